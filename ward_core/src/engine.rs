use std::sync::Arc;

use bevy::prelude::Resource;
use chrono::{DateTime, Utc};
use tracing::info;
use ward_runtime::ideology::is_valid_ideology;
use ward_runtime::CycleCalendar;
use ward_schema::{CycleId, Player, PlayerId, Wallet};

use crate::actions::ActionQueue;
use crate::catalog::WorldCatalog;
use crate::config::{EngineConfig, EngineConfigError};
use crate::distribution::DistributionEngine;
use crate::error::{EngineError, NotFoundError, ValidationError};
use crate::joint::JointActions;
use crate::ledger::ControlLedger;
use crate::resolver::Resolver;
use crate::store::{GameStore, IdKind, MemoryStore, WriteBatch, WriteOp};
use crate::wallet::Wallets;

/// Shared handle to the store and configuration. Cheap to clone across workers.
#[derive(Resource, Clone, Debug)]
pub struct Engine {
    store: Arc<dyn GameStore>,
    config: Arc<EngineConfig>,
    calendar: Arc<CycleCalendar>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn GameStore>,
        config: Arc<EngineConfig>,
    ) -> Result<Self, EngineConfigError> {
        let calendar = Arc::new(config.calendar()?);
        Ok(Self {
            store,
            config,
            calendar,
        })
    }

    /// Fresh in-memory engine seeded with the built-in world.
    pub fn with_builtin_world(config: Arc<EngineConfig>) -> Result<Self, EngineError> {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        WorldCatalog::builtin().seed(store.as_ref())?;
        Ok(Engine::new(store, config)?)
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calendar(&self) -> &CycleCalendar {
        &self.calendar
    }

    pub fn open_cycle(&self, now: DateTime<Utc>) -> CycleId {
        self.calendar.open_cycle(now)
    }

    pub fn ledger(&self) -> ControlLedger<'_> {
        ControlLedger::new(self)
    }

    pub fn wallets(&self) -> Wallets<'_> {
        Wallets::new(self)
    }

    pub fn actions(&self) -> ActionQueue<'_> {
        ActionQueue::new(self)
    }

    pub fn joints(&self) -> JointActions<'_> {
        JointActions::new(self)
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self)
    }

    pub fn distribution(&self) -> DistributionEngine<'_> {
        DistributionEngine::new(self)
    }

    pub fn player(&self, id: PlayerId) -> Result<Player, EngineError> {
        self.store
            .player(id)?
            .map(|record| record.value)
            .ok_or_else(|| NotFoundError::Player(id).into())
    }

    /// Creates a player with full allowances and the starting wallet.
    pub fn register_player(
        &self,
        name: &str,
        ideology: i8,
        now: DateTime<Utc>,
    ) -> Result<Player, EngineError> {
        if !is_valid_ideology(ideology as i32) {
            return Err(ValidationError::IdeologyOutOfRange(ideology as i32).into());
        }
        let id = PlayerId(self.store.allocate_id(IdKind::Player)?);
        let player = Player {
            id,
            name: name.to_string(),
            ideology,
            allowances: self.config.allowances().fresh(now),
        };
        let wallet = Wallet::new(id, self.config.economy().starting_wallet);

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::PutPlayer {
                player: player.clone(),
                expected: 0,
            })
            .push(WriteOp::PutWallet {
                wallet,
                expected: 0,
            });
        self.store.commit(batch)?;

        info!(
            target: "ward::players",
            player = %id,
            name,
            ideology,
            "player.registered"
        );
        Ok(player)
    }
}
