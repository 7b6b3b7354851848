//! Persistence boundary for the engine.
//!
//! Every record comes back with the version it was read at. Writes are
//! grouped into a [`WriteBatch`] of version-checked operations that a store
//! applies atomically or not at all, so a stale read surfaces as
//! [`StoreError::Conflict`] and the caller re-reads and retries.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ward_schema::{
    Action, ActionId, ControlRecord, CycleId, CycleMark, District, DistrictId, JointAction,
    JointActionId, Player, PlayerId, Politician, PoliticianId, PoliticianRelationship, Wallet,
};

mod memory;

pub use memory::{FaultMode, MemorySnapshot, MemoryStore};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Identity of a stored record, used for conflict reporting and batch checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Player(PlayerId),
    Wallet(PlayerId),
    District(DistrictId),
    Politician(PoliticianId),
    Control(DistrictId, PlayerId),
    Relationship(PoliticianId, PlayerId),
    Action(ActionId),
    Joint(JointActionId),
    Cycle(CycleId),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Player(id) => write!(f, "player:{id}"),
            RecordKey::Wallet(id) => write!(f, "wallet:{id}"),
            RecordKey::District(id) => write!(f, "district:{id}"),
            RecordKey::Politician(id) => write!(f, "politician:{id}"),
            RecordKey::Control(district, player) => write!(f, "control:{district}:{player}"),
            RecordKey::Relationship(politician, player) => {
                write!(f, "relationship:{politician}:{player}")
            }
            RecordKey::Action(id) => write!(f, "action:{id}"),
            RecordKey::Joint(id) => write!(f, "joint:{id}"),
            RecordKey::Cycle(id) => write!(f, "cycle:{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    Player,
    Action,
    Joint,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Guard {
    /// Fails the batch once the cycle's mark has left the open phase.
    CycleOpen(CycleId),
}

/// One versioned mutation. `expected` is the version read; 0 means "must not exist".
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    PutPlayer {
        player: Player,
        expected: u64,
    },
    PutWallet {
        wallet: Wallet,
        expected: u64,
    },
    PutControl {
        record: ControlRecord,
        expected: u64,
    },
    PutRelationship {
        relationship: PoliticianRelationship,
        expected: u64,
    },
    PutAction {
        action: Action,
        expected: u64,
    },
    DeleteAction {
        id: ActionId,
        expected: u64,
    },
    PutJoint {
        joint: JointAction,
        expected: u64,
    },
    DeleteJoint {
        id: JointActionId,
        expected: u64,
    },
    PutCycleMark {
        mark: CycleMark,
        expected: u64,
    },
    PutDistrict(District),
    PutPolitician(Politician),
}

impl WriteOp {
    pub fn key(&self) -> RecordKey {
        match self {
            WriteOp::PutPlayer { player, .. } => RecordKey::Player(player.id),
            WriteOp::PutWallet { wallet, .. } => RecordKey::Wallet(wallet.player),
            WriteOp::PutControl { record, .. } => {
                RecordKey::Control(record.district.clone(), record.player)
            }
            WriteOp::PutRelationship { relationship, .. } => RecordKey::Relationship(
                relationship.politician.clone(),
                relationship.player,
            ),
            WriteOp::PutAction { action, .. } => RecordKey::Action(action.id),
            WriteOp::DeleteAction { id, .. } => RecordKey::Action(*id),
            WriteOp::PutJoint { joint, .. } => RecordKey::Joint(joint.id),
            WriteOp::DeleteJoint { id, .. } => RecordKey::Joint(*id),
            WriteOp::PutCycleMark { mark, .. } => RecordKey::Cycle(mark.cycle),
            WriteOp::PutDistrict(district) => RecordKey::District(district.id.clone()),
            WriteOp::PutPolitician(politician) => RecordKey::Politician(politician.id.clone()),
        }
    }

    /// Version the op was prepared against. Catalog writes are unconditional.
    pub fn expected(&self) -> Option<u64> {
        match self {
            WriteOp::PutPlayer { expected, .. }
            | WriteOp::PutWallet { expected, .. }
            | WriteOp::PutControl { expected, .. }
            | WriteOp::PutRelationship { expected, .. }
            | WriteOp::PutAction { expected, .. }
            | WriteOp::DeleteAction { expected, .. }
            | WriteOp::PutJoint { expected, .. }
            | WriteOp::DeleteJoint { expected, .. }
            | WriteOp::PutCycleMark { expected, .. } => Some(*expected),
            WriteOp::PutDistrict(_) | WriteOp::PutPolitician(_) => None,
        }
    }
}

/// Guards plus operations committed as one unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    guards: Vec<Guard>,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, guard: Guard) -> &mut Self {
        self.guards.push(guard);
        self
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = WriteOp>) -> &mut Self {
        self.ops.extend(ops);
        self
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("version conflict on {0}")]
    Conflict(RecordKey),
    #[error("cycle {0} no longer accepts writes")]
    CycleClosed(CycleId),
    #[error("batch rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot codec failure: {0}")]
    Codec(String),
    #[error("snapshot io failure: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

/// Read and write operations the engine needs from persistence.
pub trait GameStore: Send + Sync + fmt::Debug {
    fn player(&self, id: PlayerId) -> Result<Option<Versioned<Player>>, StoreError>;
    fn players(&self) -> Result<Vec<Player>, StoreError>;
    fn wallet(&self, player: PlayerId) -> Result<Option<Versioned<Wallet>>, StoreError>;

    fn district(&self, id: &DistrictId) -> Result<Option<District>, StoreError>;
    fn districts(&self) -> Result<Vec<District>, StoreError>;
    fn politician(&self, id: &PoliticianId) -> Result<Option<Politician>, StoreError>;
    fn politicians(&self) -> Result<Vec<Politician>, StoreError>;

    fn control(
        &self,
        district: &DistrictId,
        player: PlayerId,
    ) -> Result<Option<Versioned<ControlRecord>>, StoreError>;
    fn control_records(&self) -> Result<Vec<Versioned<ControlRecord>>, StoreError>;

    fn relationship(
        &self,
        politician: &PoliticianId,
        player: PlayerId,
    ) -> Result<Option<Versioned<PoliticianRelationship>>, StoreError>;

    fn action(&self, id: ActionId) -> Result<Option<Versioned<Action>>, StoreError>;
    fn cycle_actions(&self, cycle: CycleId) -> Result<Vec<Versioned<Action>>, StoreError>;
    fn player_actions(&self, player: PlayerId) -> Result<Vec<Versioned<Action>>, StoreError>;
    /// Distinct cycles that still hold at least one pending action, ascending.
    fn pending_cycles(&self) -> Result<Vec<CycleId>, StoreError>;

    fn joint_action(&self, id: JointActionId)
        -> Result<Option<Versioned<JointAction>>, StoreError>;
    fn joint_actions(&self) -> Result<Vec<Versioned<JointAction>>, StoreError>;

    fn cycle_mark(&self, cycle: CycleId) -> Result<Option<Versioned<CycleMark>>, StoreError>;

    fn allocate_id(&self, kind: IdKind) -> Result<u64, StoreError>;
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Claims exclusive right to run `cycle`. Returns false if already held.
    fn try_acquire_cycle(&self, cycle: CycleId) -> Result<bool, StoreError>;
    fn release_cycle(&self, cycle: CycleId);

    fn district_control(
        &self,
        district: &DistrictId,
    ) -> Result<Vec<Versioned<ControlRecord>>, StoreError> {
        Ok(self
            .control_records()?
            .into_iter()
            .filter(|record| &record.value.district == district)
            .collect())
    }

    fn player_control(&self, player: PlayerId) -> Result<Vec<ControlRecord>, StoreError> {
        Ok(self
            .control_records()?
            .into_iter()
            .filter(|record| record.value.player == player)
            .map(|record| record.value)
            .collect())
    }

    fn pending_actions(&self, cycle: CycleId) -> Result<Vec<Versioned<Action>>, StoreError> {
        Ok(self
            .cycle_actions(cycle)?
            .into_iter()
            .filter(|action| action.value.is_pending())
            .collect())
    }
}

/// Exclusive claim on one cycle's pipeline, released when dropped.
#[derive(Debug)]
pub struct CycleLease {
    store: Arc<dyn GameStore>,
    cycle: CycleId,
}

impl CycleLease {
    pub fn acquire(
        store: &Arc<dyn GameStore>,
        cycle: CycleId,
    ) -> Result<Option<CycleLease>, StoreError> {
        if store.try_acquire_cycle(cycle)? {
            Ok(Some(CycleLease {
                store: Arc::clone(store),
                cycle,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        self.store.release_cycle(self.cycle);
    }
}
