//! Cycle resolution and resource economy engine for the Ward territorial game.
//!
//! Players queue actions against districts and politicians between two daily
//! deadlines. Closing a cycle resolves every queued action once, decays idle
//! control, pays district yields by control tier and hands each affected
//! player a summary. State lives behind the [`GameStore`] trait; the close
//! pipeline is a Bevy schedule driven by [`CycleScheduler`].

pub mod actions;
pub mod catalog;
pub mod config;
pub mod cycle;
pub mod dice;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod joint;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod wallet;

use bevy::prelude::*;

pub use actions::{resolution_order, ActionQueue};
pub use catalog::{WorldCatalog, WorldCatalogError, BUILTIN_WORLD};
pub use config::{
    load_engine_config_from_env, ControlConfig, EconomyConfig, EngineConfig, EngineConfigError,
    EngineConfigMetadata, JointConfig, ServerConfig, BUILTIN_ENGINE_CONFIG,
};
pub use cycle::{
    CycleOutcome, CycleReport, CycleRun, CycleScheduler, SchedulerPhase, SchedulerState,
    SkipReason,
};
pub use dice::{CycleDice, FixedRolls, RollSource, SeededRolls};
pub use distribution::{plan_distribution, plan_headlines, DistributionEngine};
pub use engine::Engine;
pub use error::{ConflictError, EngineError, NotFoundError, ResolutionError, ValidationError};
pub use joint::JointActions;
pub use ledger::{decay_ops, ControlLedger};
pub use metrics::CycleMetrics;
pub use notify::{
    build_notices, ChannelNotifier, Notifier, NotifierHandle, NotifyError, TracingNotifier,
};
pub use resolver::{DefenseLedger, Resolution, Resolver};
pub use retry::RetryPolicy;
pub use store::{
    CycleLease, FaultMode, GameStore, MemorySnapshot, MemoryStore, StoreError, Versioned,
    WriteBatch, WriteOp,
};
pub use wallet::Wallets;

/// Construct a Bevy [`App`] configured with the cycle close pipeline.
///
/// The chained systems only do work while a [`CycleRun`] resource is present;
/// [`CycleScheduler::close_cycle`] inserts one and calls [`App::update`].
pub fn build_cycle_app(engine: Engine, dice: CycleDice, notifier: NotifierHandle) -> App {
    let mut app = App::new();

    app.insert_resource(engine)
        .insert_resource(dice)
        .insert_resource(notifier)
        .insert_resource(SchedulerState::default())
        .insert_resource(CycleMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                cycle::begin_cycle.run_if(cycle::cycle_running),
                cycle::resolve_pending_actions.run_if(cycle::cycle_running),
                cycle::settle_districts.run_if(cycle::cycle_running),
                cycle::dispatch_notifications.run_if(cycle::cycle_running),
                cycle::finish_cycle.run_if(cycle::cycle_running),
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}
