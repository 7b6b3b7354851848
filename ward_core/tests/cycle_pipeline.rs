use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ward_core::store::{CycleLease, IdKind};
use ward_core::{
    ChannelNotifier, CycleOutcome, CycleScheduler, Engine, EngineConfig, EngineError, FaultMode,
    FixedRolls, GameStore, MemoryStore, NotFoundError, SkipReason, ValidationError, WorldCatalog,
    WriteBatch, WriteOp,
};
use ward_schema::{
    Action, ActionDetail, ActionId, ActionKind, ActionStatus, CycleId, CyclePhase, CycleSlot,
    DistrictId, OutcomeTier, PoliticianId, ResourceBundle, Target,
};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

fn first_cycle() -> CycleId {
    CycleId::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), CycleSlot::First)
}

fn world() -> (Arc<MemoryStore>, Engine) {
    let memory = Arc::new(MemoryStore::new());
    WorldCatalog::builtin().seed(memory.as_ref()).expect("seed world");
    let store: Arc<dyn GameStore> = memory.clone();
    let engine = Engine::new(store, EngineConfig::builtin()).expect("engine");
    (memory, engine)
}

fn vracar() -> DistrictId {
    DistrictId::new("vracar")
}

fn force(amount: u32) -> ResourceBundle {
    ResourceBundle::new(0, 0, 0, amount)
}

#[test]
fn attack_on_unheld_district_claims_it() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    let action = engine
        .actions()
        .submit(
            player.id,
            ActionKind::Attack,
            Target::District(vracar()),
            force(2),
            at(9, 0),
        )
        .expect("submit");
    assert_eq!(action.cycle, first_cycle());
    assert_eq!(engine.wallets().balance(player.id).unwrap().force, 3);

    let (notifier, notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(100), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    let report = outcome.report().expect("closed");
    assert_eq!(report.resolved, 1);
    assert!(!report.leftovers_only);

    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), 10);
    let stored = engine.store().action(action.id).unwrap().unwrap().value;
    assert_eq!(stored.status, ActionStatus::Completed);
    let result = stored.result.expect("result");
    assert_eq!(result.tier, OutcomeTier::Success);
    assert!(matches!(
        result.detail,
        ActionDetail::Transfer { claimed: true, .. }
    ));

    // 10 points sits on the participation floor: 40 % of (2, 0, 2, 0), rounded up.
    let wallet = engine.wallets().balance(player.id).unwrap();
    assert_eq!(wallet, ResourceBundle::new(6, 5, 6, 3));

    let notice = notices.try_recv().expect("notice");
    assert_eq!(notice.player, player.id);
    assert_eq!(notice.outcomes.len(), 1);
    assert_eq!(notice.outcomes[0].control_delta, 10);
    assert_eq!(notice.wallet, wallet);
    assert!(notices.try_recv().is_err());

    let mark = engine.store().cycle_mark(first_cycle()).unwrap().unwrap().value;
    assert_eq!(mark.phase, CyclePhase::Closed);
    assert_eq!(mark.notices_sent, 1);
    assert_eq!(scheduler.metrics().cycles_closed, 1);
}

#[test]
fn rerunning_a_closed_cycle_changes_nothing() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Influence,
            Target::District(vracar()),
            ResourceBundle::new(1, 1, 0, 0),
            at(9, 0),
        )
        .expect("submit");

    let (notifier, notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(100), notifier);
    scheduler.close_cycle(first_cycle(), at(13, 0)).expect("close");
    let points = engine.ledger().points(&vracar(), player.id).unwrap();
    let wallet = engine.wallets().balance(player.id).unwrap();
    let sent = notices.try_iter().count();

    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 5))
        .expect("rerun");
    let report = outcome.report().expect("closed");
    assert!(report.leftovers_only);
    assert_eq!(report.resolved, 0);
    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), points);
    assert_eq!(engine.wallets().balance(player.id).unwrap(), wallet);
    assert_eq!(sent, 1);
    assert_eq!(notices.try_iter().count(), 0);
}

#[test]
fn failure_after_commit_is_not_applied_twice() {
    let (memory, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Attack,
            Target::District(vracar()),
            force(2),
            at(9, 0),
        )
        .expect("submit");

    // The mark transition and the action commit both land, then report an outage.
    memory.inject_faults(2, FaultMode::AfterApply);
    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(100), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    assert!(matches!(outcome, CycleOutcome::Closed(_)));
    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), 10);
    assert!(engine
        .store()
        .pending_actions(first_cycle())
        .unwrap()
        .is_empty());
}

#[test]
fn outage_before_commit_halts_and_resumes() {
    let (memory, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Attack,
            Target::District(vracar()),
            force(2),
            at(9, 0),
        )
        .expect("submit");

    let attempts = engine.config().retry().max_attempts;
    memory.inject_faults(attempts + 1, FaultMode::BeforeApply);
    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(100), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    assert!(matches!(outcome, CycleOutcome::Halted { .. }));
    assert_eq!(scheduler.metrics().halted, 1);

    memory.inject_faults(0, FaultMode::BeforeApply);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 1))
        .expect("resume");
    assert_eq!(outcome.report().expect("closed").resolved, 1);
    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), 10);
}

#[test]
fn held_lease_skips_the_run() {
    let (_, engine) = world();
    let lease = CycleLease::acquire(engine.store(), first_cycle())
        .expect("acquire")
        .expect("free");
    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(50), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped {
            reason: SkipReason::LeaseHeld,
            ..
        }
    ));
    drop(lease);
    assert!(scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close")
        .report()
        .is_some());
}

#[test]
fn late_submissions_roll_into_the_next_cycle() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    let action = engine
        .actions()
        .submit(
            player.id,
            ActionKind::Reconnaissance,
            Target::District(vracar()),
            ResourceBundle::default(),
            at(12, 30),
        )
        .expect("submit");
    assert_eq!(action.cycle, first_cycle().next());

    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(50), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    assert_eq!(outcome.report().expect("closed").resolved, 0);
    assert_eq!(engine.actions().pending_for(player.id).unwrap().len(), 1);
}

#[test]
fn closed_cycle_rejects_new_submissions() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(50), notifier);
    scheduler.close_cycle(first_cycle(), at(11, 0)).expect("close");

    let err = engine
        .actions()
        .submit(
            player.id,
            ActionKind::Reconnaissance,
            Target::District(vracar()),
            ResourceBundle::default(),
            at(11, 30),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::SubmissionsClosed { .. })
    ));
    assert_eq!(
        engine.actions().allowances(player.id, at(11, 30)).unwrap().quick_left,
        2
    );
}

#[test]
fn cancelling_refunds_and_restores_the_allowance() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    let start = engine.wallets().balance(player.id).unwrap();
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Influence,
            Target::District(vracar()),
            ResourceBundle::new(2, 1, 0, 0),
            at(9, 0),
        )
        .expect("submit");
    assert_eq!(
        engine.actions().allowances(player.id, at(9, 1)).unwrap().main_left,
        0
    );

    let cancelled = engine.actions().cancel_latest(player.id, at(9, 5)).expect("cancel");
    assert_eq!(cancelled.committed, ResourceBundle::new(2, 1, 0, 0));
    assert_eq!(engine.wallets().balance(player.id).unwrap(), start);
    assert_eq!(
        engine.actions().allowances(player.id, at(9, 6)).unwrap().main_left,
        1
    );
    let err = engine
        .actions()
        .cancel_latest(player.id, at(9, 7))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotFound(NotFoundError::PendingAction(id)) if id == player.id
    ));
}

#[test]
fn timer_closes_due_cycles_once() {
    let (_, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Support,
            Target::District(vracar()),
            ResourceBundle::default(),
            at(9, 0),
        )
        .expect("submit");

    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(50), notifier);
    assert!(scheduler.on_timer(at(12, 59)).unwrap().iter().all(|o| o
        .report()
        .map_or(true, |r| r.cycle != first_cycle())));
    let outcomes = scheduler.on_timer(at(13, 0)).expect("timer");
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].report().expect("closed").cycle, first_cycle());
    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), 5);

    assert!(scheduler.on_timer(at(13, 30)).expect("timer").is_empty());
}

#[test]
fn malformed_action_is_skipped_and_the_cycle_still_closes() {
    let (memory, engine) = world();
    let player = engine.register_player("Ana", 0, at(8, 0)).expect("register");
    let bad = Action {
        id: ActionId(memory.allocate_id(IdKind::Action).expect("id")),
        player: player.id,
        kind: ActionKind::Attack,
        target: Target::Politician(PoliticianId::new("nobody")),
        committed: force(2),
        cycle: first_cycle(),
        status: ActionStatus::Pending,
        submitted_at: at(8, 30),
        joint: None,
        result: None,
    };
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::PutAction {
        action: bad.clone(),
        expected: 0,
    });
    memory.commit(batch).expect("seed bad action");
    engine
        .actions()
        .submit(
            player.id,
            ActionKind::Support,
            Target::District(vracar()),
            ResourceBundle::default(),
            at(9, 0),
        )
        .expect("submit");

    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(50), notifier);
    let outcome = scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close");
    let report = outcome.report().expect("closed");
    assert_eq!(report.resolved, 1);
    assert_eq!(report.skipped, 1);

    let stored = engine.store().action(bad.id).unwrap().unwrap().value;
    assert_eq!(stored.status, ActionStatus::Pending);
    assert_eq!(engine.ledger().points(&vracar(), player.id).unwrap(), 5);
    let mark = engine.store().cycle_mark(first_cycle()).unwrap().unwrap().value;
    assert_eq!(mark.phase, CyclePhase::Closed);
}
