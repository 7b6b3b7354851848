use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ward_core::{
    ChannelNotifier, ConflictError, CycleScheduler, Engine, EngineConfig, EngineError, FixedRolls,
    GameStore, MemoryStore, ValidationError, WorldCatalog,
};
use ward_schema::{
    ActionDetail, ActionKind, CycleId, CycleSlot, DistrictId, JointStatus, OutcomeTier,
    PoliticianId, ResourceBundle, ResourceKind, Target,
};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

fn first_cycle() -> CycleId {
    CycleId::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), CycleSlot::First)
}

fn engine() -> Engine {
    let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
    WorldCatalog::builtin().seed(store.as_ref()).expect("seed world");
    Engine::new(store, EngineConfig::builtin()).expect("engine")
}

fn close(engine: &Engine, roll: u8) {
    let (notifier, _notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(roll), notifier);
    scheduler
        .close_cycle(first_cycle(), at(13, 0))
        .expect("close")
        .report()
        .expect("closed");
}

fn district(id: &str) -> DistrictId {
    DistrictId::new(id)
}

#[test]
fn two_player_joint_attack_lands_fourteen() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let bojan = engine.register_player("Bojan", 0, at(8, 0)).unwrap();
    let one_force = ResourceBundle::single(ResourceKind::Force, 1);

    let joint = engine
        .joints()
        .open(ana.id, ActionKind::Attack, district("zemun"), one_force, at(9, 0))
        .expect("open");
    let joined = engine
        .joints()
        .attach(joint.id, bojan.id, one_force, at(9, 30))
        .expect("attach");
    assert_eq!(joined.participant_count(), 2);
    assert_eq!(joined.total_units(), 2);

    close(&engine, 100);

    assert_eq!(engine.ledger().points(&district("zemun"), ana.id).unwrap(), 14);
    assert_eq!(engine.ledger().points(&district("zemun"), bojan.id).unwrap(), 0);
    let settled = engine.joints().get(joint.id).unwrap();
    assert_eq!(settled.status, JointStatus::Resolved);
    let multiplier = settled.multiplier.expect("multiplier");
    assert!((multiplier - 1.4).abs() < 1e-5);
    assert_eq!(engine.wallets().balance(bojan.id).unwrap().force, 4);
}

#[test]
fn joint_without_quorum_expires_and_refunds() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let joint = engine
        .joints()
        .open(
            ana.id,
            ActionKind::Influence,
            district("zemun"),
            ResourceBundle::new(1, 1, 0, 0),
            at(9, 0),
        )
        .expect("open");
    assert_eq!(engine.wallets().balance(ana.id).unwrap().influence, 4);

    close(&engine, 100);

    let settled = engine.joints().get(joint.id).unwrap();
    assert_eq!(settled.status, JointStatus::Expired);
    let action = engine.store().action(joint.action).unwrap().unwrap().value;
    let result = action.result.expect("result");
    assert_eq!(result.tier, OutcomeTier::Failure);
    assert!(result.refunded);
    assert!(matches!(result.detail, ActionDetail::Expired { participants: 1 }));
    assert_eq!(engine.wallets().balance(ana.id).unwrap(), ResourceBundle::uniform(5));
    assert_eq!(engine.ledger().points(&district("zemun"), ana.id).unwrap(), 0);
}

#[test]
fn failed_joint_refunds_every_participant() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let bojan = engine.register_player("Bojan", 0, at(8, 0)).unwrap();
    let one_force = ResourceBundle::single(ResourceKind::Force, 1);
    let joint = engine
        .joints()
        .open(ana.id, ActionKind::Attack, district("zemun"), one_force, at(9, 0))
        .expect("open");
    engine
        .joints()
        .attach(joint.id, bojan.id, one_force, at(9, 30))
        .expect("attach");
    assert_eq!(engine.wallets().balance(bojan.id).unwrap().force, 4);

    close(&engine, 1);

    let settled = engine.joints().get(joint.id).unwrap();
    assert_eq!(settled.status, JointStatus::Resolved);
    let result = engine
        .store()
        .action(joint.action)
        .unwrap()
        .unwrap()
        .value
        .result
        .expect("result");
    assert_eq!(result.tier, OutcomeTier::Failure);
    assert!(result.refunded);
    assert_eq!(engine.wallets().balance(ana.id).unwrap(), ResourceBundle::uniform(5));
    assert_eq!(engine.wallets().balance(bojan.id).unwrap(), ResourceBundle::uniform(5));
    assert_eq!(engine.ledger().points(&district("zemun"), ana.id).unwrap(), 0);
}

#[test]
fn attaching_after_expiry_or_twice_is_rejected() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let bojan = engine.register_player("Bojan", 0, at(8, 0)).unwrap();
    let one_force = ResourceBundle::single(ResourceKind::Force, 1);
    let joint = engine
        .joints()
        .open(ana.id, ActionKind::Defense, district("vozdovac"), one_force, at(8, 30))
        .expect("open");

    let err = engine
        .joints()
        .attach(joint.id, ana.id, one_force, at(8, 40))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::AlreadyJoined { .. })
    ));

    let err = engine
        .joints()
        .attach(joint.id, bojan.id, one_force, at(10, 31))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::JointExpired(_))
    ));
    assert_eq!(engine.wallets().balance(bojan.id).unwrap().force, 5);

    let err = engine
        .joints()
        .open(bojan.id, ActionKind::Support, district("vozdovac"), one_force, at(9, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::JointUnsupported { .. })
    ));
}

#[test]
fn defense_blunts_an_attack_in_the_same_cycle() {
    let engine = engine();
    let holder = engine.register_player("Holder", 0, at(8, 0)).unwrap();
    let raider = engine.register_player("Raider", 0, at(8, 0)).unwrap();
    engine
        .ledger()
        .adjust(holder.id, &district("vracar"), 40, at(8, 0))
        .unwrap();

    // Submitted first, resolved second: defenses always go first.
    engine
        .actions()
        .submit(
            raider.id,
            ActionKind::Attack,
            Target::District(district("vracar")),
            ResourceBundle::new(0, 0, 0, 2),
            at(9, 0),
        )
        .unwrap();
    engine
        .actions()
        .submit(
            holder.id,
            ActionKind::Defense,
            Target::District(district("vracar")),
            ResourceBundle::new(0, 1, 0, 1),
            at(10, 0),
        )
        .unwrap();

    close(&engine, 100);

    // 10 effect, half blocked by the 50 % fortification.
    assert_eq!(engine.ledger().points(&district("vracar"), holder.id).unwrap(), 35);
    assert_eq!(engine.ledger().points(&district("vracar"), raider.id).unwrap(), 5);
}

#[test]
fn attack_takes_no_more_than_the_defender_holds() {
    let engine = engine();
    let holder = engine.register_player("Holder", 0, at(8, 0)).unwrap();
    let raider = engine.register_player("Raider", 0, at(8, 0)).unwrap();
    engine
        .ledger()
        .adjust(holder.id, &district("vracar"), 3, at(8, 0))
        .unwrap();
    let action = engine
        .actions()
        .submit(
            raider.id,
            ActionKind::Attack,
            Target::District(district("vracar")),
            ResourceBundle::new(0, 0, 0, 2),
            at(9, 0),
        )
        .unwrap();

    close(&engine, 100);

    assert_eq!(engine.ledger().points(&district("vracar"), holder.id).unwrap(), 0);
    assert_eq!(engine.ledger().points(&district("vracar"), raider.id).unwrap(), 3);
    let result = engine
        .store()
        .action(action.id)
        .unwrap()
        .unwrap()
        .value
        .result
        .expect("result");
    assert_eq!(result.control_delta, 3);
    assert!(matches!(
        result.detail,
        ActionDetail::Transfer { taken: 3, claimed: false, .. }
    ));
}

#[test]
fn idle_control_decays_at_close() {
    let engine = engine();
    let idle = engine.register_player("Idle", 0, at(8, 0)).unwrap();
    engine
        .ledger()
        .adjust(idle.id, &district("cukarica"), 3, at(8, 0))
        .unwrap();
    engine
        .ledger()
        .adjust(idle.id, &district("palilula"), 40, at(8, 0))
        .unwrap();

    close(&engine, 50);

    assert_eq!(engine.ledger().points(&district("cukarica"), idle.id).unwrap(), 0);
    assert_eq!(engine.ledger().points(&district("palilula"), idle.id).unwrap(), 35);
    // 35 points pays the firm tier: 80 % of (0, 0, 3, 1), rounded up.
    assert_eq!(
        engine.wallets().balance(idle.id).unwrap(),
        ResourceBundle::new(5, 5, 8, 6)
    );
}

#[test]
fn payout_preview_follows_the_tiers() {
    let engine = engine();
    let strong = engine.register_player("Strong", 0, at(8, 0)).unwrap();
    let weak = engine.register_player("Weak", 0, at(8, 0)).unwrap();
    engine
        .ledger()
        .adjust(strong.id, &district("novi_beograd"), 55, at(8, 0))
        .unwrap();
    engine
        .ledger()
        .adjust(weak.id, &district("novi_beograd"), 30, at(8, 0))
        .unwrap();

    let lines = engine.distribution().preview().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].player, strong.id);
    assert_eq!(lines[0].credited.economy, 3);
    assert_eq!(lines[1].player, weak.id);
    assert_eq!(lines[1].credited.economy, 2);

    let credited = engine.distribution().distribute(at(8, 30)).unwrap();
    assert_eq!(credited, lines);
    assert_eq!(engine.wallets().balance(strong.id).unwrap().economy, 8);
}

#[test]
fn courting_a_politician_warms_them() {
    let engine = engine();
    let ana = engine.register_player("Ana", -4, at(8, 0)).unwrap();
    let target = PoliticianId::new("maria_kovac");
    engine
        .actions()
        .submit(
            ana.id,
            ActionKind::PoliticianInfluence,
            Target::Politician(target.clone()),
            ResourceBundle::new(2, 0, 0, 0),
            at(9, 0),
        )
        .unwrap();

    close(&engine, 100);

    let relationship = engine
        .store()
        .relationship(&target, ana.id)
        .unwrap()
        .expect("relationship")
        .value;
    assert_eq!(relationship.friendliness, 60);
    assert_eq!(relationship.interactions, 1);
}

#[test]
fn undermining_cools_the_home_district_leader() {
    let engine = engine();
    let holder = engine.register_player("Holder", 0, at(8, 0)).unwrap();
    let schemer = engine.register_player("Schemer", -5, at(8, 0)).unwrap();
    engine
        .ledger()
        .adjust(holder.id, &district("vracar"), 40, at(8, 0))
        .unwrap();
    let target = PoliticianId::new("dragan_jovic");
    engine
        .actions()
        .submit(
            schemer.id,
            ActionKind::PoliticianUndermine,
            Target::Politician(target.clone()),
            ResourceBundle::new(1, 1, 0, 0),
            at(9, 0),
        )
        .unwrap();

    close(&engine, 100);

    let theirs = engine
        .store()
        .relationship(&target, holder.id)
        .unwrap()
        .expect("holder relationship")
        .value;
    assert_eq!(theirs.friendliness, 40);
    let mine = engine
        .store()
        .relationship(&target, schemer.id)
        .unwrap()
        .expect("schemer relationship")
        .value;
    assert_eq!(mine.friendliness, 50);
    assert_eq!(mine.interactions, 1);
}

#[test]
fn exchange_trades_two_for_one() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let balances = engine
        .wallets()
        .exchange(ana.id, ResourceKind::Economy, ResourceKind::Force, 2)
        .unwrap();
    assert_eq!(balances, ResourceBundle::new(5, 1, 5, 7));

    let err = engine
        .wallets()
        .exchange(ana.id, ResourceKind::Economy, ResourceKind::Force, 1)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InsufficientResources { .. })
    ));
    assert_eq!(engine.wallets().balance(ana.id).unwrap(), balances);
}

#[test]
fn main_actions_need_two_units_and_an_allowance() {
    let engine = engine();
    let ana = engine.register_player("Ana", 0, at(8, 0)).unwrap();
    let target = Target::District(district("zemun"));

    let err = engine
        .actions()
        .submit(
            ana.id,
            ActionKind::Influence,
            target.clone(),
            ResourceBundle::single(ResourceKind::Influence, 1),
            at(9, 0),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidComposition { units: 1, minimum: 2 })
    ));

    engine
        .actions()
        .submit(
            ana.id,
            ActionKind::Influence,
            target.clone(),
            ResourceBundle::single(ResourceKind::Influence, 2),
            at(9, 0),
        )
        .unwrap();
    let err = engine
        .actions()
        .submit(
            ana.id,
            ActionKind::Attack,
            target.clone(),
            ResourceBundle::single(ResourceKind::Force, 2),
            at(9, 5),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::NoActionsRemaining { .. })
    ));

    let err = engine
        .actions()
        .submit(
            ana.id,
            ActionKind::PoliticianInfluence,
            target,
            ResourceBundle::default(),
            at(9, 5),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidTarget { .. })
    ));
}
