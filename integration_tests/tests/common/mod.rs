#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ward_core::{
    load_engine_config_from_env, ChannelNotifier, CycleOutcome, CycleScheduler, Engine,
    FixedRolls, GameStore, MemoryStore, WorldCatalog,
};
use ward_schema::{CycleId, CycleSlot, PlayerCycleNotice};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_engine_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test engine config at {}",
            config_path.display()
        );

        std::env::set_var("WARD_CONFIG_PATH", &config_path);
    });
}

pub fn game_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

pub fn cycle(slot: CycleSlot) -> CycleId {
    CycleId::new(game_day(), slot)
}

/// Engine over a fresh seeded store, configured from the fixture.
pub fn fixture_engine() -> (Arc<MemoryStore>, Engine) {
    ensure_test_config();
    let (config, _) = load_engine_config_from_env();
    let memory = Arc::new(MemoryStore::new());
    WorldCatalog::builtin()
        .seed(memory.as_ref())
        .expect("seed world");
    let store: Arc<dyn GameStore> = memory.clone();
    let engine = Engine::new(store, config).expect("engine");
    (memory, engine)
}

pub fn close_with_roll(
    engine: &Engine,
    roll: u8,
    cycle: CycleId,
    now: DateTime<Utc>,
) -> (CycleOutcome, Vec<PlayerCycleNotice>) {
    let (notifier, notices) = ChannelNotifier::unbounded();
    let mut scheduler = CycleScheduler::new(engine.clone(), FixedRolls::always(roll), notifier);
    let outcome = scheduler.close_cycle(cycle, now).expect("close");
    (outcome, notices.try_iter().collect())
}
