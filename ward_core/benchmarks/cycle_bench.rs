use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ward_core::{
    CycleScheduler, Engine, EngineConfig, GameStore, MemoryStore, SeededRolls, TracingNotifier,
    WorldCatalog,
};
use ward_schema::{ActionKind, CycleId, CycleSlot, DistrictId, ResourceBundle, Target};

const DISTRICTS: [&str; 4] = ["stari_grad", "zemun", "vracar", "palilula"];

fn seeded_engine(players: u32) -> Engine {
    let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
    WorldCatalog::builtin()
        .seed(store.as_ref())
        .expect("seed world");
    let engine = Engine::new(store, EngineConfig::builtin()).expect("engine");
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    for index in 0..players {
        let player = engine
            .register_player(&format!("player-{index}"), 0, now)
            .expect("register");
        let district = DistrictId::new(DISTRICTS[index as usize % DISTRICTS.len()]);
        let kind = if index % 3 == 0 {
            ActionKind::Attack
        } else {
            ActionKind::Influence
        };
        engine
            .actions()
            .submit(
                player.id,
                kind,
                Target::District(district.clone()),
                ResourceBundle::new(1, 0, 0, 1),
                now,
            )
            .expect("submit main");
        engine
            .actions()
            .submit(
                player.id,
                ActionKind::Support,
                Target::District(district),
                ResourceBundle::default(),
                now,
            )
            .expect("submit quick");
    }
    engine
}

fn bench_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_close");
    let cycle = CycleId::new(
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        CycleSlot::First,
    );
    let close_at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();

    for players in [8u32, 32, 128, 256] {
        group.bench_with_input(
            BenchmarkId::new("players", players),
            &players,
            |b, &players| {
                b.iter_batched(
                    || {
                        CycleScheduler::new(
                            seeded_engine(players),
                            SeededRolls::new(7),
                            TracingNotifier,
                        )
                    },
                    |mut scheduler| {
                        scheduler.close_cycle(cycle, close_at).expect("close");
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(cycle_benches, bench_close);
criterion_main!(cycle_benches);
