use bevy::prelude::*;
use ward_schema::CycleId;

use crate::cycle::CycleRun;

/// Running totals across every close pass this scheduler has made.
#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct CycleMetrics {
    pub passes: u64,
    pub cycles_closed: u64,
    pub halted: u64,
    pub actions_resolved: u64,
    pub actions_skipped: u64,
    pub decayed_records: u64,
    pub credits_issued: u64,
    pub notices_sent: u64,
    pub notices_failed: u64,
    pub last_cycle: Option<CycleId>,
}

pub fn collect_metrics(run: Option<Res<CycleRun>>, mut metrics: ResMut<CycleMetrics>) {
    let Some(run) = run else {
        return;
    };
    metrics.passes += 1;
    metrics.last_cycle = Some(run.cycle());
    if !run.is_finished() {
        metrics.halted += 1;
        return;
    }
    let report = run.report();
    if !report.leftovers_only {
        metrics.cycles_closed += 1;
    }
    metrics.actions_resolved += report.resolved as u64;
    metrics.actions_skipped += report.skipped as u64;
    metrics.decayed_records += report.decayed as u64;
    metrics.credits_issued += report.credits.len() as u64;
    metrics.notices_sent += report.notices_sent as u64;
    metrics.notices_failed += report.notices_failed as u64;
}
