//! Cycle close pipeline.
//!
//! Closing a cycle runs as one pass of a Bevy schedule: begin, resolve,
//! settle, notify, finish and metrics systems chained in that order. Every
//! phase boundary is persisted in the cycle's [`CycleMark`], so a pass that
//! stops part way resumes from the recorded phase, and a closed cycle only
//! picks up actions that were left pending.

use std::collections::BTreeSet;

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use ward_schema::{
    Action, ActionStatus, CreditLine, CycleId, CycleMark, CyclePhase, DistrictId, Headline,
    PlayerId, Target,
};

use crate::actions::resolution_order;
use crate::dice::{CycleDice, RollSource};
use crate::distribution::{credit_ops, plan_distribution, plan_headlines};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::ledger::decay_ops;
use crate::metrics::CycleMetrics;
use crate::notify::{build_notices, Notifier, NotifierHandle};
use crate::resolver::DefenseLedger;
use crate::store::{CycleLease, Versioned, WriteBatch, WriteOp};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerPhase {
    #[default]
    AwaitingSubmissions,
    Resolving,
    Distributing,
    Notifying,
}

#[derive(Resource, Clone, Debug, Default)]
pub struct SchedulerState {
    pub phase: SchedulerPhase,
    pub last_closed: Option<CycleId>,
}

/// What one close pass did.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub cycle: CycleId,
    /// True when the cycle was already closed and only leftovers were retried.
    pub leftovers_only: bool,
    pub resolved: u32,
    pub skipped: u32,
    pub decayed: u32,
    pub credits: Vec<CreditLine>,
    pub headlines: Vec<Headline>,
    pub notices_sent: u32,
    pub notices_failed: u32,
    pub purged: usize,
}

impl CycleReport {
    fn new(cycle: CycleId) -> Self {
        Self {
            cycle,
            leftovers_only: false,
            resolved: 0,
            skipped: 0,
            decayed: 0,
            credits: Vec::new(),
            headlines: Vec::new(),
            notices_sent: 0,
            notices_failed: 0,
            purged: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    LeaseHeld,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Closed(CycleReport),
    /// A storage failure stopped the pass; the mark keeps the phase reached.
    Halted {
        cycle: CycleId,
        phase: CyclePhase,
        error: EngineError,
    },
    Skipped {
        cycle: CycleId,
        reason: SkipReason,
    },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Closed(report) => Some(report),
            _ => None,
        }
    }
}

/// State of the pass in flight, present only while `close_cycle` runs.
#[derive(Resource, Debug)]
pub struct CycleRun {
    cycle: CycleId,
    now: DateTime<Utc>,
    phase: CyclePhase,
    leftovers_only: bool,
    defense: DefenseLedger,
    report: CycleReport,
    halted: Option<EngineError>,
    finished: bool,
}

impl CycleRun {
    fn new(cycle: CycleId, now: DateTime<Utc>) -> Self {
        Self {
            cycle,
            now,
            phase: CyclePhase::Open,
            leftovers_only: false,
            defense: DefenseLedger::default(),
            report: CycleReport::new(cycle),
            halted: None,
            finished: false,
        }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn report(&self) -> &CycleReport {
        &self.report
    }

    fn halt(&mut self, stage: &'static str, err: EngineError) {
        error!(
            target: "ward::cycle",
            cycle = %self.cycle,
            stage,
            error = %err,
            "cycle.halted"
        );
        self.halted = Some(err);
    }

    fn into_outcome(self) -> CycleOutcome {
        match self.halted {
            Some(error) => CycleOutcome::Halted {
                cycle: self.cycle,
                phase: self.phase,
                error,
            },
            None => CycleOutcome::Closed(self.report),
        }
    }
}

pub(crate) fn cycle_running(run: Option<Res<CycleRun>>) -> bool {
    run.map_or(false, |run| run.halted.is_none() && !run.finished)
}

pub(crate) fn begin_cycle(
    engine: Res<Engine>,
    mut run: ResMut<CycleRun>,
    mut state: ResMut<SchedulerState>,
) {
    state.phase = SchedulerPhase::Resolving;
    if let Err(err) = begin(&engine, &mut run) {
        run.halt("begin", err);
    }
}

fn begin(engine: &Engine, run: &mut CycleRun) -> Result<(), EngineError> {
    let store = engine.store();
    let (cycle, now) = (run.cycle, run.now);
    let phase = engine.config().retry().run("cycle.begin", |_| {
        let current = store.cycle_mark(cycle)?;
        let (mut mark, expected) = match current {
            Some(record) if record.value.phase != CyclePhase::Open => {
                return Ok(record.value.phase)
            }
            Some(record) => (record.value, record.version),
            None => (CycleMark::new(cycle, now), 0),
        };
        mark.phase = CyclePhase::Resolving;
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutCycleMark { mark, expected });
        store.commit(batch)?;
        Ok(CyclePhase::Resolving)
    })?;
    run.phase = phase;
    run.leftovers_only = phase == CyclePhase::Closed;
    run.report.leftovers_only = run.leftovers_only;

    let completed: Vec<Action> = store
        .cycle_actions(cycle)?
        .into_iter()
        .map(|record| record.value)
        .filter(|action| action.status == ActionStatus::Completed)
        .collect();
    run.defense =
        DefenseLedger::from_completed(&completed, engine.config().joint().defense_cap_pct);
    info!(
        target: "ward::cycle",
        %cycle,
        phase = ?phase,
        leftovers_only = run.leftovers_only,
        "cycle.begin"
    );
    Ok(())
}

pub(crate) fn resolve_pending_actions(
    engine: Res<Engine>,
    mut dice: ResMut<CycleDice>,
    mut run: ResMut<CycleRun>,
) {
    if run.phase != CyclePhase::Resolving && !run.leftovers_only {
        return;
    }
    if let Err(err) = resolve_all(&engine, dice.0.as_mut(), &mut run) {
        run.halt("resolve", err);
    }
}

fn resolve_all(
    engine: &Engine,
    dice: &mut dyn RollSource,
    run: &mut CycleRun,
) -> Result<(), EngineError> {
    let store = engine.store();
    let cycle = run.cycle;
    let mut pending: Vec<Action> = store
        .pending_actions(cycle)?
        .into_iter()
        .map(|record| record.value)
        .collect();
    resolution_order(&mut pending);

    for action in &pending {
        match resolve_one(engine, dice, &mut run.defense, action, run.now) {
            Ok(true) => run.report.resolved += 1,
            Ok(false) => {}
            Err(err) if err.skips_action() => {
                warn!(
                    target: "ward::cycle",
                    %cycle,
                    action = %action.id,
                    player = %action.player,
                    error = %err,
                    "action.skipped"
                );
                run.report.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    let (resolved, skipped, leftovers_only) =
        (run.report.resolved, run.report.skipped, run.leftovers_only);
    engine.config().retry().run("cycle.resolved", |_| {
        let Some(current) = store.cycle_mark(cycle)? else {
            return Ok(());
        };
        let mut mark = current.value;
        if leftovers_only {
            mark.resolved += resolved;
            mark.skipped = skipped;
        } else if mark.phase == CyclePhase::Resolving {
            mark.resolved = resolved;
            mark.skipped = skipped;
            mark.phase = CyclePhase::Distributing;
        } else {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutCycleMark {
            mark,
            expected: current.version,
        });
        store.commit(batch)?;
        Ok(())
    })?;
    if !leftovers_only {
        run.phase = CyclePhase::Distributing;
    }
    info!(
        target: "ward::cycle",
        %cycle,
        resolved,
        skipped,
        "cycle.resolved"
    );
    Ok(())
}

/// Resolves one action, committing its effects together with the status
/// change. Returns false if the action was already completed.
fn resolve_one(
    engine: &Engine,
    dice: &mut dyn RollSource,
    defense: &mut DefenseLedger,
    pending: &Action,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let store = engine.store();
    let cap = engine.config().joint().defense_cap_pct;
    engine.config().retry().run("cycle.resolve_action", |_| {
        let Some(current) = store.action(pending.id)? else {
            return Ok(false);
        };
        if !current.value.is_pending() {
            defense.absorb(&current.value, cap);
            return Ok(false);
        }
        let action = &current.value;
        let resolution = if action.joint.is_some() {
            engine.joints().settle(action, dice, defense, now)?
        } else {
            engine.resolver().resolve(action, 1.0, dice, defense, now)?
        };

        let mut completed = action.clone();
        completed.status = ActionStatus::Completed;
        completed.result = Some(resolution.result.clone());
        let mut batch = WriteBatch::new();
        batch.extend(resolution.writes).push(WriteOp::PutAction {
            action: completed,
            expected: current.version,
        });
        store.commit(batch)?;

        if let Some((district, player, pct)) = resolution.fortify {
            defense.register(district, player, pct, cap);
        }
        info!(
            target: "ward::cycle",
            action = %action.id,
            player = %action.player,
            kind = action.kind.as_str(),
            tier = resolution.result.tier.as_str(),
            delta = resolution.result.control_delta,
            "action.resolved"
        );
        Ok(true)
    })
}

pub(crate) fn settle_districts(
    engine: Res<Engine>,
    mut run: ResMut<CycleRun>,
    mut state: ResMut<SchedulerState>,
) {
    if run.leftovers_only || run.phase != CyclePhase::Distributing {
        return;
    }
    state.phase = SchedulerPhase::Distributing;
    if let Err(err) = settle(&engine, &mut run) {
        run.halt("settle", err);
    }
}

/// Decay, payout and the move to `Notifying`, committed as one batch.
fn settle(engine: &Engine, run: &mut CycleRun) -> Result<(), EngineError> {
    let store = engine.store();
    let (cycle, now) = (run.cycle, run.now);
    let config = engine.config();
    let mark = config.retry().run("cycle.settle", |_| {
        let Some(current) = store.cycle_mark(cycle)? else {
            return Ok(None);
        };
        if current.value.phase != CyclePhase::Distributing {
            return Ok(Some(current.value));
        }

        let active = active_holders(engine, cycle)?;
        let records = store.control_records()?;
        let decay = decay_ops(&records, &active, config.control().decay_per_cycle, now);
        let decayed = decay.len() as u32;
        let mut snapshot: Vec<_> = records.iter().map(|record| record.value.clone()).collect();
        for op in &decay {
            if let WriteOp::PutControl { record, .. } = op {
                let slot = snapshot.iter_mut().find(|held| {
                    held.district == record.district && held.player == record.player
                });
                if let Some(slot) = slot {
                    *slot = record.clone();
                }
            }
        }

        let districts = store.districts()?;
        let credits = plan_distribution(config.payout(), &districts, &snapshot);
        let headlines = plan_headlines(config.payout(), &districts, &store.players()?, &snapshot);

        let mut mark = current.value;
        mark.phase = CyclePhase::Notifying;
        mark.decayed = decayed;
        mark.credits = credits.clone();
        mark.headlines = headlines;

        let mut batch = WriteBatch::new();
        batch
            .extend(decay)
            .extend(credit_ops(store.as_ref(), &credits)?)
            .push(WriteOp::PutCycleMark {
                mark: mark.clone(),
                expected: current.version,
            });
        store.commit(batch)?;
        Ok(Some(mark))
    })?;

    if let Some(mark) = mark {
        info!(
            target: "ward::cycle",
            %cycle,
            decayed = mark.decayed,
            credits = mark.credits.len(),
            headlines = mark.headlines.len(),
            "cycle.settled"
        );
        run.phase = mark.phase;
    }
    Ok(())
}

/// (district, player) pairs that exercised influence in `cycle`.
fn active_holders(
    engine: &Engine,
    cycle: CycleId,
) -> Result<BTreeSet<(DistrictId, PlayerId)>, EngineError> {
    let store = engine.store();
    let mut active = BTreeSet::new();
    for record in store.cycle_actions(cycle)? {
        let action = record.value;
        if action.status != ActionStatus::Completed {
            continue;
        }
        if let Target::District(district) = &action.target {
            active.insert((district.clone(), action.player));
        }
    }
    for record in store.joint_actions()? {
        let joint = record.value;
        if joint.cycle != cycle {
            continue;
        }
        for participant in &joint.participants {
            active.insert((joint.district.clone(), participant.player));
        }
    }
    Ok(active)
}

pub(crate) fn dispatch_notifications(
    engine: Res<Engine>,
    notifier: Res<NotifierHandle>,
    mut run: ResMut<CycleRun>,
    mut state: ResMut<SchedulerState>,
) {
    if run.leftovers_only || run.phase != CyclePhase::Notifying {
        return;
    }
    state.phase = SchedulerPhase::Notifying;
    if let Err(err) = notify(&engine, notifier.0.as_ref(), &mut run) {
        run.halt("notify", err);
    }
}

fn notify(
    engine: &Engine,
    notifier: &dyn Notifier,
    run: &mut CycleRun,
) -> Result<(), EngineError> {
    let store = engine.store();
    let cycle = run.cycle;
    let Some(current) = store.cycle_mark(cycle)? else {
        return Ok(());
    };
    let actions: Vec<Action> = store
        .cycle_actions(cycle)?
        .into_iter()
        .map(|record| record.value)
        .collect();
    let notices = build_notices(
        store.as_ref(),
        cycle,
        &actions,
        &current.value.credits,
        &current.value.headlines,
    )?;

    let (mut sent, mut failed) = (0u32, 0u32);
    for notice in &notices {
        match notifier.deliver(notice) {
            Ok(()) => sent += 1,
            Err(err) => {
                failed += 1;
                warn!(
                    target: "ward::notify",
                    %cycle,
                    player = %notice.player,
                    error = %err,
                    "notice.failed"
                );
            }
        }
    }

    let now = run.now;
    engine.config().retry().run("cycle.notified", |_| {
        let Some(current) = store.cycle_mark(cycle)? else {
            return Ok(());
        };
        if current.value.phase != CyclePhase::Notifying {
            return Ok(());
        }
        let mut mark = current.value;
        mark.phase = CyclePhase::Closed;
        mark.closed_at = Some(now);
        mark.notices_sent = sent;
        mark.notices_failed = failed;
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutCycleMark {
            mark,
            expected: current.version,
        });
        store.commit(batch)?;
        Ok(())
    })?;
    run.phase = CyclePhase::Closed;
    info!(
        target: "ward::cycle",
        %cycle,
        sent,
        failed,
        "cycle.notified"
    );
    Ok(())
}

pub(crate) fn finish_cycle(
    engine: Res<Engine>,
    mut run: ResMut<CycleRun>,
    mut state: ResMut<SchedulerState>,
) {
    state.phase = SchedulerPhase::AwaitingSubmissions;
    if let Err(err) = finish(&engine, &mut run) {
        run.halt("finish", err);
        return;
    }
    state.last_closed = Some(run.cycle);
    run.finished = true;
}

fn finish(engine: &Engine, run: &mut CycleRun) -> Result<(), EngineError> {
    let cycle = run.cycle;
    if let Some(Versioned { value: mark, .. }) = engine.store().cycle_mark(cycle)? {
        if !run.leftovers_only {
            run.report.decayed = mark.decayed;
            run.report.credits = mark.credits;
            run.report.headlines = mark.headlines;
            run.report.notices_sent = mark.notices_sent;
            run.report.notices_failed = mark.notices_failed;
        }
    }
    run.report.purged = engine.joints().purge_finished(run.now)?;
    info!(
        target: "ward::cycle",
        %cycle,
        resolved = run.report.resolved,
        skipped = run.report.skipped,
        leftovers_only = run.leftovers_only,
        "cycle.closed"
    );
    Ok(())
}

/// Drives close passes through the cycle app.
pub struct CycleScheduler {
    app: App,
}

impl CycleScheduler {
    pub fn new(
        engine: Engine,
        dice: impl RollSource + 'static,
        notifier: impl Notifier + 'static,
    ) -> Self {
        Self {
            app: crate::build_cycle_app(
                engine,
                CycleDice::new(dice),
                NotifierHandle::new(notifier),
            ),
        }
    }

    pub fn engine(&self) -> &Engine {
        self.app.world.resource::<Engine>()
    }

    pub fn state(&self) -> &SchedulerState {
        self.app.world.resource::<SchedulerState>()
    }

    pub fn metrics(&self) -> &CycleMetrics {
        self.app.world.resource::<CycleMetrics>()
    }

    /// Runs the close pipeline for `cycle` under its lease.
    pub fn close_cycle(
        &mut self,
        cycle: CycleId,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, EngineError> {
        let store = self.engine().store().clone();
        let Some(_lease) = CycleLease::acquire(&store, cycle)? else {
            info!(target: "ward::cycle", %cycle, "cycle.skipped=lease_held");
            return Ok(CycleOutcome::Skipped {
                cycle,
                reason: SkipReason::LeaseHeld,
            });
        };
        self.app.world.insert_resource(CycleRun::new(cycle, now));
        self.app.update();
        let outcome = match self.app.world.remove_resource::<CycleRun>() {
            Some(run) => run.into_outcome(),
            None => CycleOutcome::Skipped {
                cycle,
                reason: SkipReason::LeaseHeld,
            },
        };
        if let CycleOutcome::Halted { .. } = outcome {
            self.app.world.resource_mut::<SchedulerState>().phase =
                SchedulerPhase::AwaitingSubmissions;
        }
        Ok(outcome)
    }

    /// Closes every cycle whose results are due at `now` and that has not
    /// been closed yet, oldest first.
    pub fn on_timer(&mut self, now: DateTime<Utc>) -> Result<Vec<CycleOutcome>, EngineError> {
        let engine = self.engine().clone();
        let store = engine.store();
        let due = engine.calendar().due_cycle(now);
        let mut cycles: BTreeSet<CycleId> = store
            .pending_cycles()?
            .into_iter()
            .filter(|cycle| *cycle <= due)
            .collect();
        cycles.insert(due);

        let mut outcomes = Vec::new();
        for cycle in cycles {
            let closed = store
                .cycle_mark(cycle)?
                .map_or(false, |mark| mark.value.phase == CyclePhase::Closed);
            if closed {
                continue;
            }
            outcomes.push(self.close_cycle(cycle, now)?);
        }
        Ok(outcomes)
    }
}
