use chrono::{DateTime, Utc};
use tracing::info;
use ward_schema::{
    Action, ActionClass, ActionId, ActionKind, ActionStatus, Allowances, JointStatus, PlayerId,
    ResourceBundle, Target,
};

use crate::engine::Engine;
use crate::error::{ConflictError, EngineError, NotFoundError, ValidationError};
use crate::store::{Guard, IdKind, StoreError, WriteBatch, WriteOp};
use crate::wallet::{load_wallet, refund_op};

/// Validates submissions and keeps the per-cycle queue of pending actions.
pub struct ActionQueue<'a> {
    engine: &'a Engine,
}

impl<'a> ActionQueue<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Debits the wallet, spends an allowance and queues the action for the open cycle.
    pub fn submit(
        &self,
        player: PlayerId,
        kind: ActionKind,
        target: Target,
        committed: ResourceBundle,
        now: DateTime<Utc>,
    ) -> Result<Action, EngineError> {
        let minimum = match kind.class() {
            ActionClass::Main => self.engine.config().economy().min_main_units,
            ActionClass::Quick => 0,
        };
        let action = self
            .engine
            .config()
            .retry()
            .run_on_conflict("actions.submit", |_| {
                let (mut batch, action) =
                    self.stage(player, kind, &target, committed, minimum, now)?;
                batch.push(WriteOp::PutAction {
                    action: action.clone(),
                    expected: 0,
                });
                self.engine
                    .store()
                    .commit(batch)
                    .map_err(submission_guard_error)?;
                Ok(action)
            })?;
        info!(
            target: "ward::actions",
            %player,
            action = %action.id,
            kind = kind.as_str(),
            cycle = %action.cycle,
            "action.queued"
        );
        Ok(action)
    }

    /// Validates a new pending action and stages its player and wallet writes.
    /// The caller adds the action record itself and commits.
    pub(crate) fn stage(
        &self,
        player_id: PlayerId,
        kind: ActionKind,
        target: &Target,
        committed: ResourceBundle,
        minimum_units: u32,
        now: DateTime<Utc>,
    ) -> Result<(WriteBatch, Action), EngineError> {
        let store = self.engine.store();
        let player = store
            .player(player_id)?
            .ok_or(NotFoundError::Player(player_id))?;
        self.check_target(kind, target)?;

        let cycle = self.engine.open_cycle(now);
        if let Some(mark) = store.cycle_mark(cycle)? {
            if !mark.value.phase.accepts_submissions() {
                return Err(ValidationError::SubmissionsClosed { cycle }.into());
            }
        }

        let policy = self.engine.config().allowances();
        let mut updated = player.value.clone();
        updated.allowances = policy.refreshed(&player.value.allowances, now);
        if !policy.consume(&mut updated.allowances, kind.class()) {
            return Err(ValidationError::NoActionsRemaining {
                class: kind.class(),
            }
            .into());
        }

        let units = committed.total_units();
        if units < minimum_units {
            return Err(ValidationError::InvalidComposition {
                units,
                minimum: minimum_units,
            }
            .into());
        }

        let wallet = load_wallet(store.as_ref(), player_id)?;
        let mut debited = wallet.value.clone();
        debited.debit(&committed).map_err(ValidationError::from)?;

        let action = Action {
            id: ActionId(store.allocate_id(IdKind::Action)?),
            player: player_id,
            kind,
            target: target.clone(),
            committed,
            cycle,
            status: ActionStatus::Pending,
            submitted_at: now,
            joint: None,
            result: None,
        };

        let mut batch = WriteBatch::new();
        batch
            .require(Guard::CycleOpen(cycle))
            .push(WriteOp::PutPlayer {
                player: updated,
                expected: player.version,
            })
            .push(WriteOp::PutWallet {
                wallet: debited,
                expected: wallet.version,
            });
        Ok((batch, action))
    }

    fn check_target(&self, kind: ActionKind, target: &Target) -> Result<(), EngineError> {
        if target.kind() != kind.target_kind() {
            return Err(ValidationError::InvalidTarget {
                kind,
                target: target.clone(),
            }
            .into());
        }
        let store = self.engine.store();
        match target {
            Target::District(id) => {
                if store.district(id)?.is_none() {
                    return Err(NotFoundError::District(id.clone()).into());
                }
            }
            Target::Politician(id) => {
                if store.politician(id)?.is_none() {
                    return Err(NotFoundError::Politician(id.clone()).into());
                }
            }
        }
        Ok(())
    }

    /// Withdraws the player's most recent pending action, refunding it and
    /// returning the allowance slot. Cancelling the action behind an open
    /// joint action expires the joint action and refunds every participant.
    pub fn cancel_latest(
        &self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Action, EngineError> {
        let store = self.engine.store();
        let policy = self.engine.config().allowances();
        let action = self
            .engine
            .config()
            .retry()
            .run_on_conflict("actions.cancel", |_| {
                let player = store
                    .player(player_id)?
                    .ok_or(NotFoundError::Player(player_id))?;
                let latest = store
                    .player_actions(player_id)?
                    .into_iter()
                    .filter(|record| record.value.is_pending())
                    .max_by(|a, b| {
                        let a_key = (a.value.submitted_at, a.value.id);
                        a_key.cmp(&(b.value.submitted_at, b.value.id))
                    })
                    .ok_or(NotFoundError::PendingAction(player_id))?;
                let action = latest.value.clone();
                if let Some(mark) = store.cycle_mark(action.cycle)? {
                    if !mark.value.phase.accepts_submissions() {
                        return Err(ConflictError::ResolutionStarted {
                            cycle: action.cycle,
                        }
                        .into());
                    }
                }

                let mut batch = WriteBatch::new();
                batch
                    .require(Guard::CycleOpen(action.cycle))
                    .push(WriteOp::DeleteAction {
                        id: action.id,
                        expected: latest.version,
                    });

                let mut updated = player.value.clone();
                updated.allowances = policy.refreshed(&player.value.allowances, now);
                policy.restore(&mut updated.allowances, action.class());
                batch.push(WriteOp::PutPlayer {
                    player: updated,
                    expected: player.version,
                });
                batch.push(refund_op(
                    load_wallet(store.as_ref(), player_id)?,
                    &action.committed,
                ));

                if let Some(joint_id) = action.joint {
                    if let Some(joint) = store.joint_action(joint_id)? {
                        let owns_joint = joint.value.action == action.id;
                        if owns_joint && joint.value.status == JointStatus::Open {
                            for participant in joint
                                .value
                                .participants
                                .iter()
                                .filter(|p| p.player != player_id)
                            {
                                batch.push(refund_op(
                                    load_wallet(store.as_ref(), participant.player)?,
                                    &participant.committed,
                                ));
                                if let Some(other) = store.player(participant.player)? {
                                    let mut restored = other.value.clone();
                                    restored.allowances =
                                        policy.refreshed(&other.value.allowances, now);
                                    policy.restore(&mut restored.allowances, ActionClass::Main);
                                    batch.push(WriteOp::PutPlayer {
                                        player: restored,
                                        expected: other.version,
                                    });
                                }
                            }
                            let mut expired = joint.value.clone();
                            expired.status = JointStatus::Expired;
                            expired.finished_at = Some(now);
                            batch.push(WriteOp::PutJoint {
                                joint: expired,
                                expected: joint.version,
                            });
                        }
                    }
                }

                store.commit(batch).map_err(|err| match err {
                    StoreError::CycleClosed(cycle) => {
                        ConflictError::ResolutionStarted { cycle }.into()
                    }
                    other => EngineError::from(other),
                })?;
                Ok(action)
            })?;
        info!(
            target: "ward::actions",
            player = %player_id,
            action = %action.id,
            refunded = %action.committed,
            "action.cancelled"
        );
        Ok(action)
    }

    /// Allowances as they stand at `now`, after any pending refresh.
    pub fn allowances(
        &self,
        player: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Allowances, EngineError> {
        let player = self.engine.player(player)?;
        Ok(self
            .engine
            .config()
            .allowances()
            .refreshed(&player.allowances, now))
    }

    pub fn pending_for(&self, player: PlayerId) -> Result<Vec<Action>, EngineError> {
        let mut actions: Vec<Action> = self
            .engine
            .store()
            .player_actions(player)?
            .into_iter()
            .map(|record| record.value)
            .filter(Action::is_pending)
            .collect();
        actions.sort_by_key(|action| (action.submitted_at, action.id));
        Ok(actions)
    }
}

pub(crate) fn submission_guard_error(err: StoreError) -> EngineError {
    match err {
        StoreError::CycleClosed(cycle) => ValidationError::SubmissionsClosed { cycle }.into(),
        other => other.into(),
    }
}

/// Order a cycle's actions resolve in: defenses first, then by submission.
pub fn resolution_order(actions: &mut [Action]) {
    actions.sort_by_key(|action| {
        (
            action.kind != ActionKind::Defense,
            action.submitted_at,
            action.id,
        )
    });
}
