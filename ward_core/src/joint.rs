use chrono::{DateTime, Duration, Utc};
use tracing::info;
use ward_runtime::power::power_multiplier;
use ward_schema::{
    Action, ActionClass, ActionDetail, ActionKind, ActionResult, DistrictId, JointAction,
    JointActionId, JointParticipant, JointStatus, OutcomeTier, PlayerId, ResourceBundle, Target,
};

use crate::actions::submission_guard_error;
use crate::dice::RollSource;
use crate::engine::Engine;
use crate::error::{ConflictError, EngineError, NotFoundError, ResolutionError, ValidationError};
use crate::resolver::{DefenseLedger, Resolution};
use crate::store::{Guard, IdKind, Versioned, WriteBatch, WriteOp};
use crate::wallet::{load_wallet, refund_op};

/// Pooled main actions: several players fund one amplified action.
pub struct JointActions<'a> {
    engine: &'a Engine,
}

impl<'a> JointActions<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Queues the initiator's main action and opens it for others to join.
    pub fn open(
        &self,
        initiator: PlayerId,
        kind: ActionKind,
        district: DistrictId,
        committed: ResourceBundle,
        now: DateTime<Utc>,
    ) -> Result<JointAction, EngineError> {
        if !kind.supports_joint() {
            return Err(ValidationError::JointUnsupported { kind }.into());
        }
        let config = self.engine.config().joint();
        let target = Target::District(district.clone());
        let store = self.engine.store();
        let joint = self
            .engine
            .config()
            .retry()
            .run_on_conflict("joint.open", |_| {
                let (mut batch, mut action) = self.engine.actions().stage(
                    initiator,
                    kind,
                    &target,
                    committed,
                    config.min_units,
                    now,
                )?;
                let id = JointActionId(store.allocate_id(IdKind::Joint)?);
                action.joint = Some(id);
                let joint = JointAction {
                    id,
                    initiator,
                    action: action.id,
                    kind,
                    district: district.clone(),
                    cycle: action.cycle,
                    participants: vec![JointParticipant {
                        player: initiator,
                        committed,
                        joined_at: now,
                    }],
                    min_participants: config.min_participants.max(1),
                    created_at: now,
                    expires_at: now + Duration::minutes(config.ttl_minutes),
                    status: JointStatus::Open,
                    multiplier: None,
                    finished_at: None,
                };
                batch
                    .push(WriteOp::PutAction {
                        action,
                        expected: 0,
                    })
                    .push(WriteOp::PutJoint {
                        joint: joint.clone(),
                        expected: 0,
                    });
                store.commit(batch).map_err(submission_guard_error)?;
                Ok(joint)
            })?;
        info!(
            target: "ward::joint",
            joint = %joint.id,
            %initiator,
            kind = kind.as_str(),
            district = %joint.district,
            expires_at = %joint.expires_at,
            "joint.opened"
        );
        Ok(joint)
    }

    /// Adds `player` to an open joint action, spending a main allowance and
    /// debiting the commitment in the same commit.
    pub fn attach(
        &self,
        joint_id: JointActionId,
        player_id: PlayerId,
        committed: ResourceBundle,
        now: DateTime<Utc>,
    ) -> Result<JointAction, EngineError> {
        let store = self.engine.store();
        let policy = self.engine.config().allowances();
        let min_units = self.engine.config().joint().min_units;
        let joint = self
            .engine
            .config()
            .retry()
            .run_on_conflict("joint.attach", |_| {
                let current = store
                    .joint_action(joint_id)?
                    .ok_or(NotFoundError::JointAction(joint_id))?;
                let mut joint = current.value.clone();
                if joint.status != JointStatus::Open {
                    return Err(ConflictError::JointNotOpen(joint_id).into());
                }
                if now >= joint.expires_at {
                    return Err(ConflictError::JointExpired(joint_id).into());
                }
                if !self.engine.calendar().accepts(joint.cycle, now) {
                    return Err(ValidationError::SubmissionsClosed { cycle: joint.cycle }.into());
                }
                if joint.has_participant(player_id) {
                    return Err(ConflictError::AlreadyJoined {
                        joint: joint_id,
                        player: player_id,
                    }
                    .into());
                }

                let player = store
                    .player(player_id)?
                    .ok_or(NotFoundError::Player(player_id))?;
                let mut updated = player.value.clone();
                updated.allowances = policy.refreshed(&player.value.allowances, now);
                if !policy.consume(&mut updated.allowances, ActionClass::Main) {
                    return Err(ValidationError::NoActionsRemaining {
                        class: ActionClass::Main,
                    }
                    .into());
                }
                let units = committed.total_units();
                if units < min_units {
                    return Err(ValidationError::InvalidComposition {
                        units,
                        minimum: min_units,
                    }
                    .into());
                }
                let wallet = load_wallet(store.as_ref(), player_id)?;
                let mut debited = wallet.value.clone();
                debited.debit(&committed).map_err(ValidationError::from)?;

                joint.participants.push(JointParticipant {
                    player: player_id,
                    committed,
                    joined_at: now,
                });
                let mut batch = WriteBatch::new();
                batch
                    .require(Guard::CycleOpen(joint.cycle))
                    .push(WriteOp::PutPlayer {
                        player: updated,
                        expected: player.version,
                    })
                    .push(WriteOp::PutWallet {
                        wallet: debited,
                        expected: wallet.version,
                    })
                    .push(WriteOp::PutJoint {
                        joint: joint.clone(),
                        expected: current.version,
                    });
                store.commit(batch).map_err(submission_guard_error)?;
                Ok(joint)
            })?;
        info!(
            target: "ward::joint",
            joint = %joint_id,
            player = %player_id,
            participants = joint.participant_count(),
            units = joint.total_units(),
            "joint.attached"
        );
        Ok(joint)
    }

    pub fn get(&self, id: JointActionId) -> Result<JointAction, EngineError> {
        self.engine
            .store()
            .joint_action(id)?
            .map(|record| record.value)
            .ok_or_else(|| NotFoundError::JointAction(id).into())
    }

    /// Joint actions still accepting participants at `now`.
    pub fn open_at(&self, now: DateTime<Utc>) -> Result<Vec<JointAction>, EngineError> {
        Ok(self
            .engine
            .store()
            .joint_actions()?
            .into_iter()
            .map(|record| record.value)
            .filter(|joint| joint.status == JointStatus::Open && joint.expires_at > now)
            .collect())
    }

    /// Settles the joint action behind `action` at cycle close.
    ///
    /// Without quorum it expires and every participant is refunded. With
    /// quorum the underlying action resolves once with the pooled multiplier;
    /// a failure refunds every participant.
    pub fn settle(
        &self,
        action: &Action,
        dice: &mut dyn RollSource,
        defense: &DefenseLedger,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let joint_id = action.joint.ok_or_else(|| ResolutionError::Malformed {
            action: action.id,
            reason: "not part of a joint action".into(),
        })?;
        let store = self.engine.store();
        let current = store
            .joint_action(joint_id)?
            .ok_or_else(|| ResolutionError::Orphaned {
                action: action.id,
                reason: format!("joint action {joint_id} is missing"),
            })?;
        if current.value.status != JointStatus::Open || current.value.action != action.id {
            return Err(ResolutionError::Malformed {
                action: action.id,
                reason: format!("joint action {joint_id} is not open for this action"),
            }
            .into());
        }

        let mut joint = current.value.clone();
        joint.finished_at = Some(now);

        let mut resolution = if joint.has_quorum() {
            let multiplier = power_multiplier(
                &self.engine.config().joint().power,
                joint.participant_count(),
                joint.total_units(),
            );
            joint.status = JointStatus::Resolved;
            joint.multiplier = Some(multiplier);
            let mut resolution = self
                .engine
                .resolver()
                .resolve(action, multiplier, dice, defense, now)?;
            if resolution.result.tier == OutcomeTier::Failure {
                resolution.result.refunded = true;
            }
            resolution
        } else {
            joint.status = JointStatus::Expired;
            Resolution {
                result: ActionResult {
                    tier: OutcomeTier::Failure,
                    control_delta: 0,
                    roll: None,
                    probability: None,
                    multiplier: 1.0,
                    refunded: true,
                    detail: ActionDetail::Expired {
                        participants: joint.participant_count(),
                    },
                },
                writes: Vec::new(),
                fortify: None,
            }
        };

        if resolution.result.refunded {
            resolution.writes.extend(refund_ops(self.engine, &joint)?);
        }
        info!(
            target: "ward::joint",
            joint = %joint_id,
            status = ?joint.status,
            tier = resolution.result.tier.as_str(),
            participants = joint.participant_count(),
            refunded = resolution.result.refunded,
            "joint.settled"
        );
        resolution.writes.push(WriteOp::PutJoint {
            joint,
            expected: current.version,
        });
        Ok(resolution)
    }

    /// Deletes finished joint actions older than the retention window.
    pub fn purge_finished(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let retention = Duration::hours(self.engine.config().joint().retention_hours);
        let store = self.engine.store();
        let stale: Vec<Versioned<JointAction>> = store
            .joint_actions()?
            .into_iter()
            .filter(|record| record.value.status != JointStatus::Open)
            .filter(|record| {
                record
                    .value
                    .finished_at
                    .unwrap_or(record.value.created_at)
                    + retention
                    < now
            })
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let mut batch = WriteBatch::new();
        for record in &stale {
            batch.push(WriteOp::DeleteJoint {
                id: record.value.id,
                expected: record.version,
            });
        }
        store.commit(batch)?;
        info!(target: "ward::joint", purged = stale.len(), "joint.purged");
        Ok(stale.len())
    }
}

fn refund_ops(engine: &Engine, joint: &JointAction) -> Result<Vec<WriteOp>, EngineError> {
    let store = engine.store();
    joint
        .participants
        .iter()
        .map(|participant| {
            let wallet = load_wallet(store.as_ref(), participant.player)?;
            Ok(refund_op(wallet, &participant.committed))
        })
        .collect()
}
