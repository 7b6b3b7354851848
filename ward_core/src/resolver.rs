//! Single-action resolution against the control ledger.
//!
//! The resolver reads current state and returns the writes an outcome
//! implies; it never commits. The scheduler folds those writes into the same
//! batch that marks the action completed, which keeps every effect tied to
//! exactly one status transition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ward_runtime::odds::{classify_roll, success_probability, tier_effect, OddsInputs};
use ward_runtime::power::scale_effect;
use ward_schema::{
    clamp_points, Action, ActionDetail, ActionKind, ActionResult, District, DistrictId,
    OutcomeTier, Player, PlayerId, Politician, PoliticianRelationship, Target, DEFAULT_FRIENDLINESS,
};

use crate::dice::RollSource;
use crate::engine::Engine;
use crate::error::{EngineError, ResolutionError};
use crate::ledger::shift_op;
use crate::store::{Versioned, WriteOp};

/// Attack reductions registered by defense actions, scoped to one cycle.
#[derive(Debug, Default, Clone)]
pub struct DefenseLedger {
    reductions: HashMap<(DistrictId, PlayerId), u8>,
}

impl DefenseLedger {
    pub fn register(&mut self, district: DistrictId, player: PlayerId, pct: u8, cap: u8) {
        let slot = self.reductions.entry((district, player)).or_insert(0);
        *slot = slot.saturating_add(pct).min(cap);
    }

    pub fn reduction(&self, district: &DistrictId, player: PlayerId) -> u8 {
        self.reductions
            .get(&(district.clone(), player))
            .copied()
            .unwrap_or(0)
    }

    /// Rebuilds the ledger from defenses already resolved in a cycle.
    pub fn from_completed(actions: &[Action], cap: u8) -> Self {
        let mut ledger = DefenseLedger::default();
        for action in actions {
            ledger.absorb(action, cap);
        }
        ledger
    }

    /// Registers the reduction a completed defense action left behind.
    pub fn absorb(&mut self, action: &Action, cap: u8) {
        if let Some(ActionResult {
            detail:
                ActionDetail::Fortified {
                    district,
                    reduction_pct,
                },
            ..
        }) = &action.result
        {
            self.register(district.clone(), action.player, *reduction_pct, cap);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reductions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: ActionResult,
    pub writes: Vec<WriteOp>,
    pub fortify: Option<(DistrictId, PlayerId, u8)>,
}

impl Resolution {
    fn new(result: ActionResult) -> Self {
        Self {
            result,
            writes: Vec::new(),
            fortify: None,
        }
    }
}

struct Roll {
    probability: f32,
    roll: u8,
    tier: OutcomeTier,
}

pub struct Resolver<'a> {
    engine: &'a Engine,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Outcome of `action` with its effect scaled by `multiplier`.
    pub fn resolve(
        &self,
        action: &Action,
        multiplier: f32,
        dice: &mut dyn RollSource,
        defense: &DefenseLedger,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let store = self.engine.store();
        let player = store
            .player(action.player)?
            .ok_or_else(|| ResolutionError::Orphaned {
                action: action.id,
                reason: format!("player {} no longer exists", action.player),
            })?
            .value;
        if action.target.kind() != action.kind.target_kind() {
            return Err(ResolutionError::Malformed {
                action: action.id,
                reason: format!("{} cannot target {}", action.kind, action.target),
            }
            .into());
        }

        match &action.target {
            Target::District(id) => {
                let district = store.district(id)?.ok_or_else(|| missing(action))?;
                match action.kind {
                    ActionKind::Reconnaissance => self.reconnoitre(&district),
                    ActionKind::Support => self.support(action, &district, now),
                    _ => self.resolve_district(action, &player, &district, multiplier, dice, defense, now),
                }
            }
            Target::Politician(id) => {
                let politician = store.politician(id)?.ok_or_else(|| missing(action))?;
                self.resolve_politician(action, &player, &politician, multiplier, dice, now)
            }
        }
    }

    fn roll(
        &self,
        kind: ActionKind,
        actor_control: u8,
        player: &Player,
        target_ideology: Option<i8>,
        friendliness: Option<u8>,
        dice: &mut dyn RollSource,
    ) -> Roll {
        let config = self.engine.config();
        let odds = config.odds();
        let inputs = OddsInputs {
            kind,
            actor_control,
            player_ideology: player.ideology,
            target_ideology,
            friendliness,
            jitter: dice.jitter(odds.jitter),
        };
        let probability = success_probability(odds, config.ideology(), &inputs);
        let roll = dice.roll_percent();
        Roll {
            probability,
            roll,
            tier: classify_roll(odds, probability, roll),
        }
    }

    fn reconnoitre(&self, district: &District) -> Result<Resolution, EngineError> {
        let standings = self.engine.ledger().standings(&district.id)?;
        Ok(Resolution::new(ActionResult {
            tier: OutcomeTier::Success,
            control_delta: 0,
            roll: None,
            probability: None,
            multiplier: 1.0,
            refunded: false,
            detail: ActionDetail::Intel {
                district: district.id.clone(),
                standings,
            },
        }))
    }

    fn support(
        &self,
        action: &Action,
        district: &District,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let current = self.engine.store().control(&district.id, action.player)?;
        let before = current.as_ref().map_or(0, |r| r.value.points);
        let effect = self.engine.config().odds().support_effect as i32;
        let (op, record) = shift_op(current, &district.id, action.player, effect, now);
        let mut resolution = Resolution::new(ActionResult {
            tier: OutcomeTier::Success,
            control_delta: record.points as i32 - before as i32,
            roll: None,
            probability: None,
            multiplier: 1.0,
            refunded: false,
            detail: ActionDetail::ControlShift {
                district: district.id.clone(),
                before,
                after: record.points,
            },
        });
        resolution.writes.push(op);
        Ok(resolution)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_district(
        &self,
        action: &Action,
        player: &Player,
        district: &District,
        multiplier: f32,
        dice: &mut dyn RollSource,
        defense: &DefenseLedger,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let store = self.engine.store();
        let config = self.engine.config();
        let actor = store.control(&district.id, player.id)?;
        let before = actor.as_ref().map_or(0, |r| r.value.points);
        let roll = self.roll(action.kind, before, player, district.affinity, None, dice);
        let effect = scale_effect(tier_effect(config.odds(), roll.tier) as i32, multiplier);

        let mut writes = Vec::new();
        let mut fortify = None;
        let mut control_delta = 0;
        let detail = match action.kind {
            ActionKind::Influence if effect > 0 => {
                let (op, record) = shift_op(actor, &district.id, player.id, effect, now);
                writes.push(op);
                control_delta = record.points as i32 - before as i32;
                ActionDetail::ControlShift {
                    district: district.id.clone(),
                    before,
                    after: record.points,
                }
            }
            ActionKind::Attack if effect > 0 => {
                match self
                    .engine
                    .ledger()
                    .top_controller(&district.id, Some(player.id))?
                {
                    None => {
                        let (op, record) = shift_op(actor, &district.id, player.id, effect, now);
                        writes.push(op);
                        control_delta = record.points as i32 - before as i32;
                        ActionDetail::Transfer {
                            district: district.id.clone(),
                            defender: None,
                            taken: control_delta.max(0) as u8,
                            blocked: 0,
                            claimed: true,
                        }
                    }
                    Some(rival) => {
                        let reduction = defense.reduction(&district.id, rival.player) as i32;
                        let blocked = (effect * reduction + 50) / 100;
                        let net = effect - blocked;
                        let mut taken = 0;
                        if net > 0 {
                            let rival_record = store.control(&district.id, rival.player)?;
                            let (op, record) =
                                shift_op(rival_record, &district.id, rival.player, -net, now);
                            taken = rival.points.saturating_sub(record.points);
                            writes.push(op);
                        }
                        if taken > 0 {
                            // Only points removed from the defender move to the attacker.
                            let (op, record) =
                                shift_op(actor, &district.id, player.id, taken as i32, now);
                            control_delta = record.points as i32 - before as i32;
                            writes.push(op);
                        }
                        ActionDetail::Transfer {
                            district: district.id.clone(),
                            defender: Some(rival.player),
                            taken,
                            blocked: clamp_points(blocked),
                            claimed: false,
                        }
                    }
                }
            }
            ActionKind::Defense => {
                let control = config.control();
                let base = match roll.tier {
                    OutcomeTier::Success => control.defense_success_pct,
                    OutcomeTier::Partial => control.defense_partial_pct,
                    OutcomeTier::Failure => 0,
                };
                let cap = config.joint().defense_cap_pct;
                let pct = ((base as f32 * multiplier).round() as u32).min(cap as u32) as u8;
                if pct > 0 {
                    fortify = Some((district.id.clone(), player.id, pct));
                }
                ActionDetail::Fortified {
                    district: district.id.clone(),
                    reduction_pct: pct,
                }
            }
            ActionKind::Influence | ActionKind::Attack => ActionDetail::NoEffect,
            other => {
                return Err(ResolutionError::Malformed {
                    action: action.id,
                    reason: format!("{other} is not a district action"),
                }
                .into())
            }
        };

        Ok(Resolution {
            result: ActionResult {
                tier: roll.tier,
                control_delta,
                roll: Some(roll.roll),
                probability: Some(roll.probability),
                multiplier,
                refunded: false,
                detail,
            },
            writes,
            fortify,
        })
    }

    fn resolve_politician(
        &self,
        action: &Action,
        player: &Player,
        politician: &Politician,
        multiplier: f32,
        dice: &mut dyn RollSource,
        now: DateTime<Utc>,
    ) -> Result<Resolution, EngineError> {
        let store = self.engine.store();
        let ledger = self.engine.ledger();
        let actor_control = match &politician.district {
            Some(home) => ledger.points(home, player.id)?,
            None => 0,
        };
        let own = store.relationship(&politician.id, player.id)?;
        let friendliness = own
            .as_ref()
            .map_or(DEFAULT_FRIENDLINESS, |r| r.value.friendliness);
        let roll = self.roll(
            action.kind,
            actor_control,
            player,
            Some(politician.ideology),
            Some(friendliness),
            dice,
        );
        let effect = scale_effect(
            tier_effect(self.engine.config().odds(), roll.tier) as i32,
            multiplier,
        );

        let mut writes = Vec::new();
        let (mut mine, mine_version) = open_relationship(own, politician, player.id);
        mine.interactions = mine.interactions.saturating_add(1);
        mine.last_interaction = Some(now);

        let detail = match action.kind {
            ActionKind::PoliticianInfluence => {
                let before = mine.friendliness;
                mine.friendliness = clamp_points(before as i32 + effect);
                if effect > 0 {
                    ActionDetail::Friendliness {
                        politician: politician.id.clone(),
                        player: player.id,
                        before,
                        after: mine.friendliness,
                    }
                } else {
                    ActionDetail::NoEffect
                }
            }
            ActionKind::PoliticianUndermine => {
                let rival = match (&politician.district, effect > 0) {
                    (Some(home), true) => ledger.top_controller(home, Some(player.id))?,
                    _ => None,
                };
                match rival {
                    Some(rival) => {
                        let current = store.relationship(&politician.id, rival.player)?;
                        let (mut theirs, version) =
                            open_relationship(current, politician, rival.player);
                        let before = theirs.friendliness;
                        theirs.friendliness = clamp_points(before as i32 - effect);
                        let after = theirs.friendliness;
                        writes.push(WriteOp::PutRelationship {
                            relationship: theirs,
                            expected: version,
                        });
                        ActionDetail::Friendliness {
                            politician: politician.id.clone(),
                            player: rival.player,
                            before,
                            after,
                        }
                    }
                    None => ActionDetail::NoEffect,
                }
            }
            other => {
                return Err(ResolutionError::Malformed {
                    action: action.id,
                    reason: format!("{other} is not a politician action"),
                }
                .into())
            }
        };
        writes.push(WriteOp::PutRelationship {
            relationship: mine,
            expected: mine_version,
        });

        Ok(Resolution {
            result: ActionResult {
                tier: roll.tier,
                control_delta: 0,
                roll: Some(roll.roll),
                probability: Some(roll.probability),
                multiplier,
                refunded: false,
                detail,
            },
            writes,
            fortify: None,
        })
    }
}

fn open_relationship(
    current: Option<Versioned<PoliticianRelationship>>,
    politician: &Politician,
    player: PlayerId,
) -> (PoliticianRelationship, u64) {
    match current {
        Some(record) => (record.value, record.version),
        None => (
            PoliticianRelationship::new(politician.id.clone(), player),
            0,
        ),
    }
}

fn missing(action: &Action) -> EngineError {
    ResolutionError::MissingTarget {
        action: action.id,
        target: action.target.clone(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacked_defenses_respect_the_cap() {
        let mut ledger = DefenseLedger::default();
        let vracar = DistrictId::new("vracar");
        ledger.register(vracar.clone(), PlayerId(1), 50, 90);
        ledger.register(vracar.clone(), PlayerId(1), 50, 90);
        assert_eq!(ledger.reduction(&vracar, PlayerId(1)), 90);
        assert_eq!(ledger.reduction(&vracar, PlayerId(2)), 0);
        assert_eq!(ledger.reduction(&DistrictId::new("zemun"), PlayerId(1)), 0);
    }
}
