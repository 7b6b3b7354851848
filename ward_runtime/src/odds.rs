use rand::Rng;
use serde::Deserialize;
use ward_schema::{ActionKind, OutcomeTier};

use crate::ideology::{ideology_modifier, IdeologyTuning};

/// Knobs for the success probability and the roll classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OddsTuning {
    pub base: f32,
    pub control_bonus_cap: f32,
    pub control_divisor: f32,
    pub jitter: f32,
    pub floor: f32,
    pub ceiling: f32,
    pub success_cut: u8,
    pub failure_cut: u8,
    pub full_effect: u8,
    pub partial_effect: u8,
    pub support_effect: u8,
    pub strong_control: u8,
    pub weak_control: u8,
    pub influence_bonus: f32,
    pub attack_penalty: f32,
    pub defense_bonus: f32,
    pub politician_bonus: f32,
    pub warm_friendliness: u8,
    pub cold_friendliness: u8,
}

impl Default for OddsTuning {
    fn default() -> Self {
        Self {
            base: 0.5,
            control_bonus_cap: 0.2,
            control_divisor: 400.0,
            jitter: 0.05,
            floor: 0.1,
            ceiling: 0.9,
            success_cut: 70,
            failure_cut: 30,
            full_effect: 10,
            partial_effect: 5,
            support_effect: 5,
            strong_control: 60,
            weak_control: 20,
            influence_bonus: 0.10,
            attack_penalty: 0.10,
            defense_bonus: 0.15,
            politician_bonus: 0.10,
            warm_friendliness: 70,
            cold_friendliness: 30,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OddsInputs {
    pub kind: ActionKind,
    /// Actor's control in the district the action lands in.
    pub actor_control: u8,
    pub player_ideology: i8,
    pub target_ideology: Option<i8>,
    /// Politician friendliness toward the actor, for politician actions.
    pub friendliness: Option<u8>,
    pub jitter: f32,
}

pub fn type_modifier(
    tuning: &OddsTuning,
    kind: ActionKind,
    actor_control: u8,
    friendliness: Option<u8>,
) -> f32 {
    match kind {
        ActionKind::Influence if actor_control >= tuning.strong_control => tuning.influence_bonus,
        ActionKind::Attack if actor_control < tuning.weak_control => -tuning.attack_penalty,
        ActionKind::Defense if actor_control >= tuning.strong_control => tuning.defense_bonus,
        ActionKind::PoliticianInfluence
            if friendliness.is_some_and(|f| f >= tuning.warm_friendliness) =>
        {
            tuning.politician_bonus
        }
        ActionKind::PoliticianUndermine
            if friendliness.is_some_and(|f| f <= tuning.cold_friendliness) =>
        {
            tuning.politician_bonus
        }
        _ => 0.0,
    }
}

pub fn success_probability(
    tuning: &OddsTuning,
    ideology: &IdeologyTuning,
    inputs: &OddsInputs,
) -> f32 {
    let control_bonus =
        (inputs.actor_control as f32 / tuning.control_divisor).min(tuning.control_bonus_cap);
    let jitter = inputs.jitter.clamp(-tuning.jitter, tuning.jitter);
    let raw = tuning.base
        + control_bonus
        + ideology_modifier(ideology, inputs.player_ideology, inputs.target_ideology)
        + type_modifier(
            tuning,
            inputs.kind,
            inputs.actor_control,
            inputs.friendliness,
        )
        + jitter;
    raw.clamp(tuning.floor, tuning.ceiling)
}

/// Success and failure cutoffs for a probability.
///
/// The fixed 70/30 thresholds slide down as `p` rises above the base and up
/// as it falls below, one point per percentage point. A roll strictly above
/// the success cutoff succeeds, a roll strictly above the failure cutoff is a
/// partial, anything else fails.
pub fn cutoffs(tuning: &OddsTuning, probability: f32) -> (u8, u8) {
    let shift = ((probability - tuning.base) * 100.0).round() as i32;
    let success = (tuning.success_cut as i32 - shift).clamp(0, 100) as u8;
    let failure = (tuning.failure_cut as i32 - shift).clamp(0, 100) as u8;
    (success, failure)
}

pub fn classify_roll(tuning: &OddsTuning, probability: f32, roll: u8) -> OutcomeTier {
    let (success, failure) = cutoffs(tuning, probability);
    if roll > success {
        OutcomeTier::Success
    } else if roll > failure {
        OutcomeTier::Partial
    } else {
        OutcomeTier::Failure
    }
}

pub fn tier_effect(tuning: &OddsTuning, tier: OutcomeTier) -> u8 {
    match tier {
        OutcomeTier::Success => tuning.full_effect,
        OutcomeTier::Partial => tuning.partial_effect,
        OutcomeTier::Failure => 0,
    }
}

pub fn sample_roll<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(1..=100)
}

pub fn sample_jitter<R: Rng + ?Sized>(rng: &mut R, spread: f32) -> f32 {
    if spread <= 0.0 {
        0.0
    } else {
        rng.gen_range(-spread..=spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn inputs(kind: ActionKind, control: u8) -> OddsInputs {
        OddsInputs {
            kind,
            actor_control: control,
            player_ideology: 0,
            target_ideology: None,
            friendliness: None,
            jitter: 0.0,
        }
    }

    #[test]
    fn probability_sums_terms_and_clamps() {
        let tuning = OddsTuning::default();
        let ideology = IdeologyTuning::default();

        let p = success_probability(&tuning, &ideology, &inputs(ActionKind::Influence, 40));
        assert!((p - 0.6).abs() < 1e-5, "p = {p}");

        let p = success_probability(&tuning, &ideology, &inputs(ActionKind::Attack, 0));
        assert!((p - 0.4).abs() < 1e-5, "p = {p}");

        let mut strong = inputs(ActionKind::Defense, 100);
        strong.target_ideology = Some(1);
        strong.jitter = 0.05;
        let p = success_probability(&tuning, &ideology, &strong);
        assert!((p - 0.9).abs() < 1e-6, "ceiling applies, p = {p}");

        let mut weak = inputs(ActionKind::Attack, 0);
        weak.player_ideology = -5;
        weak.target_ideology = Some(5);
        weak.jitter = -0.5;
        let p = success_probability(&tuning, &ideology, &weak);
        assert!((p - 0.2).abs() < 1e-5, "jitter is bounded, p = {p}");
    }

    #[test]
    fn politician_modifiers_follow_friendliness() {
        let tuning = OddsTuning::default();
        assert!(
            (type_modifier(&tuning, ActionKind::PoliticianInfluence, 0, Some(75)) - 0.1).abs()
                < 1e-6
        );
        assert_eq!(
            type_modifier(&tuning, ActionKind::PoliticianInfluence, 0, Some(50)),
            0.0
        );
        assert!(
            (type_modifier(&tuning, ActionKind::PoliticianUndermine, 0, Some(20)) - 0.1).abs()
                < 1e-6
        );
    }

    #[test]
    fn base_probability_uses_plain_thresholds() {
        let tuning = OddsTuning::default();
        assert_eq!(cutoffs(&tuning, 0.5), (70, 30));
        assert_eq!(classify_roll(&tuning, 0.5, 71), OutcomeTier::Success);
        assert_eq!(classify_roll(&tuning, 0.5, 70), OutcomeTier::Partial);
        assert_eq!(classify_roll(&tuning, 0.5, 31), OutcomeTier::Partial);
        assert_eq!(classify_roll(&tuning, 0.5, 30), OutcomeTier::Failure);
    }

    #[test]
    fn better_odds_lower_the_cutoffs() {
        let tuning = OddsTuning::default();
        assert_eq!(cutoffs(&tuning, 0.9), (30, 0));
        assert_eq!(cutoffs(&tuning, 0.1), (100, 70));
        assert_eq!(classify_roll(&tuning, 0.9, 1), OutcomeTier::Partial);
        assert_eq!(classify_roll(&tuning, 0.1, 100), OutcomeTier::Partial);
        assert_eq!(tier_effect(&tuning, OutcomeTier::Partial), 5);
    }

    #[test]
    fn sampled_rolls_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            let roll = sample_roll(&mut rng);
            assert!((1..=100).contains(&roll));
            let jitter = sample_jitter(&mut rng, 0.05);
            assert!((-0.05..=0.05).contains(&jitter));
        }
        assert_eq!(sample_jitter(&mut rng, 0.0), 0.0);
    }
}
