use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerTuning {
    pub per_extra_participant: f32,
    pub per_unit: f32,
    pub cap: f32,
}

impl Default for PowerTuning {
    fn default() -> Self {
        Self {
            per_extra_participant: 0.2,
            per_unit: 0.1,
            cap: 2.5,
        }
    }
}

/// Amplification for a pooled action, never above `tuning.cap`.
pub fn power_multiplier(tuning: &PowerTuning, participants: u32, units: u32) -> f32 {
    let extra = participants.saturating_sub(1) as f32;
    let raw = 1.0 + tuning.per_extra_participant * extra + tuning.per_unit * units as f32;
    raw.min(tuning.cap)
}

pub fn scale_effect(effect: i32, multiplier: f32) -> i32 {
    (effect as f32 * multiplier).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_players_one_unit_each() {
        let tuning = PowerTuning::default();
        let multiplier = power_multiplier(&tuning, 2, 2);
        assert!((multiplier - 1.4).abs() < 1e-6);
        assert_eq!(scale_effect(10, multiplier), 14);
    }

    #[test]
    fn multiplier_is_monotone_and_capped() {
        let tuning = PowerTuning::default();
        let mut previous = 0.0f32;
        for participants in 1..12 {
            for units in 0..30 {
                let value = power_multiplier(&tuning, participants, units);
                assert!(value <= tuning.cap);
                assert!(value >= power_multiplier(&tuning, participants, units.saturating_sub(1)));
                assert!(value >= power_multiplier(&tuning, participants - 1, units));
                previous = previous.max(value);
            }
        }
        assert!((previous - 2.5).abs() < f32::EPSILON);
    }
}
