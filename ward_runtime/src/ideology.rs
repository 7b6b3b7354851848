use serde::Deserialize;

/// Lowest and highest ideology score a player or politician may hold.
pub const IDEOLOGY_RANGE: std::ops::RangeInclusive<i8> = -5..=5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Aligned,
    Neutral,
    Opposed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdeologyTuning {
    pub aligned_within: u8,
    pub neutral_within: u8,
    pub aligned_bonus: f32,
    pub opposed_penalty: f32,
}

impl Default for IdeologyTuning {
    fn default() -> Self {
        Self {
            aligned_within: 2,
            neutral_within: 5,
            aligned_bonus: 0.15,
            opposed_penalty: 0.15,
        }
    }
}

pub fn alignment(tuning: &IdeologyTuning, player: i8, target: i8) -> Alignment {
    let distance = (player as i16 - target as i16).unsigned_abs();
    if distance <= tuning.aligned_within as u16 {
        Alignment::Aligned
    } else if distance <= tuning.neutral_within as u16 {
        Alignment::Neutral
    } else {
        Alignment::Opposed
    }
}

/// Probability modifier for acting on a target. Targets without a leaning are neutral.
pub fn ideology_modifier(tuning: &IdeologyTuning, player: i8, target: Option<i8>) -> f32 {
    match target.map(|target| alignment(tuning, player, target)) {
        Some(Alignment::Aligned) => tuning.aligned_bonus,
        Some(Alignment::Opposed) => -tuning.opposed_penalty,
        Some(Alignment::Neutral) | None => 0.0,
    }
}

/// Similarity in `0.0..=1.0`; identical scores give 1.0, ten points apart give 0.0.
pub fn compatibility(player: i8, target: i8) -> f32 {
    let distance = (player as i16 - target as i16).unsigned_abs() as f32;
    (1.0 - distance / 10.0).max(0.0)
}

pub fn is_valid_ideology(value: i32) -> bool {
    value >= *IDEOLOGY_RANGE.start() as i32 && value <= *IDEOLOGY_RANGE.end() as i32
}
