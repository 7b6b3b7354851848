use std::collections::VecDeque;

use bevy::prelude::Resource;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ward_runtime::odds::{sample_jitter, sample_roll};

/// Source of percentile rolls and probability jitter for resolution.
pub trait RollSource: Send + Sync {
    /// Uniform integer in `1..=100`.
    fn roll_percent(&mut self) -> u8;
    /// Uniform value in `-spread..=spread`.
    fn jitter(&mut self, spread: f32) -> f32;
}

#[derive(Debug, Clone)]
pub struct SeededRolls {
    rng: ChaCha8Rng,
}

impl SeededRolls {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RollSource for SeededRolls {
    fn roll_percent(&mut self) -> u8 {
        sample_roll(&mut self.rng)
    }

    fn jitter(&mut self, spread: f32) -> f32 {
        sample_jitter(&mut self.rng, spread)
    }
}

/// Scripted rolls. Falls back to `fallback` once the queue runs dry.
#[derive(Debug, Clone)]
pub struct FixedRolls {
    rolls: VecDeque<u8>,
    fallback: u8,
    jitter: f32,
}

impl FixedRolls {
    pub fn always(roll: u8) -> Self {
        Self {
            rolls: VecDeque::new(),
            fallback: roll.clamp(1, 100),
            jitter: 0.0,
        }
    }

    pub fn sequence(rolls: impl IntoIterator<Item = u8>, fallback: u8) -> Self {
        Self {
            rolls: rolls.into_iter().map(|r| r.clamp(1, 100)).collect(),
            fallback: fallback.clamp(1, 100),
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter;
        self
    }
}

impl RollSource for FixedRolls {
    fn roll_percent(&mut self) -> u8 {
        self.rolls.pop_front().unwrap_or(self.fallback)
    }

    fn jitter(&mut self, spread: f32) -> f32 {
        self.jitter.clamp(-spread.abs(), spread.abs())
    }
}

#[derive(Resource)]
pub struct CycleDice(pub Box<dyn RollSource>);

impl CycleDice {
    pub fn new(source: impl RollSource + 'static) -> Self {
        Self(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rolls_are_reproducible() {
        let mut a = SeededRolls::new(7);
        let mut b = SeededRolls::new(7);
        for _ in 0..32 {
            assert_eq!(a.roll_percent(), b.roll_percent());
            assert_eq!(a.jitter(0.05), b.jitter(0.05));
        }
    }

    #[test]
    fn fixed_rolls_drain_then_fall_back() {
        let mut rolls = FixedRolls::sequence([100, 0], 50).with_jitter(0.2);
        assert_eq!(rolls.roll_percent(), 100);
        assert_eq!(rolls.roll_percent(), 1);
        assert_eq!(rolls.roll_percent(), 50);
        assert_eq!(rolls.jitter(0.05), 0.05);
    }
}
