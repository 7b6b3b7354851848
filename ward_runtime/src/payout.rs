use serde::Deserialize;
use ward_schema::{ControlTier, ResourceBundle, ResourceKind};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierRule {
    pub min_points: u8,
    pub percent: u32,
}

/// Control thresholds and the share of a district's base yield each one pays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayoutTuning {
    pub participation_floor: u8,
    pub absolute: TierRule,
    pub strong: TierRule,
    pub firm: TierRule,
    pub contested: TierRule,
    pub weak_percent: u32,
    pub stronghold_headline: u8,
    pub majority_headline: u8,
}

impl Default for PayoutTuning {
    fn default() -> Self {
        Self {
            participation_floor: 10,
            absolute: TierRule {
                min_points: 75,
                percent: 120,
            },
            strong: TierRule {
                min_points: 50,
                percent: 100,
            },
            firm: TierRule {
                min_points: 35,
                percent: 80,
            },
            contested: TierRule {
                min_points: 20,
                percent: 60,
            },
            weak_percent: 40,
            stronghold_headline: 80,
            majority_headline: 50,
        }
    }
}

impl PayoutTuning {
    pub fn tier_for(&self, points: u8) -> ControlTier {
        if points >= self.absolute.min_points {
            ControlTier::Absolute
        } else if points >= self.strong.min_points {
            ControlTier::Strong
        } else if points >= self.firm.min_points {
            ControlTier::Firm
        } else if points >= self.contested.min_points {
            ControlTier::Contested
        } else {
            ControlTier::Weak
        }
    }

    pub fn percent(&self, tier: ControlTier) -> u32 {
        match tier {
            ControlTier::Absolute => self.absolute.percent,
            ControlTier::Strong => self.strong.percent,
            ControlTier::Firm => self.firm.percent,
            ControlTier::Contested => self.contested.percent,
            ControlTier::Weak => self.weak_percent,
        }
    }

    /// Credit owed for holding `points` in a district with `yields`, or `None`
    /// below the participation floor.
    pub fn payout(
        &self,
        yields: &ResourceBundle,
        points: u8,
    ) -> Option<(ControlTier, ResourceBundle)> {
        if points < self.participation_floor || points == 0 {
            return None;
        }
        let tier = self.tier_for(points);
        let percent = self.percent(tier);
        let mut credited = ResourceBundle::default();
        for kind in ResourceKind::ALL {
            *credited.get_mut(kind) = scaled_credit(yields.get(kind), percent);
        }
        Some((tier, credited))
    }
}

/// `ceil(base * percent / 100)` in integer arithmetic.
pub fn scaled_credit(base: u32, percent: u32) -> u32 {
    let scaled = (base as u64 * percent as u64 + 99) / 100;
    scaled.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_scale_base_yield() {
        let tuning = PayoutTuning::default();
        let yields = ResourceBundle::new(0, 3, 0, 0);
        let (tier, credit) = tuning.payout(&yields, 55).expect("above floor");
        assert_eq!(tier, ControlTier::Strong);
        assert_eq!(credit.economy, 3);

        let (tier, credit) = tuning.payout(&yields, 30).expect("above floor");
        assert_eq!(tier, ControlTier::Contested);
        assert_eq!(credit.economy, 2);

        let (_, credit) = tuning.payout(&yields, 80).expect("above floor");
        assert_eq!(credit.economy, 4);
        assert_eq!(credit.influence, 0);
    }

    #[test]
    fn below_floor_receives_nothing() {
        let tuning = PayoutTuning::default();
        let yields = ResourceBundle::uniform(2);
        assert!(tuning.payout(&yields, 9).is_none());
        let (tier, credit) = tuning.payout(&yields, 10).expect("at floor");
        assert_eq!(tier, ControlTier::Weak);
        assert_eq!(credit, ResourceBundle::uniform(1));
    }

    #[test]
    fn credit_rounds_up() {
        assert_eq!(scaled_credit(1, 40), 1);
        assert_eq!(scaled_credit(3, 80), 3);
        assert_eq!(scaled_credit(0, 120), 0);
        assert_eq!(scaled_credit(5, 120), 6);
    }
}
