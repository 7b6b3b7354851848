use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use ward_schema::{ActionClass, Allowances};

/// How many actions a player gets per window and how long a window lasts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllowancePolicy {
    pub main_per_window: u8,
    pub quick_per_window: u8,
    pub refresh_minutes: i64,
}

impl Default for AllowancePolicy {
    fn default() -> Self {
        Self {
            main_per_window: 1,
            quick_per_window: 2,
            refresh_minutes: 180,
        }
    }
}

impl AllowancePolicy {
    pub fn fresh(&self, now: DateTime<Utc>) -> Allowances {
        Allowances {
            main_left: self.main_per_window,
            quick_left: self.quick_per_window,
            last_refresh: now,
        }
    }

    pub fn cap(&self, class: ActionClass) -> u8 {
        match class {
            ActionClass::Main => self.main_per_window,
            ActionClass::Quick => self.quick_per_window,
        }
    }

    /// True once strictly more than the refresh interval has passed.
    pub fn needs_refresh(&self, allowances: &Allowances, now: DateTime<Utc>) -> bool {
        now - allowances.last_refresh > Duration::minutes(self.refresh_minutes)
    }

    /// The allowances as they stand at `now`, refilled if the window rolled over.
    pub fn refreshed(&self, allowances: &Allowances, now: DateTime<Utc>) -> Allowances {
        if self.needs_refresh(allowances, now) {
            self.fresh(now)
        } else {
            allowances.clone()
        }
    }

    pub fn consume(&self, allowances: &mut Allowances, class: ActionClass) -> bool {
        let slot = match class {
            ActionClass::Main => &mut allowances.main_left,
            ActionClass::Quick => &mut allowances.quick_left,
        };
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn restore(&self, allowances: &mut Allowances, class: ActionClass) {
        let cap = self.cap(class);
        let slot = match class {
            ActionClass::Main => &mut allowances.main_left,
            ActionClass::Quick => &mut allowances.quick_left,
        };
        *slot = slot.saturating_add(1).min(cap);
    }
}
