use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use ward_schema::{CycleId, CycleSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SlotTimes {
    /// Last moment a submission lands in this cycle (exclusive).
    pub deadline: NaiveTime,
    pub results: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub first: SlotTimes,
    pub second: SlotTimes,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            first: SlotTimes {
                deadline: hm(12, 0),
                results: hm(13, 0),
            },
            second: SlotTimes {
                deadline: hm(18, 0),
                results: hm(19, 0),
            },
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("{slot} cycle deadline {deadline} is not before its result time {results}")]
    DeadlineAfterResults {
        slot: &'static str,
        deadline: NaiveTime,
        results: NaiveTime,
    },
    #[error("second cycle deadline {second} must come after first cycle results {first}")]
    SlotsOverlap { first: NaiveTime, second: NaiveTime },
}

/// Maps wall-clock time onto the two daily cycles (all times UTC).
#[derive(Debug, Clone)]
pub struct CycleCalendar {
    first: SlotTimes,
    second: SlotTimes,
}

impl CycleCalendar {
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        for (slot, times) in [
            (CycleSlot::First, config.first),
            (CycleSlot::Second, config.second),
        ] {
            if times.deadline >= times.results {
                return Err(CalendarError::DeadlineAfterResults {
                    slot: slot.as_str(),
                    deadline: times.deadline,
                    results: times.results,
                });
            }
        }
        if config.second.deadline < config.first.results {
            return Err(CalendarError::SlotsOverlap {
                first: config.first.results,
                second: config.second.deadline,
            });
        }
        Ok(Self {
            first: config.first,
            second: config.second,
        })
    }

    pub fn times(&self, slot: CycleSlot) -> SlotTimes {
        match slot {
            CycleSlot::First => self.first,
            CycleSlot::Second => self.second,
        }
    }

    pub fn deadline(&self, cycle: CycleId) -> DateTime<Utc> {
        at(cycle.date, self.times(cycle.slot).deadline)
    }

    pub fn results_at(&self, cycle: CycleId) -> DateTime<Utc> {
        at(cycle.date, self.times(cycle.slot).results)
    }

    /// The cycle a submission made at `now` belongs to: the earliest one
    /// whose deadline is still ahead.
    pub fn open_cycle(&self, now: DateTime<Utc>) -> CycleId {
        let today = CycleId::new(now.date_naive(), CycleSlot::First);
        let mut candidate = today;
        for _ in 0..3 {
            if self.deadline(candidate) > now {
                return candidate;
            }
            candidate = candidate.next();
        }
        candidate
    }

    pub fn accepts(&self, cycle: CycleId, now: DateTime<Utc>) -> bool {
        self.deadline(cycle) > now
    }

    /// The latest cycle whose result time has arrived by `now`.
    pub fn due_cycle(&self, now: DateTime<Utc>) -> CycleId {
        let mut candidate = CycleId::new(now.date_naive(), CycleSlot::Second);
        for _ in 0..2 {
            if self.results_at(candidate) <= now {
                return candidate;
            }
            candidate = candidate.previous();
        }
        candidate
    }

    /// The next cycle whose results are strictly after `now`, with that time.
    pub fn next_results_after(&self, now: DateTime<Utc>) -> (CycleId, DateTime<Utc>) {
        let mut candidate = CycleId::new(now.date_naive(), CycleSlot::First);
        for _ in 0..3 {
            let results = self.results_at(candidate);
            if results > now {
                return (candidate, results);
            }
            candidate = candidate.next();
        }
        (candidate, self.results_at(candidate))
    }
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}
