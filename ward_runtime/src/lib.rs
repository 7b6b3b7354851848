//! Rules shared by the engine and its tooling.
//!
//! Everything here is pure: probability and payout math, allowance windows,
//! the cycle calendar and the text command grammar. Nothing in this crate
//! touches storage or the Bevy runtime in `ward_core`.

pub mod allowance;
pub mod calendar;
pub mod command_text;
pub mod ideology;
pub mod odds;
pub mod payout;
pub mod power;

pub use allowance::AllowancePolicy;
pub use calendar::{CalendarConfig, CalendarError, CycleCalendar, SlotTimes};
pub use command_text::{parse_command_line, CommandParseError, WardCommand};
pub use ideology::{alignment, compatibility, ideology_modifier, Alignment, IdeologyTuning};
pub use odds::{classify_roll, success_probability, OddsInputs, OddsTuning};
pub use payout::{scaled_credit, PayoutTuning, TierRule};
pub use power::{power_multiplier, scale_effect, PowerTuning};
pub use ward_schema::*;
