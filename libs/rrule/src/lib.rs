//! Recurrence rules and deployment windows.
//!
//! A deployment window is described by an iCalendar recurrence rule
//! (RFC 5545 §3.3.10), a duration and a timezone. Every occurrence `O` of
//! the rule opens the half-open window `[O, O + duration)`.
//!
//! - [`RRule`] parses and validates rule strings. Unknown parts invalidate
//!   the rule.
//! - [`Recurrence`] expands a rule in an IANA timezone into UTC instants.
//! - [`WindowSchedule`] answers the window questions the policy engine
//!   asks: is `at` inside a window, when does the current window end, when
//!   does the next one start.
//!
//! Supported parts: `FREQ`, `INTERVAL`, `COUNT`, `UNTIL`, `WKST`,
//! `BYMONTH`, `BYWEEKNO`, `BYYEARDAY`, `BYMONTHDAY`, `BYDAY`, `BYHOUR`,
//! `BYMINUTE`, `BYSECOND`, `BYSETPOS`, and an optional `DTSTART` line.

mod error;
mod expand;
mod rule;
mod tz;
mod window;

pub use error::RRuleError;
pub use expand::{OccurrenceIter, Recurrence};
pub use rule::{DateValue, Frequency, RRule, WeekdaySpec};
pub use tz::parse_timezone;
pub use window::{validate_rrule, Window, WindowKind, WindowSchedule, WINDOW_LOOKBACK};

pub use chrono_tz::Tz;
