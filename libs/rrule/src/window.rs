//! Deployment windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RRuleError;
use crate::expand::Recurrence;
use crate::rule::RRule;
use crate::tz::parse_timezone;

/// Extra lookback, beyond the window duration, when searching for the
/// occurrence that opened the window containing `at`.
pub const WINDOW_LOOKBACK: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);

/// Whether deployments are permitted inside or outside the windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Deployments are permitted only inside windows.
    #[default]
    Allow,
    /// Deployments are blocked inside windows.
    Deny,
}

impl WindowKind {
    pub fn from_allow_flag(allow_window: Option<bool>) -> Self {
        if allow_window.unwrap_or(true) {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A recurring window schedule: a rule, a duration and a kind.
#[derive(Debug, Clone)]
pub struct WindowSchedule {
    recurrence: Recurrence,
    duration: Duration,
    kind: WindowKind,
}

impl WindowSchedule {
    /// Build a schedule. Unknown or empty timezones fall back to UTC;
    /// an invalid rule is an error.
    pub fn new(
        rrule: &str,
        duration_minutes: i64,
        timezone: Option<&str>,
        kind: WindowKind,
    ) -> Result<Self, RRuleError> {
        if duration_minutes < 0 {
            return Err(RRuleError::InvalidValue {
                part: "DURATION",
                value: duration_minutes.to_string(),
            });
        }
        let tz = parse_timezone(timezone);
        Ok(Self {
            recurrence: Recurrence::parse(rrule, tz)?,
            duration: Duration::minutes(duration_minutes),
            kind,
        })
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    /// The window containing `at`, if any.
    pub fn current_window(&self, at: DateTime<Utc>) -> Option<Window> {
        if self.duration <= Duration::zero() {
            return None;
        }
        let lookback = self.duration + Duration::seconds(WINDOW_LOOKBACK.as_secs() as i64);
        let start = self.recurrence.latest_between(at - lookback, at)?;
        let window = Window {
            start,
            end: start + self.duration,
        };
        window.contains(at).then_some(window)
    }

    pub fn is_inside(&self, at: DateTime<Utc>) -> bool {
        self.current_window(at).is_some()
    }

    /// The window opened by the first occurrence strictly after `at`.
    pub fn next_window(&self, at: DateTime<Utc>) -> Option<Window> {
        let start = self.recurrence.after(at)?;
        Some(Window {
            start,
            end: start + self.duration,
        })
    }

    /// Start of the next allow window. `None` for deny schedules, when `at`
    /// is already inside a window, or when no future occurrence exists.
    pub fn next_window_start(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.kind != WindowKind::Allow || self.is_inside(at) {
            return None;
        }
        self.next_window(at).map(|w| w.start)
    }

    /// End of the deny window containing `at`. `None` for allow schedules
    /// or when `at` is outside every window.
    pub fn deny_window_end(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.kind != WindowKind::Deny {
            return None;
        }
        self.current_window(at).map(|w| w.end)
    }
}

/// Validate a rule string, returning the parse diagnostic on failure.
pub fn validate_rrule(rrule: &str) -> Result<(), RRuleError> {
    RRule::parse(rrule).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, h, m, s).unwrap()
    }

    #[test]
    fn test_minutely_allow_window_is_always_inside() {
        let schedule =
            WindowSchedule::new("FREQ=MINUTELY;INTERVAL=1", 60, None, WindowKind::Allow).unwrap();
        let now = at(10, 30, 15);
        let window = schedule.current_window(now).unwrap();
        assert_eq!(window.start, at(10, 30, 0));
        assert_eq!(window.end, at(11, 30, 0));
        assert_eq!(schedule.next_window_start(now), None);
    }

    #[test]
    fn test_deny_window_end() {
        let schedule =
            WindowSchedule::new("FREQ=MINUTELY;INTERVAL=1", 60, Some(""), WindowKind::Deny)
                .unwrap();
        let now = at(10, 30, 15);
        assert_eq!(schedule.deny_window_end(now), Some(at(11, 30, 0)));
        assert_eq!(schedule.next_window_start(now), None);
    }

    #[test]
    fn test_outside_daily_window() {
        let schedule = WindowSchedule::new(
            "FREQ=DAILY;BYHOUR=9;BYMINUTE=0;BYSECOND=0",
            120,
            Some("UTC"),
            WindowKind::Allow,
        )
        .unwrap();
        assert!(schedule.is_inside(at(10, 59, 59)));
        assert!(!schedule.is_inside(at(11, 0, 0)));
        assert_eq!(
            schedule.next_window_start(at(12, 0, 0)),
            Some(Utc.with_ymd_and_hms(2025, 6, 5, 9, 0, 0).unwrap())
        );
        assert_eq!(schedule.deny_window_end(at(9, 30, 0)), None);
    }

    #[test]
    fn test_weekly_window_longer_than_a_day() {
        // Saturday 00:00 for 48 hours.
        let schedule = WindowSchedule::new(
            "FREQ=WEEKLY;BYDAY=SA;BYHOUR=0;BYMINUTE=0;BYSECOND=0",
            48 * 60,
            None,
            WindowKind::Deny,
        )
        .unwrap();
        let sunday_noon = Utc.with_ymd_and_hms(2025, 6, 8, 12, 0, 0).unwrap();
        assert_eq!(
            schedule.deny_window_end(sunday_noon),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        let schedule = WindowSchedule::new(
            "FREQ=DAILY;BYHOUR=9;BYMINUTE=0;BYSECOND=0",
            60,
            Some("Mars/Olympus"),
            WindowKind::Allow,
        )
        .unwrap();
        assert!(schedule.is_inside(at(9, 0, 0)));
    }

    #[test]
    fn test_invalid_rrule_is_rejected() {
        assert!(WindowSchedule::new("FREQ=DAILY;BOGUS=1", 60, None, WindowKind::Allow).is_err());
        assert!(validate_rrule("FREQ=WEEKLY;BYDAY=MO").is_ok());
        assert!(validate_rrule("not a rule").is_err());
    }

    #[test]
    fn test_kind_from_flag() {
        assert_eq!(WindowKind::from_allow_flag(None), WindowKind::Allow);
        assert_eq!(WindowKind::from_allow_flag(Some(false)), WindowKind::Deny);
    }

    proptest! {
        #[test]
        fn prop_every_occurrence_is_inside(
            hour in 0u32..24,
            duration in 1i64..600,
            offset_days in 0i64..400,
        ) {
            let rule = format!("FREQ=DAILY;BYHOUR={hour};BYMINUTE=0;BYSECOND=0");
            let schedule = WindowSchedule::new(&rule, duration, Some("Europe/Berlin"), WindowKind::Allow).unwrap();
            let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset_days);
            for occurrence in schedule.recurrence().between(from, from + Duration::days(2)) {
                prop_assert!(schedule.is_inside(occurrence));
            }
        }

        #[test]
        fn prop_next_start_none_iff_inside(
            minutes in 0i64..(14 * 24 * 60),
            duration in 1i64..180,
        ) {
            let schedule = WindowSchedule::new(
                "FREQ=WEEKLY;BYDAY=MO,TH;BYHOUR=6;BYMINUTE=0;BYSECOND=0",
                duration,
                None,
                WindowKind::Allow,
            ).unwrap();
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
            prop_assert_eq!(schedule.next_window_start(now).is_none(), schedule.is_inside(now));
        }
    }
}
