//! Occurrence expansion.
//!
//! Expansion walks local calendar days in the rule's timezone, selects the
//! days the rule matches, produces the wall-clock times for each day and
//! converts them to UTC. Local times that do not exist (DST gaps) are
//! skipped; ambiguous local times resolve to the earlier instant.
//!
//! Rules with BYSETPOS are expanded a whole period (year, month, week or
//! day) at a time so positions can be counted across the period's set.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::RRuleError;
use crate::rule::{DateValue, Frequency, RRule};

/// Days scanned past the search start before giving up.
const MAX_SCAN_DAYS: i64 = 8 * 366;

/// A recurrence rule bound to a timezone.
#[derive(Debug, Clone)]
pub struct Recurrence {
    rule: RRule,
    tz: Tz,
    anchor: NaiveDateTime,
    until: Option<DateTime<Utc>>,
}

impl Recurrence {
    pub fn new(rule: RRule, tz: Tz) -> Self {
        let anchor = match &rule.dtstart {
            Some(start) => start.to_local(tz, false),
            None => NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        };
        let until = rule.until.as_ref().and_then(|u| until_instant(u, tz));
        Self {
            rule,
            tz,
            anchor,
            until,
        }
    }

    /// Parse `input` and bind it to `tz`.
    pub fn parse(input: &str, tz: Tz) -> Result<Self, RRuleError> {
        Ok(Self::new(RRule::parse(input)?, tz))
    }

    pub fn rule(&self) -> &RRule {
        &self.rule
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Occurrences at or after `start`, in ascending order.
    pub fn iter_from(&self, start: DateTime<Utc>) -> OccurrenceIter<'_> {
        let anchor_day = self.anchor.date();
        let mut first_day = if self.rule.count.is_some() {
            anchor_day
        } else {
            start.with_timezone(&self.tz).date_naive().max(anchor_day)
        };
        if !self.rule.by_set_pos.is_empty() {
            first_day = self.period_start(first_day);
        }
        let mut last_day = first_day.max(start.with_timezone(&self.tz).date_naive())
            + Duration::days(MAX_SCAN_DAYS);
        if let Some(until) = self.until {
            let until_day = until.with_timezone(&self.tz).date_naive() + Duration::days(1);
            last_day = last_day.min(until_day);
        }

        OccurrenceIter {
            recurrence: self,
            day: first_day,
            last_day,
            pending: VecDeque::new(),
            start,
            emitted: 0,
            done: false,
        }
    }

    /// All occurrences `o` with `start <= o <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if end < start {
            return Vec::new();
        }
        self.iter_from(start).take_while(|o| *o <= end).collect()
    }

    /// First occurrence strictly after `at`.
    pub fn after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.iter_from(at).find(|o| *o > at)
    }

    /// Latest occurrence `o` with `since <= o <= at`.
    pub fn latest_between(&self, since: DateTime<Utc>, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.between(since, at).pop()
    }

    /// Occurrences of the period beginning at `day`, and the day after it.
    fn expand_period(&self, day: NaiveDate) -> (Vec<DateTime<Utc>>, Option<NaiveDate>) {
        if self.rule.by_set_pos.is_empty() {
            let mut out: Vec<DateTime<Utc>> = if day < self.anchor.date() {
                Vec::new()
            } else {
                self.local_times_on(day)
                    .into_iter()
                    .filter(|naive| *naive >= self.anchor)
                    .filter_map(|naive| self.to_utc(naive))
                    .collect()
            };
            out.sort_unstable();
            out.dedup();
            return (out, day.succ_opt());
        }

        let end = self.period_end(day);
        let mut set = Vec::new();
        let mut cursor = Some(day);
        while let Some(d) = cursor.filter(|d| *d <= end) {
            set.extend(self.local_times_on(d));
            cursor = d.succ_opt();
        }

        let freq = self.rule.freq;
        let mut out: Vec<DateTime<Utc>> = set
            .chunk_by(|a, b| set_key(freq, a) == set_key(freq, b))
            .flat_map(|group| select_positions(group, &self.rule.by_set_pos))
            .filter(|naive| *naive >= self.anchor)
            .filter_map(|naive| self.to_utc(naive))
            .collect();
        out.sort_unstable();
        out.dedup();
        (out, end.succ_opt())
    }

    fn period_start(&self, day: NaiveDate) -> NaiveDate {
        match self.rule.freq {
            Frequency::Yearly => day.with_ordinal(1).unwrap_or(day),
            Frequency::Monthly => day.with_day(1).unwrap_or(day),
            Frequency::Weekly => week_start(day, self.rule.week_start),
            _ => day,
        }
    }

    fn period_end(&self, start: NaiveDate) -> NaiveDate {
        match self.rule.freq {
            Frequency::Yearly => start.with_ordinal(days_in_year(start)).unwrap_or(start),
            Frequency::Monthly => start.with_day(days_in_month(start)).unwrap_or(start),
            Frequency::Weekly => start + Duration::days(6),
            _ => start,
        }
    }

    fn to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }

    /// Local wall-clock times the rule produces on `day`, ascending, without
    /// the DTSTART cut-off applied.
    fn local_times_on(&self, day: NaiveDate) -> Vec<NaiveDateTime> {
        if !self.day_matches(day) {
            return Vec::new();
        }

        let freq = self.rule.freq;
        let hours = field_values(&self.rule.by_hour, freq >= Frequency::Daily, self.anchor.hour(), 24);
        let minutes = field_values(
            &self.rule.by_minute,
            freq >= Frequency::Hourly,
            self.anchor.minute(),
            60,
        );
        let seconds = field_values(
            &self.rule.by_second,
            freq >= Frequency::Minutely,
            self.anchor.second(),
            60,
        );

        let day_offset = (day - self.anchor.date()).num_days();
        let interval = i64::from(self.rule.interval);
        let mut out = Vec::new();

        for &h in &hours {
            for &m in &minutes {
                for &s in &seconds {
                    if !self.time_aligned(day_offset, h, m, s, interval) {
                        continue;
                    }
                    if let Some(naive) = day.and_hms_opt(h, m, s) {
                        out.push(naive);
                    }
                }
            }
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    fn time_aligned(&self, day_offset: i64, h: u32, m: u32, s: u32, interval: i64) -> bool {
        if interval == 1 {
            return true;
        }
        let a = &self.anchor;
        let diff = match self.rule.freq {
            Frequency::Hourly => day_offset * 24 + i64::from(h) - i64::from(a.hour()),
            Frequency::Minutely => {
                day_offset * 1440 + i64::from(h * 60 + m) - i64::from(a.hour() * 60 + a.minute())
            }
            Frequency::Secondly => {
                day_offset * 86_400 + i64::from(h * 3600 + m * 60 + s)
                    - i64::from(a.num_seconds_from_midnight())
            }
            _ => return true,
        };
        diff.rem_euclid(interval) == 0
    }

    fn day_matches(&self, day: NaiveDate) -> bool {
        let rule = &self.rule;
        let anchor = self.anchor.date();
        let interval = i64::from(rule.interval);

        let aligned = match rule.freq {
            Frequency::Yearly => i64::from(day.year() - anchor.year()).rem_euclid(interval) == 0,
            Frequency::Monthly => {
                let months = i64::from(day.year() - anchor.year()) * 12 + i64::from(day.month())
                    - i64::from(anchor.month());
                months.rem_euclid(interval) == 0
            }
            Frequency::Weekly => {
                let weeks = (week_start(day, rule.week_start) - week_start(anchor, rule.week_start))
                    .num_days()
                    / 7;
                weeks.rem_euclid(interval) == 0
            }
            Frequency::Daily => (day - anchor).num_days().rem_euclid(interval) == 0,
            _ => true,
        };
        if !aligned {
            return false;
        }

        let no_year_filters = rule.by_year_day.is_empty() && rule.by_week_no.is_empty();
        let no_day_filters =
            no_year_filters && rule.by_month_day.is_empty() && rule.by_day.is_empty();

        if !rule.by_month.is_empty() {
            if !rule.by_month.contains(&day.month()) {
                return false;
            }
        } else if rule.freq == Frequency::Yearly && no_day_filters && day.month() != anchor.month()
        {
            return false;
        }

        if !rule.by_month_day.is_empty() {
            let len = days_in_month(day);
            let matched = rule.by_month_day.iter().any(|&n| {
                let target = if n > 0 { n } else { len as i32 + 1 + n };
                target == day.day() as i32
            });
            if !matched {
                return false;
            }
        } else if matches!(rule.freq, Frequency::Monthly | Frequency::Yearly)
            && rule.by_day.is_empty()
            && no_year_filters
            && day.day() != anchor.day()
        {
            return false;
        }

        if !rule.by_year_day.is_empty() {
            let len = days_in_year(day) as i32;
            let ordinal = day.ordinal() as i32;
            if !rule
                .by_year_day
                .iter()
                .any(|&n| ordinal == if n > 0 { n } else { len + 1 + n })
            {
                return false;
            }
        }

        if !rule.by_week_no.is_empty() {
            let (week, weeks_in_year) = week_number(day, rule.week_start);
            if !rule
                .by_week_no
                .iter()
                .any(|&n| week == if n > 0 { n } else { weeks_in_year + 1 + n })
            {
                return false;
            }
        }

        if !rule.by_day.is_empty() {
            let in_year = rule.freq == Frequency::Yearly && rule.by_month.is_empty();
            let matched = rule.by_day.iter().any(|spec| {
                spec.weekday == day.weekday()
                    && spec
                        .ordinal
                        .map_or(true, |n| ordinal_matches(day, n, in_year))
            });
            if !matched {
                return false;
            }
        } else if rule.freq == Frequency::Weekly && day.weekday() != anchor.weekday() {
            return false;
        }

        true
    }
}

/// Lazy, ascending iterator over UTC occurrences.
#[derive(Debug)]
pub struct OccurrenceIter<'a> {
    recurrence: &'a Recurrence,
    day: NaiveDate,
    last_day: NaiveDate,
    pending: VecDeque<DateTime<Utc>>,
    start: DateTime<Utc>,
    emitted: u32,
    done: bool,
}

impl Iterator for OccurrenceIter<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(occurrence) = self.pending.pop_front() {
                if let Some(count) = self.recurrence.rule.count {
                    self.emitted += 1;
                    if self.emitted > count {
                        self.done = true;
                        return None;
                    }
                }
                if self.recurrence.until.is_some_and(|until| occurrence > until) {
                    self.done = true;
                    return None;
                }
                if occurrence < self.start {
                    continue;
                }
                return Some(occurrence);
            }

            if self.day > self.last_day {
                self.done = true;
                return None;
            }
            let (occurrences, next) = self.recurrence.expand_period(self.day);
            self.pending = occurrences.into();
            match next {
                Some(next) => self.day = next,
                None => self.done = true,
            }
        }
        None
    }
}

fn until_instant(until: &DateValue, tz: Tz) -> Option<DateTime<Utc>> {
    match until {
        DateValue::Utc(dt) => Some(*dt),
        DateValue::Zoned(naive, zone) => zone
            .from_local_datetime(naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        DateValue::Floating(_) | DateValue::Date(_) => tz
            .from_local_datetime(&until.to_local(tz, true))
            .latest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn field_values(explicit: &[u32], from_anchor: bool, anchor: u32, range: u32) -> Vec<u32> {
    if !explicit.is_empty() {
        explicit.to_vec()
    } else if from_anchor {
        vec![anchor]
    } else {
        (0..range).collect()
    }
}

fn week_start(day: NaiveDate, wkst: Weekday) -> NaiveDate {
    let back = (day.weekday().num_days_from_monday() + 7 - wkst.num_days_from_monday()) % 7;
    day - Duration::days(i64::from(back))
}

/// First day of week 1 of `year`: the week holding at least four days of
/// the year.
fn first_week_start(year: i32, wkst: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 4).map(|jan4| week_start(jan4, wkst))
}

/// The week number of `day` and the number of weeks in the year that week
/// belongs to. Days around New Year may fall in the neighbouring year's
/// first or last week.
fn week_number(day: NaiveDate, wkst: Weekday) -> (i32, i32) {
    let this_week = week_start(day, wkst);
    let year = (this_week + Duration::days(3)).year();
    match (first_week_start(year, wkst), first_week_start(year + 1, wkst)) {
        (Some(first), Some(next)) => (
            ((this_week - first).num_days() / 7 + 1) as i32,
            ((next - first).num_days() / 7) as i32,
        ),
        _ => (0, 0),
    }
}

/// Groups of a BYSETPOS set: the whole period for day-or-coarser
/// frequencies, otherwise the hour, minute or second.
fn set_key(freq: Frequency, naive: &NaiveDateTime) -> i64 {
    let ts = naive.and_utc().timestamp();
    match freq {
        Frequency::Hourly => ts.div_euclid(3600),
        Frequency::Minutely => ts.div_euclid(60),
        Frequency::Secondly => ts,
        _ => 0,
    }
}

fn select_positions(group: &[NaiveDateTime], positions: &[i32]) -> Vec<NaiveDateTime> {
    let len = group.len() as i32;
    positions
        .iter()
        .filter_map(|&n| {
            let index = if n > 0 { n - 1 } else { len + n };
            usize::try_from(index).ok().and_then(|i| group.get(i)).copied()
        })
        .collect()
}

fn days_in_month(day: NaiveDate) -> u32 {
    let (y, m) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

fn days_in_year(day: NaiveDate) -> u32 {
    if NaiveDate::from_ymd_opt(day.year(), 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// Whether `day` is the `n`th (or `-n`th from the end) of its weekday in
/// its month, or in its year when `in_year` is set.
fn ordinal_matches(day: NaiveDate, n: i32, in_year: bool) -> bool {
    let (position, len) = if in_year {
        (day.ordinal(), days_in_year(day))
    } else {
        (day.day(), days_in_month(day))
    };
    if n > 0 {
        ((position - 1) / 7 + 1) as i32 == n
    } else {
        ((len - position) / 7 + 1) as i32 == -n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_minutely_without_dtstart() {
        let rec = Recurrence::parse("FREQ=MINUTELY;INTERVAL=1", Tz::UTC).unwrap();
        let at = utc(2025, 6, 1, 10, 15, 30);
        assert_eq!(rec.after(at), Some(utc(2025, 6, 1, 10, 16, 0)));
        assert_eq!(
            rec.latest_between(at - Duration::minutes(5), at),
            Some(utc(2025, 6, 1, 10, 15, 0))
        );
    }

    #[test]
    fn test_weekly_business_hours() {
        let rec = Recurrence::parse(
            "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR;BYHOUR=9;BYMINUTE=0;BYSECOND=0",
            Tz::UTC,
        )
        .unwrap();
        // 2025-06-06 is a Friday.
        let got = rec.between(utc(2025, 6, 6, 0, 0, 0), utc(2025, 6, 10, 0, 0, 0));
        assert_eq!(got, vec![utc(2025, 6, 6, 9, 0, 0), utc(2025, 6, 9, 9, 0, 0)]);
    }

    #[test]
    fn test_timezone_conversion() {
        let rec = Recurrence::parse(
            "FREQ=DAILY;BYHOUR=9;BYMINUTE=0;BYSECOND=0",
            "America/New_York".parse().unwrap(),
        )
        .unwrap();
        // EDT is UTC-4 in June.
        assert_eq!(
            rec.after(utc(2025, 6, 1, 0, 0, 0)),
            Some(utc(2025, 6, 1, 13, 0, 0))
        );
        // EST is UTC-5 in January.
        assert_eq!(
            rec.after(utc(2025, 1, 15, 0, 0, 0)),
            Some(utc(2025, 1, 15, 14, 0, 0))
        );
    }

    #[test]
    fn test_dst_gap_is_skipped() {
        let rec = Recurrence::parse(
            "FREQ=DAILY;BYHOUR=2;BYMINUTE=30;BYSECOND=0",
            "America/New_York".parse().unwrap(),
        )
        .unwrap();
        // 2025-03-09 02:30 does not exist in New York.
        let got = rec.between(utc(2025, 3, 8, 0, 0, 0), utc(2025, 3, 11, 0, 0, 0));
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], utc(2025, 3, 8, 7, 30, 0));
        assert_eq!(got[1], utc(2025, 3, 10, 6, 30, 0));
    }

    #[test]
    fn test_count_is_counted_from_dtstart() {
        let rec = Recurrence::parse(
            "DTSTART:20250101T120000Z\nRRULE:FREQ=DAILY;COUNT=3",
            Tz::UTC,
        )
        .unwrap();
        let all: Vec<_> = rec.iter_from(utc(2024, 1, 1, 0, 0, 0)).collect();
        assert_eq!(
            all,
            vec![
                utc(2025, 1, 1, 12, 0, 0),
                utc(2025, 1, 2, 12, 0, 0),
                utc(2025, 1, 3, 12, 0, 0)
            ]
        );
        assert_eq!(rec.iter_from(utc(2025, 1, 2, 13, 0, 0)).count(), 1);
    }

    #[test]
    fn test_until_is_inclusive() {
        let rec = Recurrence::parse(
            "DTSTART:20250101T120000Z\nRRULE:FREQ=DAILY;UNTIL=20250103T120000Z",
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(rec.iter_from(utc(2025, 1, 1, 0, 0, 0)).count(), 3);
    }

    #[test]
    fn test_interval_alignment() {
        let rec = Recurrence::parse(
            "DTSTART:20250101T000000Z\nRRULE:FREQ=DAILY;INTERVAL=2",
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(rec.after(utc(2025, 1, 1, 0, 0, 0)), Some(utc(2025, 1, 3, 0, 0, 0)));

        let hourly = Recurrence::parse(
            "DTSTART:20250101T010000Z\nRRULE:FREQ=HOURLY;INTERVAL=3",
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(
            hourly.after(utc(2025, 1, 1, 2, 0, 0)),
            Some(utc(2025, 1, 1, 4, 0, 0))
        );
    }

    #[test]
    fn test_monthly_last_friday() {
        let rec = Recurrence::parse("FREQ=MONTHLY;BYDAY=-1FR;BYHOUR=17", Tz::UTC).unwrap();
        assert_eq!(
            rec.after(utc(2025, 5, 1, 0, 0, 0)),
            Some(utc(2025, 5, 30, 17, 0, 0))
        );
    }

    #[test]
    fn test_monthly_negative_month_day() {
        let rec = Recurrence::parse("FREQ=MONTHLY;BYMONTHDAY=-1", Tz::UTC).unwrap();
        assert_eq!(
            rec.after(utc(2024, 2, 1, 0, 0, 0)),
            Some(utc(2024, 2, 29, 0, 0, 0))
        );
    }

    #[test]
    fn test_last_business_day_of_month() {
        let rec = Recurrence::parse(
            "FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1;BYHOUR=17;BYMINUTE=0;BYSECOND=0",
            Tz::UTC,
        )
        .unwrap();
        let got = rec.between(utc(2025, 5, 1, 0, 0, 0), utc(2025, 8, 31, 23, 59, 59));
        // 2025-08-31 is a Sunday.
        assert_eq!(
            got,
            vec![
                utc(2025, 5, 30, 17, 0, 0),
                utc(2025, 6, 30, 17, 0, 0),
                utc(2025, 7, 31, 17, 0, 0),
                utc(2025, 8, 29, 17, 0, 0),
            ]
        );
    }

    #[test]
    fn test_set_position_counts_from_period_start() {
        // Searching from mid-month still counts the month's weekdays from the 1st.
        let rec = Recurrence::parse("FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=2", Tz::UTC)
            .unwrap();
        // June 2025 starts on a Sunday; its second weekday is Tuesday the 3rd.
        assert_eq!(
            rec.after(utc(2025, 6, 2, 12, 0, 0)),
            Some(utc(2025, 6, 3, 0, 0, 0))
        );
        assert_eq!(
            rec.after(utc(2025, 6, 15, 0, 0, 0)),
            Some(utc(2025, 7, 2, 0, 0, 0))
        );
    }

    #[test]
    fn test_hourly_set_position_per_hour() {
        let rec = Recurrence::parse(
            "FREQ=HOURLY;BYMINUTE=0,15,30,45;BYSECOND=0;BYSETPOS=-1",
            Tz::UTC,
        )
        .unwrap();
        let got = rec.between(utc(2025, 6, 1, 10, 0, 0), utc(2025, 6, 1, 11, 59, 59));
        assert_eq!(got, vec![utc(2025, 6, 1, 10, 45, 0), utc(2025, 6, 1, 11, 45, 0)]);
    }

    #[test]
    fn test_last_day_of_year() {
        let rec = Recurrence::parse("FREQ=YEARLY;BYYEARDAY=-1", Tz::UTC).unwrap();
        assert_eq!(
            rec.after(utc(2024, 6, 1, 0, 0, 0)),
            Some(utc(2024, 12, 31, 0, 0, 0))
        );
        let leap_day = Recurrence::parse("FREQ=YEARLY;BYYEARDAY=60", Tz::UTC).unwrap();
        assert_eq!(
            leap_day.after(utc(2024, 1, 1, 0, 0, 0)),
            Some(utc(2024, 2, 29, 0, 0, 0))
        );
    }

    #[test]
    fn test_week_number_selection() {
        let rec = Recurrence::parse("FREQ=YEARLY;BYWEEKNO=1;BYDAY=MO", Tz::UTC).unwrap();
        // Week 1 of 2026 starts on Monday 2025-12-29.
        assert_eq!(
            rec.after(utc(2025, 6, 1, 0, 0, 0)),
            Some(utc(2025, 12, 29, 0, 0, 0))
        );
        // Week 1 of 2027 starts on Monday 2027-01-04.
        assert_eq!(
            rec.after(utc(2026, 1, 1, 0, 0, 0)),
            Some(utc(2027, 1, 4, 0, 0, 0))
        );

        let last = Recurrence::parse("FREQ=YEARLY;BYWEEKNO=-1;BYDAY=FR", Tz::UTC).unwrap();
        // 2026 has 53 weeks; the last one starts on Monday 2026-12-28.
        assert_eq!(
            last.after(utc(2026, 6, 1, 0, 0, 0)),
            Some(utc(2027, 1, 1, 0, 0, 0))
        );
    }

    #[rstest::rstest]
    #[case(2025, 6, 30, 27, 52)]
    #[case(2025, 12, 29, 1, 53)]
    #[case(2027, 1, 1, 53, 53)]
    #[case(2021, 1, 3, 53, 53)]
    fn test_week_number(
        #[case] y: i32,
        #[case] m: u32,
        #[case] d: u32,
        #[case] week: i32,
        #[case] weeks: i32,
    ) {
        let day = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(week_number(day, Weekday::Mon), (week, weeks));
    }

    #[test]
    fn test_yearly_defaults_to_anchor_day() {
        let rec = Recurrence::parse(
            "DTSTART:20200704T100000Z\nRRULE:FREQ=YEARLY",
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(
            rec.after(utc(2025, 1, 1, 0, 0, 0)),
            Some(utc(2025, 7, 4, 10, 0, 0))
        );
    }
}
