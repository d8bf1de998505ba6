//! Recurrence rule model and parser.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::RRuleError;

/// Recurrence frequency, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secondly => "SECONDLY",
            Self::Minutely => "MINUTELY",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    fn parse(value: &str) -> Result<Self, RRuleError> {
        match value {
            "SECONDLY" => Ok(Self::Secondly),
            "MINUTELY" => Ok(Self::Minutely),
            "HOURLY" => Ok(Self::Hourly),
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(RRuleError::InvalidValue {
                part: "FREQ",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `BYDAY` entry: a weekday with an optional ordinal (`-1FR`, `2TU`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySpec {
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

/// A DATE or DATE-TIME value from `DTSTART` or `UNTIL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    /// `YYYYMMDDTHHMMSSZ`
    Utc(DateTime<Utc>),
    /// `YYYYMMDDTHHMMSS` with a `TZID` parameter.
    Zoned(NaiveDateTime, Tz),
    /// `YYYYMMDDTHHMMSS` without a timezone: read in the rule's timezone.
    Floating(NaiveDateTime),
    /// `YYYYMMDD`
    Date(NaiveDate),
}

impl DateValue {
    /// Wall-clock time of this value in `tz`.
    ///
    /// Date-only values resolve to the start of the day unless
    /// `end_of_day` is set.
    pub fn to_local(&self, tz: Tz, end_of_day: bool) -> NaiveDateTime {
        match self {
            Self::Utc(dt) => dt.with_timezone(&tz).naive_local(),
            Self::Zoned(naive, zone) => match zone.from_local_datetime(naive).earliest() {
                Some(dt) => dt.with_timezone(&tz).naive_local(),
                None => *naive,
            },
            Self::Floating(naive) => *naive,
            Self::Date(date) => {
                let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
                date.and_hms_opt(h, m, s).unwrap_or_default()
            }
        }
    }

    fn parse(part: &'static str, value: &str, tzid: Option<Tz>) -> Result<Self, RRuleError> {
        let invalid = || RRuleError::InvalidValue {
            part,
            value: value.to_string(),
        };
        if let Some(stripped) = value.strip_suffix('Z') {
            let naive =
                NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
            return Ok(Self::Utc(Utc.from_utc_datetime(&naive)));
        }
        if value.contains('T') {
            let naive =
                NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
            return Ok(match tzid {
                Some(tz) => Self::Zoned(naive, tz),
                None => Self::Floating(naive),
            });
        }
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(Self::Date)
            .map_err(|_| invalid())
    }
}

/// A validated recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RRule {
    pub freq: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    pub until: Option<DateValue>,
    pub week_start: Weekday,
    pub by_month: Vec<u32>,
    pub by_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_day: Vec<WeekdaySpec>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_second: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub dtstart: Option<DateValue>,
}

impl RRule {
    /// Parse a rule string.
    ///
    /// Accepts a bare `FREQ=...;...` value, an `RRULE:`-prefixed line, or a
    /// block of lines with an optional `DTSTART` line.
    pub fn parse(input: &str) -> Result<Self, RRuleError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RRuleError::Empty);
        }

        let mut dtstart = None;
        let mut rule_line = None;

        for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if strip_prefix_ignore_case(line, "DTSTART").is_some() {
                if dtstart.is_some() {
                    return Err(RRuleError::DuplicatePart("DTSTART".to_string()));
                }
                dtstart = Some(parse_dtstart(line)?);
            } else if let Some(rest) = strip_prefix_ignore_case(line, "RRULE:") {
                if rule_line.is_some() {
                    return Err(RRuleError::DuplicatePart("RRULE".to_string()));
                }
                rule_line = Some(rest.to_string());
            } else if !line.contains(':') {
                if rule_line.is_some() {
                    return Err(RRuleError::DuplicatePart("RRULE".to_string()));
                }
                rule_line = Some(line.to_string());
            } else {
                let name = line.split([':', ';', '=']).next().unwrap_or(line);
                return Err(RRuleError::UnknownPart(name.to_string()));
            }
        }

        let rule_line = rule_line.ok_or(RRuleError::MissingFrequency)?;
        let mut rule = parse_rule_parts(&rule_line)?;
        rule.dtstart = dtstart;
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> Result<(), RRuleError> {
        if self.count.is_some() && self.until.is_some() {
            return Err(RRuleError::CountAndUntil);
        }
        if self.count.is_some() && self.dtstart.is_none() {
            return Err(RRuleError::CountWithoutStart);
        }
        let ordinal_allowed = matches!(self.freq, Frequency::Monthly | Frequency::Yearly);
        if !ordinal_allowed && self.by_day.iter().any(|d| d.ordinal.is_some()) {
            return Err(RRuleError::OrdinalNotAllowed(self.freq.as_str()));
        }
        let not_allowed = |part| RRuleError::PartNotAllowed {
            part,
            freq: self.freq.as_str(),
        };
        if !self.by_week_no.is_empty() && self.freq != Frequency::Yearly {
            return Err(not_allowed("BYWEEKNO"));
        }
        if !self.by_year_day.is_empty()
            && matches!(
                self.freq,
                Frequency::Daily | Frequency::Weekly | Frequency::Monthly
            )
        {
            return Err(not_allowed("BYYEARDAY"));
        }
        if self.freq == Frequency::Weekly && !self.by_month_day.is_empty() {
            return Err(not_allowed("BYMONTHDAY"));
        }
        if !self.by_set_pos.is_empty() && !self.has_by_filter() {
            return Err(RRuleError::SetPosWithoutFilter);
        }
        Ok(())
    }

    fn has_by_filter(&self) -> bool {
        !(self.by_month.is_empty()
            && self.by_month_day.is_empty()
            && self.by_year_day.is_empty()
            && self.by_week_no.is_empty()
            && self.by_day.is_empty()
            && self.by_hour.is_empty()
            && self.by_minute.is_empty()
            && self.by_second.is_empty())
    }
}

impl FromStr for RRule {
    type Err = RRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    match line.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => line.get(prefix.len()..),
        _ => None,
    }
}

/// `DTSTART:20240101T090000Z` or `DTSTART;TZID=Europe/Berlin:20240101T090000`.
fn parse_dtstart(line: &str) -> Result<DateValue, RRuleError> {
    let (head, value) = line
        .split_once(':')
        .ok_or_else(|| RRuleError::MalformedPart(line.to_string()))?;

    let mut tzid = None;
    for param in head.split(';').skip(1) {
        let (name, param_value) = param
            .split_once('=')
            .ok_or_else(|| RRuleError::MalformedPart(param.to_string()))?;
        match name.to_ascii_uppercase().as_str() {
            "TZID" => {
                let tz = param_value
                    .parse::<Tz>()
                    .map_err(|_| RRuleError::InvalidValue {
                        part: "TZID",
                        value: param_value.to_string(),
                    })?;
                tzid = Some(tz);
            }
            "VALUE" => {}
            other => return Err(RRuleError::UnknownPart(format!("DTSTART;{other}"))),
        }
    }

    DateValue::parse("DTSTART", value.trim(), tzid)
}

fn parse_rule_parts(line: &str) -> Result<RRule, RRuleError> {
    let mut seen = HashSet::new();
    let mut freq = None;
    let mut rule = RRule {
        freq: Frequency::Daily,
        interval: 1,
        count: None,
        until: None,
        week_start: Weekday::Mon,
        by_month: Vec::new(),
        by_month_day: Vec::new(),
        by_year_day: Vec::new(),
        by_week_no: Vec::new(),
        by_day: Vec::new(),
        by_hour: Vec::new(),
        by_minute: Vec::new(),
        by_second: Vec::new(),
        by_set_pos: Vec::new(),
        dtstart: None,
    };

    for part in line.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| RRuleError::MalformedPart(part.to_string()))?;
        let name = name.trim().to_ascii_uppercase();
        let value = value.trim().to_ascii_uppercase();

        if !seen.insert(name.clone()) {
            return Err(RRuleError::DuplicatePart(name));
        }

        match name.as_str() {
            "FREQ" => freq = Some(Frequency::parse(&value)?),
            "INTERVAL" => {
                rule.interval = parse_number::<u32>("INTERVAL", &value)?;
                if rule.interval == 0 {
                    return Err(invalid("INTERVAL", &value));
                }
            }
            "COUNT" => {
                let count = parse_number::<u32>("COUNT", &value)?;
                if count == 0 {
                    return Err(invalid("COUNT", &value));
                }
                rule.count = Some(count);
            }
            "UNTIL" => rule.until = Some(DateValue::parse("UNTIL", &value, None)?),
            "WKST" => rule.week_start = parse_weekday("WKST", &value)?,
            "BYMONTH" => rule.by_month = parse_list("BYMONTH", &value, 1, 12)?,
            "BYMONTHDAY" => {
                rule.by_month_day = parse_signed_list("BYMONTHDAY", &value, 31)?;
            }
            "BYDAY" => rule.by_day = parse_by_day(&value)?,
            "BYHOUR" => rule.by_hour = parse_list("BYHOUR", &value, 0, 23)?,
            "BYMINUTE" => rule.by_minute = parse_list("BYMINUTE", &value, 0, 59)?,
            "BYSECOND" => rule.by_second = parse_list("BYSECOND", &value, 0, 59)?,
            "BYYEARDAY" => rule.by_year_day = parse_signed_list("BYYEARDAY", &value, 366)?,
            "BYWEEKNO" => rule.by_week_no = parse_signed_list("BYWEEKNO", &value, 53)?,
            "BYSETPOS" => rule.by_set_pos = parse_signed_list("BYSETPOS", &value, 366)?,
            _ => return Err(RRuleError::UnknownPart(name)),
        }
    }

    rule.freq = freq.ok_or(RRuleError::MissingFrequency)?;
    Ok(rule)
}

fn invalid(part: &'static str, value: &str) -> RRuleError {
    RRuleError::InvalidValue {
        part,
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(part: &'static str, value: &str) -> Result<T, RRuleError> {
    value.parse::<T>().map_err(|_| invalid(part, value))
}

fn parse_list(part: &'static str, value: &str, min: u32, max: u32) -> Result<Vec<u32>, RRuleError> {
    let mut out = Vec::new();
    for item in value.split(',') {
        let n = parse_number::<u32>(part, item.trim())?;
        if n < min || n > max {
            return Err(invalid(part, item));
        }
        out.push(n);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

fn parse_signed_list(part: &'static str, value: &str, max: i32) -> Result<Vec<i32>, RRuleError> {
    let mut out = Vec::new();
    for item in value.split(',') {
        let n = parse_number::<i32>(part, item.trim().trim_start_matches('+'))?;
        if n == 0 || n.abs() > max {
            return Err(invalid(part, item));
        }
        out.push(n);
    }
    Ok(out)
}

fn parse_weekday(part: &'static str, value: &str) -> Result<Weekday, RRuleError> {
    match value {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(invalid(part, other)),
    }
}

fn parse_by_day(value: &str) -> Result<Vec<WeekdaySpec>, RRuleError> {
    let mut out = Vec::new();
    for item in value.split(',').map(str::trim) {
        if item.len() < 2 {
            return Err(invalid("BYDAY", item));
        }
        let (ordinal, day) = item.split_at(item.len() - 2);
        let weekday = parse_weekday("BYDAY", day)?;
        let ordinal = if ordinal.is_empty() {
            None
        } else {
            let n = parse_number::<i32>("BYDAY", ordinal.trim_start_matches('+'))?;
            if n == 0 || n.abs() > 53 {
                return Err(invalid("BYDAY", item));
            }
            Some(n)
        };
        out.push(WeekdaySpec { ordinal, weekday });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_minimal() {
        let rule = RRule::parse("FREQ=MINUTELY;INTERVAL=1").unwrap();
        assert_eq!(rule.freq, Frequency::Minutely);
        assert_eq!(rule.interval, 1);
        assert!(rule.dtstart.is_none());
    }

    #[test]
    fn test_parse_full_weekly() {
        let rule = RRule::parse("RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR;BYHOUR=9;BYMINUTE=30;WKST=SU")
            .unwrap();
        assert_eq!(rule.by_day.len(), 3);
        assert_eq!(rule.by_hour, vec![9]);
        assert_eq!(rule.by_minute, vec![30]);
        assert_eq!(rule.week_start, Weekday::Sun);
    }

    #[test]
    fn test_parse_dtstart_block() {
        let rule = RRule::parse("DTSTART;TZID=Europe/Berlin:20240101T090000\nRRULE:FREQ=DAILY;COUNT=3")
            .unwrap();
        assert_eq!(rule.count, Some(3));
        assert!(matches!(rule.dtstart, Some(DateValue::Zoned(_, Tz::Europe__Berlin))));
    }

    #[test]
    fn test_parse_monthly_ordinals() {
        let rule = RRule::parse("FREQ=MONTHLY;BYDAY=-1FR,+2TU").unwrap();
        assert_eq!(rule.by_day[0].ordinal, Some(-1));
        assert_eq!(rule.by_day[1].ordinal, Some(2));
    }

    #[rstest]
    #[case("", RRuleError::Empty)]
    #[case("INTERVAL=2", RRuleError::MissingFrequency)]
    #[case("FREQ=DAILY;FOO=1", RRuleError::UnknownPart("FOO".to_string()))]
    #[case("FREQ=MONTHLY;BYSETPOS=1", RRuleError::SetPosWithoutFilter)]
    #[case("FREQ=MONTHLY;BYWEEKNO=1", RRuleError::PartNotAllowed { part: "BYWEEKNO", freq: "MONTHLY" })]
    #[case("FREQ=WEEKLY;BYYEARDAY=1", RRuleError::PartNotAllowed { part: "BYYEARDAY", freq: "WEEKLY" })]
    #[case("FREQ=YEARLY;BYYEARDAY=367", RRuleError::InvalidValue { part: "BYYEARDAY", value: "367".to_string() })]
    #[case("FREQ=YEARLY;BYWEEKNO=0", RRuleError::InvalidValue { part: "BYWEEKNO", value: "0".to_string() })]
    #[case("FREQ=DAILY;FREQ=DAILY", RRuleError::DuplicatePart("FREQ".to_string()))]
    #[case("FREQ=FORTNIGHTLY", RRuleError::InvalidValue { part: "FREQ", value: "FORTNIGHTLY".to_string() })]
    #[case("FREQ=DAILY;INTERVAL=0", RRuleError::InvalidValue { part: "INTERVAL", value: "0".to_string() })]
    #[case("FREQ=DAILY;BYHOUR=24", RRuleError::InvalidValue { part: "BYHOUR", value: "24".to_string() })]
    #[case("FREQ=DAILY;COUNT=3", RRuleError::CountWithoutStart)]
    #[case("FREQ=WEEKLY;BYDAY=1MO", RRuleError::OrdinalNotAllowed("WEEKLY"))]
    #[case("FREQ=DAILY;COUNT=3;UNTIL=20300101", RRuleError::CountAndUntil)]
    fn test_parse_errors(#[case] input: &str, #[case] expected: RRuleError) {
        let input = if expected == RRuleError::CountAndUntil {
            format!("DTSTART:20240101T000000Z\n{input}")
        } else {
            input.to_string()
        };
        assert_eq!(RRule::parse(&input).unwrap_err(), expected);
    }

    #[test]
    fn test_parse_set_position_parts() {
        let rule = RRule::parse("FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1").unwrap();
        assert_eq!(rule.by_set_pos, vec![-1]);

        let rule = RRule::parse("FREQ=YEARLY;BYWEEKNO=20,-1;BYYEARDAY=+100").unwrap();
        assert_eq!(rule.by_week_no, vec![20, -1]);
        assert_eq!(rule.by_year_day, vec![100]);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let rule = RRule::parse("freq=daily;byday=mo").unwrap();
        assert_eq!(rule.freq, Frequency::Daily);
        assert_eq!(rule.by_day[0].weekday, Weekday::Mon);
    }
}
