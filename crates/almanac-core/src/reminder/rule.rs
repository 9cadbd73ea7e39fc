//! Reminder rule model.
//!
//! A rule pairs a start date and a time of day with a [`Repeat`] policy.
//! The persisted form keeps the repeat policy as a `(kind, value)` pair of
//! strings; [`Repeat::from_parts`] validates that pair into the typed form.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Persisted date format for `start_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Persisted time format for `time_of_day`.
pub const TIME_FORMAT: &str = "%H:%M";

/// How a reminder repeats. The closed set of persisted repeat codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatKind {
    None,
    Daily,
    Weekly,
    Monthly,
    #[serde(rename = "yearly")]
    YearlySolar,
    #[serde(rename = "lunar_yearly")]
    YearlyLunar,
}

impl RepeatKind {
    pub const ALL: [RepeatKind; 6] = [
        RepeatKind::None,
        RepeatKind::Daily,
        RepeatKind::Weekly,
        RepeatKind::Monthly,
        RepeatKind::YearlySolar,
        RepeatKind::YearlyLunar,
    ];

    /// Code stored in the `repeat_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatKind::None => "none",
            RepeatKind::Daily => "daily",
            RepeatKind::Weekly => "weekly",
            RepeatKind::Monthly => "monthly",
            RepeatKind::YearlySolar => "yearly",
            RepeatKind::YearlyLunar => "lunar_yearly",
        }
    }

    pub fn is_recurring(self) -> bool {
        self != RepeatKind::None
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepeatKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::invalid("repeat_type", format!("unknown repeat type '{s}'")))
    }
}

/// A month/day pair serialized as `MM-DD`.
///
/// Used for both solar and lunar yearly rules; the valid day range depends
/// on which calendar the pair refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    fn parse(s: &str, max_day: u32, field: &str) -> Result<Self, ValidationError> {
        let (m, d) = s
            .split_once('-')
            .ok_or_else(|| ValidationError::invalid(field, format!("expected MM-DD, got '{s}'")))?;
        let month: u32 = m
            .parse()
            .map_err(|_| ValidationError::invalid(field, format!("bad month in '{s}'")))?;
        let day: u32 = d
            .parse()
            .map_err(|_| ValidationError::invalid(field, format!("bad day in '{s}'")))?;
        if !(1..=12).contains(&month) || !(1..=max_day).contains(&day) {
            return Err(ValidationError::invalid(field, format!("'{s}' is out of range")));
        }
        Ok(Self { month, day })
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// Typed repeat policy: the kind together with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// One-shot, fires on `start_date` only.
    None,
    Daily,
    Weekly(Weekday),
    /// Day of month, 1..=31. Never clamped to shorter months.
    Monthly(u32),
    YearlySolar(MonthDay),
    YearlyLunar(MonthDay),
}

impl Repeat {
    /// Build a repeat policy from its persisted `(repeat_type, repeat_value)` pair.
    ///
    /// `value` is ignored for `none` and `daily`.
    pub fn from_parts(kind: RepeatKind, value: Option<&str>) -> Result<Self, ValidationError> {
        let required = || {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ValidationError::invalid("repeat_value", format!("{kind} reminders need a repeat value"))
                })
        };

        match kind {
            RepeatKind::None => Ok(Repeat::None),
            RepeatKind::Daily => Ok(Repeat::Daily),
            RepeatKind::Weekly => {
                let raw = required()?;
                let code: u32 = raw.parse().map_err(|_| {
                    ValidationError::invalid("repeat_value", format!("weekday code must be 0-6, got '{raw}'"))
                })?;
                weekday_from_code(code)
                    .map(Repeat::Weekly)
                    .ok_or_else(|| {
                        ValidationError::invalid("repeat_value", format!("weekday code must be 0-6, got '{raw}'"))
                    })
            }
            RepeatKind::Monthly => {
                let raw = required()?;
                match raw.parse::<u32>() {
                    Ok(day) if (1..=31).contains(&day) => Ok(Repeat::Monthly(day)),
                    _ => Err(ValidationError::invalid(
                        "repeat_value",
                        format!("day of month must be 1-31, got '{raw}'"),
                    )),
                }
            }
            RepeatKind::YearlySolar => MonthDay::parse(required()?, 31, "repeat_value").map(Repeat::YearlySolar),
            RepeatKind::YearlyLunar => MonthDay::parse(required()?, 30, "repeat_value").map(Repeat::YearlyLunar),
        }
    }

    pub fn kind(&self) -> RepeatKind {
        match self {
            Repeat::None => RepeatKind::None,
            Repeat::Daily => RepeatKind::Daily,
            Repeat::Weekly(_) => RepeatKind::Weekly,
            Repeat::Monthly(_) => RepeatKind::Monthly,
            Repeat::YearlySolar(_) => RepeatKind::YearlySolar,
            Repeat::YearlyLunar(_) => RepeatKind::YearlyLunar,
        }
    }

    /// Value stored in the `repeat_value` column.
    pub fn value(&self) -> Option<String> {
        match self {
            Repeat::None | Repeat::Daily => None,
            Repeat::Weekly(wd) => Some(wd.num_days_from_sunday().to_string()),
            Repeat::Monthly(day) => Some(day.to_string()),
            Repeat::YearlySolar(md) | Repeat::YearlyLunar(md) => Some(md.to_string()),
        }
    }
}

/// Weekday from a Sunday-based code (0=Sunday .. 6=Saturday).
pub fn weekday_from_code(code: u32) -> Option<Weekday> {
    match code {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse and validate an `HH:MM` time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map_err(|_| ValidationError::invalid("time_of_day", format!("expected HH:MM, got '{s}'")))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::invalid("date", format!("expected YYYY-MM-DD, got '{s}'")))
}

/// One scheduled notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRule {
    /// Assigned by the store; `0` until the rule is first persisted.
    pub id: i64,
    pub start_date: NaiveDate,
    /// Hour and minute only; seconds are always zero.
    pub time_of_day: NaiveTime,
    pub message: String,
    pub is_active: bool,
    pub repeat: Repeat,
}

impl ReminderRule {
    /// A new, active, not yet persisted rule.
    pub fn new(start_date: NaiveDate, time_of_day: NaiveTime, message: impl Into<String>, repeat: Repeat) -> Self {
        Self {
            id: 0,
            start_date,
            time_of_day: time_of_day.with_second(0).unwrap_or(time_of_day),
            message: message.into(),
            is_active: true,
            repeat,
        }
    }

    pub fn repeat_kind(&self) -> RepeatKind {
        self.repeat.kind()
    }

    pub fn repeat_value(&self) -> Option<String> {
        self.repeat.value()
    }

    /// Minutes past midnight of `time_of_day`.
    pub fn minute_of_day(&self) -> u32 {
        self.time_of_day.hour() * 60 + self.time_of_day.minute()
    }
}

/// A persisted rule row whose fields could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reminder {id} has malformed {field}: '{value}'")]
pub struct MalformedRule {
    pub id: i64,
    pub field: &'static str,
    pub value: String,
}

/// A rule that is due, as handed to the notification consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueReminder {
    pub id: i64,
    #[serde(with = "hh_mm")]
    pub time_of_day: NaiveTime,
    pub message: String,
    pub effective_date: NaiveDate,
    pub repeat_kind: RepeatKind,
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&t.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_kind_codes_match_storage() {
        for kind in RepeatKind::ALL {
            assert_eq!(kind.as_str().parse::<RepeatKind>().unwrap(), kind);
        }
        assert!("fortnightly".parse::<RepeatKind>().is_err());
    }

    #[test]
    fn weekly_value_uses_sunday_zero() {
        let repeat = Repeat::from_parts(RepeatKind::Weekly, Some("0")).unwrap();
        assert_eq!(repeat, Repeat::Weekly(Weekday::Sun));
        assert_eq!(Repeat::Weekly(Weekday::Wed).value().as_deref(), Some("3"));
        assert!(Repeat::from_parts(RepeatKind::Weekly, Some("7")).is_err());
        assert!(Repeat::from_parts(RepeatKind::Weekly, None).is_err());
    }

    #[test]
    fn monthly_accepts_31_and_rejects_zero() {
        assert_eq!(
            Repeat::from_parts(RepeatKind::Monthly, Some("31")).unwrap(),
            Repeat::Monthly(31)
        );
        assert!(Repeat::from_parts(RepeatKind::Monthly, Some("0")).is_err());
        assert!(Repeat::from_parts(RepeatKind::Monthly, Some("32")).is_err());
    }

    #[test]
    fn yearly_values_are_zero_padded_month_day() {
        let solar = Repeat::from_parts(RepeatKind::YearlySolar, Some("2-14")).unwrap();
        assert_eq!(solar.value().as_deref(), Some("02-14"));

        // Lunar months never have a 31st.
        assert!(Repeat::from_parts(RepeatKind::YearlyLunar, Some("01-31")).is_err());
        assert!(Repeat::from_parts(RepeatKind::YearlyLunar, Some("08-15")).is_ok());
        assert!(Repeat::from_parts(RepeatKind::YearlySolar, Some("13-01")).is_err());
    }

    #[test]
    fn value_is_ignored_for_none_and_daily() {
        assert_eq!(Repeat::from_parts(RepeatKind::None, Some("junk")).unwrap(), Repeat::None);
        assert_eq!(Repeat::from_parts(RepeatKind::Daily, None).unwrap(), Repeat::Daily);
        assert_eq!(Repeat::Daily.value(), None);
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!(parse_time_of_day("08:05").unwrap(), NaiveTime::from_hms_opt(8, 5, 0).unwrap());
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("8am").is_err());
    }

    #[test]
    fn due_reminder_serializes_time_as_hh_mm() {
        let due = DueReminder {
            id: 7,
            time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            message: "standup".into(),
            effective_date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            repeat_kind: RepeatKind::YearlyLunar,
        };
        let json = serde_json::to_value(&due).unwrap();
        assert_eq!(json["time_of_day"], "08:00");
        assert_eq!(json["effective_date"], "2024-03-06");
        assert_eq!(json["repeat_kind"], "lunar_yearly");
    }
}
