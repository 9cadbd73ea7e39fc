pub mod config;
pub mod reminder;
pub mod tag;

use almanac_core::reminder::rule::parse_date;
use almanac_core::reminder::{MonthDay, Repeat, RepeatKind};
use almanac_core::{Config, DueEvaluator, ValidationError};
use chrono::NaiveDate;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn parse_day(raw: &str) -> Result<NaiveDate, ValidationError> {
    parse_date(raw)
}

/// Build a repeat policy from `--repeat` / `--repeat-value`.
///
/// Yearly kinds fall back to the start date's month and day.
pub fn parse_repeat(kind: &str, value: Option<&str>, start: NaiveDate) -> Result<Repeat, ValidationError> {
    let kind: RepeatKind = kind.parse()?;
    let derived;
    let value = match (kind, value) {
        (RepeatKind::YearlySolar | RepeatKind::YearlyLunar, None) => {
            derived = MonthDay::of(start).to_string();
            Some(derived.as_str())
        }
        (_, value) => value,
    };
    Repeat::from_parts(kind, value)
}

/// The evaluator `check` and `watch` run with.
pub fn evaluator(config: &Config) -> DueEvaluator {
    DueEvaluator::new().with_tolerance(config.reminders.tolerance_minutes)
}

/// Warn when `repeat` can never fire under `evaluator`. Returns whether it warned.
pub fn warn_if_never_due(repeat: &Repeat, evaluator: &DueEvaluator) -> bool {
    let lunar_without_oracle = matches!(repeat, Repeat::YearlyLunar(_)) && !evaluator.has_lunar();
    if lunar_without_oracle {
        tracing::warn!(
            repeat = %repeat.kind(),
            "no lunar calendar is configured; this reminder is stored but will not fire"
        );
    }
    lunar_without_oracle
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_core::reminder::{LunarDate, TableOracle};
    use chrono::Weekday;
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 17).unwrap()
    }

    #[test]
    fn yearly_defaults_to_start_month_day() {
        let repeat = parse_repeat("yearly", None, day()).unwrap();
        assert_eq!(repeat, Repeat::YearlySolar(MonthDay { month: 9, day: 17 }));
        let lunar = parse_repeat("lunar_yearly", Some("08-15"), day()).unwrap();
        assert_eq!(lunar, Repeat::YearlyLunar(MonthDay { month: 8, day: 15 }));
    }

    #[test]
    fn other_kinds_need_explicit_values() {
        assert_eq!(parse_repeat("weekly", Some("2"), day()).unwrap(), Repeat::Weekly(Weekday::Tue));
        assert!(parse_repeat("weekly", None, day()).is_err());
        assert!(parse_repeat("hourly", None, day()).is_err());
        assert_eq!(parse_repeat("none", None, day()).unwrap(), Repeat::None);
    }

    #[test]
    fn lunar_rules_warn_without_an_oracle() {
        let lunar = parse_repeat("lunar_yearly", Some("08-15"), day()).unwrap();
        let plain = evaluator(&Config::default());
        assert!(warn_if_never_due(&lunar, &plain));
        assert!(!warn_if_never_due(&Repeat::Daily, &plain));

        let oracle: TableOracle = [(
            day(),
            LunarDate {
                month: 8,
                day: 15,
                is_leap_month: false,
            },
        )]
        .into_iter()
        .collect();
        let with_oracle = plain.with_lunar(Arc::new(oracle));
        assert!(!warn_if_never_due(&lunar, &with_oracle));
    }
}
