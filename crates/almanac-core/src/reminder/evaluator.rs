//! Due evaluation.
//!
//! Decides whether a single rule is due at a given local date and time.
//! The evaluator is pure: it holds only its tolerance and an optional lunar
//! oracle, and never touches storage.
//!
//! ## Matching
//!
//! A rule is due when it is active, its start date is not after today, the
//! date matches its repeat policy, and `time_of_day` is within the tolerance
//! window of the current minute. The minute difference is linear over the
//! day: 23:58 and 00:02 are 1436 minutes apart, not 4.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use super::lunar::LunarOracle;
use super::rule::{DueReminder, MonthDay, ReminderRule, Repeat};

/// Default tolerance around `time_of_day`, in minutes (inclusive).
pub const DEFAULT_TOLERANCE_MINUTES: u32 = 5;

#[derive(Clone)]
pub struct DueEvaluator {
    tolerance_minutes: u32,
    lunar: Option<Arc<dyn LunarOracle>>,
}

impl fmt::Debug for DueEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DueEvaluator")
            .field("tolerance_minutes", &self.tolerance_minutes)
            .field("lunar", &self.lunar.is_some())
            .finish()
    }
}

impl Default for DueEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl DueEvaluator {
    /// Evaluator with the default five-minute tolerance and no lunar oracle.
    pub fn new() -> Self {
        Self {
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            lunar: None,
        }
    }

    pub fn with_tolerance(mut self, minutes: u32) -> Self {
        self.tolerance_minutes = minutes;
        self
    }

    pub fn with_lunar(mut self, oracle: Arc<dyn LunarOracle>) -> Self {
        self.lunar = Some(oracle);
        self
    }

    pub fn tolerance_minutes(&self) -> u32 {
        self.tolerance_minutes
    }

    pub fn has_lunar(&self) -> bool {
        self.lunar.is_some()
    }

    pub fn is_due(&self, rule: &ReminderRule, now: NaiveDateTime) -> bool {
        if !rule.is_active {
            return false;
        }
        let today = now.date();
        if rule.start_date > today {
            return false;
        }
        self.date_matches(rule, today) && self.time_matches(rule, now)
    }

    /// Date shown alongside a fired reminder.
    ///
    /// One-shot rules report their start date; recurring rules report the
    /// day the recurrence matched.
    pub fn effective_date(&self, rule: &ReminderRule, now: NaiveDateTime) -> NaiveDate {
        match rule.repeat {
            Repeat::None => rule.start_date,
            _ => now.date(),
        }
    }

    /// [`is_due`](Self::is_due) and [`effective_date`](Self::effective_date) in one step.
    pub fn check(&self, rule: &ReminderRule, now: NaiveDateTime) -> Option<DueReminder> {
        if !self.is_due(rule, now) {
            return None;
        }
        Some(DueReminder {
            id: rule.id,
            time_of_day: rule.time_of_day,
            message: rule.message.clone(),
            effective_date: self.effective_date(rule, now),
            repeat_kind: rule.repeat_kind(),
        })
    }

    fn date_matches(&self, rule: &ReminderRule, today: NaiveDate) -> bool {
        match rule.repeat {
            Repeat::None => today == rule.start_date,
            Repeat::Daily => true,
            Repeat::Weekly(weekday) => today.weekday() == weekday,
            Repeat::Monthly(day) => today.day() == day,
            Repeat::YearlySolar(md) => MonthDay::of(today) == md,
            Repeat::YearlyLunar(md) => self
                .lunar
                .as_ref()
                .and_then(|oracle| oracle.solar_to_lunar(today))
                .and_then(|lunar| lunar.month_day())
                .is_some_and(|lunar_md| lunar_md == md),
        }
    }

    fn time_matches(&self, rule: &ReminderRule, now: NaiveDateTime) -> bool {
        let now_minute = now.hour() * 60 + now.minute();
        rule.minute_of_day().abs_diff(now_minute) <= self.tolerance_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::lunar::{LunarDate, TableOracle};
    use chrono::{NaiveTime, Weekday};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
        d.and_hms_opt(h, min, 0).unwrap()
    }

    fn rule(start: NaiveDate, h: u32, m: u32, repeat: Repeat) -> ReminderRule {
        let mut r = ReminderRule::new(start, NaiveTime::from_hms_opt(h, m, 0).unwrap(), "msg", repeat);
        r.id = 1;
        r
    }

    #[test]
    fn inactive_rule_is_never_due() {
        let today = date(2024, 5, 1);
        let mut r = rule(today, 8, 0, Repeat::Daily);
        r.is_active = false;
        assert!(!DueEvaluator::new().is_due(&r, at(today, 8, 0)));
    }

    #[test]
    fn one_shot_fires_only_on_its_date() {
        let eval = DueEvaluator::new();
        let start = date(2024, 5, 1);
        let r = rule(start, 9, 30, Repeat::None);
        assert!(eval.is_due(&r, at(start, 9, 30)));
        assert!(!eval.is_due(&r, at(start.succ_opt().unwrap(), 9, 30)));
        assert_eq!(eval.effective_date(&r, at(start, 9, 30)), start);
    }

    #[test]
    fn missed_one_shot_is_not_caught_up() {
        let start = date(2024, 5, 1);
        let r = rule(start, 9, 30, Repeat::None);
        assert!(!DueEvaluator::new().is_due(&r, at(date(2024, 5, 3), 9, 30)));
    }

    #[test]
    fn start_date_tomorrow_is_never_due() {
        let eval = DueEvaluator::new().with_lunar(Arc::new(TableOracle::new()));
        let today = date(2024, 5, 1);
        let tomorrow = today.succ_opt().unwrap();
        let repeats = [
            Repeat::None,
            Repeat::Daily,
            Repeat::Weekly(today.weekday()),
            Repeat::Monthly(1),
            Repeat::YearlySolar(MonthDay::of(today)),
            Repeat::YearlyLunar(MonthDay { month: 3, day: 23 }),
        ];
        for repeat in repeats {
            let r = rule(tomorrow, 8, 0, repeat);
            assert!(!eval.is_due(&r, at(today, 8, 0)), "{repeat:?}");
        }
    }

    #[test]
    fn weekly_wednesday_window() {
        let eval = DueEvaluator::new();
        let r = rule(date(2024, 1, 1), 8, 0, Repeat::Weekly(Weekday::Wed));
        let wednesday = date(2024, 5, 8);
        assert_eq!(wednesday.weekday(), Weekday::Wed);

        assert!(eval.is_due(&r, at(wednesday, 7, 55)));
        assert!(eval.is_due(&r, at(wednesday, 8, 0)));
        assert!(eval.is_due(&r, at(wednesday, 8, 5)));
        assert!(!eval.is_due(&r, at(wednesday, 7, 54)));
        assert!(!eval.is_due(&r, at(wednesday, 8, 6)));
        assert!(!eval.is_due(&r, at(wednesday.pred_opt().unwrap(), 8, 0)));
    }

    #[test]
    fn monthly_31_skips_short_months() {
        let eval = DueEvaluator::new();
        let r = rule(date(2023, 1, 1), 12, 0, Repeat::Monthly(31));
        for month in [4, 6, 9, 11] {
            let mut day = date(2024, month, 1);
            while day.month() == month {
                assert!(!eval.is_due(&r, at(day, 12, 0)), "{day}");
                day = day.succ_opt().unwrap();
            }
        }
        assert!(!eval.is_due(&r, at(date(2024, 2, 29), 12, 0)));
        assert!(eval.is_due(&r, at(date(2024, 5, 31), 12, 0)));
    }

    #[test]
    fn yearly_solar_recurs_every_year() {
        let eval = DueEvaluator::new();
        let r = rule(date(2022, 2, 14), 19, 0, Repeat::YearlySolar(MonthDay { month: 2, day: 14 }));
        for year in 2022..=2030 {
            let now = at(date(year, 2, 14), 19, 2);
            assert!(eval.is_due(&r, now));
            assert_eq!(eval.effective_date(&r, now), date(year, 2, 14));
        }
        assert!(!eval.is_due(&r, at(date(2024, 2, 15), 19, 0)));
    }

    #[test]
    fn yearly_lunar_fails_closed_without_oracle() {
        let today = date(2024, 9, 17);
        let r = rule(date(2020, 1, 1), 20, 0, Repeat::YearlyLunar(MonthDay { month: 8, day: 15 }));
        assert!(!DueEvaluator::new().is_due(&r, at(today, 20, 0)));

        let oracle: TableOracle = [(today, LunarDate { month: 8, day: 15, is_leap_month: false })]
            .into_iter()
            .collect();
        let eval = DueEvaluator::new().with_lunar(Arc::new(oracle));
        assert!(eval.is_due(&r, at(today, 20, 0)));
        // Oracle has no entry for other days.
        assert!(!eval.is_due(&r, at(today.succ_opt().unwrap(), 20, 0)));
    }

    #[test]
    fn yearly_lunar_ignores_leap_month() {
        let today = date(2023, 8, 16);
        let oracle: TableOracle = [(today, LunarDate { month: 7, day: 1, is_leap_month: true })]
            .into_iter()
            .collect();
        let eval = DueEvaluator::new().with_lunar(Arc::new(oracle));
        let r = rule(date(2020, 1, 1), 8, 0, Repeat::YearlyLunar(MonthDay { month: 7, day: 1 }));
        assert!(!eval.is_due(&r, at(today, 8, 0)));
    }

    #[test]
    fn no_wraparound_at_midnight() {
        let eval = DueEvaluator::new();
        let r = rule(date(2024, 1, 1), 23, 58, Repeat::Daily);
        assert!(!eval.is_due(&r, at(date(2024, 5, 2), 0, 2)));
        assert!(eval.is_due(&r, at(date(2024, 5, 1), 23, 59)));
    }

    #[test]
    fn recurring_effective_date_is_today() {
        let eval = DueEvaluator::new();
        let r = rule(date(2020, 1, 1), 8, 0, Repeat::Daily);
        let now = at(date(2024, 5, 1), 8, 0);
        let due = eval.check(&r, now).unwrap();
        assert_eq!(due.effective_date, date(2024, 5, 1));
        assert_eq!(due.repeat_kind, crate::reminder::RepeatKind::Daily);
    }

    #[test]
    fn custom_tolerance() {
        let eval = DueEvaluator::new().with_tolerance(0);
        let r = rule(date(2024, 1, 1), 8, 0, Repeat::Daily);
        assert!(eval.is_due(&r, at(date(2024, 5, 1), 8, 0)));
        assert!(!eval.is_due(&r, at(date(2024, 5, 1), 8, 1)));
    }

    fn any_repeat() -> impl Strategy<Value = Repeat> {
        prop_oneof![
            Just(Repeat::None),
            Just(Repeat::Daily),
            (0u32..7).prop_map(|c| Repeat::Weekly(crate::reminder::rule::weekday_from_code(c).unwrap())),
            (1u32..=31).prop_map(Repeat::Monthly),
            (1u32..=12, 1u32..=28).prop_map(|(month, day)| Repeat::YearlySolar(MonthDay { month, day })),
            (1u32..=12, 1u32..=28).prop_map(|(month, day)| Repeat::YearlyLunar(MonthDay { month, day })),
        ]
    }

    proptest! {
        #[test]
        fn is_due_is_pure(
            repeat in any_repeat(),
            start_offset in 0i64..800,
            now_offset in 0i64..800,
            rule_minute in 0u32..1440,
            now_minute in 0u32..1440,
        ) {
            let base = date(2023, 1, 1);
            let r = rule(
                base + chrono::Duration::days(start_offset),
                rule_minute / 60,
                rule_minute % 60,
                repeat,
            );
            let now = at(base + chrono::Duration::days(now_offset), now_minute / 60, now_minute % 60);
            let eval = DueEvaluator::new();
            let first = eval.is_due(&r, now);
            prop_assert_eq!(first, eval.is_due(&r, now));
            prop_assert_eq!(eval.check(&r, now).is_some(), first);
        }

        #[test]
        fn never_due_before_start(
            repeat in any_repeat(),
            days_early in 1i64..400,
            minute in 0u32..1440,
        ) {
            let start = date(2025, 6, 1);
            let r = rule(start, minute / 60, minute % 60, repeat);
            let now = at(start - chrono::Duration::days(days_early), minute / 60, minute % 60);
            prop_assert!(!DueEvaluator::new().is_due(&r, now));
        }
    }
}
