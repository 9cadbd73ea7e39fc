//! Lunar calendar lookup.
//!
//! The engine does not convert dates itself. A host that can do solar to
//! lunar conversion injects a [`LunarOracle`]; without one, yearly lunar
//! reminders never fire.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::rule::MonthDay;

/// A date in the Chinese lunisolar calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunarDate {
    pub month: u32,
    pub day: u32,
    /// Set for days inside an intercalary (leap) month.
    pub is_leap_month: bool,
}

impl LunarDate {
    /// Month/day used for matching yearly lunar rules.
    ///
    /// Leap-month days have no regular month/day and match nothing.
    pub fn month_day(&self) -> Option<MonthDay> {
        if self.is_leap_month {
            return None;
        }
        Some(MonthDay {
            month: self.month,
            day: self.day,
        })
    }
}

/// Solar to lunar date conversion.
pub trait LunarOracle: Send + Sync {
    /// Convert a solar date. `None` if the date cannot be converted.
    fn solar_to_lunar(&self, date: NaiveDate) -> Option<LunarDate>;
}

/// Oracle backed by a precomputed table, for hosts that ship conversion
/// data for a bounded range of years.
#[derive(Debug, Clone, Default)]
pub struct TableOracle {
    entries: HashMap<NaiveDate, LunarDate>,
}

impl TableOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, solar: NaiveDate, lunar: LunarDate) -> &mut Self {
        self.entries.insert(solar, lunar);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(NaiveDate, LunarDate)> for TableOracle {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, LunarDate)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl LunarOracle for TableOracle {
    fn solar_to_lunar(&self, date: NaiveDate) -> Option<LunarDate> {
        self.entries.get(&date).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup_misses_return_none() {
        let mid_autumn = NaiveDate::from_ymd_opt(2024, 9, 17).unwrap();
        let oracle: TableOracle = [(
            mid_autumn,
            LunarDate { month: 8, day: 15, is_leap_month: false },
        )]
        .into_iter()
        .collect();

        assert_eq!(
            oracle.solar_to_lunar(mid_autumn).and_then(|d| d.month_day()),
            Some(MonthDay { month: 8, day: 15 })
        );
        assert!(oracle.solar_to_lunar(mid_autumn.succ_opt().unwrap()).is_none());
    }

    #[test]
    fn leap_month_days_have_no_month_day() {
        let leap = LunarDate { month: 6, day: 1, is_leap_month: true };
        assert_eq!(leap.month_day(), None);
    }
}
