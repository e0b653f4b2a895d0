use crate::exemption::WorkdayExemption;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` string; empty or malformed input yields `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).ok()
}

/// Format an optional date, rendering `None` as the empty string.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Business-day calendar. Defaults to a Monday-Friday week with no holidays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkCalendar {
    holidays: HashSet<NaiveDate>,
    recurring_holidays: HashSet<(u32, u32)>,
    non_working_days: HashSet<Weekday>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self {
            holidays: HashSet::new(),
            recurring_holidays: HashSet::new(),
            non_working_days: HashSet::from([Weekday::Sat, Weekday::Sun]),
        }
    }
}

impl WorkCalendar {
    const ALL_WEEKDAYS: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn custom<I, J>(working_days: I, holidays: J) -> Self
    where
        I: IntoIterator<Item = Weekday>,
        J: IntoIterator<Item = NaiveDate>,
    {
        let mut calendar = Self::default();
        calendar.set_working_days(working_days.into_iter().collect());
        calendar.add_holidays(holidays);
        calendar
    }

    /// Calendar that also treats the given exemptions as non-working days.
    /// Recurring exemptions block the same month/day in every year.
    pub fn with_exemptions(mut self, exemptions: &[WorkdayExemption]) -> Self {
        for exemption in exemptions {
            if exemption.recurring {
                self.recurring_holidays
                    .insert((exemption.date.month(), exemption.date.day()));
            } else {
                self.holidays.insert(exemption.date);
            }
        }
        self
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn add_holidays<I: IntoIterator<Item = NaiveDate>>(&mut self, dates: I) {
        self.holidays.extend(dates);
    }

    pub fn add_recurring_holiday(&mut self, month: u32, day: u32) {
        self.recurring_holidays.insert((month, day));
    }

    /// Set the working weekdays. An empty set leaves the current week untouched,
    /// since a calendar with no working day can never advance.
    pub fn set_working_days(&mut self, days: Vec<Weekday>) {
        if days.is_empty() {
            tracing::warn!("ignoring empty working-day set; keeping current week");
            return;
        }
        self.non_working_days.clear();
        for day in Self::ALL_WEEKDAYS {
            if !days.contains(&day) {
                self.non_working_days.insert(day);
            }
        }
    }

    pub fn working_days(&self) -> Vec<Weekday> {
        Self::ALL_WEEKDAYS
            .into_iter()
            .filter(|day| !self.non_working_days.contains(day))
            .collect()
    }

    /// Check if a date is a business day
    pub fn is_available(&self, date: NaiveDate) -> bool {
        !self.non_working_days.contains(&date.weekday())
            && !self.holidays.contains(&date)
            && !self
                .recurring_holidays
                .contains(&(date.month(), date.day()))
    }

    /// First business day strictly after `from`
    pub fn next_available(&self, from: NaiveDate) -> Option<NaiveDate> {
        self.add_workdays(from, 1)
    }

    /// Move `date` by `n` business days. Negative `n` walks backwards; the
    /// starting day itself is never counted. `None` once the walk leaves
    /// the representable date range.
    pub fn add_workdays(&self, date: NaiveDate, n: i64) -> Option<NaiveDate> {
        let step = Duration::days(n.signum());
        let mut remaining = n.abs();
        let mut current = date;
        while remaining > 0 {
            current = current.checked_add_signed(step)?;
            if self.is_available(current) {
                remaining -= 1;
            }
        }
        Some(current)
    }

    /// Count business days in the inclusive range `[start, end]`.
    pub fn count_available_days(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let mut count = 0;
        let mut current = start;
        while current <= end {
            if self.is_available(current) {
                count += 1;
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        count
    }

    /// Inclusive business-day span of a task. Never less than 1: a missing
    /// date, a reversed range or an all-weekend range all count as one day.
    pub fn workday_count(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> i64 {
        match (start, end) {
            (Some(start), Some(end)) => self.count_available_days(start, end).max(1),
            _ => 1,
        }
    }

    /// Date on which an inclusive span of `workdays` business days that begins
    /// at `start` ends. `start` always counts as the first day.
    pub fn end_from_workdays(&self, start: NaiveDate, workdays: i64) -> Option<NaiveDate> {
        let mut remaining = workdays - 1;
        let mut current = start;
        while remaining > 0 {
            current = current.succ_opt()?;
            if self.is_available(current) {
                remaining -= 1;
            }
        }
        Some(current)
    }

    /// Business days in the half-open range `(from, to]`.
    pub fn elapsed_workdays(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        match from.succ_opt() {
            Some(first) if to > from => self.count_available_days(first, to),
            _ => 0,
        }
    }
}
