//! Due-date computation for recurring tasks.
//!
//! Everything here is pure: given a rule and the date of the current
//! occurrence (the anchor), work out when the next one is due.

use chrono::{Datelike, Duration, NaiveDate};
use db::{
    models::task::{Frequency, TaskRecurrence, UpsertRecurrence, Weekday},
    validation::ValidationErrors,
};

/// Upper bound for `preview` so a request cannot ask for an unbounded list.
pub const MAX_PREVIEW: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    /// Sorted Monday-first, no duplicates
    pub days_of_week: Vec<Weekday>,
    pub day_of_month: Option<u32>,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub max_occurrences: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, interval: u32, starts_on: NaiveDate) -> Self {
        Self {
            frequency,
            interval: interval.max(1),
            days_of_week: Vec::new(),
            day_of_month: None,
            starts_on,
            ends_on: None,
            max_occurrences: None,
        }
    }

    pub fn with_days(mut self, days: &[Weekday]) -> Self {
        let mut days = days.to_vec();
        days.sort();
        days.dedup();
        self.days_of_week = days;
        self
    }

    pub fn with_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    pub fn ending_on(mut self, ends_on: NaiveDate) -> Self {
        self.ends_on = Some(ends_on);
        self
    }

    pub fn limited_to(mut self, max_occurrences: u32) -> Self {
        self.max_occurrences = Some(max_occurrences);
        self
    }

    pub fn from_stored(recurrence: &TaskRecurrence) -> Self {
        Self {
            frequency: recurrence.frequency,
            interval: u32::try_from(recurrence.repeat_interval).unwrap_or(1).max(1),
            days_of_week: Vec::new(),
            day_of_month: recurrence
                .day_of_month
                .and_then(|d| u32::try_from(d).ok()),
            starts_on: recurrence.starts_on,
            ends_on: recurrence.ends_on,
            max_occurrences: recurrence
                .max_occurrences
                .and_then(|m| u32::try_from(m).ok()),
        }
        .with_days(&recurrence.days_of_week)
    }

    /// Validate a request body and turn it into a rule.
    pub fn from_request(data: &UpsertRecurrence) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.between("interval", data.interval, 1, 365);
        if let Some(day) = data.day_of_month {
            errors.between("day_of_month", day, 1, 31);
            if data.frequency != Frequency::Monthly {
                errors.add(
                    "day_of_month",
                    "The day of month field is only allowed for monthly recurrences.",
                );
            }
        }
        if !data.days_of_week.is_empty() && data.frequency != Frequency::Weekly {
            errors.add(
                "days_of_week",
                "The days of week field is only allowed for weekly recurrences.",
            );
        }
        if let Some(max) = data.max_occurrences {
            errors.between("max_occurrences", max, 1, 10_000);
        }
        if let Some(ends_on) = data.ends_on
            && ends_on < data.starts_on
        {
            errors.add(
                "ends_on",
                "The ends on field must be a date after or equal to starts on.",
            );
        }
        errors.into_result()?;

        Ok(Self {
            frequency: data.frequency,
            interval: u32::try_from(data.interval).unwrap_or(1),
            days_of_week: Vec::new(),
            day_of_month: data.day_of_month.and_then(|d| u32::try_from(d).ok()),
            starts_on: data.starts_on,
            ends_on: data.ends_on,
            max_occurrences: data.max_occurrences.and_then(|m| u32::try_from(m).ok()),
        }
        .with_days(&data.days_of_week))
    }

    /// The first date on or after `starts_on` that matches the rule.
    pub fn first_occurrence(&self) -> Option<NaiveDate> {
        let start = self.starts_on;
        let first = match self.frequency {
            Frequency::Weekly if !self.days_of_week.is_empty() => {
                let from_monday = start.weekday().num_days_from_monday();
                let day = self
                    .days_of_week
                    .iter()
                    .map(|d| d.to_chrono().num_days_from_monday())
                    .find(|d| *d >= from_monday);
                match day {
                    Some(day) => start + Duration::days(i64::from(day - from_monday)),
                    None => {
                        let first_day = self.days_of_week[0].to_chrono().num_days_from_monday();
                        week_start(start) + Duration::days(7 + i64::from(first_day))
                    }
                }
            }
            Frequency::Monthly => match self.day_of_month {
                Some(day) => {
                    let candidate = clamp_day(start.year(), start.month(), day)?;
                    if candidate >= start {
                        candidate
                    } else {
                        let (year, month) = add_months(start.year(), start.month(), 1);
                        clamp_day(year, month, day)?
                    }
                }
                None => start,
            },
            _ => start,
        };
        self.within_end(first)
    }

    /// The occurrence that follows `anchor`.
    ///
    /// `occurrences_so_far` counts occurrences already created (the anchor's
    /// included). Returns `None` once the series is exhausted.
    pub fn next_after(&self, anchor: NaiveDate, occurrences_so_far: u32) -> Option<NaiveDate> {
        if let Some(max) = self.max_occurrences
            && occurrences_so_far >= max
        {
            return None;
        }
        let next = self.step(anchor)?;
        if next < self.starts_on {
            return self.first_occurrence();
        }
        self.within_end(next)
    }

    /// The next `count` due dates after `anchor`.
    pub fn preview(&self, anchor: NaiveDate, occurrences_so_far: u32, count: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(count.min(MAX_PREVIEW));
        let mut current = anchor;
        let mut created = occurrences_so_far;
        while dates.len() < count.min(MAX_PREVIEW) {
            match self.next_after(current, created) {
                Some(next) if next > current => {
                    dates.push(next);
                    current = next;
                    created = created.saturating_add(1);
                }
                _ => break,
            }
        }
        dates
    }

    fn within_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.ends_on {
            Some(ends_on) if date > ends_on => None,
            _ => Some(date),
        }
    }

    fn step(&self, anchor: NaiveDate) -> Option<NaiveDate> {
        let interval = self.interval.max(1);
        match self.frequency {
            Frequency::Daily => anchor.checked_add_signed(Duration::days(i64::from(interval))),
            Frequency::Weekly => {
                if self.days_of_week.is_empty() {
                    return anchor.checked_add_signed(Duration::days(7 * i64::from(interval)));
                }
                let from_monday = anchor.weekday().num_days_from_monday();
                let later_this_week = self
                    .days_of_week
                    .iter()
                    .map(|d| d.to_chrono().num_days_from_monday())
                    .find(|d| *d > from_monday);
                match later_this_week {
                    Some(day) => Some(anchor + Duration::days(i64::from(day - from_monday))),
                    None => {
                        let first_day = self.days_of_week[0].to_chrono().num_days_from_monday();
                        week_start(anchor).checked_add_signed(Duration::days(
                            7 * i64::from(interval) + i64::from(first_day),
                        ))
                    }
                }
            }
            Frequency::Monthly => {
                let (year, month) = add_months(anchor.year(), anchor.month(), interval);
                clamp_day(year, month, self.day_of_month.unwrap_or(anchor.day()))
            }
            Frequency::Yearly => {
                let year = anchor.year().checked_add(i32::try_from(interval).ok()?)?;
                clamp_day(year, anchor.month(), anchor.day())
            }
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn add_months(year: i32, month: u32, months: u32) -> (i32, u32) {
    let zero_based = i64::from(year) * 12 + i64::from(month - 1) + i64::from(months);
    ((zero_based.div_euclid(12)) as i32, (zero_based.rem_euclid(12) + 1) as u32)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = add_months(year, month, 1);
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some(first_of_next.pred_opt()?.day())
}

/// `day` in the given month, clamped to the month's last day.
fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, last_day_of_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_interval() {
        let rule = RecurrenceRule::new(Frequency::Daily, 3, date(2025, 1, 1));
        assert_eq!(rule.next_after(date(2025, 1, 30), 1), Some(date(2025, 2, 2)));
    }

    #[test]
    fn test_weekly_without_days() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 2, date(2025, 1, 1));
        assert_eq!(rule.next_after(date(2025, 1, 1), 1), Some(date(2025, 1, 15)));
    }

    #[test]
    fn test_weekly_days_same_week_then_next_interval() {
        // 2025-03-03 is a Monday.
        let rule = RecurrenceRule::new(Frequency::Weekly, 2, date(2025, 3, 3))
            .with_days(&[Weekday::Friday, Weekday::Monday]);

        assert_eq!(rule.next_after(date(2025, 3, 3), 1), Some(date(2025, 3, 7)));
        // From Friday, jump two weeks ahead to that week's Monday.
        assert_eq!(rule.next_after(date(2025, 3, 7), 2), Some(date(2025, 3, 17)));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let rule = RecurrenceRule::new(Frequency::Monthly, 1, date(2025, 1, 1)).with_day_of_month(31);
        assert_eq!(rule.next_after(date(2025, 1, 31), 1), Some(date(2025, 2, 28)));
        assert_eq!(rule.next_after(date(2025, 2, 28), 2), Some(date(2025, 3, 31)));
        assert_eq!(rule.next_after(date(2024, 1, 31), 1), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_monthly_uses_anchor_day_and_crosses_year() {
        let rule = RecurrenceRule::new(Frequency::Monthly, 3, date(2024, 1, 1));
        assert_eq!(rule.next_after(date(2024, 11, 15), 1), Some(date(2025, 2, 15)));
    }

    #[test]
    fn test_yearly_leap_day() {
        let rule = RecurrenceRule::new(Frequency::Yearly, 1, date(2024, 1, 1));
        assert_eq!(rule.next_after(date(2024, 2, 29), 1), Some(date(2025, 2, 28)));
    }

    #[test]
    fn test_never_before_start() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, date(2025, 6, 1));
        assert_eq!(rule.next_after(date(2025, 1, 1), 1), Some(date(2025, 6, 1)));
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, date(2025, 1, 1)).ending_on(date(2025, 1, 3));
        assert_eq!(rule.next_after(date(2025, 1, 2), 1), Some(date(2025, 1, 3)));
        assert_eq!(rule.next_after(date(2025, 1, 3), 2), None);
    }

    #[test]
    fn test_max_occurrences() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, date(2025, 1, 1)).limited_to(3);
        assert_eq!(rule.next_after(date(2025, 1, 2), 2), Some(date(2025, 1, 3)));
        assert_eq!(rule.next_after(date(2025, 1, 3), 3), None);
    }

    #[test]
    fn test_preview_stops_at_limit() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 1, date(2025, 3, 3))
            .with_days(&[Weekday::Monday, Weekday::Wednesday])
            .limited_to(4);
        let dates = rule.preview(date(2025, 3, 3), 1, 10);
        assert_eq!(
            dates,
            vec![date(2025, 3, 5), date(2025, 3, 10), date(2025, 3, 12)]
        );
    }

    #[test]
    fn test_first_occurrence_weekly_and_monthly() {
        // 2025-03-05 is a Wednesday.
        let weekly = RecurrenceRule::new(Frequency::Weekly, 1, date(2025, 3, 5))
            .with_days(&[Weekday::Monday, Weekday::Thursday]);
        assert_eq!(weekly.first_occurrence(), Some(date(2025, 3, 6)));

        let monthly = RecurrenceRule::new(Frequency::Monthly, 1, date(2025, 3, 20)).with_day_of_month(10);
        assert_eq!(monthly.first_occurrence(), Some(date(2025, 4, 10)));
    }

    #[test]
    fn test_from_request_validation() {
        let data = UpsertRecurrence {
            frequency: Frequency::Daily,
            interval: 0,
            days_of_week: vec![Weekday::Monday],
            day_of_month: Some(40),
            starts_on: date(2025, 1, 10),
            ends_on: Some(date(2025, 1, 1)),
            max_occurrences: Some(0),
        };
        let errors = RecurrenceRule::from_request(&data).unwrap_err();
        for field in ["interval", "days_of_week", "day_of_month", "ends_on", "max_occurrences"] {
            assert!(errors.has(field), "expected error for {field}");
        }
    }
}
