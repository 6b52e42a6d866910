use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::model::{Ms, Stay};

/// Inclusive range of dates during which the club runs vacation pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl VacationPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Holidays and vacation periods supplied by the calendar service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    #[serde(default)]
    holidays: BTreeSet<NaiveDate>,
    #[serde(default)]
    vacations: Vec<VacationPeriod>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            vacations: Vec::new(),
        }
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    /// Ignored when `end < start`.
    pub fn add_vacation(&mut self, start: NaiveDate, end: NaiveDate) {
        if start <= end {
            self.vacations.push(VacationPeriod { start, end });
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn in_vacation(&self, date: NaiveDate) -> bool {
        self.vacations.iter().any(|v| v.contains(date))
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    /// Holiday or vacation: the dates on which exemptions stop applying.
    pub fn is_special(&self, date: NaiveDate) -> bool {
        self.is_holiday(date) || self.in_vacation(date)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut calendar: HolidayCalendar = serde_json::from_str(json)?;
        calendar.vacations.retain(|v| v.start <= v.end);
        Ok(calendar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Weekday,
    Weekend,
}

pub fn classify(date: NaiveDate) -> DayClass {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => DayClass::Weekend,
        _ => DayClass::Weekday,
    }
}

/// One night of a stay. `special` never changes `class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Night {
    pub date: NaiveDate,
    pub class: DayClass,
    pub special: bool,
}

pub fn classify_nights(stay: Stay, calendar: &HolidayCalendar) -> Vec<Night> {
    stay.night_dates()
        .map(|date| Night {
            date,
            class: classify(date),
            special: calendar.is_special(date),
        })
        .collect()
}

/// The Saturday that opens the weekend `date` falls in, if it is a weekend date.
pub fn weekend_of(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => Some(date),
        Weekday::Sun => date.pred_opt(),
        _ => None,
    }
}

/// Weekends touched by the nights of `stay`, in order, without duplicates.
pub fn weekends_in(stay: Stay) -> BTreeSet<NaiveDate> {
    stay.night_dates().filter_map(weekend_of).collect()
}

/// UTC calendar date of a timestamp.
pub fn date_of(ms: Ms) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .date_naive()
}

/// Midnight UTC opening `date`.
pub fn start_of(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Whole days from the date of `now` to `date` (negative for past dates).
pub fn days_until(now: Ms, date: NaiveDate) -> i64 {
    (date - date_of(now)).num_days()
}

/// `(year, month)` key for monthly quotas.
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{date, midnight, stay};
    use crate::model::HOUR_MS;

    #[test]
    fn classify_weekdays_and_weekends() {
        assert_eq!(classify(date("2024-07-05")), DayClass::Weekday); // Friday
        assert_eq!(classify(date("2024-07-06")), DayClass::Weekend); // Saturday
        assert_eq!(classify(date("2024-07-07")), DayClass::Weekend); // Sunday
        assert_eq!(classify(date("2024-07-08")), DayClass::Weekday); // Monday
    }

    #[test]
    fn holiday_does_not_change_day_class() {
        let cal = HolidayCalendar::with_holidays([date("2024-07-04")]);
        let nights = classify_nights(stay("2024-07-04", "2024-07-06"), &cal);
        assert_eq!(nights.len(), 2);
        assert_eq!(nights[0].class, DayClass::Weekday);
        assert!(nights[0].special);
        assert!(!nights[1].special);
    }

    #[test]
    fn vacation_periods_are_inclusive() {
        let mut cal = HolidayCalendar::new();
        cal.add_vacation(date("2024-12-20"), date("2025-01-05"));
        assert!(cal.in_vacation(date("2024-12-20")));
        assert!(cal.in_vacation(date("2025-01-05")));
        assert!(!cal.in_vacation(date("2025-01-06")));
        assert!(cal.is_special(date("2024-12-31")));
    }

    #[test]
    fn reversed_vacation_ignored() {
        let mut cal = HolidayCalendar::new();
        cal.add_vacation(date("2024-12-20"), date("2024-12-01"));
        assert!(!cal.in_vacation(date("2024-12-10")));
    }

    #[test]
    fn weekend_keys() {
        assert_eq!(weekend_of(date("2024-07-06")), Some(date("2024-07-06")));
        assert_eq!(weekend_of(date("2024-07-07")), Some(date("2024-07-06")));
        assert_eq!(weekend_of(date("2024-07-05")), None);

        // Friday to Monday touches one weekend; Friday to Saturday touches none.
        let keys = weekends_in(stay("2024-07-05", "2024-07-08"));
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![date("2024-07-06")]);
        assert!(weekends_in(stay("2024-07-05", "2024-07-06")).is_empty());
    }

    #[test]
    fn days_until_uses_utc_dates() {
        let thursday_evening = midnight("2024-07-04") + 22 * HOUR_MS;
        assert_eq!(days_until(thursday_evening, date("2024-07-06")), 2);
        assert_eq!(days_until(thursday_evening, date("2024-07-04")), 0);
        assert_eq!(days_until(thursday_evening, date("2024-07-01")), -3);
    }

    #[test]
    fn calendar_from_json() {
        let json = r#"{
            "holidays": ["2024-12-25", "2025-01-01"],
            "vacations": [{"start": "2024-07-15", "end": "2024-07-31"},
                          {"start": "2024-09-10", "end": "2024-09-01"}]
        }"#;
        let cal = HolidayCalendar::from_json(json).unwrap();
        assert!(cal.is_holiday(date("2024-12-25")));
        assert!(cal.in_vacation(date("2024-07-20")));
        assert!(!cal.in_vacation(date("2024-09-05")));

        let empty = HolidayCalendar::from_json("{}").unwrap();
        assert_eq!(empty, HolidayCalendar::new());
    }
}
