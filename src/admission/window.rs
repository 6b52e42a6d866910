//! Stay-length, day-of-week and advance-notice checks.

use chrono::{Days, NaiveDate};

use crate::calendar::{classify_nights, date_of, days_until, DayClass, HolidayCalendar};
use crate::model::{Ms, Stay};
use crate::policy::{DayPolicy, RuleSet};

use super::{RuleViolation, TitularProblem};

/// First violation of the date rules, if any.
pub fn validate(
    rules: &RuleSet,
    check_in: NaiveDate,
    check_out: NaiveDate,
    now: Ms,
    calendar: &HolidayCalendar,
) -> Result<(), RuleViolation> {
    match violations(rules, check_in, check_out, now, calendar).into_iter().next() {
        Some(v) => Err(v),
        None => Ok(()),
    }
}

/// Every violation of the date rules.
///
/// An invalid range or a type that cannot book directly yields exactly one
/// violation; the remaining checks are meaningless in those cases.
pub fn violations(
    rules: &RuleSet,
    check_in: NaiveDate,
    check_out: NaiveDate,
    now: Ms,
    calendar: &HolidayCalendar,
) -> Vec<RuleViolation> {
    let Some(stay) = Stay::new(check_in, check_out) else {
        return vec![RuleViolation::InvalidDateRange { check_in, check_out }];
    };
    if rules.allowed_day_policy == DayPolicy::None {
        return vec![RuleViolation::UnauthorizedBookingAttempt {
            problem: TitularProblem::Missing,
        }];
    }

    let mut found = Vec::new();

    let nights = stay.nights();
    let max = i64::from(rules.max_consecutive_nights);
    if nights > max {
        found.push(RuleViolation::ExceedsMaxDuration {
            nights,
            max: rules.max_consecutive_nights,
        });
    }

    if let DayPolicy::WeekdayOnly { min_weekend_advance_days } = rules.allowed_day_policy {
        // Only nights inside the notice horizon can fail, and an overlong stay
        // is only scanned up to its allowed length.
        let horizon = date_of(now)
            .checked_add_days(Days::new(min_weekend_advance_days.max(0).unsigned_abs()))
            .unwrap_or(NaiveDate::MAX);
        let mut end = stay.check_out.min(horizon);
        if nights > max {
            let allowed = stay.check_in.checked_add_days(Days::new(max.unsigned_abs()));
            end = end.min(allowed.unwrap_or(NaiveDate::MAX));
        }
        let scanned = Stay::new(stay.check_in, end);
        // Holidays are classified but never relax the weekend restriction.
        for night in scanned.map(|s| classify_nights(s, calendar)).unwrap_or_default() {
            if night.class != DayClass::Weekend {
                continue;
            }
            found.push(RuleViolation::AdvanceNoticeViolation {
                date: night.date,
                days_ahead: days_until(now, night.date),
                required: min_weekend_advance_days,
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{date, midnight};
    use crate::policy::{resolve, MemberType};

    #[test]
    fn reversed_range_rejected() {
        let rules = resolve(MemberType::Regular);
        let err = validate(&rules, date("2024-07-05"), date("2024-07-05"), 0, &HolidayCalendar::new());
        assert_eq!(
            err,
            Err(RuleViolation::InvalidDateRange {
                check_in: date("2024-07-05"),
                check_out: date("2024-07-05"),
            })
        );
    }

    #[test]
    fn regular_eight_nights_exceeds_max() {
        let rules = resolve(MemberType::Regular);
        let now = midnight("2024-06-01");
        let err = validate(&rules, date("2024-07-01"), date("2024-07-09"), now, &HolidayCalendar::new());
        assert_eq!(err, Err(RuleViolation::ExceedsMaxDuration { nights: 8, max: 7 }));

        let ok = validate(&rules, date("2024-07-01"), date("2024-07-08"), now, &HolidayCalendar::new());
        assert_eq!(ok, Ok(()));
    }

    #[test]
    fn director_limited_to_three_nights() {
        let rules = resolve(MemberType::Director);
        let now = midnight("2024-06-01");
        let cal = HolidayCalendar::new();
        assert!(validate(&rules, date("2024-07-01"), date("2024-07-04"), now, &cal).is_ok());
        assert_eq!(
            validate(&rules, date("2024-07-01"), date("2024-07-05"), now, &cal),
            Err(RuleViolation::ExceedsMaxDuration { nights: 4, max: 3 })
        );
    }

    #[test]
    fn widow_saturday_needs_three_days_notice() {
        let rules = resolve(MemberType::Widow);
        let cal = HolidayCalendar::new();
        // Saturday 2024-07-06, booked on Thursday.
        let thursday = midnight("2024-07-04") + 9 * crate::model::HOUR_MS;
        let err = validate(&rules, date("2024-07-06"), date("2024-07-07"), thursday, &cal);
        assert_eq!(
            err,
            Err(RuleViolation::AdvanceNoticeViolation {
                date: date("2024-07-06"),
                days_ahead: 2,
                required: 3,
            })
        );

        let wednesday = midnight("2024-07-03");
        assert_eq!(validate(&rules, date("2024-07-06"), date("2024-07-07"), wednesday, &cal), Ok(()));
    }

    #[test]
    fn weekday_nights_need_no_notice() {
        let rules = resolve(MemberType::SpecialVisitor);
        // Monday night booked the same Monday.
        let monday = midnight("2024-07-08");
        assert_eq!(
            validate(&rules, date("2024-07-08"), date("2024-07-10"), monday, &HolidayCalendar::new()),
            Ok(())
        );
    }

    #[test]
    fn holiday_does_not_relax_weekend_rule() {
        let rules = resolve(MemberType::TransientVisitor);
        let cal = HolidayCalendar::with_holidays([date("2024-07-06")]);
        let friday = midnight("2024-07-05");
        assert!(validate(&rules, date("2024-07-06"), date("2024-07-07"), friday, &cal).is_err());
    }

    #[test]
    fn full_report_lists_every_short_notice_weekend_night() {
        let rules = resolve(MemberType::Widow);
        let friday = midnight("2024-07-05");
        // Fri..Tue: Sat and Sun both too close, plus 4 nights is fine.
        let found = violations(&rules, date("2024-07-05"), date("2024-07-09"), friday, &HolidayCalendar::new());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|v| v.code() == "AdvanceNoticeViolation"));
    }

    #[test]
    fn far_future_weekends_are_not_scanned() {
        let rules = resolve(MemberType::Widow);
        let now = midnight("2024-07-04");
        // Every weekend after the notice horizon is fine, however long the stay.
        let found = violations(&rules, date("2024-07-04"), date("2124-07-04"), now, &HolidayCalendar::new());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code(), "ExceedsMaxDuration");
        assert_eq!(
            found[1],
            RuleViolation::AdvanceNoticeViolation {
                date: date("2024-07-06"),
                days_ahead: 2,
                required: 3,
            }
        );

        let extreme = violations(&rules, NaiveDate::MIN, NaiveDate::MAX, now, &HolidayCalendar::new());
        assert_eq!(extreme[0].code(), "ExceedsMaxDuration");
        assert!(extreme.len() <= 1 + rules.max_consecutive_nights as usize);
    }

    #[test]
    fn youth_visitor_policy_is_unauthorized() {
        let rules = resolve(MemberType::YouthVisitor);
        let found = violations(&rules, date("2024-07-08"), date("2024-07-09"), 0, &HolidayCalendar::new());
        assert_eq!(
            found,
            vec![RuleViolation::UnauthorizedBookingAttempt { problem: TitularProblem::Missing }]
        );
    }
}
