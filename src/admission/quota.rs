//! Per-member booking quotas, room availability and payment exemption.

use crate::calendar::{month_key, weekends_in, HolidayCalendar};
use crate::model::{MemberId, Ms, Reservation, Stay, HOUR_MS};
use crate::policy::RuleSet;

use super::{QuotaBreach, RuleViolation};

pub fn check_quota(
    rules: &RuleSet,
    holder: &MemberId,
    location: &str,
    stay: Stay,
    existing: &[Reservation],
) -> Result<(), RuleViolation> {
    match violations(rules, holder, location, stay, existing).into_iter().next() {
        Some(v) => Err(v),
        None => Ok(()),
    }
}

/// Every quota the request would break. `existing` may contain other members'
/// records; only slot-holding reservations charged to `holder` count.
pub fn violations(
    rules: &RuleSet,
    holder: &MemberId,
    location: &str,
    stay: Stay,
    existing: &[Reservation],
) -> Vec<RuleViolation> {
    let held: Vec<&Reservation> = existing
        .iter()
        .filter(|r| r.holds_slot() && r.quota_holder() == holder)
        .collect();
    let mut found = Vec::new();

    if let Some(limit) = rules.per_weekend_limit {
        for weekend in weekends_in(stay) {
            let on_weekend: Vec<&Reservation> = held
                .iter()
                .copied()
                .filter(|r| weekends_in(r.stay).contains(&weekend))
                .collect();
            if on_weekend.len() as u32 >= limit
                && let Some(first) = on_weekend.first()
            {
                found.push(RuleViolation::QuotaExceeded {
                    breach: QuotaBreach::WeekendTaken {
                        weekend,
                        conflicting: first.id,
                    },
                });
            }
        }
    }

    if let Some(quota) = rules.monthly_quota {
        let (year, month) = month_key(stay.check_in);
        let in_month: Vec<&Reservation> = held
            .iter()
            .copied()
            .filter(|r| month_key(r.stay.check_in) == (year, month))
            .collect();

        let count = in_month.len() as u32;
        if count >= quota.max_reservations {
            found.push(RuleViolation::QuotaExceeded {
                breach: QuotaBreach::MonthlyLimit {
                    year,
                    month,
                    count,
                    max: quota.max_reservations,
                },
            });
        }

        let same_location: Vec<&Reservation> =
            in_month.iter().copied().filter(|r| r.location == location).collect();
        if same_location.len() as u32 >= quota.max_per_location
            && let Some(first) = same_location.first()
        {
            found.push(RuleViolation::QuotaExceeded {
                breach: QuotaBreach::LocationTaken {
                    location: location.to_string(),
                    conflicting: first.id,
                },
            });
        }
    }

    found
}

/// Slot-holding reservations that already occupy the room on any night of `stay`.
pub fn availability_violations(stay: Stay, occupying: &[Reservation]) -> Vec<RuleViolation> {
    occupying
        .iter()
        .filter(|r| r.holds_slot() && r.stay.overlaps(&stay))
        .map(|r| RuleViolation::AccommodationUnavailable { conflicting: r.id })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exemption {
    pub exempt: bool,
    pub payment_deadline: Option<Ms>,
}

pub fn compute_exemption(
    rules: &RuleSet,
    stay: Stay,
    calendar: &HolidayCalendar,
    created_at: Ms,
) -> Exemption {
    let touches_special = stay.night_dates().any(|date| calendar.is_special(date));
    if rules.payment_exempt_except_holidays && !touches_special {
        return Exemption { exempt: true, payment_deadline: None };
    }
    let payment_deadline = rules
        .takes_payment()
        .then(|| created_at.saturating_add(i64::from(rules.payment_window_hours) * HOUR_MS));
    Exemption { exempt: false, payment_deadline }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{date, midnight, reservation, stay};
    use crate::model::ReservationStatus;
    use crate::policy::{resolve, MemberType};

    fn regular(member: &str, s: Stay) -> Reservation {
        reservation(member, MemberType::Regular, "beach", s)
    }

    #[test]
    fn second_reservation_on_same_weekend_rejected() {
        let rules = resolve(MemberType::Regular);
        let holder = MemberId::from("m1");
        let first = regular("m1", stay("2024-07-05", "2024-07-07"));
        let err = check_quota(&rules, &holder, "lake", stay("2024-07-07", "2024-07-09"), &[first.clone()]);
        assert_eq!(
            err,
            Err(RuleViolation::QuotaExceeded {
                breach: QuotaBreach::WeekendTaken { weekend: date("2024-07-06"), conflicting: first.id },
            })
        );
    }

    #[test]
    fn cancelled_reservation_frees_weekend() {
        let rules = resolve(MemberType::Regular);
        let holder = MemberId::from("m1");
        let mut first = regular("m1", stay("2024-07-06", "2024-07-07"));
        first.status = ReservationStatus::Cancelled;
        assert_eq!(check_quota(&rules, &holder, "beach", stay("2024-07-06", "2024-07-08"), &[first]), Ok(()));
    }

    #[test]
    fn other_members_and_other_weekends_do_not_count() {
        let rules = resolve(MemberType::Regular);
        let holder = MemberId::from("m1");
        let existing = vec![
            regular("m2", stay("2024-07-06", "2024-07-07")),
            regular("m1", stay("2024-07-13", "2024-07-14")),
            regular("m1", stay("2024-07-08", "2024-07-11")), // weekday-only stay
        ];
        assert_eq!(check_quota(&rules, &holder, "beach", stay("2024-07-05", "2024-07-08"), &existing), Ok(()));
    }

    #[test]
    fn weekday_stays_ignore_weekend_limit() {
        let rules = resolve(MemberType::Regular);
        let holder = MemberId::from("m1");
        let existing = vec![regular("m1", stay("2024-07-06", "2024-07-08"))];
        assert_eq!(check_quota(&rules, &holder, "beach", stay("2024-07-08", "2024-07-10"), &existing), Ok(()));
    }

    fn director(location: &str, s: Stay) -> Reservation {
        reservation("d1", MemberType::Director, location, s)
    }

    #[test]
    fn director_fourth_reservation_in_month_rejected() {
        let rules = resolve(MemberType::Director);
        let holder = MemberId::from("d1");
        let existing = vec![
            director("beach", stay("2024-07-01", "2024-07-02")),
            director("lake", stay("2024-07-08", "2024-07-09")),
            director("mountain", stay("2024-07-15", "2024-07-16")),
        ];
        let found = violations(&rules, &holder, "river", stay("2024-07-22", "2024-07-23"), &existing);
        assert_eq!(
            found,
            vec![RuleViolation::QuotaExceeded {
                breach: QuotaBreach::MonthlyLimit { year: 2024, month: 7, count: 3, max: 3 },
            }]
        );
    }

    #[test]
    fn director_one_reservation_per_location_per_month() {
        let rules = resolve(MemberType::Director);
        let holder = MemberId::from("d1");
        let existing = vec![director("beach", stay("2024-07-01", "2024-07-02"))];

        assert_eq!(check_quota(&rules, &holder, "lake", stay("2024-07-10", "2024-07-11"), &existing), Ok(()));
        assert!(matches!(
            check_quota(&rules, &holder, "beach", stay("2024-07-20", "2024-07-21"), &existing),
            Err(RuleViolation::QuotaExceeded { breach: QuotaBreach::LocationTaken { .. } })
        ));
        // Same location next month is fine.
        assert_eq!(check_quota(&rules, &holder, "beach", stay("2024-08-01", "2024-08-02"), &existing), Ok(()));
    }

    #[test]
    fn overlapping_room_booking_conflicts() {
        let occupied = regular("m2", stay("2024-07-01", "2024-07-04"));
        assert_eq!(
            availability_violations(stay("2024-07-03", "2024-07-05"), std::slice::from_ref(&occupied)),
            vec![RuleViolation::AccommodationUnavailable { conflicting: occupied.id }]
        );
        assert!(availability_violations(stay("2024-07-04", "2024-07-05"), &[occupied]).is_empty());
    }

    #[test]
    fn regular_pays_within_72_hours() {
        let rules = resolve(MemberType::Regular);
        let created = midnight("2024-06-01");
        let ex = compute_exemption(&rules, stay("2024-07-01", "2024-07-03"), &HolidayCalendar::new(), created);
        assert_eq!(ex, Exemption { exempt: false, payment_deadline: Some(created + 72 * HOUR_MS) });

        let late = compute_exemption(&rules, stay("2024-07-01", "2024-07-03"), &HolidayCalendar::new(), Ms::MAX);
        assert_eq!(late.payment_deadline, Some(Ms::MAX));
    }

    #[test]
    fn director_exempt_except_on_holidays_and_vacations() {
        let rules = resolve(MemberType::Director);
        let created = midnight("2024-06-01");
        let mut cal = HolidayCalendar::with_holidays([date("2024-07-04")]);
        cal.add_vacation(date("2024-12-20"), date("2025-01-05"));

        let plain = compute_exemption(&rules, stay("2024-07-01", "2024-07-03"), &cal, created);
        assert_eq!(plain, Exemption { exempt: true, payment_deadline: None });

        let holiday = compute_exemption(&rules, stay("2024-07-03", "2024-07-05"), &cal, created);
        assert!(!holiday.exempt);
        assert_eq!(holiday.payment_deadline, Some(created + 72 * HOUR_MS));

        let vacation = compute_exemption(&rules, stay("2024-12-19", "2024-12-21"), &cal, created);
        assert!(!vacation.exempt);

        // Checkout on the holiday itself does not count: no night is spent on it.
        let checkout_on_holiday = compute_exemption(&rules, stay("2024-07-02", "2024-07-04"), &cal, created);
        assert!(checkout_on_holiday.exempt);
    }
}
