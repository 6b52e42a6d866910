//! Admission decisions.
//!
//! [`evaluate`] composes the rule resolver, the date-window checks and the
//! quota/exemption checks into a single [`Decision`]. It is pure: every fact it
//! needs is handed in through [`Facts`], and rejections come back as
//! [`RuleViolation`] values rather than errors.

pub mod quota;
pub mod window;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar::HolidayCalendar;
use crate::directory::AccommodationInfo;
use crate::limits::MAX_GUESTS;
use crate::model::{AccommodationId, MemberId, Ms, Reservation, Stay};
use crate::policy::{self, MemberType, RuleSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub member_id: MemberId,
    pub accommodation_id: AccommodationId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub titular_member_id: Option<MemberId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TitularProblem {
    /// The member type needs a titular and none was given.
    Missing,
    /// The titular given is the booking member.
    SelfBooking,
    /// The directory does not list the titular for this member.
    NotTitular,
    /// The titular's own type cannot book.
    TitularCannotBook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QuotaBreach {
    WeekendTaken { weekend: NaiveDate, conflicting: Ulid },
    MonthlyLimit { year: i32, month: u32, count: u32, max: u32 },
    LocationTaken { location: String, conflicting: Ulid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum RuleViolation {
    InvalidDateRange { check_in: NaiveDate, check_out: NaiveDate },
    ExceedsMaxDuration { nights: i64, max: u32 },
    AdvanceNoticeViolation { date: NaiveDate, days_ahead: i64, required: i64 },
    UnauthorizedBookingAttempt { problem: TitularProblem },
    QuotaExceeded { breach: QuotaBreach },
    UnknownMemberType { tag: String },
    UnknownMember { member_id: MemberId },
    UnknownAccommodation { accommodation_id: AccommodationId },
    GuestCountInvalid { requested: u32, capacity: u32 },
    AccommodationUnavailable { conflicting: Ulid },
    /// Ids, dates or the evaluation instant fall outside the accepted bounds.
    LimitExceeded { limit: String },
}

impl RuleViolation {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RuleViolation::InvalidDateRange { .. } => "InvalidDateRange",
            RuleViolation::ExceedsMaxDuration { .. } => "ExceedsMaxDuration",
            RuleViolation::AdvanceNoticeViolation { .. } => "AdvanceNoticeViolation",
            RuleViolation::UnauthorizedBookingAttempt { .. } => "UnauthorizedBookingAttempt",
            RuleViolation::QuotaExceeded { .. } => "QuotaExceeded",
            RuleViolation::UnknownMemberType { .. } => "UnknownMemberType",
            RuleViolation::UnknownMember { .. } => "UnknownMember",
            RuleViolation::UnknownAccommodation { .. } => "UnknownAccommodation",
            RuleViolation::GuestCountInvalid { .. } => "GuestCountInvalid",
            RuleViolation::AccommodationUnavailable { .. } => "AccommodationUnavailable",
            RuleViolation::LimitExceeded { .. } => "LimitExceeded",
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::InvalidDateRange { check_in, check_out } => {
                write!(f, "check-out {check_out} must be after check-in {check_in}")
            }
            RuleViolation::ExceedsMaxDuration { nights, max } => {
                write!(f, "{nights} nights exceeds the maximum of {max}")
            }
            RuleViolation::AdvanceNoticeViolation { date, days_ahead, required } => write!(
                f,
                "weekend night {date} is {days_ahead} days away; {required} days notice required"
            ),
            RuleViolation::UnauthorizedBookingAttempt { problem } => match problem {
                TitularProblem::Missing => f.write_str("this member must be booked by a titular member"),
                TitularProblem::SelfBooking => f.write_str("titular member must differ from the guest"),
                TitularProblem::NotTitular => f.write_str("titular member is not registered for this guest"),
                TitularProblem::TitularCannotBook => f.write_str("titular member cannot book"),
            },
            RuleViolation::QuotaExceeded { breach } => match breach {
                QuotaBreach::WeekendTaken { weekend, conflicting } => {
                    write!(f, "weekend of {weekend} already booked by reservation {conflicting}")
                }
                QuotaBreach::MonthlyLimit { year, month, count, max } => {
                    write!(f, "{count} of {max} reservations already used in {year}-{month:02}")
                }
                QuotaBreach::LocationTaken { location, conflicting } => {
                    write!(f, "{location} already booked this month by reservation {conflicting}")
                }
            },
            RuleViolation::UnknownMemberType { tag } => write!(f, "unknown member type: {tag:?}"),
            RuleViolation::UnknownMember { member_id } => write!(f, "unknown member: {member_id}"),
            RuleViolation::UnknownAccommodation { accommodation_id } => {
                write!(f, "unknown accommodation: {accommodation_id}")
            }
            RuleViolation::GuestCountInvalid { requested, capacity } => {
                write!(f, "{requested} guests requested; accommodation holds 1 to {capacity}")
            }
            RuleViolation::AccommodationUnavailable { conflicting } => {
                write!(f, "accommodation already reserved ({conflicting})")
            }
            RuleViolation::LimitExceeded { limit } => write!(f, "request out of bounds: {limit}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Stop at the first rejection.
    #[default]
    FirstFailure,
    /// Collect every applicable rejection.
    FullReport,
}

/// Everything [`evaluate`] knows about the world.
#[derive(Debug, Clone, Copy)]
pub struct Facts<'a> {
    pub member_type_tag: Option<&'a str>,
    pub titular_type_tag: Option<&'a str>,
    /// The directory lists the request's titular as the member's titular.
    pub titular_confirmed: bool,
    pub accommodation: Option<&'a AccommodationInfo>,
    /// Reservations charged to the quota holder.
    pub holder_reservations: &'a [Reservation],
    /// Reservations on the requested accommodation overlapping the stay.
    pub occupying: &'a [Reservation],
    pub calendar: &'a HolidayCalendar,
    pub now: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reasons: Vec<RuleViolation>,
    pub member_type: Option<MemberType>,
    /// Rule set the request was judged by; the titular's for dependents.
    pub rule_set: Option<RuleSet>,
    pub quota_holder: MemberId,
    /// Set only when the booking goes through a titular member.
    pub titular_member_id: Option<MemberId>,
    pub location: Option<String>,
    pub payment_deadline: Option<Ms>,
    pub payment_exempt: bool,
    pub evaluated_at: Ms,
}

impl Decision {
    fn rejected(request: &BookingRequest, now: Ms) -> Self {
        Self {
            allowed: false,
            reasons: Vec::new(),
            member_type: None,
            rule_set: None,
            quota_holder: request.member_id.clone(),
            titular_member_id: None,
            location: None,
            payment_deadline: None,
            payment_exempt: false,
            evaluated_at: now,
        }
    }

    /// Rejected before any rule ran.
    pub fn refused(request: &BookingRequest, now: Ms, reason: RuleViolation) -> Self {
        let mut decision = Self::rejected(request, now);
        decision.reasons.push(reason);
        decision
    }

    /// In first-failure mode, trims to the first reason and reports whether to stop.
    fn stage_failed(&mut self, mode: ReportMode) -> bool {
        if mode == ReportMode::FirstFailure && !self.reasons.is_empty() {
            self.reasons.truncate(1);
            return true;
        }
        false
    }
}

/// Member whose quotas a request is charged against.
pub fn quota_holder(request: &BookingRequest, member_type: Option<MemberType>) -> &MemberId {
    let needs_titular = member_type.is_some_and(|t| policy::resolve(t).requires_titular_member);
    match (&request.titular_member_id, needs_titular) {
        (Some(titular), true) => titular,
        _ => &request.member_id,
    }
}

struct Resolved {
    member_type: MemberType,
    rules: RuleSet,
    titular: Option<MemberId>,
}

fn resolve_rules(request: &BookingRequest, facts: &Facts<'_>) -> Result<Resolved, RuleViolation> {
    let tag = facts.member_type_tag.ok_or_else(|| RuleViolation::UnknownMember {
        member_id: request.member_id.clone(),
    })?;
    let (member_type, rules) =
        policy::resolve_tag(tag).map_err(|e| RuleViolation::UnknownMemberType { tag: e.0 })?;
    if !rules.requires_titular_member {
        return Ok(Resolved { member_type, rules, titular: None });
    }

    let unauthorized = |problem| RuleViolation::UnauthorizedBookingAttempt { problem };
    let titular = request
        .titular_member_id
        .as_ref()
        .ok_or(unauthorized(TitularProblem::Missing))?;
    if titular == &request.member_id {
        return Err(unauthorized(TitularProblem::SelfBooking));
    }
    if !facts.titular_confirmed {
        return Err(unauthorized(TitularProblem::NotTitular));
    }
    let titular_tag = facts.titular_type_tag.ok_or_else(|| RuleViolation::UnknownMember {
        member_id: titular.clone(),
    })?;
    let (_, titular_rules) =
        policy::resolve_tag(titular_tag).map_err(|e| RuleViolation::UnknownMemberType { tag: e.0 })?;
    if titular_rules.requires_titular_member {
        return Err(unauthorized(TitularProblem::TitularCannotBook));
    }
    Ok(Resolved {
        member_type,
        rules: titular_rules,
        titular: Some(titular.clone()),
    })
}

/// Resolver → accommodation → date window → quotas, then exemption.
pub fn evaluate(request: &BookingRequest, facts: &Facts<'_>, mode: ReportMode) -> Decision {
    let mut decision = Decision::rejected(request, facts.now);

    let resolved = match resolve_rules(request, facts) {
        Ok(r) => r,
        Err(v) => {
            decision.reasons.push(v);
            return decision;
        }
    };
    decision.member_type = Some(resolved.member_type);
    decision.rule_set = Some(resolved.rules);
    if let Some(titular) = &resolved.titular {
        decision.quota_holder = titular.clone();
    }
    decision.titular_member_id = resolved.titular;
    let rules = resolved.rules;

    match facts.accommodation {
        Some(info) => {
            decision.location = Some(info.location.clone());
            let ceiling = info.capacity.min(MAX_GUESTS);
            if request.guests == 0 || request.guests > ceiling {
                decision.reasons.push(RuleViolation::GuestCountInvalid {
                    requested: request.guests,
                    capacity: ceiling,
                });
            }
        }
        None => decision.reasons.push(RuleViolation::UnknownAccommodation {
            accommodation_id: request.accommodation_id.clone(),
        }),
    }
    if decision.stage_failed(mode) {
        return decision;
    }

    decision.reasons.extend(window::violations(
        &rules,
        request.check_in,
        request.check_out,
        facts.now,
        facts.calendar,
    ));
    if decision.stage_failed(mode) {
        return decision;
    }
    let Some(stay) = Stay::new(request.check_in, request.check_out) else {
        return decision;
    };

    if let Some(location) = decision.location.clone() {
        decision.reasons.extend(quota::violations(
            &rules,
            &decision.quota_holder,
            &location,
            stay,
            facts.holder_reservations,
        ));
        decision
            .reasons
            .extend(quota::availability_violations(stay, facts.occupying));
        if decision.stage_failed(mode) {
            return decision;
        }
    }

    let exemption = quota::compute_exemption(&rules, stay, facts.calendar, facts.now);
    decision.payment_exempt = exemption.exempt;
    decision.payment_deadline = exemption.payment_deadline;
    decision.allowed = decision.reasons.is_empty();
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{date, midnight, reservation, stay};
    use crate::model::HOUR_MS;

    fn cabin() -> AccommodationInfo {
        AccommodationInfo {
            id: AccommodationId::from("cabin-1"),
            location: "lakeside".into(),
            capacity: 4,
        }
    }

    fn request(member: &str, check_in: &str, check_out: &str) -> BookingRequest {
        BookingRequest {
            member_id: MemberId::from(member),
            accommodation_id: AccommodationId::from("cabin-1"),
            check_in: date(check_in),
            check_out: date(check_out),
            guests: 2,
            titular_member_id: None,
        }
    }

    fn facts<'a>(tag: &'a str, info: &'a AccommodationInfo, cal: &'a HolidayCalendar, now: Ms) -> Facts<'a> {
        Facts {
            member_type_tag: Some(tag),
            titular_type_tag: None,
            titular_confirmed: false,
            accommodation: Some(info),
            holder_reservations: &[],
            occupying: &[],
            calendar: cal,
            now,
        }
    }

    #[test]
    fn regular_request_allowed_with_deadline() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let now = midnight("2024-06-01");
        let d = evaluate(&request("m1", "2024-07-01", "2024-07-05"), &facts("regular", &info, &cal, now), ReportMode::FirstFailure);
        assert!(d.allowed, "{:?}", d.reasons);
        assert_eq!(d.member_type, Some(MemberType::Regular));
        assert_eq!(d.location.as_deref(), Some("lakeside"));
        assert!(!d.payment_exempt);
        assert_eq!(d.payment_deadline, Some(now + 72 * HOUR_MS));
    }

    #[test]
    fn unknown_member_and_type_stop_evaluation() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let mut f = facts("honorary", &info, &cal, 0);
        let d = evaluate(&request("m1", "2024-07-01", "2024-07-05"), &f, ReportMode::FullReport);
        assert_eq!(d.reasons, vec![RuleViolation::UnknownMemberType { tag: "honorary".into() }]);
        assert!(!d.allowed);

        f.member_type_tag = None;
        let d = evaluate(&request("m1", "2024-07-01", "2024-07-05"), &f, ReportMode::FullReport);
        assert_eq!(d.reasons[0].code(), "UnknownMember");
    }

    #[test]
    fn youth_visitor_without_titular_unauthorized() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let d = evaluate(
            &request("kid", "2024-07-01", "2024-07-03"),
            &facts("youthVisitor", &info, &cal, midnight("2024-06-01")),
            ReportMode::FirstFailure,
        );
        assert_eq!(
            d.reasons,
            vec![RuleViolation::UnauthorizedBookingAttempt { problem: TitularProblem::Missing }]
        );
    }

    #[test]
    fn youth_visitor_with_titular_uses_titular_rules() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let mut req = request("kid", "2024-07-01", "2024-07-03");
        req.titular_member_id = Some(MemberId::from("parent"));
        let mut f = facts("youthVisitor", &info, &cal, midnight("2024-06-01"));
        f.titular_type_tag = Some("regular");
        f.titular_confirmed = true;

        let d = evaluate(&req, &f, ReportMode::FirstFailure);
        assert!(d.allowed, "{:?}", d.reasons);
        assert_eq!(d.member_type, Some(MemberType::YouthVisitor));
        assert_eq!(d.rule_set, Some(policy::resolve(MemberType::Regular)));
        assert_eq!(d.quota_holder, MemberId::from("parent"));
        assert_eq!(d.titular_member_id, Some(MemberId::from("parent")));
    }

    #[test]
    fn youth_visitor_titular_checks() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let mut f = facts("youthVisitor", &info, &cal, midnight("2024-06-01"));
        f.titular_type_tag = Some("regular");

        let mut req = request("kid", "2024-07-01", "2024-07-03");
        req.titular_member_id = Some(MemberId::from("kid"));
        f.titular_confirmed = true;
        assert_eq!(
            evaluate(&req, &f, ReportMode::FirstFailure).reasons,
            vec![RuleViolation::UnauthorizedBookingAttempt { problem: TitularProblem::SelfBooking }]
        );

        req.titular_member_id = Some(MemberId::from("stranger"));
        f.titular_confirmed = false;
        assert_eq!(
            evaluate(&req, &f, ReportMode::FirstFailure).reasons,
            vec![RuleViolation::UnauthorizedBookingAttempt { problem: TitularProblem::NotTitular }]
        );

        f.titular_confirmed = true;
        f.titular_type_tag = Some("youthVisitor");
        assert_eq!(
            evaluate(&req, &f, ReportMode::FirstFailure).reasons,
            vec![RuleViolation::UnauthorizedBookingAttempt { problem: TitularProblem::TitularCannotBook }]
        );
    }

    #[test]
    fn titular_ignored_for_members_who_book_themselves() {
        let mut req = request("m1", "2024-07-01", "2024-07-03");
        req.titular_member_id = Some(MemberId::from("someone"));
        assert_eq!(quota_holder(&req, Some(MemberType::Regular)), &MemberId::from("m1"));
        assert_eq!(quota_holder(&req, Some(MemberType::YouthVisitor)), &MemberId::from("someone"));
        assert_eq!(quota_holder(&req, None), &MemberId::from("m1"));
    }

    #[test]
    fn first_failure_reports_one_reason_full_report_all() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        // Widow, 9 nights across a weekend booked the day before, 6 guests in a 4-bed cabin.
        let mut req = request("w1", "2024-07-05", "2024-07-14");
        req.guests = 6;
        let f = facts("widow", &info, &cal, midnight("2024-07-04"));

        let first = evaluate(&req, &f, ReportMode::FirstFailure);
        assert_eq!(first.reasons.len(), 1);
        assert_eq!(first.reasons[0].code(), "GuestCountInvalid");

        let full = evaluate(&req, &f, ReportMode::FullReport);
        let codes: Vec<_> = full.reasons.iter().map(|r| r.code()).collect();
        assert!(codes.contains(&"GuestCountInvalid"));
        assert!(codes.contains(&"ExceedsMaxDuration"));
        assert!(codes.contains(&"AdvanceNoticeViolation"));
        assert!(!full.allowed);
    }

    #[test]
    fn quota_and_room_conflicts_reported() {
        let info = cabin();
        let cal = HolidayCalendar::new();
        let mine = reservation("m1", MemberType::Regular, "beach", stay("2024-07-06", "2024-07-07"));
        let theirs = reservation("m2", MemberType::Regular, "lakeside", stay("2024-07-06", "2024-07-08"));
        let held = [mine];
        let occupying = [theirs];
        let mut f = facts("regular", &info, &cal, midnight("2024-06-01"));
        f.holder_reservations = &held;
        f.occupying = &occupying;

        let d = evaluate(&request("m1", "2024-07-06", "2024-07-08"), &f, ReportMode::FullReport);
        let codes: Vec<_> = d.reasons.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["QuotaExceeded", "AccommodationUnavailable"]);
    }

    #[test]
    fn unknown_accommodation_skips_quota() {
        let cal = HolidayCalendar::new();
        let f = Facts {
            member_type_tag: Some("regular"),
            titular_type_tag: None,
            titular_confirmed: false,
            accommodation: None,
            holder_reservations: &[],
            occupying: &[],
            calendar: &cal,
            now: midnight("2024-06-01"),
        };
        let d = evaluate(&request("m1", "2024-07-01", "2024-07-03"), &f, ReportMode::FullReport);
        assert_eq!(d.reasons.len(), 1);
        assert_eq!(d.reasons[0].code(), "UnknownAccommodation");
        assert!(d.location.is_none());
    }

    #[test]
    fn violations_serialize_with_code_tag() {
        let v = RuleViolation::ExceedsMaxDuration { nights: 8, max: 7 };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["code"], "ExceedsMaxDuration");
        assert_eq!(json["nights"], 8);
        assert!(v.to_string().contains("8 nights"));
    }
}
