//! Membership rule table.
//!
//! Every member type maps to exactly one immutable [`RuleSet`]. The match in
//! [`resolve`] is exhaustive, so a new member type cannot compile without a
//! rule set of its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calendar::start_of;
use crate::model::{Ms, Stay, HOUR_MS};

/// Payment window shared by every type that pays on booking.
pub const STANDARD_PAYMENT_WINDOW_HOURS: u32 = 72;

/// Longest stay for members and visitors.
pub const STANDARD_MAX_NIGHTS: u32 = 7;

/// Longest stay for directors.
pub const DIRECTOR_MAX_NIGHTS: u32 = 3;

/// Days of notice a weekday-only member needs before a weekend night.
pub const WEEKEND_ADVANCE_DAYS: i64 = 3;

pub const DEFAULT_CHECK_IN_HOUR: u32 = 15;
pub const DEFAULT_CHECK_OUT_HOUR: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberType {
    Regular,
    Widow,
    SpecialVisitor,
    TransientVisitor,
    YouthVisitor,
    Director,
}

impl MemberType {
    pub const ALL: [MemberType; 6] = [
        MemberType::Regular,
        MemberType::Widow,
        MemberType::SpecialVisitor,
        MemberType::TransientVisitor,
        MemberType::YouthVisitor,
        MemberType::Director,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            MemberType::Regular => "regular",
            MemberType::Widow => "widow",
            MemberType::SpecialVisitor => "specialVisitor",
            MemberType::TransientVisitor => "transientVisitor",
            MemberType::YouthVisitor => "youthVisitor",
            MemberType::Director => "director",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMemberType(pub String);

impl fmt::Display for UnknownMemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown member type: {:?}", self.0)
    }
}

impl std::error::Error for UnknownMemberType {}

impl FromStr for MemberType {
    type Err = UnknownMemberType;

    /// Accepts the camelCase tags used by the member directory and their
    /// snake_case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "regular" => Ok(MemberType::Regular),
            "widow" => Ok(MemberType::Widow),
            "specialVisitor" | "special_visitor" => Ok(MemberType::SpecialVisitor),
            "transientVisitor" | "transient_visitor" => Ok(MemberType::TransientVisitor),
            "youthVisitor" | "youth_visitor" => Ok(MemberType::YouthVisitor),
            "director" => Ok(MemberType::Director),
            other => Err(UnknownMemberType(other.to_string())),
        }
    }
}

/// Which nights a member type may book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DayPolicy {
    AnyDay,
    /// Weekday nights always; weekend nights only with enough notice.
    WeekdayOnly { min_weekend_advance_days: i64 },
    /// No direct booking at all.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyQuota {
    pub max_reservations: u32,
    pub max_per_location: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub max_consecutive_nights: u32,
    pub allowed_day_policy: DayPolicy,
    /// Zero when the type never pays on booking.
    pub payment_window_hours: u32,
    pub monthly_quota: Option<MonthlyQuota>,
    pub per_weekend_limit: Option<u32>,
    pub payment_exempt_except_holidays: bool,
    pub requires_titular_member: bool,
    pub check_in_hour: u32,
    pub check_out_hour: u32,
}

impl RuleSet {
    const fn standard(allowed_day_policy: DayPolicy) -> Self {
        Self {
            max_consecutive_nights: STANDARD_MAX_NIGHTS,
            allowed_day_policy,
            payment_window_hours: STANDARD_PAYMENT_WINDOW_HOURS,
            monthly_quota: None,
            per_weekend_limit: Some(1),
            payment_exempt_except_holidays: false,
            requires_titular_member: false,
            check_in_hour: DEFAULT_CHECK_IN_HOUR,
            check_out_hour: DEFAULT_CHECK_OUT_HOUR,
        }
    }

    /// When the guest is due, at the check-in hour of the first night.
    pub fn expected_arrival(&self, stay: Stay) -> Ms {
        start_of(stay.check_in) + i64::from(self.check_in_hour) * HOUR_MS
    }

    pub fn expected_departure(&self, stay: Stay) -> Ms {
        start_of(stay.check_out) + i64::from(self.check_out_hour) * HOUR_MS
    }

    /// Whether the payment window applies at all.
    pub fn takes_payment(&self) -> bool {
        self.payment_window_hours > 0
    }
}

pub fn resolve(member_type: MemberType) -> RuleSet {
    match member_type {
        MemberType::Regular => RuleSet::standard(DayPolicy::AnyDay),
        MemberType::Widow | MemberType::SpecialVisitor | MemberType::TransientVisitor => {
            RuleSet::standard(DayPolicy::WeekdayOnly {
                min_weekend_advance_days: WEEKEND_ADVANCE_DAYS,
            })
        }
        MemberType::YouthVisitor => RuleSet {
            max_consecutive_nights: 0,
            allowed_day_policy: DayPolicy::None,
            payment_window_hours: 0,
            monthly_quota: None,
            per_weekend_limit: None,
            payment_exempt_except_holidays: false,
            requires_titular_member: true,
            check_in_hour: DEFAULT_CHECK_IN_HOUR,
            check_out_hour: DEFAULT_CHECK_OUT_HOUR,
        },
        MemberType::Director => RuleSet {
            max_consecutive_nights: DIRECTOR_MAX_NIGHTS,
            allowed_day_policy: DayPolicy::AnyDay,
            // Only charged when the stay touches a holiday or vacation period.
            payment_window_hours: STANDARD_PAYMENT_WINDOW_HOURS,
            monthly_quota: Some(MonthlyQuota {
                max_reservations: 3,
                max_per_location: 1,
            }),
            per_weekend_limit: None,
            payment_exempt_except_holidays: true,
            requires_titular_member: false,
            check_in_hour: DEFAULT_CHECK_IN_HOUR,
            check_out_hour: DEFAULT_CHECK_OUT_HOUR,
        },
    }
}

/// Parse a directory tag and resolve its rule set.
pub fn resolve_tag(tag: &str) -> Result<(MemberType, RuleSet), UnknownMemberType> {
    let member_type: MemberType = tag.parse()?;
    Ok((member_type, resolve(member_type)))
}
