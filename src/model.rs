use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::policy::MemberType;

/// Unix milliseconds, UTC.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;

/// Member identifier issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

/// Accommodation identifier issued by the inventory service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccommodationId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(MemberId);
string_id!(AccommodationId);

/// Half-open range of nights `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    /// `None` unless `check_in < check_out`.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Option<Self> {
        (check_in < check_out).then_some(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Every night of the stay, by the date the night starts on.
    pub fn night_dates(self) -> impl Iterator<Item = NaiveDate> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::CheckedOut | ReservationStatus::Cancelled)
    }

    /// `CONFIRMED → CHECKED_IN → CHECKED_OUT`, or `CONFIRMED | CHECKED_IN → CANCELLED`.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Confirmed, CheckedIn) | (CheckedIn, CheckedOut) | (Confirmed, Cancelled) | (CheckedIn, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::CheckedIn => "CHECKED_IN",
            ReservationStatus::CheckedOut => "CHECKED_OUT",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInDetails {
    pub checked_in_by: String,
    pub actual_arrival_time: Option<Ms>,
    pub guests_present: u32,
    pub documents_verified: bool,
    pub key_provided: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutDetails {
    pub checked_out_by: String,
    pub actual_departure_time: Ms,
    pub room_condition: RoomCondition,
    pub damages_reported: bool,
    pub damage_description: Option<String>,
    pub cleaning_required: bool,
    pub key_returned: bool,
    /// Minor currency units.
    pub additional_charges: Option<i64>,
    pub guest_comments: Option<String>,
    pub host_comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Requested(String),
    PaymentWindowExpired,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested(reason) => write!(f, "requested: {reason}"),
            CancelReason::PaymentWindowExpired => f.write_str("payment window expired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancelReason,
    pub cancelled_at: Ms,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub reservation_code: String,
    pub member_id: MemberId,
    pub member_type: MemberType,
    /// Booker acting for a youth visitor; quotas are charged to this member.
    pub titular_member_id: Option<MemberId>,
    pub accommodation_id: AccommodationId,
    pub location: String,
    pub stay: Stay,
    pub number_of_guests: u32,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub payment_deadline: Option<Ms>,
    pub payment_exempt: bool,
    pub paid_at: Option<Ms>,
    pub deadline_reminder_sent: bool,
    pub check_in_details: Option<CheckInDetails>,
    pub check_out_details: Option<CheckOutDetails>,
    pub cancellation: Option<Cancellation>,
}

impl Reservation {
    /// The member whose quotas this reservation consumes.
    pub fn quota_holder(&self) -> &MemberId {
        self.titular_member_id.as_ref().unwrap_or(&self.member_id)
    }

    /// Cancelled reservations no longer hold a quota slot or the room.
    pub fn holds_slot(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }

    pub fn awaiting_payment(&self) -> bool {
        self.status == ReservationStatus::Confirmed
            && !self.payment_exempt
            && self.paid_at.is_none()
            && self.payment_deadline.is_some()
    }

    /// Confirmed, unpaid and past its deadline.
    pub fn payment_lapsed(&self, now: Ms) -> bool {
        self.awaiting_payment() && self.payment_deadline.is_some_and(|d| now > d)
    }
}

/// The event types. This is the WAL record format and what subscribers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// New reservation. Compaction also writes one of these per record as a snapshot.
    Confirmed {
        reservation: Reservation,
    },
    CheckedIn {
        id: Ulid,
        member_id: MemberId,
        details: CheckInDetails,
    },
    CheckedOut {
        id: Ulid,
        member_id: MemberId,
        details: CheckOutDetails,
    },
    Cancelled {
        id: Ulid,
        member_id: MemberId,
        cancellation: Cancellation,
    },
    PaymentRecorded {
        id: Ulid,
        member_id: MemberId,
        paid_at: Ms,
    },
    PaymentDeadlineApproaching {
        id: Ulid,
        member_id: MemberId,
        deadline: Ms,
    },
}

impl Event {
    pub fn reservation_id(&self) -> Ulid {
        match self {
            Event::Confirmed { reservation } => reservation.id,
            Event::CheckedIn { id, .. }
            | Event::CheckedOut { id, .. }
            | Event::Cancelled { id, .. }
            | Event::PaymentRecorded { id, .. }
            | Event::PaymentDeadlineApproaching { id, .. } => *id,
        }
    }

    pub fn member_id(&self) -> &MemberId {
        match self {
            Event::Confirmed { reservation } => &reservation.member_id,
            Event::CheckedIn { member_id, .. }
            | Event::CheckedOut { member_id, .. }
            | Event::Cancelled { member_id, .. }
            | Event::PaymentRecorded { member_id, .. }
            | Event::PaymentDeadlineApproaching { member_id, .. } => member_id,
        }
    }
}

/// Apply an event to the record it targets. `Confirmed` replaces the record wholesale.
pub fn apply_to_reservation(r: &mut Reservation, event: &Event) {
    match event {
        Event::Confirmed { reservation } => *r = reservation.clone(),
        Event::CheckedIn { details, .. } => {
            r.status = ReservationStatus::CheckedIn;
            r.check_in_details = Some(details.clone());
        }
        Event::CheckedOut { details, .. } => {
            r.status = ReservationStatus::CheckedOut;
            r.check_out_details = Some(details.clone());
        }
        Event::Cancelled { cancellation, .. } => {
            r.status = ReservationStatus::Cancelled;
            r.cancellation = Some(cancellation.clone());
        }
        Event::PaymentRecorded { paid_at, .. } => r.paid_at = Some(*paid_at),
        Event::PaymentDeadlineApproaching { .. } => r.deadline_reminder_sent = true,
    }
}
