use tracing::debug;
use ulid::Ulid;

use crate::admission::{self, BookingRequest, Decision, Facts, ReportMode, RuleViolation};
use crate::model::*;
use crate::observability::ADMISSIONS_TOTAL;
use crate::policy::MemberType;

use super::validate::{validate_request, validate_timestamp};
use super::{Engine, EngineError};

impl Engine {
    /// Admission check with first-failure reporting. Has no side effects
    /// beyond metrics.
    pub async fn evaluate_reservation_request(&self, request: &BookingRequest, now: Ms) -> Decision {
        self.evaluate_with_mode(request, now, ReportMode::FirstFailure).await
    }

    pub async fn evaluate_with_mode(
        &self,
        request: &BookingRequest,
        now: Ms,
        mode: ReportMode,
    ) -> Decision {
        let decision = self.gather_and_evaluate(request, now, mode).await;
        let outcome = match decision.reasons.first() {
            None => "allowed",
            Some(reason) => reason.code(),
        };
        metrics::counter!(ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        debug!(
            "evaluated {} on {} {}..{}: {outcome}",
            request.member_id, request.accommodation_id, request.check_in, request.check_out
        );
        decision
    }

    /// Collect directory, inventory and reservation facts, then run the pure evaluator.
    /// Out-of-bounds requests are refused before any fact is gathered.
    pub(super) async fn gather_and_evaluate(
        &self,
        request: &BookingRequest,
        now: Ms,
        mode: ReportMode,
    ) -> Decision {
        if let Err(e) = validate_request(request).and_then(|()| validate_timestamp(now)) {
            let limit = match e {
                EngineError::LimitExceeded(what) => what.to_string(),
                other => other.to_string(),
            };
            return Decision::refused(request, now, RuleViolation::LimitExceeded { limit });
        }

        let member_tag = self.directory.member_type_tag(&request.member_id);
        let (titular_tag, titular_confirmed) = match &request.titular_member_id {
            Some(titular) => (
                self.directory.member_type_tag(titular),
                self.directory.is_titular_of(titular, &request.member_id),
            ),
            None => (None, false),
        };
        let accommodation = self.inventory.accommodation(&request.accommodation_id);

        let member_type = member_tag.as_deref().and_then(|t| t.parse::<MemberType>().ok());
        let holder = admission::quota_holder(request, member_type);
        let holder_reservations = self.store.for_member(holder).await;
        let occupying = match Stay::new(request.check_in, request.check_out) {
            Some(stay) => self.store.overlapping(&request.accommodation_id, &stay).await,
            None => Vec::new(),
        };

        let facts = Facts {
            member_type_tag: member_tag.as_deref(),
            titular_type_tag: titular_tag.as_deref(),
            titular_confirmed,
            accommodation: accommodation.as_ref(),
            holder_reservations: &holder_reservations,
            occupying: &occupying,
            calendar: &self.calendar,
            now,
        };
        admission::evaluate(request, &facts, mode)
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store.get(id).await.ok_or(EngineError::ReservationNotFound(id))
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Reservation, EngineError> {
        self.store
            .get_by_code(code.trim())
            .await
            .ok_or_else(|| EngineError::CodeNotFound(code.to_string()))
    }

    /// Reservations booked by `member` or charged to them as titular, by check-in date.
    pub async fn reservations_for_member(&self, member: &MemberId) -> Vec<Reservation> {
        let mut out = self.store.for_member(member).await;
        out.sort_by_key(|r| (r.stay.check_in, r.id));
        out
    }

    pub async fn reservation_count(&self) -> usize {
        self.store.count().await
    }
}
