use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::admission::{self, BookingRequest, Decision, ReportMode};
use crate::limits::*;
use crate::model::*;
use crate::observability::EXPIRED_TOTAL;
use crate::policy;

use super::validate::{validate_optional_text, validate_request, validate_text, validate_timestamp};
use super::{Engine, EngineError};

/// `CS-` followed by the last eight characters of a fresh ULID.
pub(crate) fn reservation_code(seed: Ulid) -> String {
    let s = seed.to_string();
    format!("CS-{}", &s[s.len() - 8..])
}

fn require_transition(record: &Reservation, to: ReservationStatus) -> Result<(), EngineError> {
    if !record.status.can_transition_to(to) {
        return Err(EngineError::InvalidStateTransition {
            id: record.id,
            from: record.status,
            to,
        });
    }
    Ok(())
}

fn reminder_due(r: &Reservation, now: Ms, lead: Ms) -> bool {
    r.awaiting_payment()
        && !r.deadline_reminder_sent
        && r.payment_deadline.is_some_and(|d| now <= d && d.saturating_sub(now) <= lead)
}

impl Engine {
    /// Commit an admitted request. Quotas and room availability are checked
    /// again under the holder and accommodation locks, so a stale `decision`
    /// cannot overbook.
    pub async fn confirm_reservation(
        &self,
        decision: &Decision,
        request: &BookingRequest,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        if !decision.allowed {
            return Err(EngineError::Rejected(decision.reasons.clone()));
        }
        validate_request(request)?;
        validate_timestamp(now)?;
        if self.store.count().await >= MAX_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }

        let holder = admission::quota_holder(request, decision.member_type).clone();
        let _holder_guard = self.holder_locks.lock(&holder).await;
        let _room_guard = self.accommodation_locks.lock(&request.accommodation_id).await;

        let fresh = self.gather_and_evaluate(request, now, ReportMode::FullReport).await;
        if !fresh.allowed || fresh.quota_holder != holder {
            debug!("confirm for {} rejected on re-check: {:?}", request.member_id, fresh.reasons);
            return Err(EngineError::Rejected(fresh.reasons));
        }
        let (Some(member_type), Some(location), Some(stay)) = (
            fresh.member_type,
            fresh.location,
            Stay::new(request.check_in, request.check_out),
        ) else {
            return Err(EngineError::Rejected(fresh.reasons));
        };

        let reservation = Reservation {
            id: Ulid::new(),
            reservation_code: self.allocate_code().await?,
            member_id: request.member_id.clone(),
            member_type,
            titular_member_id: fresh.titular_member_id,
            accommodation_id: request.accommodation_id.clone(),
            location,
            stay,
            number_of_guests: request.guests,
            status: ReservationStatus::Confirmed,
            created_at: now,
            payment_deadline: fresh.payment_deadline,
            payment_exempt: fresh.payment_exempt,
            paid_at: None,
            deadline_reminder_sent: false,
            check_in_details: None,
            check_out_details: None,
            cancellation: None,
        };
        let event = Event::Confirmed { reservation: reservation.clone() };
        let record = self.persist_and_apply(reservation, &event).await?;
        info!(
            "confirmed {} ({}) for {} at {} {}..{}",
            record.reservation_code,
            record.id,
            record.member_id,
            record.accommodation_id,
            record.stay.check_in,
            record.stay.check_out
        );
        Ok(record)
    }

    async fn allocate_code(&self) -> Result<String, EngineError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = reservation_code(Ulid::new());
            if self.store.get_by_code(&code).await.is_none() {
                return Ok(code);
            }
        }
        Err(EngineError::LimitExceeded("could not allocate a unique reservation code"))
    }

    /// Move a confirmed reservation to checked-in.
    ///
    /// Errors: `InvalidStateTransition` unless the reservation is confirmed;
    /// `InvalidDetails` when the arrival time is missing or the guests present
    /// fall outside 1 to the number booked; `LimitExceeded` for oversized text
    /// or an out-of-range arrival time.
    pub async fn perform_check_in(
        &self,
        id: Ulid,
        details: CheckInDetails,
    ) -> Result<Reservation, EngineError> {
        validate_text(&details.checked_in_by, MAX_ACTOR_LEN, "checked_in_by too long")?;
        validate_optional_text(details.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;

        let (_guard, record) = self.lock_reservation(id).await?;
        require_transition(&record, ReservationStatus::CheckedIn)?;
        let Some(arrival) = details.actual_arrival_time else {
            return Err(EngineError::InvalidDetails("actual arrival time is required"));
        };
        validate_timestamp(arrival)?;
        if details.guests_present == 0 || details.guests_present > record.number_of_guests {
            return Err(EngineError::InvalidDetails(
                "guests present must be between 1 and the number booked",
            ));
        }

        if arrival < policy::resolve(record.member_type).expected_arrival(record.stay) {
            info!("early arrival for {} ({id})", record.reservation_code);
        }

        let event = Event::CheckedIn {
            id,
            member_id: record.member_id.clone(),
            details,
        };
        let record = self.persist_and_apply(record, &event).await?;
        info!("checked in {} ({id})", record.reservation_code);
        Ok(record)
    }

    pub async fn perform_check_out(
        &self,
        id: Ulid,
        details: CheckOutDetails,
    ) -> Result<Reservation, EngineError> {
        validate_text(&details.checked_out_by, MAX_ACTOR_LEN, "checked_out_by too long")?;
        for text in [&details.damage_description, &details.guest_comments, &details.host_comments] {
            validate_optional_text(text.as_deref(), MAX_NOTES_LEN, "comment too long")?;
        }
        validate_timestamp(details.actual_departure_time)?;

        let (_guard, record) = self.lock_reservation(id).await?;
        require_transition(&record, ReservationStatus::CheckedOut)?;
        if !details.key_returned {
            return Err(EngineError::KeyNotReturned(id));
        }
        let described = details
            .damage_description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if details.damages_reported && !described {
            return Err(EngineError::InvalidDetails("damages reported without a description"));
        }

        let departure = details.actual_departure_time;
        if departure > policy::resolve(record.member_type).expected_departure(record.stay) {
            info!("late departure for {} ({id})", record.reservation_code);
        }

        let event = Event::CheckedOut {
            id,
            member_id: record.member_id.clone(),
            details,
        };
        let record = self.persist_and_apply(record, &event).await?;
        info!("checked out {} ({id})", record.reservation_code);
        Ok(record)
    }

    pub async fn cancel_reservation(
        &self,
        id: Ulid,
        reason: &str,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        self.cancel_reservation_as(id, reason, None, now).await
    }

    /// Cancel on behalf of `actor` (staff or the member), recorded on the reservation.
    pub async fn cancel_reservation_as(
        &self,
        id: Ulid,
        reason: &str,
        actor: Option<&str>,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        validate_text(reason, MAX_REASON_LEN, "cancellation reason too long")?;
        validate_optional_text(actor, MAX_ACTOR_LEN, "cancelled_by too long")?;
        validate_timestamp(now)?;

        let (_guard, record) = self.lock_reservation(id).await?;
        let cancellation = Cancellation {
            reason: CancelReason::Requested(reason.to_string()),
            cancelled_at: now,
            cancelled_by: actor.map(str::to_string),
        };
        let record = self.cancel_locked(record, cancellation).await?;
        info!("cancelled {} ({id}): {reason}", record.reservation_code);
        Ok(record)
    }

    async fn cancel_locked(
        &self,
        record: Reservation,
        cancellation: Cancellation,
    ) -> Result<Reservation, EngineError> {
        require_transition(&record, ReservationStatus::Cancelled)?;
        let event = Event::Cancelled {
            id: record.id,
            member_id: record.member_id.clone(),
            cancellation,
        };
        self.persist_and_apply(record, &event).await
    }

    /// Mark a reservation paid. Paying twice returns the record unchanged.
    pub async fn record_payment(&self, id: Ulid, paid_at: Ms) -> Result<Reservation, EngineError> {
        validate_timestamp(paid_at)?;
        let (_guard, record) = self.lock_reservation(id).await?;
        if record.payment_exempt || record.payment_deadline.is_none() || record.status.is_terminal() {
            return Err(EngineError::NotPayable(id));
        }
        if record.paid_at.is_some() {
            return Ok(record);
        }
        let event = Event::PaymentRecorded {
            id,
            member_id: record.member_id.clone(),
            paid_at,
        };
        let record = self.persist_and_apply(record, &event).await?;
        info!("payment recorded for {} ({id})", record.reservation_code);
        Ok(record)
    }

    /// Emit `PaymentDeadlineApproaching` once for every unpaid reservation whose
    /// deadline falls within `lead` of `now`.
    pub async fn remind_approaching_deadlines(&self, now: Ms, lead: Ms) -> Vec<Reservation> {
        if let Err(e) = validate_timestamp(now) {
            warn!("reminders skipped: {e}");
            return Vec::new();
        }
        let candidates: Vec<Ulid> = self
            .store
            .with_status(ReservationStatus::Confirmed)
            .await
            .into_iter()
            .filter(|r| reminder_due(r, now, lead))
            .map(|r| r.id)
            .collect();

        let mut reminded = Vec::new();
        for id in candidates {
            match self.remind_one(id, now, lead).await {
                Ok(Some(record)) => {
                    debug!("payment reminder for {} ({id})", record.reservation_code);
                    reminded.push(record);
                }
                Ok(None) => {}
                Err(e) => warn!("reminder skipped for {id}: {e}"),
            }
        }
        reminded
    }

    async fn remind_one(&self, id: Ulid, now: Ms, lead: Ms) -> Result<Option<Reservation>, EngineError> {
        let (_guard, record) = self.lock_reservation(id).await?;
        let Some(deadline) = record.payment_deadline.filter(|_| reminder_due(&record, now, lead)) else {
            return Ok(None);
        };
        let event = Event::PaymentDeadlineApproaching {
            id,
            member_id: record.member_id.clone(),
            deadline,
        };
        self.persist_and_apply(record, &event).await.map(Some)
    }

    /// Cancel every confirmed, unpaid, non-exempt reservation past its deadline.
    /// Returns immediately with nothing if another sweep is running.
    pub async fn run_expiration_sweep(&self, now: Ms) -> Vec<Reservation> {
        let Ok(_sweep) = self.sweep_lock.try_lock() else {
            debug!("expiration sweep already running");
            return Vec::new();
        };

        let candidates: Vec<Ulid> = self
            .store
            .with_status(ReservationStatus::Confirmed)
            .await
            .into_iter()
            .filter(|r| r.payment_lapsed(now))
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::new();
        for id in candidates {
            match self.expire_one(id, now).await {
                Ok(Some(record)) => {
                    metrics::counter!(EXPIRED_TOTAL).increment(1);
                    info!("expired unpaid {} ({id})", record.reservation_code);
                    expired.push(record);
                }
                Ok(None) => {}
                Err(e) => warn!("expiration skipped for {id}: {e}"),
            }
        }
        expired
    }

    async fn expire_one(&self, id: Ulid, now: Ms) -> Result<Option<Reservation>, EngineError> {
        let (_guard, record) = self.lock_reservation(id).await?;
        // Paid or cancelled since the candidate scan.
        if !record.payment_lapsed(now) {
            return Ok(None);
        }
        let cancellation = Cancellation {
            reason: CancelReason::PaymentWindowExpired,
            cancelled_at: now,
            cancelled_by: None,
        };
        self.cancel_locked(record, cancellation).await.map(Some)
    }

    /// Rewrite the WAL as one `Confirmed` snapshot per reservation.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.journal_gate.write().await;
        let events: Vec<Event> = self
            .store
            .all()
            .await
            .into_iter()
            .map(|reservation| Event::Confirmed { reservation })
            .collect();
        let count = events.len();
        self.wal
            .compact(events)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} reservations");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}
