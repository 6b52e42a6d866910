use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Storage behind the engine. Records are never deleted.
///
/// Identity fields (`id`, `reservation_code`, member, titular, accommodation,
/// stay) are fixed at insert; `update` may only change lifecycle fields.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert(&self, reservation: Reservation) -> Result<(), EngineError>;
    async fn update(&self, reservation: Reservation) -> Result<(), EngineError>;
    async fn get(&self, id: Ulid) -> Option<Reservation>;
    async fn get_by_code(&self, code: &str) -> Option<Reservation>;
    /// Reservations booked by `member` or charged to them as titular.
    async fn for_member(&self, member: &MemberId) -> Vec<Reservation>;
    /// Reservations on `accommodation` sharing at least one night with `stay`.
    async fn overlapping(&self, accommodation: &AccommodationId, stay: &Stay) -> Vec<Reservation>;
    async fn with_status(&self, status: ReservationStatus) -> Vec<Reservation>;
    async fn all(&self) -> Vec<Reservation>;
    async fn count(&self) -> usize;
}

/// One entry of the per-accommodation index.
#[derive(Debug, Clone, Copy)]
struct Booked {
    check_in: NaiveDate,
    check_out: NaiveDate,
    id: Ulid,
}

/// Arena of records keyed by id, plus secondary indices.
pub struct InMemoryStore {
    records: DashMap<Ulid, Reservation>,
    codes: DashMap<String, Ulid>,
    by_member: DashMap<MemberId, Vec<Ulid>>,
    /// Sorted by `check_in`.
    by_accommodation: DashMap<AccommodationId, Vec<Booked>>,
    by_status: DashMap<ReservationStatus, BTreeSet<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            codes: DashMap::new(),
            by_member: DashMap::new(),
            by_accommodation: DashMap::new(),
            by_status: DashMap::new(),
        }
    }

    fn collect(&self, ids: impl IntoIterator<Item = Ulid>) -> Vec<Reservation> {
        ids.into_iter()
            .filter_map(|id| self.records.get(&id).map(|r| r.value().clone()))
            .collect()
    }

    fn index_status(&self, id: Ulid, old: Option<ReservationStatus>, new: ReservationStatus) {
        if old == Some(new) {
            return;
        }
        if let Some(old) = old
            && let Some(mut ids) = self.by_status.get_mut(&old)
        {
            ids.remove(&id);
        }
        self.by_status.entry(new).or_default().insert(id);
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn insert(&self, reservation: Reservation) -> Result<(), EngineError> {
        let id = reservation.id;
        if self.records.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        match self.codes.entry(reservation.reservation_code.clone()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        self.by_member
            .entry(reservation.member_id.clone())
            .or_default()
            .push(id);
        if let Some(titular) = &reservation.titular_member_id
            && titular != &reservation.member_id
        {
            self.by_member.entry(titular.clone()).or_default().push(id);
        }

        {
            let mut booked = self
                .by_accommodation
                .entry(reservation.accommodation_id.clone())
                .or_default();
            let entry = Booked {
                check_in: reservation.stay.check_in,
                check_out: reservation.stay.check_out,
                id,
            };
            let pos = booked.partition_point(|b| b.check_in <= entry.check_in);
            booked.insert(pos, entry);
        }

        self.index_status(id, None, reservation.status);
        self.records.insert(id, reservation);
        Ok(())
    }

    async fn update(&self, reservation: Reservation) -> Result<(), EngineError> {
        let id = reservation.id;
        let (old_status, new_status) = {
            let mut current = self
                .records
                .get_mut(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let statuses = (current.status, reservation.status);
            *current = reservation;
            statuses
        };
        self.index_status(id, Some(old_status), new_status);
        Ok(())
    }

    async fn get(&self, id: Ulid) -> Option<Reservation> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    async fn get_by_code(&self, code: &str) -> Option<Reservation> {
        let id = self.codes.get(code).map(|e| *e.value())?;
        self.get(id).await
    }

    async fn for_member(&self, member: &MemberId) -> Vec<Reservation> {
        let ids = self
            .by_member
            .get(member)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.collect(ids)
    }

    async fn overlapping(&self, accommodation: &AccommodationId, stay: &Stay) -> Vec<Reservation> {
        let ids: Vec<Ulid> = match self.by_accommodation.get(accommodation) {
            Some(entry) => {
                let booked = entry.value();
                // Everything from right_bound on checks in on or after our checkout.
                let right_bound = booked.partition_point(|b| b.check_in < stay.check_out);
                booked[..right_bound]
                    .iter()
                    .filter(|b| b.check_out > stay.check_in)
                    .map(|b| b.id)
                    .collect()
            }
            None => return Vec::new(),
        };
        self.collect(ids)
    }

    async fn with_status(&self, status: ReservationStatus) -> Vec<Reservation> {
        let ids: Vec<Ulid> = self
            .by_status
            .get(&status)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default();
        self.collect(ids)
    }

    async fn all(&self) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self.records.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }

    async fn count(&self) -> usize {
        self.records.len()
    }
}
