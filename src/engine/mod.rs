mod error;
mod locks;
mod mutations;
mod queries;
pub mod store;
mod validate;

pub use error::EngineError;
pub use store::{InMemoryStore, ReservationRepository};
pub use validate::now_ms;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::calendar::HolidayCalendar;
use crate::directory::{Inventory, MemberDirectory};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{transition_label, TRANSITIONS_TOTAL};
use crate::wal::{Wal, WalHandle};

use locks::KeyedLocks;

/// Services the engine reads from but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn MemberDirectory>,
    pub inventory: Arc<dyn Inventory>,
    pub calendar: Arc<HolidayCalendar>,
}

pub struct Engine {
    pub(super) store: Arc<dyn ReservationRepository>,
    pub(super) wal: WalHandle,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn MemberDirectory>,
    pub(super) inventory: Arc<dyn Inventory>,
    pub(super) calendar: Arc<HolidayCalendar>,
    /// Creation locks, taken holder first, then accommodation.
    pub(super) holder_locks: KeyedLocks<MemberId>,
    pub(super) accommodation_locks: KeyedLocks<AccommodationId>,
    pub(super) reservation_locks: KeyedLocks<Ulid>,
    pub(super) sweep_lock: Mutex<()>,
    /// Journal writes hold this shared; compaction holds it exclusively.
    pub(super) journal_gate: RwLock<()>,
}

impl Engine {
    pub async fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        collaborators: Collaborators,
    ) -> io::Result<Self> {
        Self::with_store(wal_path, notify, Arc::new(InMemoryStore::new()), collaborators).await
    }

    /// Replay the journal into `store` and start the WAL writer.
    pub async fn with_store(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        store: Arc<dyn ReservationRepository>,
        collaborators: Collaborators,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = WalHandle::spawn(Wal::open(&wal_path)?);

        let engine = Self {
            store,
            wal,
            notify,
            directory: collaborators.directory,
            inventory: collaborators.inventory,
            calendar: collaborators.calendar,
            holder_locks: KeyedLocks::new(),
            accommodation_locks: KeyedLocks::new(),
            reservation_locks: KeyedLocks::new(),
            sweep_lock: Mutex::new(()),
            journal_gate: RwLock::new(()),
        };

        for event in &events {
            engine.replay_event(event).await;
        }
        tracing::info!(
            "replayed {} events into {} reservations from {}",
            events.len(),
            engine.store.count().await,
            wal_path.display()
        );
        Ok(engine)
    }

    async fn replay_event(&self, event: &Event) {
        let id = event.reservation_id();
        let result = match (event, self.store.get(id).await) {
            (Event::Confirmed { reservation }, None) => self.store.insert(reservation.clone()).await,
            (_, Some(mut record)) => {
                apply_to_reservation(&mut record, event);
                self.store.update(record).await
            }
            (_, None) => Err(EngineError::ReservationNotFound(id)),
        };
        if let Err(e) = result {
            warn!("replay: skipping event for {id}: {e}");
        }
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        self.wal
            .append(event)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + store + notify. Callers hold the record's lock.
    pub(super) async fn persist_and_apply(
        &self,
        mut record: Reservation,
        event: &Event,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.journal_gate.read().await;
        self.wal_append(event).await?;
        apply_to_reservation(&mut record, event);
        match event {
            Event::Confirmed { .. } => self.store.insert(record.clone()).await?,
            _ => self.store.update(record.clone()).await?,
        }
        metrics::counter!(TRANSITIONS_TOTAL, "transition" => transition_label(event)).increment(1);
        let mut recipients = vec![&record.member_id];
        recipients.extend(record.titular_member_id.as_ref());
        self.notify.send(&recipients, event);
        Ok(record)
    }

    /// Take the reservation's lock, then load it.
    pub(super) async fn lock_reservation(
        &self,
        id: Ulid,
    ) -> Result<(OwnedMutexGuard<()>, Reservation), EngineError> {
        let guard = self.reservation_locks.lock(&id).await;
        let record = self
            .store
            .get(id)
            .await
            .ok_or(EngineError::ReservationNotFound(id))?;
        Ok((guard, record))
    }
}
