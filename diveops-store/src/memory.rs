use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use diveops_domain::{
    Booking, BookingRepository, BookingStatus, EligibilityError, EligibilityGate, Excursion,
    ExcursionRepository, ExcursionStatus, RosterEntry, SettlementRecord, SettlementRepository,
    SettlementType, StoreError,
};

#[derive(Default)]
struct Inner {
    excursions: HashMap<Uuid, Excursion>,
    bookings: HashMap<Uuid, Booking>,
    roster: Vec<RosterEntry>,
    settlements: HashMap<(Uuid, SettlementType), SettlementRecord>,
}

/// In-memory store used by tests and local tooling. A single mutex guards
/// all tables, so every repository operation is atomic and operations are
/// totally ordered by lock acquisition — the same serialization the
/// Postgres store gets from row locks and unique indexes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panicking test; the data is still
        // consistent because every mutation completes before unlock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ExcursionRepository for MemoryStore {
    async fn insert_excursion(&self, excursion: &Excursion) -> Result<(), StoreError> {
        self.lock().excursions.insert(excursion.id, excursion.clone());
        Ok(())
    }

    async fn fetch_excursion(&self, id: Uuid) -> Result<Option<Excursion>, StoreError> {
        Ok(self.lock().excursions.get(&id).cloned())
    }

    async fn transition_excursion(
        &self,
        id: Uuid,
        expected: ExcursionStatus,
        next: ExcursionStatus,
    ) -> Result<Excursion, StoreError> {
        let mut inner = self.lock();
        let excursion = inner
            .excursions
            .get_mut(&id)
            .ok_or(StoreError::ExcursionNotFound(id))?;
        if excursion.status != expected {
            return Err(StoreError::ExcursionStatusConflict {
                excursion_id: id,
                expected,
                actual: excursion.status,
            });
        }
        excursion.status = next;
        excursion.updated_at = Utc::now();
        Ok(excursion.clone())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_active_booking(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut inner = self.lock();

        let excursion = inner
            .excursions
            .get(&booking.excursion_id)
            .ok_or(StoreError::ExcursionNotFound(booking.excursion_id))?;
        let capacity = excursion.capacity;

        let duplicate = inner.bookings.values().any(|b| {
            b.excursion_id == booking.excursion_id
                && b.diver_id == booking.diver_id
                && b.is_active()
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveBooking {
                excursion_id: booking.excursion_id,
                diver_id: booking.diver_id,
            });
        }

        let active = inner
            .bookings
            .values()
            .filter(|b| b.excursion_id == booking.excursion_id && b.is_active())
            .count() as u32;
        if active >= capacity {
            return Err(StoreError::CapacityExhausted {
                excursion_id: booking.excursion_id,
                capacity,
            });
        }

        inner.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn fetch_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Booking, StoreError> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .get_mut(&id)
            .ok_or(StoreError::BookingNotFound(id))?;
        if booking.status != expected {
            return Err(StoreError::BookingStatusConflict {
                booking_id: id,
                expected,
                actual: booking.status,
            });
        }
        booking.status = next;
        if cancelled_at.is_some() {
            booking.cancelled_at = cancelled_at;
        }
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn has_active_booking(
        &self,
        excursion_id: Uuid,
        diver_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().bookings.values().any(|b| {
            b.excursion_id == excursion_id && b.diver_id == diver_id && b.is_active()
        }))
    }

    async fn active_booking_count(&self, excursion_id: Uuid) -> Result<u32, StoreError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|b| b.excursion_id == excursion_id && b.is_active())
            .count() as u32)
    }

    async fn list_bookings(&self, excursion_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| b.excursion_id == excursion_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn insert_roster_entry(&self, entry: RosterEntry) -> Result<RosterEntry, StoreError> {
        self.lock().roster.push(entry.clone());
        Ok(entry)
    }

    async fn roster_for_excursion(
        &self,
        excursion_id: Uuid,
    ) -> Result<Vec<RosterEntry>, StoreError> {
        Ok(self
            .lock()
            .roster
            .iter()
            .filter(|e| e.excursion_id == excursion_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettlementRepository for MemoryStore {
    async fn insert_or_fetch_settlement(
        &self,
        record: SettlementRecord,
    ) -> Result<SettlementRecord, StoreError> {
        let mut inner = self.lock();
        let key = (record.booking_id, record.settlement_type);
        if let Some(existing) = inner.settlements.get(&key) {
            return Ok(existing.clone());
        }
        inner.settlements.insert(key, record.clone());
        Ok(record)
    }

    async fn settlements_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        let mut records: Vec<SettlementRecord> = self
            .lock()
            .settlements
            .values()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn fetch_settlement(
        &self,
        booking_id: Uuid,
        settlement_type: SettlementType,
    ) -> Result<Option<SettlementRecord>, StoreError> {
        Ok(self
            .lock()
            .settlements
            .get(&(booking_id, settlement_type))
            .cloned())
    }
}

#[derive(Default)]
struct EligibilityState {
    certified: HashSet<Uuid>,
    waivers: HashMap<Uuid, DateTime<Utc>>,
}

/// In-memory eligibility collaborator. Divers start with nothing on file;
/// tests grant certification and sign waivers as needed.
#[derive(Default)]
pub struct MemoryEligibility {
    state: Mutex<EligibilityState>,
}

impl MemoryEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_certification(&self, diver_id: Uuid) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .certified
            .insert(diver_id);
    }

    pub fn sign_waiver(&self, diver_id: Uuid, valid_until: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .waivers
            .insert(diver_id, valid_until);
    }
}

#[async_trait]
impl EligibilityGate for MemoryEligibility {
    async fn verify(&self, diver_id: Uuid) -> Result<(), EligibilityError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.certified.contains(&diver_id) {
            return Err(EligibilityError::MissingCertification(diver_id));
        }
        Ok(())
    }

    async fn has_valid_waiver(&self, diver_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .waivers
            .get(&diver_id)
            .map(|valid_until| *valid_until > Utc::now())
            .unwrap_or(false))
    }
}
