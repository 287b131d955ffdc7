use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::error::{EligibilityError, StoreError};
use crate::excursion::{Excursion, ExcursionStatus};
use crate::roster::RosterEntry;
use crate::settlement::{SettlementRecord, SettlementType};

/// Repository trait for excursion rows.
#[async_trait]
pub trait ExcursionRepository: Send + Sync {
    async fn insert_excursion(&self, excursion: &Excursion) -> Result<(), StoreError>;

    async fn fetch_excursion(&self, id: Uuid) -> Result<Option<Excursion>, StoreError>;

    /// Compare-and-swap status transition. Fails with
    /// `ExcursionStatusConflict` (carrying the actual status) when the row
    /// is not in `expected`, so callers can report precise state errors.
    async fn transition_excursion(
        &self,
        id: Uuid,
        expected: ExcursionStatus,
        next: ExcursionStatus,
    ) -> Result<Excursion, StoreError>;
}

/// Repository trait for booking and roster rows.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomic guarded insert: within one transaction holding the excursion
    /// row lock, verify the diver has no active booking and the active
    /// count is below capacity, then persist. The loser of a race observes
    /// the winner's committed state and gets `DuplicateActiveBooking` or
    /// `CapacityExhausted`.
    async fn insert_active_booking(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn fetch_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Compare-and-swap status transition; sets `cancelled_at` when given.
    /// Fails with `BookingStatusConflict` carrying the actual status.
    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Booking, StoreError>;

    async fn has_active_booking(
        &self,
        excursion_id: Uuid,
        diver_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Count of bookings occupying a capacity slot (confirmed or
    /// checked-in). Always derived from the rows, never cached.
    async fn active_booking_count(&self, excursion_id: Uuid) -> Result<u32, StoreError>;

    async fn list_bookings(&self, excursion_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    async fn insert_roster_entry(&self, entry: RosterEntry) -> Result<RosterEntry, StoreError>;

    async fn roster_for_excursion(&self, excursion_id: Uuid)
        -> Result<Vec<RosterEntry>, StoreError>;
}

/// Repository trait for settlement records.
#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Insert-or-fetch keyed on (booking_id, settlement_type). Exactly one
    /// record is ever persisted per key; concurrent callers all receive the
    /// committed record.
    async fn insert_or_fetch_settlement(
        &self,
        record: SettlementRecord,
    ) -> Result<SettlementRecord, StoreError>;

    async fn settlements_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<SettlementRecord>, StoreError>;

    async fn fetch_settlement(
        &self,
        booking_id: Uuid,
        settlement_type: SettlementType,
    ) -> Result<Option<SettlementRecord>, StoreError>;
}

/// Everything the booking and settlement services need from one handle.
pub trait OperationsRepository:
    ExcursionRepository + BookingRepository + SettlementRepository
{
}

impl<T: ExcursionRepository + BookingRepository + SettlementRepository> OperationsRepository for T {}

/// External collaborator seam: diver prerequisite lookups. Injected so
/// tests run against isolated instances rather than shared state.
#[async_trait]
pub trait EligibilityGate: Send + Sync {
    /// Verify certification/medical/waiver currency for booking.
    async fn verify(&self, diver_id: Uuid) -> Result<(), EligibilityError>;

    /// Whether the diver holds a currently-valid signed waiver.
    async fn has_valid_waiver(&self, diver_id: Uuid) -> Result<bool, StoreError>;
}
