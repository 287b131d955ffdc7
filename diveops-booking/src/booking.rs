use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use diveops_domain::{
    Booking, BookingStatus, EligibilityError, EligibilityGate, OperationsRepository, RosterEntry,
    StoreError,
};

/// Drives booking creation, cancellation, and check-in. All capacity and
/// duplicate-booking invariants are enforced against the excursion row
/// lock held by the store's guarded insert.
pub struct BookingService {
    store: Arc<dyn OperationsRepository>,
    eligibility: Arc<dyn EligibilityGate>,
}

/// Wraps the cancelled booking; extension point for post-commit side
/// effects such as triggering the refund settlement.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationResult {
    pub booking: Booking,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("excursion not found: {0}")]
    ExcursionNotFound(Uuid),

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("excursion is {0}, not open for booking")]
    NotOpenForBooking(diveops_domain::ExcursionStatus),

    #[error("diver already has an active booking on this excursion")]
    DuplicateBooking,

    #[error("excursion is full (capacity {capacity})")]
    CapacityExceeded { capacity: u32 },

    #[error(transparent)]
    Eligibility(#[from] EligibilityError),

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    #[error("cannot cancel a checked-in booking")]
    CheckedIn,

    #[error("lock wait timed out, retry the operation")]
    LockTimeout,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateActiveBooking { .. } => BookingError::DuplicateBooking,
            StoreError::CapacityExhausted { capacity, .. } => {
                BookingError::CapacityExceeded { capacity }
            }
            StoreError::LockTimeout => BookingError::LockTimeout,
            other => BookingError::Store(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("cannot check in a cancelled booking")]
    CancelledBooking,

    #[error("booking is already checked in")]
    AlreadyCheckedIn,

    #[error("Waiver agreement not signed or expired for diver {0}")]
    WaiverRequired(Uuid),

    #[error("lock wait timed out, retry the operation")]
    LockTimeout,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CheckInError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => CheckInError::LockTimeout,
            other => CheckInError::Store(other),
        }
    }
}

impl BookingService {
    pub fn new(store: Arc<dyn OperationsRepository>, eligibility: Arc<dyn EligibilityGate>) -> Self {
        Self { store, eligibility }
    }

    /// Book a diver onto an excursion.
    ///
    /// Validation order: duplicate active booking, capacity, then
    /// eligibility (unless skipped). The pre-checks give precise error
    /// precedence; the store's guarded insert re-verifies duplicate and
    /// capacity atomically, so a race loser gets the same typed error from
    /// the winner's committed state.
    pub async fn book(
        &self,
        excursion_id: Uuid,
        diver_id: Uuid,
        actor: Uuid,
        skip_eligibility_check: bool,
    ) -> Result<Booking, BookingError> {
        let excursion = self
            .store
            .fetch_excursion(excursion_id)
            .await?
            .ok_or(BookingError::ExcursionNotFound(excursion_id))?;

        if !excursion.is_open_for_booking() {
            return Err(BookingError::NotOpenForBooking(excursion.status));
        }

        if self.store.has_active_booking(excursion_id, diver_id).await? {
            return Err(BookingError::DuplicateBooking);
        }

        let active = self.store.active_booking_count(excursion_id).await?;
        if active >= excursion.capacity {
            return Err(BookingError::CapacityExceeded {
                capacity: excursion.capacity,
            });
        }

        if !skip_eligibility_check {
            self.eligibility.verify(diver_id).await?;
        }

        let booking = Booking::new(&excursion, diver_id, actor);
        let booking = self.store.insert_active_booking(booking).await?;

        info!(
            booking_id = %booking.id,
            excursion_id = %excursion_id,
            diver_id = %diver_id,
            "booking confirmed"
        );
        Ok(booking)
    }

    /// Cancel a confirmed booking. Frees the capacity slot immediately
    /// (cancelled rows are excluded from the active count).
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor: Uuid,
    ) -> Result<CancellationResult, BookingError> {
        let booking = self
            .store
            .fetch_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        match booking.status {
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
            BookingStatus::CheckedIn => return Err(BookingError::CheckedIn),
            BookingStatus::Confirmed => {}
        }

        let updated = self
            .store
            .transition_booking(
                booking_id,
                BookingStatus::Confirmed,
                BookingStatus::Cancelled,
                Some(Utc::now()),
            )
            .await
            .map_err(|err| match err {
                // Raced with another cancel or a check-in between the fetch
                // and the CAS; report against the committed status.
                StoreError::BookingStatusConflict { actual, .. } => match actual {
                    BookingStatus::Cancelled => BookingError::AlreadyCancelled,
                    BookingStatus::CheckedIn => BookingError::CheckedIn,
                    BookingStatus::Confirmed => {
                        BookingError::Store(StoreError::Backend(format!(
                            "booking {booking_id} transition failed while confirmed"
                        )))
                    }
                },
                other => other.into(),
            })?;

        info!(booking_id = %booking_id, actor = %actor, "booking cancelled");
        Ok(CancellationResult { booking: updated })
    }

    /// Check a confirmed booking in: advance it to checked_in and add the
    /// diver to the departure roster. The CAS transition runs first so a
    /// concurrent double check-in loses on the status conflict.
    pub async fn check_in(
        &self,
        booking_id: Uuid,
        checked_in_by: Uuid,
        require_waiver: bool,
    ) -> Result<RosterEntry, CheckInError> {
        let booking = self
            .store
            .fetch_booking(booking_id)
            .await?
            .ok_or(CheckInError::BookingNotFound(booking_id))?;

        match booking.status {
            BookingStatus::Cancelled => return Err(CheckInError::CancelledBooking),
            BookingStatus::CheckedIn => return Err(CheckInError::AlreadyCheckedIn),
            BookingStatus::Confirmed => {}
        }

        if require_waiver {
            let signed = self.eligibility.has_valid_waiver(booking.diver_id).await?;
            if !signed {
                return Err(CheckInError::WaiverRequired(booking.diver_id));
            }
        }

        let updated = self
            .store
            .transition_booking(
                booking_id,
                BookingStatus::Confirmed,
                BookingStatus::CheckedIn,
                None,
            )
            .await
            .map_err(|err| match err {
                StoreError::BookingStatusConflict { actual, .. } => match actual {
                    BookingStatus::CheckedIn => CheckInError::AlreadyCheckedIn,
                    BookingStatus::Cancelled => CheckInError::CancelledBooking,
                    BookingStatus::Confirmed => CheckInError::Store(StoreError::Backend(format!(
                        "booking {booking_id} transition failed while confirmed"
                    ))),
                },
                other => other.into(),
            })?;

        let entry = RosterEntry::new(
            updated.excursion_id,
            updated.diver_id,
            updated.id,
            checked_in_by,
        );
        let entry = match self.store.insert_roster_entry(entry).await {
            Ok(entry) => entry,
            Err(err) => {
                // Booking is checked in but the roster write failed; the
                // roster can be rebuilt from booking rows, so surface the
                // failure without unwinding the transition.
                warn!(booking_id = %booking_id, error = %err, "roster insert failed after check-in");
                return Err(err.into());
            }
        };

        info!(booking_id = %booking_id, excursion_id = %updated.excursion_id, "diver checked in");
        Ok(entry)
    }
}
