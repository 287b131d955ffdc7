use uuid::Uuid;

use crate::booking::BookingStatus;
use crate::excursion::ExcursionStatus;

/// Failures surfaced by the repository layer. Services translate the
/// invariant violations into their own business-error taxonomy; `Backend`
/// and `LockTimeout` pass through as infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("excursion not found: {0}")]
    ExcursionNotFound(Uuid),

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("diver {diver_id} already has an active booking on excursion {excursion_id}")]
    DuplicateActiveBooking { excursion_id: Uuid, diver_id: Uuid },

    #[error("excursion {excursion_id} is at capacity ({capacity})")]
    CapacityExhausted { excursion_id: Uuid, capacity: u32 },

    #[error("booking {booking_id} is {actual}, expected {expected}")]
    BookingStatusConflict {
        booking_id: Uuid,
        expected: BookingStatus,
        actual: BookingStatus,
    },

    #[error("excursion {excursion_id} is {actual}, expected {expected}")]
    ExcursionStatusConflict {
        excursion_id: Uuid,
        expected: ExcursionStatus,
        actual: ExcursionStatus,
    },

    #[error("row lock wait timed out")]
    LockTimeout,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Diver prerequisite failures (certification, medical, waiver currency).
/// Recoverable once the diver satisfies the prerequisite.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EligibilityError {
    #[error("diver {0} has no current certification on file")]
    MissingCertification(Uuid),

    #[error("diver {0} has an expired medical clearance")]
    ExpiredMedical(Uuid),

    #[error("Waiver agreement not signed or expired for diver {0}")]
    MissingWaiver(Uuid),
}
