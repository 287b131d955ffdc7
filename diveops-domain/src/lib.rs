pub mod booking;
pub mod error;
pub mod excursion;
pub mod repository;
pub mod roster;
pub mod settlement;

pub use booking::{Booking, BookingStatus};
pub use error::{EligibilityError, StoreError};
pub use excursion::{Excursion, ExcursionStatus};
pub use repository::{
    BookingRepository, EligibilityGate, ExcursionRepository, OperationsRepository,
    SettlementRepository,
};
pub use roster::RosterEntry;
pub use settlement::{RefundDecision, SettlementRecord, SettlementType};
