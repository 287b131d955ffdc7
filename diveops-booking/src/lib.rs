pub mod booking;
pub mod lifecycle;
pub mod policy;
pub mod settlement;

pub use booking::{BookingError, BookingService, CancellationResult, CheckInError};
pub use lifecycle::{ExcursionLifecycleService, LifecycleError};
pub use policy::CancellationPolicy;
pub use settlement::{SettlementError, SettlementService};
