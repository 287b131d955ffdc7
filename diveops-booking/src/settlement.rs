use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use diveops_domain::{
    BookingStatus, OperationsRepository, RefundDecision, SettlementRecord, SettlementType,
    StoreError,
};

/// Converts a booking's terminal financial states into immutable
/// settlement records, exactly once per (booking, settlement_type).
pub struct SettlementService {
    store: Arc<dyn OperationsRepository>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("cannot settle revenue: booking is cancelled")]
    BookingCancelled,

    #[error("cannot settle revenue: booking has no price_amount")]
    MissingPrice,

    #[error("cannot settle refund: booking is not cancelled")]
    NotCancelled,

    #[error("lock wait timed out, retry the operation")]
    LockTimeout,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => SettlementError::LockTimeout,
            other => SettlementError::Store(other),
        }
    }
}

impl SettlementService {
    pub fn new(store: Arc<dyn OperationsRepository>) -> Self {
        Self { store }
    }

    /// Record revenue recognition for a booking. Idempotent: a second call
    /// (sequential or racing) returns the already-committed record.
    pub async fn create_revenue_settlement(
        &self,
        booking_id: Uuid,
        processed_by: Uuid,
    ) -> Result<SettlementRecord, SettlementError> {
        let booking = self
            .store
            .fetch_booking(booking_id)
            .await?
            .ok_or(SettlementError::BookingNotFound(booking_id))?;

        if booking.status == BookingStatus::Cancelled {
            return Err(SettlementError::BookingCancelled);
        }
        let amount = booking.price_amount.ok_or(SettlementError::MissingPrice)?;

        let candidate = SettlementRecord::new(
            booking_id,
            SettlementType::Revenue,
            amount,
            booking.price_currency.clone(),
            processed_by,
        );
        let candidate_id = candidate.id;
        let record = self.store.insert_or_fetch_settlement(candidate).await?;

        if record.id == candidate_id {
            info!(
                booking_id = %booking_id,
                settlement_id = %record.id,
                amount = %record.amount,
                "revenue settlement created"
            );
        } else {
            debug!(
                booking_id = %booking_id,
                settlement_id = %record.id,
                "revenue settlement already exists, returning existing record"
            );
        }
        Ok(record)
    }

    /// Record a refund for a cancelled booking. Returns `None` without
    /// persisting anything when the decision refunds zero: no-op financial
    /// events are not recorded. Otherwise idempotent like revenue.
    pub async fn create_refund_settlement(
        &self,
        booking_id: Uuid,
        decision: &RefundDecision,
        processed_by: Uuid,
    ) -> Result<Option<SettlementRecord>, SettlementError> {
        let booking = self
            .store
            .fetch_booking(booking_id)
            .await?
            .ok_or(SettlementError::BookingNotFound(booking_id))?;

        if booking.status != BookingStatus::Cancelled {
            return Err(SettlementError::NotCancelled);
        }

        if decision.refund_amount.is_zero() {
            debug!(booking_id = %booking_id, reason = %decision.reason, "zero refund, no settlement recorded");
            return Ok(None);
        }

        let candidate = SettlementRecord::new(
            booking_id,
            SettlementType::Refund,
            decision.refund_amount,
            decision.currency.clone(),
            processed_by,
        );
        let candidate_id = candidate.id;
        let record = self.store.insert_or_fetch_settlement(candidate).await?;

        if record.id == candidate_id {
            info!(
                booking_id = %booking_id,
                settlement_id = %record.id,
                amount = %record.amount,
                percent = decision.refund_percent,
                "refund settlement created"
            );
        } else {
            debug!(
                booking_id = %booking_id,
                settlement_id = %record.id,
                "refund settlement already exists, returning existing record"
            );
        }
        Ok(Some(record))
    }
}
