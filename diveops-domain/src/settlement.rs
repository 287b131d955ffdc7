use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Revenue recognition vs. refund issuance. One record of each type at most
/// per booking; shared fields, tagged variant rather than two tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    Revenue,
    Refund,
}

impl SettlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementType::Revenue => "revenue",
            SettlementType::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revenue" => Some(SettlementType::Revenue),
            "refund" => Some(SettlementType::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for SettlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable financial record derived from a booking's terminal state.
/// Unique on (booking_id, settlement_type) — that index is the idempotency
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub settlement_type: SettlementType,
    pub amount: Decimal,
    pub currency: String,
    pub processed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn new(
        booking_id: Uuid,
        settlement_type: SettlementType,
        amount: Decimal,
        currency: impl Into<String>,
        processed_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            settlement_type,
            amount,
            currency: currency.into(),
            processed_by,
            created_at: Utc::now(),
        }
    }
}

/// Transient refund computation produced by the cancellation policy and
/// consumed immediately by settlement. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundDecision {
    pub refund_amount: Decimal,
    pub refund_percent: u32,
    pub original_amount: Decimal,
    pub currency: String,
    pub reason: String,
}
