use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::excursion::Excursion;

/// Booking status. Transitions are one-directional:
/// confirmed -> checked_in, confirmed -> cancelled; both targets terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    CheckedIn,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(BookingStatus::Confirmed),
            "checked_in" => Some(BookingStatus::CheckedIn),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the booking occupies a capacity slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::CheckedIn)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diver's reservation on an excursion. Never physically deleted;
/// cancellation is a status change so the row stays for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub excursion_id: Uuid,
    pub diver_id: Uuid,
    pub status: BookingStatus,
    pub booked_by: Uuid,
    pub price_amount: Option<Decimal>,
    pub price_currency: String,
    pub price_snapshot: Option<serde_json::Value>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Create a confirmed booking with the price snapshot captured from the
    /// excursion at booking time. The price is never recomputed afterwards.
    pub fn new(excursion: &Excursion, diver_id: Uuid, booked_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            excursion_id: excursion.id,
            diver_id,
            status: BookingStatus::Confirmed,
            booked_by,
            price_amount: Some(excursion.base_price),
            price_currency: excursion.currency.clone(),
            price_snapshot: Some(json!({
                "amount": excursion.base_price.to_string(),
                "currency": excursion.currency,
            })),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
