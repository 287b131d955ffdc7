use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Excursion lifecycle status. Advances monotonically
/// scheduled -> in_progress -> completed, or diverts to cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExcursionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ExcursionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcursionStatus::Scheduled => "scheduled",
            ExcursionStatus::InProgress => "in_progress",
            ExcursionStatus::Completed => "completed",
            ExcursionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ExcursionStatus::Scheduled),
            "in_progress" => Some(ExcursionStatus::InProgress),
            "completed" => Some(ExcursionStatus::Completed),
            "cancelled" => Some(ExcursionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExcursionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled dive trip with fixed capacity.
///
/// Capacity is never stored as a mutable counter; the active-booking count
/// is always derived from the booking rows under lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Excursion {
    pub id: Uuid,
    pub dive_shop_id: Uuid,
    pub name: String,
    pub departure_at: DateTime<Utc>,
    pub capacity: u32,
    pub base_price: Decimal,
    pub currency: String,
    pub status: ExcursionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Excursion {
    pub fn new(
        dive_shop_id: Uuid,
        name: impl Into<String>,
        departure_at: DateTime<Utc>,
        capacity: u32,
        base_price: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dive_shop_id,
            name: name.into(),
            departure_at,
            capacity,
            base_price,
            currency: currency.into(),
            status: ExcursionStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new bookings are accepted.
    pub fn is_open_for_booking(&self) -> bool {
        self.status == ExcursionStatus::Scheduled
    }
}
