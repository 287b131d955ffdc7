use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A checked-in diver on an excursion's departure roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub excursion_id: Uuid,
    pub diver_id: Uuid,
    pub booking_id: Uuid,
    pub checked_in_by: Uuid,
    pub checked_in_at: DateTime<Utc>,
}

impl RosterEntry {
    pub fn new(excursion_id: Uuid, diver_id: Uuid, booking_id: Uuid, checked_in_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            excursion_id,
            diver_id,
            booking_id,
            checked_in_by,
            checked_in_at: Utc::now(),
        }
    }
}
