use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use diveops_domain::{Booking, Excursion, RefundDecision};

/// Refund policy thresholds. Pure and deterministic: the decision depends
/// only on the booking's price snapshot and how far the cancellation
/// precedes departure, so it is testable without any store.
#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    /// Full refund at or above this much notice.
    pub full_refund_hours: i64,
    /// Partial refund at or above this much notice (below the full window).
    pub partial_refund_hours: i64,
    /// Percent refunded inside the partial window.
    pub partial_refund_percent: u32,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            full_refund_hours: 48,
            partial_refund_hours: 24,
            partial_refund_percent: 50,
        }
    }
}

/// Minor-unit exponent for rounding refund amounts. Zero-decimal and
/// three-decimal ISO 4217 currencies, everything else two.
fn minor_units(currency: &str) -> u32 {
    match currency {
        "BIF" | "CLP" | "DJF" | "GNF" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "VND" | "VUV"
        | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

impl CancellationPolicy {
    /// Compute the refund for cancelling `booking` at `cancellation_time`.
    ///
    /// `refund_amount = original * percent / 100`, rounded half-even to the
    /// currency's minor units. A booking without a price snapshot refunds
    /// nothing.
    pub fn decide(
        &self,
        booking: &Booking,
        excursion: &Excursion,
        cancellation_time: DateTime<Utc>,
    ) -> RefundDecision {
        let currency = booking.price_currency.clone();

        let original_amount = match booking.price_amount {
            Some(amount) => amount,
            None => {
                return RefundDecision {
                    refund_amount: Decimal::ZERO,
                    refund_percent: 0,
                    original_amount: Decimal::ZERO,
                    currency,
                    reason: "No refund - booking has no recorded price".to_string(),
                };
            }
        };

        let notice = excursion.departure_at - cancellation_time;
        let (refund_percent, reason) = self.tier(notice);

        let refund_amount = (original_amount * Decimal::from(refund_percent)
            / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(minor_units(&currency), RoundingStrategy::MidpointNearestEven);

        RefundDecision {
            refund_amount,
            refund_percent,
            original_amount,
            currency,
            reason,
        }
    }

    fn tier(&self, notice: Duration) -> (u32, String) {
        if notice >= Duration::hours(self.full_refund_hours) {
            (
                100,
                format!(
                    "Full refund - cancelled at least {} hours before departure",
                    self.full_refund_hours
                ),
            )
        } else if notice >= Duration::hours(self.partial_refund_hours) {
            (
                self.partial_refund_percent,
                format!(
                    "Partial refund ({}%) - cancelled between {} and {} hours before departure",
                    self.partial_refund_percent, self.partial_refund_hours, self.full_refund_hours
                ),
            )
        } else {
            (
                0,
                format!(
                    "No refund - cancelled less than {} hours before departure",
                    self.partial_refund_hours
                ),
            )
        }
    }
}
