use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use diveops_domain::{
    Booking, BookingRepository, BookingStatus, Excursion, ExcursionRepository, ExcursionStatus,
    RosterEntry, SettlementRecord, SettlementRepository, SettlementType, StoreError,
};

/// Postgres-backed store. The excursion row is the single locking key for
/// booking creation: `insert_active_booking` takes `SELECT ... FOR UPDATE`
/// on it and runs the duplicate and capacity checks inside that
/// transaction. Unique indexes (active (excursion_id, diver_id), and
/// (booking_id, settlement_type)) are the backstop for both invariants.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // 55P03: lock_not_available (lock_timeout / NOWAIT expiry).
        if db_err.code().as_deref() == Some("55P03") {
            return StoreError::LockTimeout;
        }
    }
    StoreError::Backend(err.to_string())
}

fn parse_booking_status(s: &str) -> Result<BookingStatus, StoreError> {
    BookingStatus::parse(s)
        .ok_or_else(|| StoreError::Backend(format!("unknown booking status in store: {s}")))
}

fn parse_excursion_status(s: &str) -> Result<ExcursionStatus, StoreError> {
    ExcursionStatus::parse(s)
        .ok_or_else(|| StoreError::Backend(format!("unknown excursion status in store: {s}")))
}

#[derive(sqlx::FromRow)]
struct ExcursionRow {
    id: Uuid,
    dive_shop_id: Uuid,
    name: String,
    departure_at: DateTime<Utc>,
    capacity: i32,
    base_price: Decimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExcursionRow> for Excursion {
    type Error = StoreError;

    fn try_from(row: ExcursionRow) -> Result<Self, StoreError> {
        Ok(Excursion {
            id: row.id,
            dive_shop_id: row.dive_shop_id,
            name: row.name,
            departure_at: row.departure_at,
            capacity: row.capacity.max(0) as u32,
            base_price: row.base_price,
            currency: row.currency,
            status: parse_excursion_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    excursion_id: Uuid,
    diver_id: Uuid,
    status: String,
    booked_by: Uuid,
    price_amount: Option<Decimal>,
    price_currency: String,
    price_snapshot: Option<serde_json::Value>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        Ok(Booking {
            id: row.id,
            excursion_id: row.excursion_id,
            diver_id: row.diver_id,
            status: parse_booking_status(&row.status)?,
            booked_by: row.booked_by,
            price_amount: row.price_amount,
            price_currency: row.price_currency,
            price_snapshot: row.price_snapshot,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RosterRow {
    id: Uuid,
    excursion_id: Uuid,
    diver_id: Uuid,
    booking_id: Uuid,
    checked_in_by: Uuid,
    checked_in_at: DateTime<Utc>,
}

impl From<RosterRow> for RosterEntry {
    fn from(row: RosterRow) -> Self {
        RosterEntry {
            id: row.id,
            excursion_id: row.excursion_id,
            diver_id: row.diver_id,
            booking_id: row.booking_id,
            checked_in_by: row.checked_in_by,
            checked_in_at: row.checked_in_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SettlementRow {
    id: Uuid,
    booking_id: Uuid,
    settlement_type: String,
    amount: Decimal,
    currency: String,
    processed_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<SettlementRow> for SettlementRecord {
    type Error = StoreError;

    fn try_from(row: SettlementRow) -> Result<Self, StoreError> {
        let settlement_type = SettlementType::parse(&row.settlement_type).ok_or_else(|| {
            StoreError::Backend(format!(
                "unknown settlement type in store: {}",
                row.settlement_type
            ))
        })?;
        Ok(SettlementRecord {
            id: row.id,
            booking_id: row.booking_id,
            settlement_type,
            amount: row.amount,
            currency: row.currency,
            processed_by: row.processed_by,
            created_at: row.created_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, excursion_id, diver_id, status, booked_by, price_amount, \
     price_currency, price_snapshot, cancelled_at, created_at, updated_at";

const EXCURSION_COLUMNS: &str = "id, dive_shop_id, name, departure_at, capacity, base_price, \
     currency, status, created_at, updated_at";

const SETTLEMENT_COLUMNS: &str =
    "id, booking_id, settlement_type, amount, currency, processed_by, created_at";

#[async_trait]
impl ExcursionRepository for PgStore {
    async fn insert_excursion(&self, excursion: &Excursion) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO excursions (id, dive_shop_id, name, departure_at, capacity, base_price, \
             currency, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(excursion.id)
        .bind(excursion.dive_shop_id)
        .bind(&excursion.name)
        .bind(excursion.departure_at)
        .bind(excursion.capacity as i32)
        .bind(excursion.base_price)
        .bind(&excursion.currency)
        .bind(excursion.status.as_str())
        .bind(excursion.created_at)
        .bind(excursion.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn fetch_excursion(&self, id: Uuid) -> Result<Option<Excursion>, StoreError> {
        let row = sqlx::query_as::<_, ExcursionRow>(&format!(
            "SELECT {EXCURSION_COLUMNS} FROM excursions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Excursion::try_from).transpose()
    }

    async fn transition_excursion(
        &self,
        id: Uuid,
        expected: ExcursionStatus,
        next: ExcursionStatus,
    ) -> Result<Excursion, StoreError> {
        let updated = sqlx::query_as::<_, ExcursionRow>(&format!(
            "UPDATE excursions SET status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2 RETURNING {EXCURSION_COLUMNS}"
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                let current = self
                    .fetch_excursion(id)
                    .await?
                    .ok_or(StoreError::ExcursionNotFound(id))?;
                Err(StoreError::ExcursionStatusConflict {
                    excursion_id: id,
                    expected,
                    actual: current.status,
                })
            }
        }
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_active_booking(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // Exclusive lock on the excursion row for the check-and-insert
        // sequence; concurrent bookers for this excursion queue here.
        let locked = sqlx::query_as::<_, (i32,)>(
            "SELECT capacity FROM excursions WHERE id = $1 FOR UPDATE",
        )
        .bind(booking.excursion_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        let capacity = locked
            .ok_or(StoreError::ExcursionNotFound(booking.excursion_id))?
            .0
            .max(0) as u32;

        let duplicate = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE excursion_id = $1 AND diver_id = $2 \
             AND status IN ('confirmed', 'checked_in'))",
        )
        .bind(booking.excursion_id)
        .bind(booking.diver_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if duplicate {
            return Err(StoreError::DuplicateActiveBooking {
                excursion_id: booking.excursion_id,
                diver_id: booking.diver_id,
            });
        }

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM bookings WHERE excursion_id = $1 \
             AND status IN ('confirmed', 'checked_in')",
        )
        .bind(booking.excursion_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if active as u32 >= capacity {
            return Err(StoreError::CapacityExhausted {
                excursion_id: booking.excursion_id,
                capacity,
            });
        }

        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking.id)
        .bind(booking.excursion_id)
        .bind(booking.diver_id)
        .bind(booking.status.as_str())
        .bind(booking.booked_by)
        .bind(booking.price_amount)
        .bind(&booking.price_currency)
        .bind(&booking.price_snapshot)
        .bind(booking.cancelled_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            // The partial unique index on active (excursion_id, diver_id)
            // backstops the duplicate check.
            if let sqlx::Error::Database(db_err) = &err {
                if db_err.is_unique_violation() {
                    return StoreError::DuplicateActiveBooking {
                        excursion_id: booking.excursion_id,
                        diver_id: booking.diver_id,
                    };
                }
            }
            map_sqlx_err(err)
        })?;

        tx.commit().await.map_err(map_sqlx_err)?;
        inserted.try_into()
    }

    async fn fetch_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Booking, StoreError> {
        let updated = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = $3, cancelled_at = COALESCE($4, cancelled_at), \
             updated_at = now() WHERE id = $1 AND status = $2 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(cancelled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                let current = self
                    .fetch_booking(id)
                    .await?
                    .ok_or(StoreError::BookingNotFound(id))?;
                Err(StoreError::BookingStatusConflict {
                    booking_id: id,
                    expected,
                    actual: current.status,
                })
            }
        }
    }

    async fn has_active_booking(
        &self,
        excursion_id: Uuid,
        diver_id: Uuid,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE excursion_id = $1 AND diver_id = $2 \
             AND status IN ('confirmed', 'checked_in'))",
        )
        .bind(excursion_id)
        .bind(diver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn active_booking_count(&self, excursion_id: Uuid) -> Result<u32, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM bookings WHERE excursion_id = $1 \
             AND status IN ('confirmed', 'checked_in')",
        )
        .bind(excursion_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u32)
    }

    async fn list_bookings(&self, excursion_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE excursion_id = $1 ORDER BY created_at"
        ))
        .bind(excursion_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn insert_roster_entry(&self, entry: RosterEntry) -> Result<RosterEntry, StoreError> {
        sqlx::query(
            "INSERT INTO roster_entries (id, excursion_id, diver_id, booking_id, checked_in_by, \
             checked_in_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.excursion_id)
        .bind(entry.diver_id)
        .bind(entry.booking_id)
        .bind(entry.checked_in_by)
        .bind(entry.checked_in_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(entry)
    }

    async fn roster_for_excursion(
        &self,
        excursion_id: Uuid,
    ) -> Result<Vec<RosterEntry>, StoreError> {
        let rows = sqlx::query_as::<_, RosterRow>(
            "SELECT id, excursion_id, diver_id, booking_id, checked_in_by, checked_in_at \
             FROM roster_entries WHERE excursion_id = $1 ORDER BY checked_in_at",
        )
        .bind(excursion_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(RosterEntry::from).collect())
    }
}

#[async_trait]
impl SettlementRepository for PgStore {
    async fn insert_or_fetch_settlement(
        &self,
        record: SettlementRecord,
    ) -> Result<SettlementRecord, StoreError> {
        // ON CONFLICT DO NOTHING makes the existence-check-and-insert
        // atomic; the loser of a race falls through to fetch the winner's
        // committed row.
        let inserted = sqlx::query_as::<_, SettlementRow>(&format!(
            "INSERT INTO settlement_records ({SETTLEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (booking_id, settlement_type) DO NOTHING \
             RETURNING {SETTLEMENT_COLUMNS}"
        ))
        .bind(record.id)
        .bind(record.booking_id)
        .bind(record.settlement_type.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.processed_by)
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(row) = inserted {
            return row.try_into();
        }

        let existing = self
            .fetch_settlement(record.booking_id, record.settlement_type)
            .await?;
        existing.ok_or_else(|| {
            StoreError::Backend(format!(
                "settlement for booking {} vanished after conflict",
                record.booking_id
            ))
        })
    }

    async fn settlements_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<SettlementRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement_records WHERE booking_id = $1 \
             ORDER BY created_at"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(SettlementRecord::try_from).collect()
    }

    async fn fetch_settlement(
        &self,
        booking_id: Uuid,
        settlement_type: SettlementType,
    ) -> Result<Option<SettlementRecord>, StoreError> {
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlement_records \
             WHERE booking_id = $1 AND settlement_type = $2"
        ))
        .bind(booking_id)
        .bind(settlement_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(SettlementRecord::try_from).transpose()
    }
}
