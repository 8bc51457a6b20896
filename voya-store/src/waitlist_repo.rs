use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;
use voya_core::models::{Booking, BookingStatus, Trip, WaitingListEntry};
use voya_core::queue::TripQueue;
use voya_core::repository::{TripUnitOfWork, WaitlistRepository};
use voya_core::{CoreError, CoreResult};

pub struct PgWaitlistRepository {
    pool: PgPool,
}

impl PgWaitlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    title: String,
    total_rooms: i32,
    available_rooms: i32,
    start_date: NaiveDate,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            title: row.title,
            total_rooms: to_count(row.total_rooms),
            available_rooms: to_count(row.available_rooms),
            start_date: row.start_date,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: String,
    position: i32,
    rooms_requested: i32,
    joined_at: DateTime<Utc>,
    status: String,
    notified_at: Option<DateTime<Utc>>,
    notification_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for WaitingListEntry {
    type Error = CoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(WaitingListEntry {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            position: to_count(row.position),
            rooms_requested: to_count(row.rooms_requested),
            joined_at: row.joined_at,
            status: row.status.parse()?,
            notified_at: row.notified_at,
            notification_expires_at: row.notification_expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: String,
    number_of_rooms: i32,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            number_of_rooms: to_count(row.number_of_rooms),
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

fn to_count(value: i32) -> u32 {
    value.max(0) as u32
}

fn to_column(value: u32) -> CoreResult<i32> {
    i32::try_from(value).map_err(|_| CoreError::InvalidRoomCount)
}

const TRIP_COLUMNS: &str = "id, title, total_rooms, available_rooms, start_date";
const ENTRY_COLUMNS: &str = "id, trip_id, user_id, position, rooms_requested, joined_at, status, \
                             notified_at, notification_expires_at";
const BOOKING_COLUMNS: &str = "id, trip_id, user_id, number_of_rooms, status, created_at";

/// Serialization failures, deadlocks and lock timeouts are expected under
/// contention and surface as retryable conflicts.
pub(crate) fn storage_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db) => {
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01") | Some("55P03")) {
                return CoreError::ConcurrencyConflict(db.message().to_string());
            }
        }
        sqlx::Error::PoolTimedOut => {
            return CoreError::ConcurrencyConflict(
                "timed out waiting for a database connection".to_string(),
            );
        }
        _ => {}
    }
    CoreError::Storage(err.to_string())
}

#[async_trait]
impl WaitlistRepository for PgWaitlistRepository {
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripUnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let trip: Trip = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?
        .ok_or(CoreError::TripNotFound(trip_id))?
        .into();

        let rows: Vec<EntryRow> = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {} FROM waiting_list_entries WHERE trip_id = $1 ORDER BY position, joined_at",
            ENTRY_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?;

        let entries = rows
            .into_iter()
            .map(WaitingListEntry::try_from)
            .collect::<CoreResult<Vec<_>>>()?;

        debug!("Locked trip {} with {} waiting list entries", trip_id, entries.len());

        let queue = TripQueue::new(trip, entries);
        Ok(Box::new(PgTripUnitOfWork {
            tx,
            original: queue.clone(),
            queue,
        }))
    }

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn trips_with_expired_turns(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT trip_id
            FROM waiting_list_entries
            WHERE status = 'NOTIFIED' AND notification_expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn save_trip(&self, trip: &Trip) -> CoreResult<Trip> {
        let total_rooms = to_column(trip.total_rooms)?;
        let available_rooms = to_column(trip.available_rooms.min(trip.total_rooms))?;

        let row = sqlx::query_as::<_, TripRow>(&format!(
            r#"
            INSERT INTO trips (id, title, total_rooms, available_rooms, start_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET title = EXCLUDED.title, start_date = EXCLUDED.start_date, updated_at = NOW()
            RETURNING {}
            "#,
            TRIP_COLUMNS
        ))
        .bind(trip.id)
        .bind(&trip.title)
        .bind(total_rooms)
        .bind(available_rooms)
        .bind(trip.start_date)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.into())
    }
}

/// Transaction holding `FOR UPDATE` on one trip row. Changes to the queue
/// are written back on commit by diffing against the state that was loaded.
pub struct PgTripUnitOfWork {
    tx: Transaction<'static, Postgres>,
    original: TripQueue,
    queue: TripQueue,
}

#[async_trait]
impl TripUnitOfWork for PgTripUnitOfWork {
    fn queue(&self) -> &TripQueue {
        &self.queue
    }

    fn queue_mut(&mut self) -> &mut TripQueue {
        &mut self.queue
    }

    async fn confirmed_future_bookings(
        &mut self,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> CoreResult<HashMap<String, u32>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT b.user_id, COUNT(*)
            FROM bookings b
            JOIN trips t ON t.id = b.trip_id
            WHERE b.user_id = ANY($1) AND b.status = 'CONFIRMED' AND t.start_date > $2
            GROUP BY b.user_id
            "#,
        )
        .bind(user_ids.to_vec())
        .bind(now.date_naive())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|(user_id, count)| (user_id, count.max(0) as u32))
            .collect())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        let number_of_rooms = to_column(booking.number_of_rooms)?;
        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, user_id, number_of_rooms, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(&booking.user_id)
        .bind(number_of_rooms)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn cancel_booking(&mut self, booking_id: Uuid) -> CoreResult<Booking> {
        let trip_id = self.queue.trip().id;
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND trip_id = $2 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .bind(trip_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_error)?
        .ok_or(CoreError::BookingNotFound(booking_id))?;

        let mut booking = Booking::try_from(row)?;
        if booking.status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: BookingStatus::Cancelled.as_str().to_string(),
            });
        }

        sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(BookingStatus::Cancelled.as_str())
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        booking.status = BookingStatus::Cancelled;
        Ok(booking)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let PgTripUnitOfWork { mut tx, original, queue } = *self;

        let trip = queue.trip();
        if trip != original.trip() {
            let total_rooms = to_column(trip.total_rooms)?;
            let available_rooms = to_column(trip.available_rooms)?;
            sqlx::query(
                r#"
                UPDATE trips SET total_rooms = $1, available_rooms = $2, updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(total_rooms)
            .bind(available_rooms)
            .bind(trip.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        for entry in queue.entries() {
            let position = to_column(entry.position)?;
            let rooms_requested = to_column(entry.rooms_requested)?;
            match original.entry(entry.id) {
                Some(before) if before == entry => continue,
                Some(_) => {
                    sqlx::query(
                        r#"
                        UPDATE waiting_list_entries
                        SET position = $1, rooms_requested = $2, joined_at = $3, status = $4,
                            notified_at = $5, notification_expires_at = $6
                        WHERE id = $7
                        "#,
                    )
                    .bind(position)
                    .bind(rooms_requested)
                    .bind(entry.joined_at)
                    .bind(entry.status.as_str())
                    .bind(entry.notified_at)
                    .bind(entry.notification_expires_at)
                    .bind(entry.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?;
                }
                None => {
                    sqlx::query(&format!(
                        r#"
                        INSERT INTO waiting_list_entries ({})
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                        "#,
                        ENTRY_COLUMNS
                    ))
                    .bind(entry.id)
                    .bind(entry.trip_id)
                    .bind(&entry.user_id)
                    .bind(position)
                    .bind(rooms_requested)
                    .bind(entry.joined_at)
                    .bind(entry.status.as_str())
                    .bind(entry.notified_at)
                    .bind(entry.notification_expires_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?;
                }
            }
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_counts_fit_integer_columns() {
        assert_eq!(to_column(0), Ok(0));
        assert_eq!(to_column(i32::MAX as u32), Ok(i32::MAX));
        assert_eq!(to_column(u32::MAX), Err(CoreError::InvalidRoomCount));
    }

    #[test]
    fn test_lock_timeouts_are_conflicts() {
        assert!(storage_error(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!storage_error(sqlx::Error::RowNotFound).is_retryable());
    }
}
