use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Booking, Trip};
use crate::queue::TripQueue;
use crate::CoreResult;

/// Persistence for trips, their waiting lists and the bookings the waiting
/// list reads.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Lock the trip row and load its queue. The lock is held until the
    /// returned unit of work is committed or dropped; dropping it discards
    /// every change.
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripUnitOfWork>>;

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>>;

    /// Trips with at least one Notified entry whose window ended before `now`.
    async fn trips_with_expired_turns(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>>;

    /// Insert a trip, or update the catalog fields (title, start date) of an
    /// existing one. Room counts of existing trips only change through the
    /// inventory operations.
    async fn save_trip(&self, trip: &Trip) -> CoreResult<Trip>;
}

/// One trip's queue and inventory, exclusively held.
#[async_trait]
pub trait TripUnitOfWork: Send {
    fn queue(&self) -> &TripQueue;

    fn queue_mut(&mut self) -> &mut TripQueue;

    /// Confirmed bookings on trips departing after `now`, per user.
    async fn confirmed_future_bookings(
        &mut self,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> CoreResult<HashMap<String, u32>>;

    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()>;

    /// Mark a confirmed booking on this trip as cancelled and return it.
    async fn cancel_booking(&mut self, booking_id: Uuid) -> CoreResult<Booking>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
