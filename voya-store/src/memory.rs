use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use voya_core::models::{Booking, BookingStatus, Trip};
use voya_core::queue::TripQueue;
use voya_core::repository::{TripUnitOfWork, WaitlistRepository};
use voya_core::{CoreError, CoreResult};

#[derive(Debug, Clone)]
struct StoredBooking {
    booking: Booking,
    start_date: NaiveDate,
}

type BookingTable = Arc<StdMutex<HashMap<Uuid, StoredBooking>>>;

/// Process-local repository. Each trip sits behind its own async mutex, so
/// units of work on one trip run one at a time while other trips proceed.
#[derive(Default)]
pub struct InMemoryWaitlistRepository {
    trips: RwLock<HashMap<Uuid, Arc<Mutex<TripQueue>>>>,
    bookings: BookingTable,
    #[cfg(any(test, feature = "test-util"))]
    injected_conflicts: AtomicU32,
}

impl InMemoryWaitlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `lock_trip` fail with a concurrency conflict.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_locks(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Committed state of a trip's queue.
    pub async fn snapshot(&self, trip_id: Uuid) -> Option<TripQueue> {
        let slot = self.slot(trip_id)?;
        let queue = slot.lock().await;
        Some(queue.clone())
    }

    fn slot(&self, trip_id: Uuid) -> Option<Arc<Mutex<TripQueue>>> {
        let trips = self.trips.read().unwrap_or_else(PoisonError::into_inner);
        trips.get(&trip_id).cloned()
    }

    #[cfg(any(test, feature = "test-util"))]
    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryWaitlistRepository {
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripUnitOfWork>> {
        #[cfg(any(test, feature = "test-util"))]
        {
            if self.take_injected_conflict() {
                return Err(CoreError::ConcurrencyConflict(format!("trip {} is busy", trip_id)));
            }
        }

        let slot = self.slot(trip_id).ok_or(CoreError::TripNotFound(trip_id))?;
        let guard = slot.lock_owned().await;
        let queue = guard.clone();

        Ok(Box::new(MemoryTripUnitOfWork {
            guard,
            queue,
            inserted: Vec::new(),
            cancelled: Vec::new(),
            bookings: Arc::clone(&self.bookings),
        }))
    }

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        let table = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(table.get(&booking_id).map(|stored| stored.booking.clone()))
    }

    async fn trips_with_expired_turns(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>> {
        let slots: Vec<(Uuid, Arc<Mutex<TripQueue>>)> = {
            let trips = self.trips.read().unwrap_or_else(PoisonError::into_inner);
            trips.iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect()
        };

        let mut out = Vec::new();
        for (trip_id, slot) in slots {
            let queue = slot.lock().await;
            if !queue.expired_turns(now).is_empty() {
                out.push(trip_id);
            }
        }
        Ok(out)
    }

    async fn save_trip(&self, trip: &Trip) -> CoreResult<Trip> {
        if let Some(slot) = self.slot(trip.id) {
            let mut queue = slot.lock().await;
            let stored = queue.trip_mut();
            stored.title = trip.title.clone();
            stored.start_date = trip.start_date;

            let mut table = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
            for booking in table.values_mut().filter(|b| b.booking.trip_id == trip.id) {
                booking.start_date = trip.start_date;
            }
            return Ok(queue.trip().clone());
        }

        let mut fresh = trip.clone();
        fresh.available_rooms = fresh.available_rooms.min(fresh.total_rooms);

        let mut trips = self.trips.write().unwrap_or_else(PoisonError::into_inner);
        let slot = trips
            .entry(trip.id)
            .or_insert_with(|| Arc::new(Mutex::new(TripQueue::new(fresh.clone(), Vec::new()))));
        // lost a race with another insert of the same id
        let saved = match slot.try_lock() {
            Ok(queue) => queue.trip().clone(),
            Err(_) => fresh,
        };
        Ok(saved)
    }
}

/// Holds the trip's mutex for its whole lifetime. Queue changes and staged
/// booking writes are applied on commit; dropping discards them.
pub struct MemoryTripUnitOfWork {
    guard: OwnedMutexGuard<TripQueue>,
    queue: TripQueue,
    inserted: Vec<StoredBooking>,
    cancelled: Vec<Uuid>,
    bookings: BookingTable,
}

#[async_trait]
impl TripUnitOfWork for MemoryTripUnitOfWork {
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
        let today = now.date_naive();
        let counts_toward = |stored: &StoredBooking| {
            stored.booking.status == BookingStatus::Confirmed
                && stored.start_date > today
                && user_ids.contains(&stored.booking.user_id)
        };

        let mut counts: HashMap<String, u32> = HashMap::new();
        {
            let table = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
            for stored in table.values() {
                if counts_toward(stored) && !self.cancelled.contains(&stored.booking.id) {
                    *counts.entry(stored.booking.user_id.clone()).or_default() += 1;
                }
            }
        }
        for stored in &self.inserted {
            if counts_toward(stored) && !self.cancelled.contains(&stored.booking.id) {
                *counts.entry(stored.booking.user_id.clone()).or_default() += 1;
            }
        }
        Ok(counts)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        self.inserted.push(StoredBooking {
            booking: booking.clone(),
            start_date: self.queue.trip().start_date,
        });
        Ok(())
    }

    async fn cancel_booking(&mut self, booking_id: Uuid) -> CoreResult<Booking> {
        let trip_id = self.queue.trip().id;
        let staged = self.inserted.iter().find(|b| b.booking.id == booking_id).cloned();
        let stored = match staged {
            Some(stored) => Some(stored),
            None => {
                let table = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
                table.get(&booking_id).cloned()
            }
        };

        let mut booking = match stored {
            Some(stored) if stored.booking.trip_id == trip_id => stored.booking,
            _ => return Err(CoreError::BookingNotFound(booking_id)),
        };

        if booking.status != BookingStatus::Confirmed || self.cancelled.contains(&booking_id) {
            return Err(CoreError::InvalidTransition {
                from: BookingStatus::Cancelled.as_str().to_string(),
                to: BookingStatus::Cancelled.as_str().to_string(),
            });
        }

        self.cancelled.push(booking_id);
        booking.status = BookingStatus::Cancelled;
        Ok(booking)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryTripUnitOfWork {
            mut guard,
            queue,
            inserted,
            cancelled,
            bookings,
        } = *self;

        {
            let mut table = bookings.lock().unwrap_or_else(PoisonError::into_inner);
            for stored in inserted {
                table.insert(stored.booking.id, stored);
            }
            for booking_id in cancelled {
                if let Some(stored) = table.get_mut(&booking_id) {
                    stored.booking.status = BookingStatus::Cancelled;
                }
            }
        }

        *guard = queue;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    async fn repo_with_trip(rooms: u32) -> (InMemoryWaitlistRepository, Uuid) {
        let repo = InMemoryWaitlistRepository::new();
        let start = Utc::now().date_naive() + Duration::days(40);
        let trip = repo.save_trip(&Trip::new("Dolomites Hut to Hut", rooms, start)).await.unwrap();
        (repo, trip.id)
    }

    #[tokio::test]
    async fn test_commit_persists_and_drop_discards() {
        let (repo, trip_id) = repo_with_trip(2).await;
        let now = Utc::now();

        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        uow.queue_mut().enqueue("kept", 1, now).unwrap();
        uow.commit().await.unwrap();

        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        uow.queue_mut().enqueue("discarded", 1, now).unwrap();
        uow.queue_mut().trip_mut().reserve_rooms(2).unwrap();
        drop(uow);

        let snapshot = repo.snapshot(trip_id).await.unwrap();
        assert_eq!(snapshot.queue_depth(), 1);
        assert!(snapshot.active_entry_for("kept").is_some());
        assert_eq!(snapshot.trip().available_rooms, 2);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_trip() {
        let (repo, trip_id) = repo_with_trip(1).await;
        let other = repo
            .save_trip(&Trip::new("Faroe Islands", 1, Utc::now().date_naive() + Duration::days(10)))
            .await
            .unwrap();

        let held = repo.lock_trip(trip_id).await.unwrap();

        let wait = StdDuration::from_millis(50);
        let blocked = tokio::time::timeout(wait, repo.lock_trip(trip_id)).await;
        assert!(blocked.is_err(), "second lock on the same trip must wait");

        // other trips are unaffected
        let unrelated = tokio::time::timeout(wait, repo.lock_trip(other.id)).await;
        assert!(unrelated.is_ok());

        drop(held);
        assert!(repo.lock_trip(trip_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_trip() {
        let repo = InMemoryWaitlistRepository::new();
        let missing = Uuid::new_v4();
        assert_eq!(repo.lock_trip(missing).await.err(), Some(CoreError::TripNotFound(missing)));
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let (repo, trip_id) = repo_with_trip(1).await;
        repo.fail_next_locks(2);

        assert!(matches!(repo.lock_trip(trip_id).await, Err(CoreError::ConcurrencyConflict(_))));
        assert!(matches!(repo.lock_trip(trip_id).await, Err(CoreError::ConcurrencyConflict(_))));
        assert!(repo.lock_trip(trip_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_booking_counts_and_cancellation() {
        let (repo, trip_id) = repo_with_trip(3).await;
        let now = Utc::now();

        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        let first = Booking::confirmed(trip_id, "maya".to_string(), 1, now);
        let second = Booking::confirmed(trip_id, "maya".to_string(), 1, now);
        uow.insert_booking(&first).await.unwrap();
        uow.insert_booking(&second).await.unwrap();

        // staged writes are visible inside the unit of work
        let counts = uow.confirmed_future_bookings(&["maya".to_string()], now).await.unwrap();
        assert_eq!(counts.get("maya"), Some(&2));
        uow.commit().await.unwrap();

        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        let cancelled = uow.cancel_booking(first.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(uow.cancel_booking(first.id).await.is_err());
        uow.commit().await.unwrap();

        assert_eq!(
            repo.booking(first.id).await.unwrap().map(|b| b.status),
            Some(BookingStatus::Cancelled)
        );
        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        let counts = uow
            .confirmed_future_bookings(&["maya".to_string(), "nobody".to_string()], now)
            .await
            .unwrap();
        assert_eq!(counts.get("maya"), Some(&1));
        assert_eq!(counts.get("nobody"), None);
    }

    #[tokio::test]
    async fn test_past_trips_do_not_count() {
        let repo = InMemoryWaitlistRepository::new();
        let now = Utc::now();
        let past = repo
            .save_trip(&Trip::new("Last Summer", 2, now.date_naive() - Duration::days(30)))
            .await
            .unwrap();

        let mut uow = repo.lock_trip(past.id).await.unwrap();
        uow.insert_booking(&Booking::confirmed(past.id, "maya".to_string(), 1, now)).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = repo.lock_trip(past.id).await.unwrap();
        let counts = uow.confirmed_future_bookings(&["maya".to_string()], now).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_expired_turn_scan() {
        let (repo, trip_id) = repo_with_trip(1).await;
        let now = Utc::now();

        let mut uow = repo.lock_trip(trip_id).await.unwrap();
        let entry = uow.queue_mut().enqueue("x", 1, now).unwrap();
        uow.queue_mut().grant_turn(entry.id, now, Duration::hours(2)).unwrap();
        uow.commit().await.unwrap();

        assert!(repo.trips_with_expired_turns(now).await.unwrap().is_empty());
        assert_eq!(
            repo.trips_with_expired_turns(now + Duration::hours(3)).await.unwrap(),
            vec![trip_id]
        );
    }
}
