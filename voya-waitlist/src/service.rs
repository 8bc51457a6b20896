use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voya_core::allocation::{allocate_after_rooms_freed, AllocationOutcome, AllocationPolicy};
use voya_core::gate::{check_priority, PriorityDecision};
use voya_core::models::{Booking, EntryStatus, Trip, WaitingListEntry};
use voya_core::notify::{self, Notifier};
use voya_core::queue::TripQueue;
use voya_core::repository::{TripUnitOfWork, WaitlistRepository};
use voya_core::window::WaitEstimate;
use voya_core::{Clock, CoreError, CoreResult};
use voya_shared::models::events::Notification;

use crate::retry::{with_conflict_retry, RetryPolicy};

/// What a queued user sees about their place in line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub entry_id: Uuid,
    pub trip_id: Uuid,
    pub user_id: String,
    pub status: EntryStatus,
    pub position: u32,
    pub queue_depth: u32,
    pub rooms_requested: u32,
    /// Window a turn granted now would get.
    pub window_hours: u32,
    pub estimate: WaitEstimate,
    pub message: String,
}

impl PositionView {
    fn new(
        queue: &TripQueue,
        entry: &WaitingListEntry,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let window_hours = policy.current_window_hours(queue, now);
        let estimate = match entry.notification_expires_at {
            Some(expires_at) if entry.holds_turn(now) => WaitEstimate::YourTurn { expires_at },
            // overdue but not swept yet
            Some(expired_at) if entry.status == EntryStatus::Notified => {
                WaitEstimate::TurnLapsed { expired_at }
            }
            _ => policy.window.estimate_wait(entry.position, window_hours),
        };

        Self {
            entry_id: entry.id,
            trip_id: entry.trip_id,
            user_id: entry.user_id.clone(),
            status: entry.status,
            position: entry.position,
            queue_depth: queue.queue_depth(),
            rooms_requested: entry.rooms_requested,
            window_hours,
            message: estimate.message(),
            estimate,
        }
    }
}

/// Admin view of a trip and its active queue.
#[derive(Debug, Clone, Serialize)]
pub struct TripWaitlist {
    pub trip: Trip,
    pub entries: Vec<WaitingListEntry>,
    pub active_turn: Option<Uuid>,
    pub window_hours: u32,
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryOutcome {
    pub expired: usize,
    pub granted: bool,
}

/// Orchestrates every waiting-list operation: one trip lock per call, pure
/// queue logic from `voya-core` inside it, notifications after commit.
pub struct WaitlistService {
    repo: Arc<dyn WaitlistRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: AllocationPolicy,
    retry: RetryPolicy,
}

impl WaitlistService {
    pub fn new(
        repo: Arc<dyn WaitlistRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            notifier,
            clock,
            policy: AllocationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn repository(&self) -> &Arc<dyn WaitlistRepository> {
        &self.repo
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn save_trip(&self, trip: &Trip) -> CoreResult<Trip> {
        let saved = self.repo.save_trip(trip).await?;
        info!("Saved trip {} ({}) with {} rooms", saved.id, saved.title, saved.total_rooms);
        Ok(saved)
    }

    /// Put a user at the back of the trip's queue. Joining never grants a
    /// turn by itself.
    pub async fn join(
        &self,
        trip_id: Uuid,
        user_id: &str,
        rooms_requested: u32,
    ) -> CoreResult<PositionView> {
        with_conflict_retry(&self.retry, "join", move || {
            self.try_join(trip_id, user_id, rooms_requested)
        })
        .await
    }

    async fn try_join(
        &self,
        trip_id: Uuid,
        user_id: &str,
        rooms_requested: u32,
    ) -> CoreResult<PositionView> {
        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(trip_id).await?;

        let entry = uow.queue_mut().enqueue(user_id, rooms_requested, now)?;
        let view = PositionView::new(uow.queue(), &entry, &self.policy, now);
        uow.commit().await?;

        info!(
            "User {} joined waiting list for trip {} at position {}",
            user_id, trip_id, entry.position
        );
        Ok(view)
    }

    /// Remove the user's active entry. If they held the turn, the next
    /// eligible waiter gets it.
    pub async fn leave(&self, trip_id: Uuid, user_id: &str) -> CoreResult<WaitingListEntry> {
        let (entry, notifications) = with_conflict_retry(&self.retry, "leave", move || {
            self.try_leave(trip_id, user_id)
        })
        .await?;
        self.dispatch(notifications).await;
        Ok(entry)
    }

    async fn try_leave(
        &self,
        trip_id: Uuid,
        user_id: &str,
    ) -> CoreResult<(WaitingListEntry, Vec<Notification>)> {
        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(trip_id).await?;

        let entry_id = uow
            .queue()
            .active_entry_for(user_id)
            .map(|e| e.id)
            .ok_or_else(|| CoreError::EntryNotFound(user_id.to_string()))?;

        let compaction = uow.queue_mut().dequeue(entry_id, EntryStatus::Cancelled)?;
        let moved: Vec<Uuid> = compaction.shifted.iter().map(|e| e.id).collect();

        let outcome = self.allocate(uow.as_mut(), now).await?;
        let notifications = follow_up(uow.queue(), &outcome, &moved, &self.policy, now);
        uow.commit().await?;

        info!("User {} left waiting list for trip {}", user_id, trip_id);
        Ok((compaction.removed, notifications))
    }

    /// Create a confirmed booking. The priority gate is re-checked under the
    /// trip lock, so a blocked user can never reserve rooms.
    pub async fn book(&self, trip_id: Uuid, user_id: &str, rooms: u32) -> CoreResult<Booking> {
        let (booking, notifications) = with_conflict_retry(&self.retry, "book", move || {
            self.try_book(trip_id, user_id, rooms)
        })
        .await?;
        self.dispatch(notifications).await;
        Ok(booking)
    }

    async fn try_book(
        &self,
        trip_id: Uuid,
        user_id: &str,
        rooms: u32,
    ) -> CoreResult<(Booking, Vec<Notification>)> {
        if rooms == 0 {
            return Err(CoreError::InvalidRoomCount);
        }

        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(trip_id).await?;

        check_priority(uow.queue(), user_id, now).into_result()?;
        uow.queue_mut().trip_mut().reserve_rooms(rooms)?;

        let booking = Booking::confirmed(trip_id, user_id.to_string(), rooms, now);
        uow.insert_booking(&booking).await?;

        let mut moved = Vec::new();
        let queued = uow.queue().active_entry_for(user_id).map(|e| e.id);
        if let Some(entry_id) = queued {
            let compaction = uow.queue_mut().dequeue(entry_id, EntryStatus::Booked)?;
            moved.extend(compaction.shifted.iter().map(|e| e.id));
        }

        let outcome = self.allocate(uow.as_mut(), now).await?;
        let notifications = follow_up(uow.queue(), &outcome, &moved, &self.policy, now);
        uow.commit().await?;

        info!(
            "Booking {} confirmed: {} rooms on trip {} for {}",
            booking.id, rooms, trip_id, user_id
        );
        Ok((booking, notifications))
    }

    /// Cancel a confirmed booking, return its rooms and offer them to the queue.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let (booking, notifications) = with_conflict_retry(&self.retry, "cancel_booking", move || {
            self.try_cancel_booking(booking_id)
        })
        .await?;
        self.dispatch(notifications).await;
        Ok(booking)
    }

    async fn try_cancel_booking(
        &self,
        booking_id: Uuid,
    ) -> CoreResult<(Booking, Vec<Notification>)> {
        let booking = self
            .repo
            .booking(booking_id)
            .await?
            .ok_or(CoreError::BookingNotFound(booking_id))?;

        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(booking.trip_id).await?;

        let cancelled = uow.cancel_booking(booking_id).await?;
        uow.queue_mut().trip_mut().release_rooms(cancelled.number_of_rooms)?;

        let outcome = self.allocate(uow.as_mut(), now).await?;
        let notifications = follow_up(uow.queue(), &outcome, &[], &self.policy, now);
        uow.commit().await?;

        info!(
            "Booking {} cancelled, {} rooms back on trip {}",
            booking_id, cancelled.number_of_rooms, cancelled.trip_id
        );
        Ok((cancelled, notifications))
    }

    /// Admin capacity increase.
    pub async fn add_rooms(&self, trip_id: Uuid, rooms: u32) -> CoreResult<Trip> {
        let (trip, notifications) = with_conflict_retry(&self.retry, "add_rooms", move || {
            self.try_add_rooms(trip_id, rooms)
        })
        .await?;
        self.dispatch(notifications).await;
        Ok(trip)
    }

    async fn try_add_rooms(
        &self,
        trip_id: Uuid,
        rooms: u32,
    ) -> CoreResult<(Trip, Vec<Notification>)> {
        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(trip_id).await?;

        uow.queue_mut().trip_mut().add_rooms(rooms)?;

        let outcome = self.allocate(uow.as_mut(), now).await?;
        let notifications = follow_up(uow.queue(), &outcome, &[], &self.policy, now);
        let trip = uow.queue().trip().clone();
        uow.commit().await?;

        info!("Added {} rooms to trip {} ({} available)", rooms, trip_id, trip.available_rooms);
        Ok((trip, notifications))
    }

    /// Expire every overdue turn on the trip, then re-run allocation.
    /// Running it again right away changes nothing.
    pub async fn expire_turns(&self, trip_id: Uuid) -> CoreResult<ExpiryOutcome> {
        let (outcome, notifications) = with_conflict_retry(&self.retry, "expire_turns", move || {
            self.try_expire_turns(trip_id)
        })
        .await?;
        self.dispatch(notifications).await;
        Ok(outcome)
    }

    async fn try_expire_turns(
        &self,
        trip_id: Uuid,
    ) -> CoreResult<(ExpiryOutcome, Vec<Notification>)> {
        let now = self.clock.now();
        let mut uow = self.repo.lock_trip(trip_id).await?;

        let expired = uow.queue().expired_turns(now);
        if expired.is_empty() {
            return Ok((ExpiryOutcome::default(), Vec::new()));
        }

        let mut notifications = Vec::new();
        let mut moved: Vec<Uuid> = Vec::new();
        for entry_id in &expired {
            let compaction = uow.queue_mut().dequeue(*entry_id, EntryStatus::Expired)?;
            info!(
                "Turn of {} on trip {} expired at position {}",
                compaction.removed.user_id, trip_id, compaction.removed.position
            );
            notifications.push(notify::turn_expired(uow.queue(), &compaction.removed, now));
            for entry in compaction.shifted {
                if !moved.contains(&entry.id) {
                    moved.push(entry.id);
                }
            }
        }

        let outcome = self.allocate(uow.as_mut(), now).await?;
        notifications.extend(follow_up(uow.queue(), &outcome, &moved, &self.policy, now));
        uow.commit().await?;

        Ok((
            ExpiryOutcome {
                expired: expired.len(),
                granted: outcome.grant.is_some(),
            },
            notifications,
        ))
    }

    /// The user's active entry with a wait estimate.
    pub async fn position(&self, trip_id: Uuid, user_id: &str) -> CoreResult<PositionView> {
        with_conflict_retry(&self.retry, "position", move || {
            self.try_position(trip_id, user_id)
        })
        .await
    }

    async fn try_position(&self, trip_id: Uuid, user_id: &str) -> CoreResult<PositionView> {
        let now = self.clock.now();
        let uow = self.repo.lock_trip(trip_id).await?;
        let queue = uow.queue();

        let entry = queue
            .active_entry_for(user_id)
            .ok_or_else(|| CoreError::EntryNotFound(user_id.to_string()))?;
        Ok(PositionView::new(queue, entry, &self.policy, now))
    }

    /// Advisory: booking re-checks under the lock.
    pub async fn check_priority(
        &self,
        trip_id: Uuid,
        user_id: &str,
    ) -> CoreResult<PriorityDecision> {
        with_conflict_retry(&self.retry, "check_priority", move || {
            self.try_check_priority(trip_id, user_id)
        })
        .await
    }

    async fn try_check_priority(
        &self,
        trip_id: Uuid,
        user_id: &str,
    ) -> CoreResult<PriorityDecision> {
        let now = self.clock.now();
        let uow = self.repo.lock_trip(trip_id).await?;
        Ok(check_priority(uow.queue(), user_id, now))
    }

    pub async fn waitlist(&self, trip_id: Uuid) -> CoreResult<TripWaitlist> {
        with_conflict_retry(&self.retry, "waitlist", move || self.try_waitlist(trip_id)).await
    }

    async fn try_waitlist(&self, trip_id: Uuid) -> CoreResult<TripWaitlist> {
        let now = self.clock.now();
        let uow = self.repo.lock_trip(trip_id).await?;
        let queue = uow.queue();

        Ok(TripWaitlist {
            trip: queue.trip().clone(),
            entries: queue.ordered_active().into_iter().cloned().collect(),
            active_turn: queue.active_turn_holder(now).map(|e| e.id),
            window_hours: self.policy.current_window_hours(queue, now),
            utilization: queue.trip().utilization(),
        })
    }

    async fn allocate(
        &self,
        uow: &mut dyn TripUnitOfWork,
        now: DateTime<Utc>,
    ) -> CoreResult<AllocationOutcome> {
        let queue = uow.queue();
        if !queue.trip().has_free_rooms() || queue.active_turn_holder(now).is_some() {
            return Ok(AllocationOutcome::default());
        }

        let users: Vec<String> = queue
            .ordered_waiting()
            .iter()
            .map(|e| e.user_id.clone())
            .collect();
        if users.is_empty() {
            return Ok(AllocationOutcome::default());
        }

        let active_bookings = uow.confirmed_future_bookings(&users, now).await?;
        let outcome =
            allocate_after_rooms_freed(uow.queue_mut(), &active_bookings, &self.policy, now)?;
        for skipped in &outcome.skipped {
            debug!(
                "Skipped {} on trip {}: {:?}",
                skipped.user_id,
                uow.queue().trip().id,
                skipped.reason
            );
        }
        Ok(outcome)
    }

    async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in &notifications {
            if let Err(e) = self.notifier.notify(notification).await {
                warn!(
                    "Failed to deliver {} notification to {}: {}",
                    notification.kind().as_str(),
                    notification.user_id,
                    e
                );
            }
        }
    }
}

/// Notifications owed after a queue change: the allocation's own messages
/// when a turn was granted, otherwise position updates for the waiters that
/// moved up.
fn follow_up(
    queue: &TripQueue,
    outcome: &AllocationOutcome,
    moved: &[Uuid],
    policy: &AllocationPolicy,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    if outcome.grant.is_some() {
        return outcome.notifications(queue, policy, now);
    }

    let waiting = moved
        .iter()
        .filter_map(|id| queue.entry(*id))
        .filter(|e| e.status == EntryStatus::Waiting);
    notify::position_updates(queue, waiting, policy, now)
}
