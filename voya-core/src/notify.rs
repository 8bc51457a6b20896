use async_trait::async_trait;
use chrono::{DateTime, Utc};
use voya_shared::models::events::{
    Notification, PositionUpdatedEvent, TurnExpiredEvent, WaitlistEvent,
};

use crate::allocation::AllocationPolicy;
use crate::models::WaitingListEntry;
use crate::queue::TripQueue;

pub type NotifyResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Delivery of waiting-list messages to users.
///
/// Best effort: an error is logged by the caller and never undoes the state
/// change that produced the notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> NotifyResult;
}

/// PositionUpdated for each given entry, with a fresh wait estimate.
pub fn position_updates<'a>(
    queue: &TripQueue,
    entries: impl IntoIterator<Item = &'a WaitingListEntry>,
    policy: &AllocationPolicy,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let window_hours = policy.current_window_hours(queue, now);
    let depth = queue.queue_depth();

    entries
        .into_iter()
        .map(|entry| {
            let estimate = policy.window.estimate_wait(entry.position, window_hours);
            Notification::new(
                entry.user_id.clone(),
                queue.trip().id,
                WaitlistEvent::PositionUpdated(PositionUpdatedEvent {
                    entry_id: entry.id,
                    trip_title: queue.trip().title.clone(),
                    position: entry.position,
                    queue_depth: depth,
                    estimate: estimate.message(),
                }),
                now,
            )
        })
        .collect()
}

pub fn turn_expired(
    queue: &TripQueue,
    entry: &WaitingListEntry,
    now: DateTime<Utc>,
) -> Notification {
    Notification::new(
        entry.user_id.clone(),
        queue.trip().id,
        WaitlistEvent::TurnExpired(TurnExpiredEvent {
            entry_id: entry.id,
            trip_title: queue.trip().title.clone(),
            expired_at: entry.notification_expires_at.unwrap_or(now),
        }),
        now,
    )
}
