use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;
use voya_shared::models::events::{Notification, TurnGrantedEvent, WaitlistEvent};

use crate::models::WaitingListEntry;
use crate::notify;
use crate::queue::TripQueue;
use crate::window::{days_until_trip, BookingWindowPolicy};
use crate::CoreResult;

pub const DEFAULT_MAX_ACTIVE_BOOKINGS: u32 = 3;

/// Knobs of the allocation scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub window: BookingWindowPolicy,
    /// Users with this many confirmed future bookings are skipped.
    pub max_active_bookings: u32,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            window: BookingWindowPolicy::default(),
            max_active_bookings: DEFAULT_MAX_ACTIVE_BOOKINGS,
        }
    }
}

impl AllocationPolicy {
    /// The window a turn granted right now on this trip would get.
    pub fn current_window_hours(&self, queue: &TripQueue, now: DateTime<Utc>) -> u32 {
        let days = days_until_trip(queue.trip().start_date, now);
        self.window.window_hours(days, queue.queue_depth())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooManyRooms { requested: u32, available: u32 },
    BookingCapReached { active_bookings: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub entry_id: Uuid,
    pub user_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnGrant {
    pub entry: WaitingListEntry,
    pub window_hours: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub grant: Option<TurnGrant>,
    pub skipped: Vec<SkippedEntry>,
}

impl AllocationOutcome {
    /// TurnGranted for the winner, PositionUpdated for everyone still waiting.
    /// Nothing when no turn was granted.
    pub fn notifications(
        &self,
        queue: &TripQueue,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let Some(grant) = &self.grant else {
            return Vec::new();
        };

        let expires_at = grant.entry.notification_expires_at.unwrap_or(now);
        let mut out = vec![Notification::new(
            grant.entry.user_id.clone(),
            queue.trip().id,
            WaitlistEvent::TurnGranted(TurnGrantedEvent {
                entry_id: grant.entry.id,
                trip_title: queue.trip().title.clone(),
                rooms_requested: grant.entry.rooms_requested,
                window_hours: grant.window_hours,
                expires_at,
            }),
            now,
        )];

        let waiting: Vec<&WaitingListEntry> = queue.ordered_waiting();
        out.extend(notify::position_updates(queue, waiting, policy, now));
        out
    }
}

/// Grant at most one turn after capacity was freed on the trip.
///
/// `active_bookings` maps user ids to their confirmed future booking count;
/// missing users count as zero. The scan is a no-op when no rooms are free
/// or someone already holds an unexpired turn.
pub fn allocate_after_rooms_freed(
    queue: &mut TripQueue,
    active_bookings: &HashMap<String, u32>,
    policy: &AllocationPolicy,
    now: DateTime<Utc>,
) -> CoreResult<AllocationOutcome> {
    let mut outcome = AllocationOutcome::default();

    let available = queue.trip().available_rooms;
    if available == 0 || queue.active_turn_holder(now).is_some() {
        return Ok(outcome);
    }

    let candidates: Vec<(Uuid, String, u32)> = queue
        .ordered_waiting()
        .into_iter()
        .map(|e| (e.id, e.user_id.clone(), e.rooms_requested))
        .collect();

    let mut winner = None;
    for (entry_id, user_id, rooms_requested) in candidates {
        if rooms_requested > available {
            outcome.skipped.push(SkippedEntry {
                entry_id,
                user_id,
                reason: SkipReason::TooManyRooms {
                    requested: rooms_requested,
                    available,
                },
            });
            continue;
        }

        let bookings = active_bookings.get(&user_id).copied().unwrap_or(0);
        if bookings >= policy.max_active_bookings {
            outcome.skipped.push(SkippedEntry {
                entry_id,
                user_id,
                reason: SkipReason::BookingCapReached {
                    active_bookings: bookings,
                },
            });
            continue;
        }

        winner = Some(entry_id);
        break;
    }

    if let Some(entry_id) = winner {
        let window_hours = policy.current_window_hours(queue, now);
        let entry = queue.grant_turn(entry_id, now, chrono::Duration::hours(window_hours as i64))?;
        tracing::info!(
            "Granted turn on trip {} to {} at position {} for {}h",
            queue.trip().id,
            entry.user_id,
            entry.position,
            window_hours
        );
        outcome.grant = Some(TurnGrant { entry, window_hours });
    }

    Ok(outcome)
}
