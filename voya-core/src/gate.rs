use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::queue::TripQueue;
use crate::{CoreError, CoreResult};

/// Outcome of the admission check run before every booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityDecision {
    Allowed,
    Blocked {
        reason: String,
        holder_position: u32,
        holder_expires_at: DateTime<Utc>,
    },
}

impl PriorityDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PriorityDecision::Allowed)
    }

    pub fn into_result(self) -> CoreResult<()> {
        match self {
            PriorityDecision::Allowed => Ok(()),
            PriorityDecision::Blocked {
                reason,
                holder_expires_at,
                ..
            } => Err(CoreError::PriorityBlocked {
                reason,
                expires_at: holder_expires_at,
            }),
        }
    }
}

/// Allowed when nobody holds an unexpired turn on the trip, or when the
/// holder is `user_id`.
///
/// Standalone calls are advisory: state can change between requests. The
/// booking path re-runs this under the trip lock before reserving rooms.
pub fn check_priority(queue: &TripQueue, user_id: &str, now: DateTime<Utc>) -> PriorityDecision {
    match queue.active_turn_holder(now) {
        None => PriorityDecision::Allowed,
        Some(holder) if holder.user_id == user_id => PriorityDecision::Allowed,
        Some(holder) => {
            // holds_turn() guarantees the expiry is set
            let expires_at = holder.notification_expires_at.unwrap_or(now);
            PriorityDecision::Blocked {
                reason: format!(
                    "The traveller at position {} on the waiting list has priority to book \"{}\" \
                     until {} UTC. If they don't book by then, the next person in line gets \
                     their turn.",
                    holder.position,
                    queue.trip().title,
                    expires_at.format("%Y-%m-%d %H:%M")
                ),
                holder_position: holder.position,
                holder_expires_at: expires_at,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trip;
    use chrono::{Duration, NaiveDate};

    fn trip() -> Trip {
        Trip::new("Kyoto Autumn Colours", 1, NaiveDate::from_ymd_opt(2031, 11, 2).unwrap())
    }

    fn queue_with_holder(now: DateTime<Utc>) -> TripQueue {
        let mut queue = TripQueue::new(trip(), Vec::new());
        let holder = queue.enqueue("holder", 1, now).unwrap();
        queue.enqueue("waiter", 1, now).unwrap();
        queue.grant_turn(holder.id, now, Duration::hours(6)).unwrap();
        queue
    }

    #[test]
    fn test_open_when_nobody_holds_turn() {
        let now = Utc::now();
        let queue = TripQueue::new(trip(), Vec::new());
        assert!(check_priority(&queue, "anyone", now).is_allowed());
    }

    #[test]
    fn test_holder_is_allowed_others_blocked() {
        let now = Utc::now();
        let queue = queue_with_holder(now);

        assert!(check_priority(&queue, "holder", now).is_allowed());

        let decision = check_priority(&queue, "waiter", now);
        match &decision {
            PriorityDecision::Blocked {
                holder_position,
                holder_expires_at,
                reason,
            } => {
                assert_eq!(*holder_position, 1);
                assert_eq!(*holder_expires_at, now + Duration::hours(6));
                assert!(reason.contains("Kyoto"));
            }
            other => panic!("expected block, got {:?}", other),
        }
        assert!(matches!(decision.into_result(), Err(CoreError::PriorityBlocked { .. })));

        assert!(!check_priority(&queue, "walk-in", now).is_allowed());
    }

    #[test]
    fn test_expired_turn_does_not_block() {
        let now = Utc::now();
        let queue = queue_with_holder(now);
        assert!(check_priority(&queue, "waiter", now + Duration::hours(7)).is_allowed());
    }
}
