use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What a waiting-list notification is about.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TurnGranted,
    PositionUpdated,
    TurnExpired,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TurnGranted => "TURN_GRANTED",
            NotificationKind::PositionUpdated => "POSITION_UPDATED",
            NotificationKind::TurnExpired => "TURN_EXPIRED",
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TurnGrantedEvent {
    pub entry_id: Uuid,
    pub trip_title: String,
    pub rooms_requested: u32,
    pub window_hours: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PositionUpdatedEvent {
    pub entry_id: Uuid,
    pub trip_title: String,
    pub position: u32,
    pub queue_depth: u32,
    pub estimate: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TurnExpiredEvent {
    pub entry_id: Uuid,
    pub trip_title: String,
    pub expired_at: DateTime<Utc>,
}

/// Payload carried by a notification, tagged by kind on the wire.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistEvent {
    TurnGranted(TurnGrantedEvent),
    PositionUpdated(PositionUpdatedEvent),
    TurnExpired(TurnExpiredEvent),
}

impl WaitlistEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            WaitlistEvent::TurnGranted(_) => NotificationKind::TurnGranted,
            WaitlistEvent::PositionUpdated(_) => NotificationKind::PositionUpdated,
            WaitlistEvent::TurnExpired(_) => NotificationKind::TurnExpired,
        }
    }
}

/// A message for one user about one trip's waiting list.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub user_id: String,
    pub trip_id: Uuid,
    pub event: WaitlistEvent,
    pub timestamp: i64,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        trip_id: Uuid,
        event: WaitlistEvent,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            trip_id,
            event,
            timestamp: at.timestamp(),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.event.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_with_kind() {
        let event = WaitlistEvent::TurnExpired(TurnExpiredEvent {
            entry_id: Uuid::new_v4(),
            trip_title: "Lisbon".to_string(),
            expired_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "TURN_EXPIRED");
        assert_eq!(json["trip_title"], "Lisbon");
        assert_eq!(event.kind().as_str(), "TURN_EXPIRED");
    }
}
