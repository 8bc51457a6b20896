use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// A bookable travel package with a finite number of rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub title: String,
    pub total_rooms: u32,
    pub available_rooms: u32,
    pub start_date: NaiveDate,
}

impl Trip {
    pub fn new(title: impl Into<String>, total_rooms: u32, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            total_rooms,
            available_rooms: total_rooms,
            start_date,
        }
    }
}

/// Lifecycle of a waiting-list entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    Notified,
    Booked,
    Cancelled,
    Expired,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "WAITING",
            EntryStatus::Notified => "NOTIFIED",
            EntryStatus::Booked => "BOOKED",
            EntryStatus::Cancelled => "CANCELLED",
            EntryStatus::Expired => "EXPIRED",
        }
    }

    /// Waiting and Notified entries hold a place in the queue.
    pub fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Notified)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(EntryStatus::Waiting),
            "NOTIFIED" => Ok(EntryStatus::Notified),
            "BOOKED" => Ok(EntryStatus::Booked),
            "CANCELLED" => Ok(EntryStatus::Cancelled),
            "EXPIRED" => Ok(EntryStatus::Expired),
            other => Err(CoreError::Storage(format!("unknown entry status: {}", other))),
        }
    }
}

/// One user's place in a trip's waiting list. Never deleted; terminal
/// entries are kept as history and may be resurrected on a later join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: String,
    pub position: u32,
    pub rooms_requested: u32,
    pub joined_at: DateTime<Utc>,
    pub status: EntryStatus,
    pub notified_at: Option<DateTime<Utc>>,
    pub notification_expires_at: Option<DateTime<Utc>>,
}

impl WaitingListEntry {
    pub fn new(
        trip_id: Uuid,
        user_id: String,
        position: u32,
        rooms_requested: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id,
            position,
            rooms_requested,
            joined_at: now,
            status: EntryStatus::Waiting,
            notified_at: None,
            notification_expires_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Notified and still inside the booking window.
    pub fn holds_turn(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Notified
            && self.notification_expires_at.is_some_and(|expires| expires > now)
    }

    /// Notified but the booking window has passed.
    pub fn turn_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Notified
            && self.notification_expires_at.is_some_and(|expires| expires < now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::Storage(format!("unknown booking status: {}", other))),
        }
    }
}

/// Minimal booking record: the part of a booking the waiting list reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: String,
    pub number_of_rooms: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn confirmed(
        trip_id: Uuid,
        user_id: String,
        number_of_rooms: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id,
            number_of_rooms,
            status: BookingStatus::Confirmed,
            created_at: now,
        }
    }
}
