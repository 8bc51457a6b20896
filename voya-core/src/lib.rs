pub mod allocation;
pub mod clock;
pub mod gate;
pub mod inventory;
pub mod models;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod window;

pub use allocation::{AllocationOutcome, AllocationPolicy, SkipReason, TurnGrant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::PriorityDecision;
pub use models::{Booking, BookingStatus, EntryStatus, Trip, WaitingListEntry};
pub use notify::Notifier;
pub use queue::TripQueue;
pub use repository::{TripUnitOfWork, WaitlistRepository};
pub use window::{BookingWindowPolicy, WaitEstimate};

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Already on the waiting list at position {position}")]
    AlreadyQueued { position: u32 },

    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    #[error("Booking blocked: {reason}")]
    PriorityBlocked {
        reason: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Waiting list entry not found: {0}")]
    EntryNotFound(String),

    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Room count must be between 1 and {}", inventory::MAX_ROOMS)]
    InvalidRoomCount,

    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Conflicts are expected under contention and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrencyConflict(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
