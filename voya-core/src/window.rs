//! Booking-window scheduling.
//!
//! The window is a best-effort heuristic: more people waiting or less time
//! before departure gives each notified user a shorter window, so the queue
//! keeps moving, bounded by `min_hours` and `max_hours`. It is not an SLA.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_WINDOW_HOURS: u32 = 2;
pub const MAX_WINDOW_HOURS: u32 = 48;

/// Whole calendar days from today until departure, never negative.
pub fn days_until_trip(start_date: NaiveDate, now: DateTime<Utc>) -> u32 {
    (start_date - now.date_naive()).num_days().max(0) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindowPolicy {
    pub min_hours: u32,
    pub max_hours: u32,
}

impl Default for BookingWindowPolicy {
    fn default() -> Self {
        Self {
            min_hours: MIN_WINDOW_HOURS,
            max_hours: MAX_WINDOW_HOURS,
        }
    }
}

impl BookingWindowPolicy {
    pub fn new(min_hours: u32, max_hours: u32) -> Self {
        Self { min_hours, max_hours }
    }

    /// `clamp(round(days * 24 / (people + 1)), min, max)`.
    ///
    /// `people_in_queue` counts Waiting and Notified entries, including the
    /// entry about to be notified.
    pub fn window_hours(&self, days_until_trip: u32, people_in_queue: u32) -> u32 {
        let raw = (days_until_trip as f64 * 24.0) / (people_in_queue as f64 + 1.0);
        let max = self.max_hours.max(self.min_hours);
        (raw.round() as u32).clamp(self.min_hours, max)
    }

    /// Advisory wait estimate for someone at `position` while turns last
    /// `window_hours` each.
    pub fn estimate_wait(&self, position: u32, window_hours: u32) -> WaitEstimate {
        if position <= 1 {
            WaitEstimate::NextInLine
        } else {
            WaitEstimate::UpTo {
                hours: (position - 1) * window_hours,
            }
        }
    }
}

/// Display-only estimate of how long a queued user may wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitEstimate {
    /// The user holds the turn right now.
    YourTurn { expires_at: DateTime<Utc> },
    /// The turn ran out and is waiting to be swept.
    TurnLapsed { expired_at: DateTime<Utc> },
    /// First in line; timing depends on cancellations.
    NextInLine,
    /// Worst case: everyone ahead uses their full window.
    UpTo { hours: u32 },
}

impl WaitEstimate {
    pub fn message(&self) -> String {
        match self {
            WaitEstimate::YourTurn { expires_at } => format!(
                "It's your turn! Complete your booking before {} UTC.",
                expires_at.format("%Y-%m-%d %H:%M")
            ),
            WaitEstimate::TurnLapsed { expired_at } => format!(
                "Your booking window closed at {} UTC. The next person in line will be offered \
                 the rooms.",
                expired_at.format("%Y-%m-%d %H:%M")
            ),
            WaitEstimate::NextInLine => "You're next in line. We can't predict when a room will \
                 free up since that depends on cancellations, but you'll be notified as soon as \
                 one does."
                .to_string(),
            WaitEstimate::UpTo { hours } if *hours < 48 => format!(
                "Estimated wait: up to {} hours once rooms free up. It may be much shorter \
                 if people ahead of you book quickly or are skipped.",
                hours
            ),
            WaitEstimate::UpTo { hours } => format!(
                "Estimated wait: up to about {} days once rooms free up. It may be much shorter \
                 if people ahead of you book quickly or are skipped.",
                hours.div_ceil(24)
            ),
        }
    }
}
