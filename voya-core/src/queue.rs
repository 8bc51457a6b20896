use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::inventory::MAX_ROOMS;
use crate::models::{EntryStatus, Trip, WaitingListEntry};
use crate::{CoreError, CoreResult};

/// A trip together with every waiting-list entry it has ever had.
///
/// This is the unit that gets locked: all queue and inventory mutations for
/// a trip go through one `TripQueue` inside one unit of work.
///
/// Positions are dense over the *active* entries (Waiting and Notified):
/// a turn holder keeps its place until it books, leaves or expires, and the
/// entries behind it keep theirs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripQueue {
    trip: Trip,
    entries: Vec<WaitingListEntry>,
}

/// Result of removing an entry from the active queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    pub removed: WaitingListEntry,
    /// Entries that moved up one place, with their new positions.
    pub shifted: Vec<WaitingListEntry>,
}

impl TripQueue {
    pub fn new(trip: Trip, entries: Vec<WaitingListEntry>) -> Self {
        Self { trip, entries }
    }

    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn trip_mut(&mut self) -> &mut Trip {
        &mut self.trip
    }

    pub fn entries(&self) -> &[WaitingListEntry] {
        &self.entries
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn active_entry_for(&self, user_id: &str) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| e.user_id == user_id && e.is_active())
    }

    fn tail_position(&self) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
    }

    /// Waiting + Notified.
    pub fn queue_depth(&self) -> u32 {
        self.entries.iter().filter(|e| e.is_active()).count() as u32
    }

    /// Add a user at the tail of the queue, resurrecting their old entry if
    /// they had one.
    pub fn enqueue(
        &mut self,
        user_id: &str,
        rooms_requested: u32,
        now: DateTime<Utc>,
    ) -> CoreResult<WaitingListEntry> {
        if rooms_requested == 0 || rooms_requested > MAX_ROOMS {
            return Err(CoreError::InvalidRoomCount);
        }

        if let Some(active) = self.active_entry_for(user_id) {
            return Err(CoreError::AlreadyQueued { position: active.position });
        }

        let position = self.tail_position() + 1;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.user_id == user_id) {
            entry.position = position;
            entry.rooms_requested = rooms_requested;
            entry.status = EntryStatus::Waiting;
            entry.joined_at = now;
            entry.notified_at = None;
            entry.notification_expires_at = None;
            return Ok(entry.clone());
        }

        let entry = WaitingListEntry::new(
            self.trip.id,
            user_id.to_string(),
            position,
            rooms_requested,
            now,
        );
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Move an active entry to a terminal status and close the gap it leaves.
    pub fn dequeue(&mut self, entry_id: Uuid, status: EntryStatus) -> CoreResult<Compaction> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()))?;

        let current = self.entries[idx].status;
        if !current.is_active() || !status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        self.entries[idx].status = status;
        let removed = self.entries[idx].clone();

        let mut shifted = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.is_active() && entry.position > removed.position {
                entry.position -= 1;
                shifted.push(entry.clone());
            }
        }
        shifted.sort_by_key(|e| e.position);

        Ok(Compaction { removed, shifted })
    }

    /// Waiting -> Notified with a booking window starting now.
    pub fn grant_turn(
        &mut self,
        entry_id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CoreResult<WaitingListEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()))?;

        if entry.status != EntryStatus::Waiting {
            return Err(CoreError::InvalidTransition {
                from: entry.status.to_string(),
                to: EntryStatus::Notified.to_string(),
            });
        }

        entry.status = EntryStatus::Notified;
        entry.notified_at = Some(now);
        entry.notification_expires_at = Some(now + window);
        Ok(entry.clone())
    }

    /// Waiting entries in queue order.
    pub fn ordered_waiting(&self) -> Vec<&WaitingListEntry> {
        let mut waiting: Vec<&WaitingListEntry> =
            self.entries.iter().filter(|e| e.status == EntryStatus::Waiting).collect();
        waiting.sort_by_key(|e| (e.position, e.joined_at));
        waiting
    }

    /// Waiting and Notified entries in queue order.
    pub fn ordered_active(&self) -> Vec<&WaitingListEntry> {
        let mut active: Vec<&WaitingListEntry> =
            self.entries.iter().filter(|e| e.is_active()).collect();
        active.sort_by_key(|e| (e.position, e.joined_at));
        active
    }

    pub fn active_turn_holder(&self, now: DateTime<Utc>) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| e.holds_turn(now))
    }

    /// Notified entries whose booking window has passed, in queue order.
    pub fn expired_turns(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut expired: Vec<&WaitingListEntry> =
            self.entries.iter().filter(|e| e.turn_expired(now)).collect();
        expired.sort_by_key(|e| e.position);
        expired.into_iter().map(|e| e.id).collect()
    }

    /// Verify the queue invariants. Returns a description of the first
    /// violation found.
    pub fn check_invariants(&self, now: DateTime<Utc>) -> Result<(), String> {
        let trip = &self.trip;
        if trip.available_rooms > trip.total_rooms {
            return Err(format!(
                "available rooms {} exceed total {}",
                trip.available_rooms, trip.total_rooms
            ));
        }

        let mut positions: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.position)
            .collect();
        positions.sort_unstable();
        for (idx, position) in positions.iter().enumerate() {
            if *position != idx as u32 + 1 {
                return Err(format!("active positions are not contiguous: {:?}", positions));
            }
        }

        let holders = self.entries.iter().filter(|e| e.holds_turn(now)).count();
        if holders > 1 {
            return Err(format!("{} entries hold an active turn", holders));
        }

        let mut users: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.user_id.as_str())
            .collect();
        users.sort_unstable();
        if users.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err("a user holds more than one active entry".to_string());
        }

        Ok(())
    }
}
