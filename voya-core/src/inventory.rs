use crate::models::Trip;
use crate::{CoreError, CoreResult};

/// Largest room count a trip or request may carry; counts are stored as
/// Postgres `INTEGER`.
pub const MAX_ROOMS: u32 = i32::MAX as u32;

/// Room inventory operations. Callers hold the trip lock, so the queue and
/// the room counts change together.
impl Trip {
    /// Reserve rooms for a booking that is actually being created.
    pub fn reserve_rooms(&mut self, rooms: u32) -> CoreResult<()> {
        if rooms == 0 {
            return Err(CoreError::InvalidRoomCount);
        }

        if self.available_rooms < rooms {
            return Err(CoreError::InsufficientInventory {
                requested: rooms,
                available: self.available_rooms,
            });
        }

        self.available_rooms -= rooms;
        Ok(())
    }

    /// Return rooms freed by a cancellation. Never exceeds the trip's total.
    pub fn release_rooms(&mut self, rooms: u32) -> CoreResult<()> {
        if rooms == 0 {
            return Err(CoreError::InvalidRoomCount);
        }

        let released = self.available_rooms.saturating_add(rooms);
        if released > self.total_rooms {
            tracing::warn!(
                "Release of {} rooms on trip {} would exceed total {}, clamping",
                rooms,
                self.id,
                self.total_rooms
            );
        }
        self.available_rooms = released.min(self.total_rooms);
        Ok(())
    }

    /// Admin capacity increase: new rooms are immediately available.
    pub fn add_rooms(&mut self, rooms: u32) -> CoreResult<()> {
        if rooms == 0 {
            return Err(CoreError::InvalidRoomCount);
        }

        let total = self
            .total_rooms
            .checked_add(rooms)
            .filter(|total| *total <= MAX_ROOMS)
            .ok_or(CoreError::InvalidRoomCount)?;

        self.total_rooms = total;
        self.available_rooms = self.available_rooms.saturating_add(rooms).min(total);
        Ok(())
    }

    pub fn has_free_rooms(&self) -> bool {
        self.available_rooms > 0
    }

    /// Share of rooms already booked, 0.0..=1.0
    pub fn utilization(&self) -> f64 {
        if self.total_rooms == 0 {
            0.0
        } else {
            1.0 - (self.available_rooms as f64 / self.total_rooms as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(total: u32) -> Trip {
        Trip::new("Dolomites Hut Trek", total, NaiveDate::from_ymd_opt(2030, 6, 1).unwrap())
    }

    #[test]
    fn test_inventory_lifecycle() {
        let mut trip = trip(10);

        trip.reserve_rooms(4).unwrap();
        assert_eq!(trip.available_rooms, 6);

        trip.release_rooms(2).unwrap();
        assert_eq!(trip.available_rooms, 8);

        let utilization = trip.utilization();
        assert!((utilization - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_reserve_never_goes_negative() {
        let mut trip = trip(2);
        trip.reserve_rooms(2).unwrap();

        let err = trip.reserve_rooms(1).unwrap_err();
        assert_eq!(err, CoreError::InsufficientInventory { requested: 1, available: 0 });
        assert_eq!(trip.available_rooms, 0);
    }

    #[test]
    fn test_release_is_clamped_to_total() {
        let mut trip = trip(3);
        trip.reserve_rooms(1).unwrap();

        trip.release_rooms(5).unwrap();
        assert_eq!(trip.available_rooms, 3);
    }

    #[test]
    fn test_add_rooms_grows_capacity() {
        let mut trip = trip(0);
        trip.add_rooms(2).unwrap();
        assert_eq!(trip.total_rooms, 2);
        assert_eq!(trip.available_rooms, 2);
    }

    #[test]
    fn test_add_rooms_past_max_is_rejected() {
        let mut trip = trip(10);
        assert_eq!(trip.add_rooms(MAX_ROOMS), Err(CoreError::InvalidRoomCount));
        assert_eq!(trip.total_rooms, 10);
        assert_eq!(trip.available_rooms, 10);

        trip.add_rooms(MAX_ROOMS - 10).unwrap();
        assert_eq!(trip.total_rooms, MAX_ROOMS);
    }

    #[test]
    fn test_zero_rooms_rejected() {
        let mut trip = trip(1);
        assert_eq!(trip.reserve_rooms(0), Err(CoreError::InvalidRoomCount));
        assert_eq!(trip.release_rooms(0), Err(CoreError::InvalidRoomCount));
        assert_eq!(trip.add_rooms(0), Err(CoreError::InvalidRoomCount));
    }
}
