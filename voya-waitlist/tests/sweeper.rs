mod common;

use chrono::Duration;
use common::harness;
use std::time::Duration as StdDuration;
use voya_core::models::EntryStatus;
use voya_waitlist::ExpirySweeper;

#[tokio::test]
async fn test_failing_trip_does_not_stop_the_sweep() {
    let h = harness();
    let (first, first_bookings) = h.sold_out_trip(1, 30).await;
    let (second, second_bookings) = h.sold_out_trip(1, 30).await;
    for (trip, booking) in [(first.id, first_bookings[0]), (second.id, second_bookings[0])] {
        h.service.join(trip, "holder", 1).await.unwrap();
        h.service.cancel_booking(booking).await.unwrap();
    }

    h.clock.advance(Duration::hours(49));
    let sweeper = ExpirySweeper::new(h.service.clone(), StdDuration::from_secs(300));

    // enough injected conflicts to exhaust every retry on whichever trip goes first
    h.repo.fail_next_locks(3);
    let report = sweeper.sweep_once().await;
    assert_eq!(report.trips_scanned, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.turns_expired, 1);

    let report = sweeper.sweep_once().await;
    assert_eq!(report.trips_scanned, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(report.turns_expired, 1);

    assert_eq!(h.entry(first.id, "holder").await.status, EntryStatus::Expired);
    assert_eq!(h.entry(second.id, "holder").await.status, EntryStatus::Expired);
}

#[tokio::test]
async fn test_expiry_without_free_rooms_only_compacts() {
    let h = harness();
    let (trip, bookings) = h.sold_out_trip(1, 30).await;
    for user in ["a", "b", "c"] {
        h.service.join(trip.id, user, 1).await.unwrap();
    }
    h.service.cancel_booking(bookings[0]).await.unwrap();
    // a's window lapses and a walk-in takes the room before the sweep
    h.clock.advance(Duration::hours(49));
    h.service.book(trip.id, "walk-in", 1).await.unwrap();

    let sweeper = ExpirySweeper::new(h.service.clone(), StdDuration::from_secs(300));
    let report = sweeper.sweep_once().await;
    assert_eq!(report.turns_expired, 1);
    assert_eq!(report.turns_granted, 0);

    assert_eq!(h.positions(trip.id).await, vec![("b".to_string(), 1), ("c".to_string(), 2)]);
    assert_eq!(h.entry(trip.id, "b").await.status, EntryStatus::Waiting);
}

#[tokio::test]
async fn test_background_sweeper_runs_until_shutdown() {
    let h = harness();
    let (trip, bookings) = h.sold_out_trip(1, 30).await;
    h.service.join(trip.id, "a", 1).await.unwrap();
    h.service.join(trip.id, "b", 1).await.unwrap();
    h.service.cancel_booking(bookings[0]).await.unwrap();

    let handle = ExpirySweeper::new(h.service.clone(), StdDuration::from_millis(10)).spawn();
    h.clock.advance(Duration::hours(49));

    let mut promoted = false;
    for _ in 0..50 {
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        if h.entry(trip.id, "b").await.status == EntryStatus::Notified {
            promoted = true;
            break;
        }
    }
    handle.shutdown_and_join().await;

    assert!(promoted, "sweeper never promoted the next waiter");
    assert_eq!(h.entry(trip.id, "a").await.status, EntryStatus::Expired);
}
