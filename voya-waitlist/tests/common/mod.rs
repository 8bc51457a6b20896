#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use uuid::Uuid;
use voya_core::models::{Trip, WaitingListEntry};
use voya_core::queue::TripQueue;
use voya_core::notify::NotifyResult;
use voya_core::{ManualClock, Notifier};
use voya_shared::models::events::{Notification, NotificationKind};
use voya_store::InMemoryWaitlistRepository;
use voya_waitlist::{RetryPolicy, WaitlistService};

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn kinds(&self) -> Vec<(String, NotificationKind)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| (n.user_id.clone(), n.kind()))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> NotifyResult {
        Err("smtp relay refused connection".into())
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryWaitlistRepository>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<WaitlistService>,
}

pub fn harness() -> Harness {
    harness_with(None)
}

pub fn harness_with(notifier: Option<Arc<dyn Notifier>>) -> Harness {
    let repo = Arc::new(InMemoryWaitlistRepository::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap()));
    let recording = Arc::new(RecordingNotifier::default());
    let sink: Arc<dyn Notifier> =
        notifier.unwrap_or_else(|| recording.clone() as Arc<dyn Notifier>);

    let service = WaitlistService::new(repo.clone(), sink, clock.clone())
        .with_retry(RetryPolicy::new(3, StdDuration::from_millis(1)));

    Harness {
        repo,
        clock,
        notifier: recording,
        service: Arc::new(service),
    }
}

impl Harness {
    /// A trip departing `days_out` days from the clock's today.
    pub async fn trip(&self, title: &str, rooms: u32, days_out: i64) -> Trip {
        let start = self.clock_now().date_naive() + Duration::days(days_out);
        self.service.save_trip(&Trip::new(title, rooms, start)).await.unwrap()
    }

    /// A trip with every room booked by someone outside the queue.
    pub async fn sold_out_trip(&self, rooms: u32, days_out: i64) -> (Trip, Vec<Uuid>) {
        let trip = self.trip("Northern Lights Lodge", rooms, days_out).await;
        let mut bookings = Vec::new();
        for n in 0..rooms {
            let booking = self
                .service
                .book(trip.id, &format!("early-bird-{}", n), 1)
                .await
                .unwrap();
            bookings.push(booking.id);
        }
        (trip, bookings)
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use voya_core::Clock;
        self.clock.now()
    }

    pub async fn queue(&self, trip_id: Uuid) -> TripQueue {
        let queue = self.repo.snapshot(trip_id).await.unwrap();
        queue.check_invariants(self.clock_now()).unwrap();
        queue
    }

    pub async fn entry(&self, trip_id: Uuid, user_id: &str) -> WaitingListEntry {
        let queue = self.queue(trip_id).await;
        queue
            .entries()
            .iter()
            .find(|e| e.user_id == user_id)
            .cloned()
            .unwrap()
    }

    pub async fn positions(&self, trip_id: Uuid) -> Vec<(String, u32)> {
        self.queue(trip_id)
            .await
            .ordered_active()
            .iter()
            .map(|e| (e.user_id.clone(), e.position))
            .collect()
    }
}
