use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use voya_core::notify::NotifyResult;
use voya_core::Notifier;
use voya_shared::models::events::{Notification, WaitlistEvent};

/// Writes every notification to the log. The default sink when nothing
/// else is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult {
        match &notification.event {
            WaitlistEvent::TurnGranted(event) => info!(
                "[notify {}] Your turn to book {} ({} rooms) until {}",
                notification.user_id, event.trip_title, event.rooms_requested, event.expires_at
            ),
            WaitlistEvent::PositionUpdated(event) => info!(
                "[notify {}] Position {} of {} for {}. {}",
                notification.user_id,
                event.position,
                event.queue_depth,
                event.trip_title,
                event.estimate
            ),
            WaitlistEvent::TurnExpired(event) => info!(
                "[notify {}] Your booking window for {} closed at {}",
                notification.user_id, event.trip_title, event.expired_at
            ),
        }
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers, e.g. SSE streams.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<Notification>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult {
        // no subscribers is not a failure
        let _ = self.tx.send(notification.clone());
        Ok(())
    }
}

/// Delivers to every sink. One failing sink does not stop the others; the
/// first error is reported after all were tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notification).await {
                warn!("Notification sink failed for {}: {}", notification.user_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use voya_shared::models::events::{TurnExpiredEvent, WaitlistEvent};

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn notify(&self, _notification: &Notification) -> NotifyResult {
            Err("mail server down".into())
        }
    }

    fn expired() -> Notification {
        let now = Utc::now();
        Notification::new(
            "sam",
            Uuid::new_v4(),
            WaitlistEvent::TurnExpired(TurnExpiredEvent {
                entry_id: Uuid::new_v4(),
                trip_title: "Lofoten Kayak".to_string(),
                expired_at: now,
            }),
            now,
        )
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let (tx, _) = broadcast::channel(8);
        let notifier = BroadcastNotifier::new(tx);
        let mut rx = notifier.subscribe();

        notifier.notify(&expired()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().user_id, "sam");
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let (tx, _) = broadcast::channel(8);
        assert!(BroadcastNotifier::new(tx).notify(&expired()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fanout_tries_every_sink() {
        let (tx, _) = broadcast::channel(8);
        let broadcast = BroadcastNotifier::new(tx);
        let mut rx = broadcast.subscribe();

        let fanout = FanoutNotifier::default()
            .with(Arc::new(Broken))
            .with(Arc::new(LogNotifier))
            .with(Arc::new(broadcast));

        assert!(fanout.notify(&expired()).await.is_err());
        // the broken sink came first and did not stop delivery
        assert!(rx.try_recv().is_ok());
    }
}
