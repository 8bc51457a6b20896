use std::sync::Arc;
use tokio::sync::broadcast;
use voya_shared::models::events::Notification;
use voya_waitlist::WaitlistService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WaitlistService>,
    /// Same channel the `BroadcastNotifier` publishes to; SSE streams subscribe here.
    pub sse_tx: broadcast::Sender<Notification>,
}
