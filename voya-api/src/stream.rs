use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/users/{user_id}/notifications/stream", get(notification_stream))
}

/// Live waiting-list notifications for one user. Messages published while
/// nobody is connected are not replayed.
async fn notification_stream(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let user_id = user_id.clone();
        async move {
            match result {
                Ok(notification) if notification.user_id == user_id => {
                    let data = serde_json::to_string(&notification).ok()?;
                    Some(Ok(Event::default().event(notification.kind().as_str()).data(data)))
                }
                // lagged receivers just skip what they missed
                _ => None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
