use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use voya_core::models::WaitingListEntry;
use voya_core::PriorityDecision;
use voya_waitlist::PositionView;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct JoinWaitlistRequest {
    user_id: String,
    #[serde(default = "one_room")]
    rooms_requested: u32,
}

fn one_room() -> u32 {
    1
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/waitlist", post(join_waitlist))
        .route(
            "/v1/trips/{trip_id}/waitlist/{user_id}",
            get(get_position).delete(leave_waitlist),
        )
        .route("/v1/trips/{trip_id}/priority/{user_id}", get(check_priority))
}

pub(crate) fn require_user(user_id: &str) -> Result<&str, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::ValidationError("user_id must not be empty".to_string()));
    }
    Ok(user_id)
}

async fn join_waitlist(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<JoinWaitlistRequest>,
) -> Result<(StatusCode, Json<PositionView>), AppError> {
    let user_id = require_user(&req.user_id)?;
    let view = state.service.join(trip_id, user_id, req.rooms_requested).await?;
    info!("Waitlist join: trip {} user {} position {}", trip_id, user_id, view.position);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn leave_waitlist(
    State(state): State<AppState>,
    Path((trip_id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<WaitingListEntry>, AppError> {
    let entry = state.service.leave(trip_id, require_user(&user_id)?).await?;
    Ok(Json(entry))
}

async fn get_position(
    State(state): State<AppState>,
    Path((trip_id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<PositionView>, AppError> {
    let view = state.service.position(trip_id, require_user(&user_id)?).await?;
    Ok(Json(view))
}

async fn check_priority(
    State(state): State<AppState>,
    Path((trip_id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<PriorityDecision>, AppError> {
    let decision = state.service.check_priority(trip_id, require_user(&user_id)?).await?;
    Ok(Json(decision))
}
