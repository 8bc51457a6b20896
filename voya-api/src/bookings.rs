use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use voya_core::models::Booking;

use crate::error::AppError;
use crate::state::AppState;
use crate::waitlist::require_user;

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    user_id: String,
    rooms: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/bookings", post(create_booking))
        .route("/v1/bookings/{booking_id}/cancel", post(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let user_id = require_user(&req.user_id)?;
    let booking = state.service.book(trip_id, user_id, req.rooms).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.service.cancel_booking(booking_id).await?;
    Ok(Json(booking))
}
