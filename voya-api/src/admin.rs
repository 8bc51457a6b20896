use axum::{
    extract::{Json, Path, State},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use voya_core::models::Trip;
use voya_waitlist::{ExpirySweeper, SweepReport, TripWaitlist};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct UpsertTripRequest {
    id: Option<Uuid>,
    title: String,
    total_rooms: u32,
    start_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct AddRoomsRequest {
    rooms: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/trips", put(upsert_trip))
        .route("/v1/admin/trips/{trip_id}/rooms", post(add_rooms))
        .route("/v1/admin/trips/{trip_id}/waitlist", get(list_waitlist))
        .route("/v1/admin/sweep", post(run_sweep))
}

/// Catalog stand-in. Room counts of an existing trip are left alone; use
/// the rooms endpoint to add capacity.
async fn upsert_trip(
    State(state): State<AppState>,
    Json(req): Json<UpsertTripRequest>,
) -> Result<Json<Trip>, AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::ValidationError("title must not be empty".to_string()));
    }

    let mut trip = Trip::new(title, req.total_rooms, req.start_date);
    if let Some(id) = req.id {
        trip.id = id;
    }

    let saved = state.service.save_trip(&trip).await?;
    Ok(Json(saved))
}

async fn add_rooms(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<AddRoomsRequest>,
) -> Result<Json<Trip>, AppError> {
    let trip = state.service.add_rooms(trip_id, req.rooms).await?;
    info!("Admin added {} rooms to trip {}", req.rooms, trip_id);
    Ok(Json(trip))
}

async fn list_waitlist(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripWaitlist>, AppError> {
    Ok(Json(state.service.waitlist(trip_id).await?))
}

/// Run one expiry sweep now instead of waiting for the next tick.
async fn run_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    // interval is irrelevant for a single pass
    let sweeper = ExpirySweeper::new(state.service.clone(), Duration::from_secs(1));
    Json(sweeper.sweep_once().await)
}
