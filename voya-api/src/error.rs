use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use voya_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    /// Message plus extra fields merged into the body.
    ConflictError(String, Map<String, Value>),
    LockedError(String, Map<String, Value>),
    UnavailableError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, extra) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, Map::new()),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, Map::new()),
            AppError::ConflictError(msg, extra) => (StatusCode::CONFLICT, msg, extra),
            AppError::LockedError(msg, extra) => (StatusCode::LOCKED, msg, extra),
            AppError::UnavailableError(msg) => {
                tracing::warn!("Giving up after repeated conflicts: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The trip is busy, please try again".to_string(),
                    Map::new(),
                )
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), Map::new())
            }
        };

        let mut body = extra;
        body.insert("error".to_string(), Value::String(error_message));

        (status, Json(Value::Object(body))).into_response()
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::AlreadyQueued { position } => {
                AppError::ConflictError(message, fields(json!({ "position": position })))
            }
            CoreError::InsufficientInventory { requested, available } => AppError::ConflictError(
                message,
                fields(json!({ "requested": requested, "available": available })),
            ),
            CoreError::PriorityBlocked { reason, expires_at } => AppError::LockedError(
                reason,
                fields(json!({ "blocked_until": expires_at })),
            ),
            CoreError::InvalidTransition { .. } => AppError::ConflictError(message, Map::new()),
            CoreError::EntryNotFound(_)
            | CoreError::TripNotFound(_)
            | CoreError::BookingNotFound(_) => AppError::NotFoundError(message),
            CoreError::InvalidRoomCount => AppError::ValidationError(message),
            CoreError::ConcurrencyConflict(_) => AppError::UnavailableError(message),
            CoreError::Storage(_) => AppError::InternalServerError(message),
        }
    }
}
