//! API routes for the fleet server.

pub mod fleet;
pub mod orders;
pub mod request_id;
mod routes;
pub mod ws;
pub mod zones;

use axum::{http::StatusCode, Json, Router};
use fleet_core::FleetError;
use serde_json::{json, Value};

pub fn routes() -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router()
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T = Json<Value>> = Result<T, ApiError>;

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "ok": false, "error": message.into() })))
}

/// Map a core error onto an HTTP status.
pub fn fleet_error(err: FleetError) -> ApiError {
    let status = match &err {
        FleetError::InvalidPoint { .. } => StatusCode::BAD_REQUEST,
        FleetError::OrderNotFound(_) | FleetError::ZoneNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::OrderClosed(_) | FleetError::GraphNotLoaded => StatusCode::CONFLICT,
        FleetError::EmptyNetwork | FleetError::NoRouteFound(_) | FleetError::NodeNotReachable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    error_response(status, err.to_string())
}

#[cfg(test)]
mod tests;
