//! REST API routes.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{fleet, orders, request_id, ws, zones};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/load_city", post(fleet::load_city))
        .route("/api/state", get(fleet::get_state))
        .route("/api/snapshot", get(fleet::get_snapshot))
        .route("/api/weather", get(get_weather).post(fleet::set_weather))
        .route("/api/stations", get(fleet::list_stations).put(fleet::set_stations))
        .route("/api/base", get(fleet::get_base).put(fleet::set_base))
        .route("/api/inventory", get(fleet::get_inventory).put(fleet::set_inventory))
        // Orders
        .route("/api/orders", get(orders::list_orders).post(orders::add_order))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/cancel", post(orders::cancel_order))
        .route(
            "/api/orders/:id/update_destination",
            post(orders::update_destination),
        )
        // No-fly zones
        .route(
            "/api/no_fly_zones",
            get(zones::list_zones)
                .post(zones::add_zone)
                .delete(zones::clear_zones),
        )
        .route("/api/no_fly_zones/:id", delete(zones::remove_zone))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::ensure_request_id))
}

async fn get_weather(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> axum::Json<fleet_core::Weather> {
    let weather = state.scheduler().weather();
    axum::Json(weather)
}
