//! Order endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fleet_core::{GeoPoint, Order, OrderId, OrderRequest, OrderType};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{error_response, fleet_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddOrderRequest {
    /// `[lat, lon]`
    pub coords_from: Option<GeoPoint>,
    pub coords_to: Option<GeoPoint>,
    pub address_from: Option<String>,
    pub address_to: Option<String>,
    pub type_hint: Option<OrderType>,
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDestinationRequest {
    pub new_coords_to: Option<GeoPoint>,
}

fn parse_order_id(raw: &str) -> ApiResult<OrderId> {
    raw.parse()
        .map_err(|_| error_response(StatusCode::NOT_FOUND, format!("order not found: {raw}")))
}

/// Queue a new order. Coordinates are required; addresses only help classify it.
pub async fn add_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddOrderRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let (Some(start), Some(end)) = (req.coords_from, req.coords_to) else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Invalid start or end"));
    };
    let request = OrderRequest {
        start,
        end,
        battery_level: req.battery_level.unwrap_or(100.0),
        waypoints: req.waypoints,
        type_hint: req.type_hint,
        address_from: req.address_from,
        address_to: req.address_to,
    };

    let mut scheduler = state.scheduler();
    let order_id = scheduler.submit_order(request).map_err(fleet_error)?;
    let order = scheduler.order(order_id).cloned();
    let queue_size = scheduler.orders().count();
    drop(scheduler);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "order": order, "queue_size": queue_size })),
    ))
}

pub async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    let orders = state.scheduler().orders().cloned().collect();
    Json(orders)
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order_id = parse_order_id(&id)?;
    let order = state.scheduler().order(order_id).cloned();
    order
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("order not found: {id}")))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order_id = parse_order_id(&id)?;
    let mut scheduler = state.scheduler();
    let already_closed = scheduler
        .order(order_id)
        .map(|order| order.status.is_terminal())
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("order not found: {id}")))?;
    if already_closed {
        return Err(error_response(StatusCode::CONFLICT, "Order is not cancellable"));
    }
    scheduler.cancel_order(order_id).map_err(fleet_error)?;
    let order = scheduler.order(order_id).cloned();
    Ok(Json(json!({ "ok": true, "order": order })))
}

pub async fn update_destination(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDestinationRequest>,
) -> ApiResult {
    let order_id = parse_order_id(&id)?;
    let Some(end) = req.new_coords_to else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Invalid destination"));
    };
    let mut scheduler = state.scheduler();
    scheduler.update_destination(order_id, end).map_err(fleet_error)?;
    let order = scheduler.order(order_id).cloned();
    Ok(Json(json!({ "ok": true, "order": order })))
}
