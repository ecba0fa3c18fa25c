//! City, environment and charger endpoints.

use axum::{extract::State, http::StatusCode, Json};
use fleet_core::{Charger, ChargerSpec, DroneType, Inventory, Snapshot, Weather};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{error_response, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoadCityRequest {
    pub city: String,
    pub drone_type: Option<DroneType>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherRequest {
    pub wind_mps: Option<f64>,
}

pub async fn load_city(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoadCityRequest>,
) -> ApiResult {
    let path = state.cities().path_for(&req.city);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no city data for '{}'", req.city),
        ));
    }
    match state.load_city(&req.city, req.drone_type).await {
        Ok(stats) => {
            tracing::info!(city = %req.city, nodes = stats.nodes, edges = stats.edges, "City loaded");
            Ok(Json(json!({ "ok": true, "stats": stats })))
        }
        Err(err) => {
            tracing::error!(city = %req.city, "load_city failed: {:#}", err);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// Compact status summary.
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<Value> {
    let drone_type = state.drone_type();
    let scheduler = state.scheduler();
    let graph = scheduler.graph().map(|graph| {
        json!({
            "nodes": graph.node_count(),
            "edges": graph.edge_count(),
            "zone_version": graph.zone_version(),
        })
    });
    let body = json!({
        "city": scheduler.city(),
        "drone_type": drone_type,
        "orders_count": scheduler.orders().count(),
        "drones_count": scheduler.drones().count(),
        "no_fly_zones": scheduler.zones(),
        "zone_version": scheduler.zone_version(),
        "weather": scheduler.weather(),
        "inventory": scheduler.inventory(),
        "graph": graph,
    });
    Json(body)
}

pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    let snapshot = state.scheduler().snapshot();
    Json(snapshot)
}

pub async fn set_weather(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WeatherRequest>,
) -> Json<Value> {
    let weather: Weather = state
        .scheduler()
        .set_weather(req.wind_mps.unwrap_or(Weather::default().wind_mps));
    Json(json!({ "ok": true, "weather": weather }))
}

pub async fn list_stations(State(state): State<Arc<AppState>>) -> Json<Vec<Charger>> {
    let stations = state.scheduler().stations().to_vec();
    Json(stations)
}

/// Replace the station list.
pub async fn set_stations(
    State(state): State<Arc<AppState>>,
    Json(specs): Json<Vec<ChargerSpec>>,
) -> ApiResult {
    if let Some(bad) = specs.iter().find(|spec| !spec.position.is_valid()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid station position ({}, {})", bad.position.lat, bad.position.lon),
        ));
    }
    let mut scheduler = state.scheduler();
    scheduler.set_stations(specs);
    let stations = scheduler.stations().to_vec();
    Ok(Json(json!({ "ok": true, "stations": stations })))
}

pub async fn get_base(State(state): State<Arc<AppState>>) -> Json<Charger> {
    let base = state.scheduler().base().clone();
    Json(base)
}

pub async fn set_base(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<ChargerSpec>,
) -> ApiResult {
    if !spec.position.is_valid() {
        return Err(error_response(StatusCode::BAD_REQUEST, "invalid base position"));
    }
    let mut scheduler = state.scheduler();
    scheduler.set_base(spec);
    let base = scheduler.base().clone();
    Ok(Json(json!({ "ok": true, "base": base })))
}

pub async fn get_inventory(State(state): State<Arc<AppState>>) -> Json<Inventory> {
    let inventory = state.scheduler().inventory().clone();
    Json(inventory)
}

pub async fn set_inventory(
    State(state): State<Arc<AppState>>,
    Json(inventory): Json<Inventory>,
) -> Json<Value> {
    state.scheduler().set_inventory(inventory.clone());
    Json(json!({ "ok": true, "inventory": inventory }))
}
