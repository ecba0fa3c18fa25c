//! No-fly zone endpoints. Every change triggers a graph rebuild.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fleet_core::{NoFlyZone, ZoneRequest};
use serde_json::json;
use std::sync::Arc;

use super::{error_response, fleet_error, ApiResult};
use crate::state::AppState;

pub async fn add_zone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ZoneRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let zone = state.scheduler().add_zone(req).map_err(fleet_error)?;
    let graph = rebuild(&state).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "zone": zone, "graph": graph })),
    ))
}

pub async fn list_zones(State(state): State<Arc<AppState>>) -> Json<Vec<NoFlyZone>> {
    let zones = state.scheduler().zones().to_vec();
    Json(zones)
}

pub async fn remove_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let zone = state.scheduler().remove_zone(&id).map_err(fleet_error)?;
    let graph = rebuild(&state).await?;
    Ok(Json(json!({ "ok": true, "removed": 1, "zone": zone, "graph": graph })))
}

pub async fn clear_zones(State(state): State<Arc<AppState>>) -> ApiResult {
    let removed = {
        let mut scheduler = state.scheduler();
        let count = scheduler.zones().len();
        scheduler.clear_zones();
        count
    };
    let graph = rebuild(&state).await?;
    Ok(Json(json!({ "ok": true, "removed": removed, "graph": graph })))
}

async fn rebuild(state: &AppState) -> ApiResult<Option<crate::state::GraphStats>> {
    state.rebuild_graph().await.map_err(|err| {
        tracing::error!("Graph rebuild after zone change failed: {:#}", err);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Graph rebuild failed")
    })
}
