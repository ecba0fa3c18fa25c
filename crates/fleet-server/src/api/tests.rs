use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, config::Config, state::AppState};

/// Writes a three-node line city (about 1.1 km per hop, due north) into a fresh data dir.
fn write_test_city() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fleet-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create data dir");
    let city = json!({
        "name": "Line Town",
        "network": {
            "nodes": [
                { "id": 1, "lat": 55.00, "lon": 37.00 },
                { "id": 2, "lat": 55.01, "lon": 37.00 },
                { "id": 3, "lat": 55.02, "lon": 37.00 }
            ],
            "edges": [
                { "u": 1, "v": 2 },
                { "u": 2, "v": 3 }
            ]
        },
        "buildings": []
    });
    std::fs::write(dir.join("Line_Town.json"), city.to_string()).expect("write city");
    dir
}

fn setup_app() -> (axum::Router, Arc<AppState>) {
    let mut config = Config::from_env();
    config.data_dir = write_test_city();
    config.persist_enabled = false;
    config.base.position = fleet_core::GeoPoint::new(55.0, 37.0);
    let state = Arc::new(AppState::new(config));
    let app = api::routes().with_state(state.clone());
    (app, state)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_echoes_request_id() {
    let (app, _state) = setup_app();

    let req = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    let res = app.oneshot(get("/health")).await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn load_city_builds_graph() {
    let (app, state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json("/api/load_city", json!({ "city": "Nowhere" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .clone()
        .oneshot(post_json("/api/load_city", json!({ "city": "Line Town", "drone_type": "cargo" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["ok"], Value::Bool(true));
    assert_eq!(body["stats"]["nodes"], 3);
    assert_eq!(body["stats"]["edges"], 2);
    assert_eq!(state.scheduler().city(), Some("Line Town"));

    let res = app.oneshot(get("/api/state")).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body["city"], "Line Town");
    assert_eq!(body["graph"]["nodes"], 3);
}

#[tokio::test]
async fn add_order_validates_and_queues() {
    let (app, _state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json("/api/orders", json!({ "coords_from": [55.0, 37.0] })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/orders",
            json!({
                "coords_from": [55.0, 37.0],
                "coords_to": [55.02, 37.0],
                "address_to": "aerial photo of the river",
                "battery_level": 250
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["order"]["status"], "queued");
    assert_eq!(body["order"]["order_type"], "shooting");
    assert_eq!(body["order"]["battery_level"], 100.0);
    assert_eq!(body["queue_size"], 1);

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/orders",
            json!({ "coords_from": [95.0, 37.0], "coords_to": [55.02, 37.0] }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.oneshot(get("/api/orders")).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn cancel_order_only_once() {
    let (app, _state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/orders",
            json!({ "coords_from": [55.0, 37.0], "coords_to": [55.01, 37.0] }),
        ))
        .await
        .unwrap();
    let body = read_json(res).await;
    let id = body["order"]["id"].as_u64().expect("numeric order id");

    let uri = format!("/api/orders/ord_{id}/cancel");
    let res = app.clone().oneshot(post_json(&uri, json!({}))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["order"]["status"], "cancelled");

    let res = app.clone().oneshot(post_json(&uri, json!({}))).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .oneshot(post_json("/api/orders/ord_999/cancel", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zone_changes_rebuild_the_graph() {
    let (app, state) = setup_app();
    app.clone()
        .oneshot(post_json("/api/load_city", json!({ "city": "Line Town" })))
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/no_fly_zones",
            json!({ "lat_min": 55.009, "lat_max": 55.011, "lon_min": 36.99, "lon_max": 37.01 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["zone"]["id"], "zone_1");
    assert_eq!(body["graph"]["zone_version"], 1);
    {
        let scheduler = state.scheduler();
        let graph = scheduler.graph().expect("graph installed");
        assert_eq!(graph.zone_version(), 1);
        assert!(graph.edges().iter().all(|edge| edge.is_blocked()));
    }

    let res = app.clone().oneshot(get("/api/no_fly_zones")).await.unwrap();
    assert_eq!(read_json(res).await.as_array().map(Vec::len), Some(1));

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/no_fly_zones/zone_1")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(state
        .scheduler()
        .graph()
        .is_some_and(|graph| graph.zone_version() == 2 && !graph.edges()[0].is_blocked()));

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/no_fly_zones/zone_1")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn weather_is_clamped() {
    let (app, _state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json("/api/weather", json!({ "wind_mps": 120.0 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["weather"]["wind_mps"], 40.0);

    let res = app.oneshot(get("/api/weather")).await.unwrap();
    assert_eq!(read_json(res).await["wind_mps"], 40.0);
}

#[tokio::test]
async fn stations_replace_and_reject_bad_positions() {
    let (app, _state) = setup_app();

    let put = |body: Value| {
        Request::builder()
            .method("PUT")
            .uri("/api/stations")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let res = app
        .clone()
        .oneshot(put(json!([{ "name": "North", "position": [55.02, 37.0], "capacity": 2 }])))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["stations"][0]["id"], json!({ "station": 0 }));

    let res = app
        .clone()
        .oneshot(put(json!([{ "name": "Bad", "position": [55.0, 190.0], "capacity": 1 }])))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.oneshot(get("/api/stations")).await.unwrap();
    assert_eq!(read_json(res).await.as_array().map(Vec::len), Some(1));
}
