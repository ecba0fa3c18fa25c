//! Headless simulation: build a city graph, submit random orders and tick
//! the scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_core::{
    build_graph, ChargerSpec, CityData, DroneType, FleetRules, GeoPoint, Inventory, OrderRequest,
    OrderStatus, OrderType, Scheduler, Snapshot, ZoneRequest,
};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Airframe the graph is built for
    pub drone_type: DroneType,
    pub orders: usize,
    pub max_ticks: usize,
    pub wind_mps: f64,
    /// Defaults to the first road node
    pub base: Option<GeoPoint>,
    pub base_capacity: usize,
    pub inventory: Inventory,
    pub stations: Vec<GeoPoint>,
    pub zones: Vec<ZoneRequest>,
    pub rules: FleetRules,
}

#[derive(Debug, Default, Serialize)]
pub struct SimSummary {
    pub city: String,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub ticks: usize,
    pub orders: BTreeMap<String, usize>,
    pub drones: BTreeMap<String, usize>,
    pub assigned: usize,
    pub completed: usize,
    pub charger_arrivals: usize,
    pub full_charges: usize,
    pub mean_route_m: Option<f64>,
}

/// Run until every order is closed or `max_ticks` is reached.
pub fn run<R: Rng>(city: &CityData, cfg: &SimConfig, rng: &mut R) -> Result<(SimSummary, Snapshot)> {
    let road_points: Vec<GeoPoint> = city
        .network
        .nodes
        .iter()
        .map(|node| GeoPoint::new(node.lat, node.lon))
        .filter(GeoPoint::is_valid)
        .collect();
    let base = cfg
        .base
        .or_else(|| road_points.first().copied())
        .context("city has no valid road nodes")?;

    let mut scheduler = Scheduler::new(
        cfg.rules.clone(),
        ChargerSpec {
            name: "Base".into(),
            position: base,
            capacity: cfg.base_capacity,
        },
        cfg.inventory.clone(),
    );
    scheduler.set_weather(cfg.wind_mps);
    scheduler.set_stations(
        cfg.stations
            .iter()
            .enumerate()
            .map(|(i, position)| ChargerSpec {
                name: format!("Station {}", i + 1),
                position: *position,
                capacity: 2,
            })
            .collect(),
    );
    for zone in &cfg.zones {
        scheduler.add_zone(zone.clone())?;
    }

    let graph = build_graph(&city.network, &city.buildings, scheduler.zones(), cfg.drone_type)?
        .with_zone_version(scheduler.zone_version());
    let mut summary = SimSummary {
        city: city.name.clone(),
        graph_nodes: graph.node_count(),
        graph_edges: graph.edge_count(),
        ..SimSummary::default()
    };
    scheduler.install_graph(city.name.clone(), Arc::new(graph));

    const ORDER_TYPES: [OrderType; 3] = [OrderType::Delivery, OrderType::Shooting, OrderType::Work];
    for _ in 0..cfg.orders {
        let pair: Vec<&GeoPoint> = road_points.choose_multiple(rng, 2).collect();
        let [start, end] = pair[..] else {
            break;
        };
        let order_type = ORDER_TYPES.choose(rng).copied().unwrap_or(OrderType::Delivery);
        scheduler.submit_order(OrderRequest::new(*start, *end).with_type(order_type))?;
    }
    tracing::info!(orders = cfg.orders, city = %city.name, "Submitted random orders");

    for tick in 1..=cfg.max_ticks {
        let report = scheduler.tick();
        summary.ticks = tick;
        summary.assigned += report.assigned;
        summary.completed += report.completed;
        summary.charger_arrivals += report.arrived_at_charger;
        summary.full_charges += report.fully_charged;
        if scheduler.orders().all(|order| order.status.is_terminal()) {
            break;
        }
    }

    let mut route_total = 0.0;
    let mut routed = 0usize;
    for order in scheduler.orders() {
        *summary.orders.entry(label(&order.status)).or_default() += 1;
        if order.status == OrderStatus::Completed {
            if let Some(length) = order.route_length_m {
                route_total += length;
                routed += 1;
            }
        }
    }
    summary.mean_route_m = (routed > 0).then(|| route_total / routed as f64);
    for drone in scheduler.drones() {
        *summary.drones.entry(label(&drone.status)).or_default() += 1;
    }

    Ok((summary, scheduler.snapshot()))
}

/// Wire name of a serde enum value.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => "unknown".to_string(),
    }
}
