//! Fleet scheduler: owns drones, orders, zones and charging queues, and
//! advances them one tick at a time.
//!
//! A tick runs three phases in order: order assignment, drone motion,
//! charging. Every drone and order is processed in isolation; a failure on
//! one is logged and never aborts the tick.

mod assign;
mod charging;
mod motion;

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};
use crate::graph::Graph;
use crate::models::{
    Charger, ChargerId, ChargerSpec, ChargingQueue, Drone, DroneId, DroneType, Inventory, Order,
    OrderId, OrderRequest, OrderStatus, Snapshot, Weather,
};
use crate::planner::ChargerStop;
use crate::rules::FleetRules;
use crate::spatial::GeoPoint;
use crate::zones::{NoFlyZone, ZoneRequest};

/// A drone this close to an order stop has reached it.
const STOP_REACHED_M: f64 = 1.0;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub assigned: usize,
    pub completed: usize,
    pub arrived_at_charger: usize,
    pub fully_charged: usize,
}

pub struct Scheduler {
    rules: FleetRules,
    graph: Option<Arc<Graph>>,
    city: Option<String>,
    orders: BTreeMap<OrderId, Order>,
    drones: BTreeMap<DroneId, Drone>,
    zones: Vec<NoFlyZone>,
    zone_version: u64,
    weather: Weather,
    base: Charger,
    stations: Vec<Charger>,
    inventory: Inventory,
    next_order: u32,
    next_drone: u32,
    next_zone: u32,
    next_station: u32,
}

impl Scheduler {
    pub fn new(rules: FleetRules, base: ChargerSpec, inventory: Inventory) -> Self {
        Self {
            rules,
            graph: None,
            city: None,
            orders: BTreeMap::new(),
            drones: BTreeMap::new(),
            zones: Vec::new(),
            zone_version: 0,
            weather: Weather::default(),
            base: Charger::new(ChargerId::Base, base.name, base.position, base.capacity),
            stations: Vec::new(),
            inventory,
            next_order: 1,
            next_drone: 1,
            next_zone: 1,
            next_station: 0,
        }
    }

    pub fn rules(&self) -> &FleetRules {
        &self.rules
    }

    // ========== GRAPH ==========

    /// Swap in a freshly built graph. Graphs built for an older zone set are rejected.
    pub fn install_graph(&mut self, city: impl Into<String>, graph: Arc<Graph>) -> bool {
        if graph.zone_version() < self.zone_version {
            warn!(
                graph_version = graph.zone_version(),
                current_version = self.zone_version,
                "Rejecting stale graph"
            );
            return false;
        }
        let city = city.into();
        info!(
            city = %city,
            nodes = graph.node_count(),
            zone_version = graph.zone_version(),
            "Installed graph"
        );
        self.city = Some(city);
        self.graph = Some(graph);
        true
    }

    pub fn graph(&self) -> Option<&Arc<Graph>> {
        self.graph.as_ref()
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    // ========== ZONES ==========

    pub fn zones(&self) -> &[NoFlyZone] {
        &self.zones
    }

    /// Generation counter bumped by every zone change; rebuilt graphs carry it.
    pub fn zone_version(&self) -> u64 {
        self.zone_version
    }

    pub fn add_zone(&mut self, request: ZoneRequest) -> Result<NoFlyZone> {
        let id = match request.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let id = format!("zone_{}", self.next_zone);
                self.next_zone += 1;
                id
            }
        };
        let zone = NoFlyZone::new(
            id,
            request.lat_min,
            request.lat_max,
            request.lon_min,
            request.lon_max,
        )?;
        self.zones.retain(|existing| existing.id != zone.id);
        self.zones.push(zone.clone());
        self.zone_version += 1;
        info!(zone_id = %zone.id, zone_version = self.zone_version, "Added no-fly zone");
        Ok(zone)
    }

    pub fn remove_zone(&mut self, id: &str) -> Result<NoFlyZone> {
        let pos = self
            .zones
            .iter()
            .position(|zone| zone.id == id)
            .ok_or_else(|| FleetError::ZoneNotFound(id.to_string()))?;
        let zone = self.zones.remove(pos);
        self.zone_version += 1;
        info!(zone_id = %zone.id, zone_version = self.zone_version, "Removed no-fly zone");
        Ok(zone)
    }

    pub fn clear_zones(&mut self) {
        self.zones.clear();
        self.zone_version += 1;
    }

    // ========== ENVIRONMENT & CHARGERS ==========

    pub fn weather(&self) -> Weather {
        self.weather
    }

    pub fn set_weather(&mut self, wind_mps: f64) -> Weather {
        self.weather = Weather::new(wind_mps);
        self.weather
    }

    pub fn base(&self) -> &Charger {
        &self.base
    }

    pub fn stations(&self) -> &[Charger] {
        &self.stations
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn set_inventory(&mut self, inventory: Inventory) {
        self.inventory = inventory;
    }

    /// Move or resize the base. Occupants beyond the new capacity go back to waiting.
    pub fn set_base(&mut self, spec: ChargerSpec) {
        self.base.name = spec.name;
        self.base.position = spec.position;
        resize_queue(&mut self.base.queue, spec.capacity);
        self.promote_waiting();
    }

    /// Replace all stations. A station at the position of an existing one keeps
    /// its id and queue; drones bound to a station that is gone carry on with
    /// their order, or park and pick a new charger on the next battery check.
    pub fn set_stations(&mut self, specs: Vec<ChargerSpec>) {
        let mut previous = std::mem::take(&mut self.stations);
        let snap = self.rules.charger_snap_m;
        for spec in specs {
            let kept = previous
                .iter()
                .position(|old| old.position.distance_m(&spec.position) <= snap);
            let station = match kept {
                Some(i) => {
                    let mut station = previous.remove(i);
                    station.name = spec.name;
                    station.position = spec.position;
                    resize_queue(&mut station.queue, spec.capacity);
                    station
                }
                None => {
                    let id = ChargerId::Station(self.next_station);
                    self.next_station += 1;
                    Charger::new(id, spec.name, spec.position, spec.capacity)
                }
            };
            self.stations.push(station);
        }

        let removed: Vec<ChargerId> = previous.iter().map(|station| station.id).collect();
        let orphans: Vec<DroneId> = self
            .drones
            .values()
            .filter(|drone| drone.charger.is_some_and(|id| removed.contains(&id)))
            .map(|drone| drone.id)
            .collect();
        for drone_id in orphans {
            self.drop_charger(drone_id);
        }
        self.promote_waiting();
        info!(stations = self.stations.len(), removed = removed.len(), "Updated charging stations");
    }

    /// The drone's charger no longer exists.
    fn drop_charger(&mut self, drone_id: DroneId) {
        let order_id = match self.drones.get_mut(&drone_id) {
            Some(drone) => {
                drone.charger = None;
                drone.resume_route.clear();
                drone.order_id
            }
            None => return,
        };
        match order_id.filter(|id| self.is_active(*id)) {
            Some(order_id) => {
                debug!(drone_id = %drone_id, order_id = %order_id, "Charger removed, replanning order");
                self.continue_order(drone_id, order_id);
            }
            None => {
                if let Some(drone) = self.drones.get_mut(&drone_id) {
                    drone.park();
                }
            }
        }
    }

    pub fn charger(&self, id: ChargerId) -> Option<&Charger> {
        match id {
            ChargerId::Base => Some(&self.base),
            ChargerId::Station(_) => self.stations.iter().find(|station| station.id == id),
        }
    }

    fn charger_mut(&mut self, id: ChargerId) -> Option<&mut Charger> {
        match id {
            ChargerId::Base => Some(&mut self.base),
            ChargerId::Station(_) => self.stations.iter_mut().find(|station| station.id == id),
        }
    }

    /// Base first, then stations in configured order.
    pub fn charger_stops(&self) -> Vec<ChargerStop> {
        std::iter::once(&self.base)
            .chain(self.stations.iter())
            .map(|charger| ChargerStop {
                id: charger.id,
                position: charger.position,
            })
            .collect()
    }

    // ========== ORDERS & DRONES ==========

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn drones(&self) -> impl Iterator<Item = &Drone> {
        self.drones.values()
    }

    pub fn drone(&self, id: DroneId) -> Option<&Drone> {
        self.drones.get(&id)
    }

    fn is_active(&self, order_id: OrderId) -> bool {
        self.orders
            .get(&order_id)
            .is_some_and(|order| order.status == OrderStatus::Assigned)
    }

    /// Tick off the order stops the drone is standing on, in order.
    fn mark_stops_reached(&mut self, drone_id: DroneId) {
        let Some(drone) = self.drones.get(&drone_id) else {
            return;
        };
        let position = drone.position;
        let Some(order) = drone.order_id.and_then(|id| self.orders.get_mut(&id)) else {
            return;
        };
        while order
            .next_stop()
            .is_some_and(|stop| stop.distance_m(&position) <= STOP_REACHED_M)
        {
            order.stops_done += 1;
            debug!(order_id = %order.id, drone_id = %drone_id, stops_done = order.stops_done, "Order stop reached");
        }
    }

    /// Queue an order; it is assigned on a later tick.
    pub fn submit_order(&mut self, request: OrderRequest) -> Result<OrderId> {
        for point in std::iter::once(&request.start)
            .chain(std::iter::once(&request.end))
            .chain(request.waypoints.iter())
        {
            if !point.is_valid() {
                return Err(FleetError::InvalidPoint {
                    lat: point.lat,
                    lon: point.lon,
                });
            }
        }
        let order_type = crate::models::OrderType::classify(
            request.type_hint,
            &[request.address_from.as_deref(), request.address_to.as_deref()],
        );
        let battery_level = if request.battery_level.is_finite() {
            request.battery_level.clamp(1.0, 100.0)
        } else {
            100.0
        };
        let id = OrderId(self.next_order);
        self.next_order += 1;
        self.orders.insert(
            id,
            Order {
                id,
                order_type,
                start: request.start,
                end: request.end,
                battery_level,
                waypoints: request.waypoints,
                status: OrderStatus::Queued,
                drone_id: None,
                route_length_m: None,
                stops_done: 0,
                created_at: Utc::now(),
                completed_at: None,
            },
        );
        info!(order_id = %id, ?order_type, "Order queued");
        Ok(id)
    }

    /// Register an idle drone outside the inventory (operator-placed or test fixtures).
    pub fn add_drone(&mut self, drone_type: DroneType, position: GeoPoint, battery_pct: f64) -> DroneId {
        let id = DroneId(self.next_drone);
        self.next_drone += 1;
        self.drones.insert(id, Drone::new(id, drone_type, position, battery_pct));
        id
    }

    // ========== TICK ==========

    /// Advance the fleet by one tick.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            assigned: self.assign_orders(),
            ..TickReport::default()
        };
        self.advance_drones(&mut report);
        self.process_charging(&mut report);
        report
    }

    // ========== SNAPSHOT ==========

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            city: self.city.clone(),
            orders: self.orders.values().cloned().collect(),
            drones: self.drones.clone(),
            zones: self.zones.clone(),
            weather: self.weather,
            base: self.base.clone(),
            inventory: self.inventory.clone(),
            stations: self.stations.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Load state from a snapshot. The graph is dropped; callers rebuild it for
    /// the restored city and zones.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.city = snapshot.city;
        self.orders = snapshot.orders.into_iter().map(|order| (order.id, order)).collect();
        self.drones = snapshot.drones;
        self.zones = snapshot.zones;
        self.zone_version += 1;
        self.graph = None;
        self.weather = Weather::new(snapshot.weather.wind_mps);
        self.base = snapshot.base;
        self.stations = snapshot.stations;
        self.inventory = snapshot.inventory;

        self.next_order = self.orders.keys().map(|id| id.0 + 1).max().unwrap_or(1);
        self.next_drone = self.drones.keys().map(|id| id.0 + 1).max().unwrap_or(1);
        self.next_zone = self
            .zones
            .iter()
            .filter_map(|zone| zone.id.strip_prefix("zone_")?.parse::<u32>().ok())
            .map(|n| n + 1)
            .max()
            .unwrap_or(1);
        self.next_station = self
            .stations
            .iter()
            .filter_map(|station| match station.id {
                ChargerId::Station(n) => Some(n + 1),
                ChargerId::Base => None,
            })
            .max()
            .unwrap_or(0);
        self.rebuild_queues();
        info!(
            orders = self.orders.len(),
            drones = self.drones.len(),
            zones = self.zones.len(),
            "Restored fleet state"
        );
    }
}

/// Shrink or grow a queue's slot count, pushing overflow to the front of the waiting line.
fn resize_queue(queue: &mut ChargingQueue, capacity: usize) {
    queue.capacity = capacity;
    while queue.charging.len() > capacity {
        if let Some(id) = queue.charging.pop() {
            queue.waiting.push_front(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;

    fn scheduler() -> Scheduler {
        let base = ChargerSpec {
            name: "Base".into(),
            position: GeoPoint::new(0.0, 0.0),
            capacity: 2,
        };
        Scheduler::new(FleetRules::default(), base, Inventory::new())
    }

    #[test]
    fn submit_clamps_battery_and_classifies() {
        let mut sched = scheduler();
        let mut request = OrderRequest::new(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01));
        request.battery_level = 250.0;
        request.address_to = Some("aerial photo of the stadium".into());
        let id = sched.submit_order(request).unwrap();
        let order = sched.order(id).unwrap();
        assert_eq!(order.battery_level, 100.0);
        assert_eq!(order.order_type, OrderType::Shooting);
        assert_eq!(order.status, OrderStatus::Queued);
    }

    #[test]
    fn invalid_order_point_is_rejected() {
        let mut sched = scheduler();
        let request = OrderRequest::new(GeoPoint::new(95.0, 0.0), GeoPoint::new(0.0, 0.01));
        assert!(matches!(
            sched.submit_order(request),
            Err(FleetError::InvalidPoint { .. })
        ));
    }

    #[test]
    fn zone_changes_bump_version_and_reject_stale_graphs() {
        let mut sched = scheduler();
        let zone = sched
            .add_zone(ZoneRequest {
                lat_min: 0.2,
                lat_max: 0.1,
                lon_min: 0.1,
                lon_max: 0.2,
                id: None,
            })
            .unwrap();
        assert_eq!(zone.id, "zone_1");
        assert_eq!(zone.lat_min, 0.1);
        assert_eq!(sched.zone_version(), 1);

        let network = crate::graph::RoadNetwork {
            nodes: vec![crate::graph::RoadNode { id: 1, lat: 0.0, lon: 0.0 }],
            edges: vec![],
        };
        let stale = crate::graph::build_graph(&network, &[], &[], DroneType::Cargo).unwrap();
        assert!(!sched.install_graph("test", Arc::new(stale.clone())));
        assert!(sched.install_graph("test", Arc::new(stale.with_zone_version(1))));

        assert!(matches!(
            sched.remove_zone("missing"),
            Err(FleetError::ZoneNotFound(_))
        ));
        sched.remove_zone("zone_1").unwrap();
        assert_eq!(sched.zone_version(), 2);
    }

    #[test]
    fn weather_is_clamped_on_set() {
        let mut sched = scheduler();
        assert_eq!(sched.set_weather(100.0).wind_mps, 40.0);
    }

    #[test]
    fn stations_keep_ids_across_updates() {
        let mut sched = scheduler();
        let north = GeoPoint::new(0.01, 0.0);
        let east = GeoPoint::new(0.0, 0.01);
        let spec = |name: &str, position| ChargerSpec {
            name: name.into(),
            position,
            capacity: 1,
        };
        sched.set_stations(vec![spec("North", north), spec("East", east)]);
        let ids: Vec<ChargerId> = sched.stations().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![ChargerId::Station(0), ChargerId::Station(1)]);

        // reorder, drop North and add a new one: East keeps its id, ids are never reused
        let south = GeoPoint::new(-0.01, 0.0);
        sched.set_stations(vec![spec("South", south), spec("East 2", east)]);
        let ids: Vec<ChargerId> = sched.stations().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![ChargerId::Station(2), ChargerId::Station(1)]);
        assert_eq!(sched.charger(ChargerId::Station(1)).unwrap().name, "East 2");
        assert!(sched.charger(ChargerId::Station(0)).is_none());
    }

    #[test]
    fn snapshot_restore_keeps_ids_moving_forward() {
        let mut sched = scheduler();
        sched
            .submit_order(OrderRequest::new(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)))
            .unwrap();
        sched.add_drone(DroneType::Cargo, GeoPoint::new(0.0, 0.0), 80.0);
        let json = serde_json::to_string(&sched.snapshot()).unwrap();

        let mut restored = scheduler();
        restored.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.orders().count(), 1);
        let next = restored
            .submit_order(OrderRequest::new(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.02)))
            .unwrap();
        assert_eq!(next, OrderId(2));
        assert_eq!(restored.add_drone(DroneType::Cleaner, GeoPoint::new(0.0, 0.0), 100.0), DroneId(2));
    }
}
