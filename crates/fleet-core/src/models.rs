//! Core data models for the fleet orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::spatial::GeoPoint;
use crate::zones::NoFlyZone;

const BUILDING_BASE_WEIGHT: f64 = 10.0;
const ON_POINT_M: f64 = 0.5;

// ========== DRONE TYPES ==========

/// Closed set of airframes; every per-type parameter lives in [`DroneProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneType {
    Cargo,
    Operator,
    Cleaner,
}

impl DroneType {
    pub const ALL: [DroneType; 3] = [DroneType::Cargo, DroneType::Operator, DroneType::Cleaner];

    /// Parameter table, resolved once per lookup.
    pub fn profile(self) -> DroneProfile {
        match self {
            DroneType::Cargo => DroneProfile {
                drone_type: self,
                weight_factor: 1.5,
                max_altitude_m: 120.0,
                battery_range_m: 15_000.0,
                meters_per_pct: 2_000.0,
                overflies_buildings: false,
            },
            DroneType::Operator => DroneProfile {
                drone_type: self,
                weight_factor: 1.0,
                max_altitude_m: 150.0,
                battery_range_m: 20_000.0,
                meters_per_pct: 2_500.0,
                overflies_buildings: true,
            },
            DroneType::Cleaner => DroneProfile {
                drone_type: self,
                weight_factor: 1.2,
                max_altitude_m: 80.0,
                battery_range_m: 25_000.0,
                meters_per_pct: 3_000.0,
                overflies_buildings: true,
            },
        }
    }

    /// Airframe serving an order type.
    pub fn for_order(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Delivery => DroneType::Cargo,
            OrderType::Shooting => DroneType::Operator,
            OrderType::Work => DroneType::Cleaner,
        }
    }
}

impl fmt::Display for DroneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DroneType::Cargo => "cargo",
            DroneType::Operator => "operator",
            DroneType::Cleaner => "cleaner",
        };
        f.write_str(name)
    }
}

impl FromStr for DroneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cargo" => Ok(DroneType::Cargo),
            "operator" => Ok(DroneType::Operator),
            "cleaner" => Ok(DroneType::Cleaner),
            other => Err(format!("unknown drone type '{other}'")),
        }
    }
}

/// Per-type physical parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroneProfile {
    pub drone_type: DroneType,
    /// Multiplier on the cost of flying over building nodes
    pub weight_factor: f64,
    pub max_altitude_m: f64,
    /// Distance flyable on a full battery
    pub battery_range_m: f64,
    /// Meters flown per 1% of battery
    pub meters_per_pct: f64,
    /// Whether building centroids are added to this type's graph
    pub overflies_buildings: bool,
}

impl DroneProfile {
    pub fn building_weight(&self) -> f64 {
        BUILDING_BASE_WEIGHT * self.weight_factor
    }

    /// Battery percentage consumed by flying `distance_m`.
    pub fn drain_pct(&self, distance_m: f64) -> f64 {
        distance_m / self.meters_per_pct
    }
}

// ========== ORDERS ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u32);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord_{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("ord_").unwrap_or(s);
        digits
            .parse()
            .map(OrderId)
            .map_err(|_| format!("invalid order id '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Delivery,
    Shooting,
    Work,
}

impl OrderType {
    /// Explicit hint wins; otherwise keywords in the free-text addresses decide.
    pub fn classify(hint: Option<OrderType>, texts: &[Option<&str>]) -> Self {
        if let Some(hint) = hint {
            return hint;
        }
        let text = texts
            .iter()
            .flatten()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        const DELIVERY: [&str; 4] = ["достав", "deliver", "посыл", "parcel"];
        const SHOOTING: [&str; 5] = ["съём", "съем", "photo", "video", "aerial"];
        if DELIVERY.iter().any(|k| text.contains(k)) {
            OrderType::Delivery
        } else if SHOOTING.iter().any(|k| text.contains(k)) {
            OrderType::Shooting
        } else {
            OrderType::Work
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for a drone and a feasible route
    Queued,
    /// Drone and route committed
    Assigned,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// A delivery/inspection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_type: OrderType,
    pub start: GeoPoint,
    pub end: GeoPoint,
    /// Battery level for a unit spawned at the order start, clamped to [1, 100]
    pub battery_level: f64,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
    pub status: OrderStatus,
    #[serde(default)]
    pub drone_id: Option<DroneId>,
    #[serde(default)]
    pub route_length_m: Option<f64>,
    /// Stops reached so far, counting the pickup first and then the waypoints
    #[serde(default)]
    pub stops_done: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Pickup, then waypoints in order.
    pub fn stops(&self) -> impl Iterator<Item = &GeoPoint> {
        std::iter::once(&self.start).chain(self.waypoints.iter())
    }

    pub fn next_stop(&self) -> Option<GeoPoint> {
        self.stops().nth(self.stops_done).copied()
    }

    pub fn remaining_stops(&self) -> Vec<GeoPoint> {
        self.stops().skip(self.stops_done).copied().collect()
    }
}

/// Order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub start: GeoPoint,
    pub end: GeoPoint,
    #[serde(default = "default_battery_level")]
    pub battery_level: f64,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
    #[serde(default)]
    pub type_hint: Option<OrderType>,
    /// Free text used only to classify the order
    #[serde(default)]
    pub address_from: Option<String>,
    #[serde(default)]
    pub address_to: Option<String>,
}

fn default_battery_level() -> f64 {
    100.0
}

impl OrderRequest {
    pub fn new(start: GeoPoint, end: GeoPoint) -> Self {
        Self {
            start,
            end,
            battery_level: default_battery_level(),
            waypoints: Vec::new(),
            type_hint: None,
            address_from: None,
            address_to: None,
        }
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.type_hint = Some(order_type);
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<GeoPoint>) -> Self {
        self.waypoints = waypoints;
        self
    }
}

// ========== DRONES ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub u32);

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "drone_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    /// Parked, available for assignment
    #[default]
    Idle,
    /// Flying an order route
    Enroute,
    /// Occupying a charger slot
    Charging,
    /// Parked at a charger, waiting for a free slot
    Waiting,
    /// Route blocked and no replan found
    Holding,
    /// Paused this tick to keep the proximity bubble clear
    Avoidance,
    LowBattery,
    /// Flying to the base to recharge
    ReturnBase,
    /// Flying to a station to recharge
    ReturnCharge,
}

impl DroneStatus {
    /// States in which the drone follows its route each tick.
    pub fn is_flying(self) -> bool {
        matches!(
            self,
            DroneStatus::Enroute
                | DroneStatus::Avoidance
                | DroneStatus::LowBattery
                | DroneStatus::ReturnBase
                | DroneStatus::ReturnCharge
        )
    }

    /// Landed states; parked drones do not count for the proximity bubble.
    pub fn is_parked(self) -> bool {
        matches!(
            self,
            DroneStatus::Idle | DroneStatus::Charging | DroneStatus::Waiting
        )
    }
}

/// A fleet vehicle. Created on assignment or from inventory, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    pub drone_type: DroneType,
    pub position: GeoPoint,
    pub battery_pct: f64,
    #[serde(default)]
    pub route: Vec<GeoPoint>,
    /// Remainder of an order route, flown after recharging
    #[serde(default)]
    pub resume_route: Vec<GeoPoint>,
    #[serde(default)]
    pub target_index: usize,
    pub status: DroneStatus,
    /// Status restored once avoidance or holding clears
    #[serde(default)]
    pub cruise_status: DroneStatus,
    pub temperature_c: f64,
    pub link_quality: f64,
    #[serde(default)]
    pub position_history: VecDeque<GeoPoint>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Charger the drone is heading to, charging at or queued at
    #[serde(default)]
    pub charger: Option<ChargerId>,
    #[serde(default)]
    pub remaining_m: f64,
    #[serde(default)]
    pub eta_s: u64,
}

impl Drone {
    pub fn new(id: DroneId, drone_type: DroneType, position: GeoPoint, battery_pct: f64) -> Self {
        Self {
            id,
            drone_type,
            position,
            battery_pct: battery_pct.clamp(0.0, 100.0),
            route: Vec::new(),
            resume_route: Vec::new(),
            target_index: 0,
            status: DroneStatus::Idle,
            cruise_status: DroneStatus::Idle,
            temperature_c: 20.0,
            link_quality: 100.0,
            position_history: VecDeque::new(),
            order_id: None,
            charger: None,
            remaining_m: 0.0,
            eta_s: 0,
        }
    }

    pub fn profile(&self) -> DroneProfile {
        self.drone_type.profile()
    }

    pub fn current_target(&self) -> Option<&GeoPoint> {
        self.route.get(self.target_index)
    }

    pub fn route_end(&self) -> Option<GeoPoint> {
        self.route.last().copied()
    }

    /// Start flying `route`, skipping leading points the drone already sits on.
    pub fn set_route(&mut self, route: Vec<GeoPoint>, status: DroneStatus) {
        let here = self.position;
        self.target_index = route
            .iter()
            .take(route.len().saturating_sub(1))
            .take_while(|point| point.distance_m(&here) < ON_POINT_M)
            .count();
        self.route = route;
        self.status = status;
        self.cruise_status = status;
    }

    /// Drop all route state and park.
    pub fn park(&mut self) {
        self.route.clear();
        self.resume_route.clear();
        self.target_index = 0;
        self.status = DroneStatus::Idle;
        self.cruise_status = DroneStatus::Idle;
        self.charger = None;
        self.remaining_m = 0.0;
        self.eta_s = 0;
    }
}

// ========== CHARGING ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargerId {
    Base,
    Station(u32),
}

impl fmt::Display for ChargerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerId::Base => f.write_str("base"),
            ChargerId::Station(n) => write!(f, "station_{n}"),
        }
    }
}

/// Capacity-limited charging slots with a FIFO waiting list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargingQueue {
    pub charging: Vec<DroneId>,
    pub waiting: VecDeque<DroneId>,
    pub capacity: usize,
}

/// Outcome of presenting a drone to a charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Charging,
    Waiting,
}

impl ChargingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            charging: Vec::new(),
            waiting: VecDeque::new(),
            capacity,
        }
    }

    /// Admit a drone. Idempotent: a drone already charging or waiting keeps its place.
    pub fn admit(&mut self, drone: DroneId) -> Admission {
        if self.charging.contains(&drone) {
            return Admission::Charging;
        }
        if self.waiting.contains(&drone) {
            return Admission::Waiting;
        }
        if self.charging.len() < self.capacity {
            self.charging.push(drone);
            Admission::Charging
        } else {
            self.waiting.push_back(drone);
            Admission::Waiting
        }
    }

    /// Remove a drone from either list.
    pub fn release(&mut self, drone: DroneId) -> bool {
        let before = self.charging.len() + self.waiting.len();
        self.charging.retain(|id| *id != drone);
        self.waiting.retain(|id| *id != drone);
        before != self.charging.len() + self.waiting.len()
    }

    /// Move waiting drones into free slots in arrival order. Returns the promoted ids.
    pub fn promote(&mut self) -> Vec<DroneId> {
        let mut promoted = Vec::new();
        while self.charging.len() < self.capacity {
            let Some(next) = self.waiting.pop_front() else {
                break;
            };
            self.charging.push(next);
            promoted.push(next);
        }
        promoted
    }

    pub fn contains(&self, drone: DroneId) -> bool {
        self.charging.contains(&drone) || self.waiting.contains(&drone)
    }
}

/// A base or station offering charging slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charger {
    pub id: ChargerId,
    pub name: String,
    pub position: GeoPoint,
    pub queue: ChargingQueue,
}

impl Charger {
    pub fn new(id: ChargerId, name: impl Into<String>, position: GeoPoint, capacity: usize) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            queue: ChargingQueue::new(capacity),
        }
    }
}

/// Charger definition as configured by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerSpec {
    pub name: String,
    pub position: GeoPoint,
    pub capacity: usize,
}

// ========== ENVIRONMENT & SNAPSHOT ==========

pub const MAX_WIND_MPS: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub wind_mps: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Self { wind_mps: 3.0 }
    }
}

impl Weather {
    pub fn new(wind_mps: f64) -> Self {
        let wind = if wind_mps.is_finite() { wind_mps } else { 0.0 };
        Self {
            wind_mps: wind.clamp(0.0, MAX_WIND_MPS),
        }
    }
}

/// Drones still sitting in base storage, per type.
pub type Inventory = BTreeMap<DroneType, u32>;

/// Parse `"cargo=3,operator=2"`. Unknown types and malformed entries are skipped.
pub fn parse_inventory(s: &str) -> Inventory {
    s.split(',')
        .filter_map(|entry| {
            let (kind, count) = entry.split_once('=')?;
            Some((kind.parse().ok()?, count.trim().parse().ok()?))
        })
        .collect()
}

/// Read-only view of the whole fleet, used for broadcast and as the persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub city: Option<String>,
    pub orders: Vec<Order>,
    pub drones: BTreeMap<DroneId, Drone>,
    pub zones: Vec<NoFlyZone>,
    pub weather: Weather,
    pub base: Charger,
    pub inventory: Inventory,
    pub stations: Vec<Charger>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_respects_capacity_and_fifo() {
        let mut queue = ChargingQueue::new(2);
        assert_eq!(queue.admit(DroneId(1)), Admission::Charging);
        assert_eq!(queue.admit(DroneId(2)), Admission::Charging);
        assert_eq!(queue.admit(DroneId(3)), Admission::Waiting);
        assert_eq!(queue.admit(DroneId(4)), Admission::Waiting);
        // idempotent admission
        assert_eq!(queue.admit(DroneId(3)), Admission::Waiting);
        assert_eq!(queue.waiting.len(), 2);

        assert!(queue.release(DroneId(1)));
        assert_eq!(queue.promote(), vec![DroneId(3)]);
        assert_eq!(queue.charging, vec![DroneId(2), DroneId(3)]);
        assert_eq!(queue.waiting, VecDeque::from(vec![DroneId(4)]));
    }

    #[test]
    fn remaining_stops_skip_reached_ones() {
        let p = |lat: f64| GeoPoint::new(lat, 0.0);
        let mut order = Order {
            id: OrderId(1),
            order_type: OrderType::Delivery,
            start: p(0.0),
            end: p(0.3),
            battery_level: 100.0,
            waypoints: vec![p(0.1), p(0.2)],
            status: OrderStatus::Assigned,
            drone_id: None,
            route_length_m: None,
            stops_done: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(order.remaining_stops(), vec![p(0.0), p(0.1), p(0.2)]);
        order.stops_done = 2;
        assert_eq!(order.next_stop(), Some(p(0.2)));
        assert_eq!(order.remaining_stops(), vec![p(0.2)]);
        order.stops_done = 3;
        assert_eq!(order.next_stop(), None);
        assert!(order.remaining_stops().is_empty());
    }

    #[test]
    fn classify_prefers_hint_then_keywords() {
        assert_eq!(
            OrderType::classify(Some(OrderType::Shooting), &[Some("parcel")]),
            OrderType::Shooting
        );
        assert_eq!(
            OrderType::classify(None, &[Some("Deliver parcel"), None]),
            OrderType::Delivery
        );
        assert_eq!(
            OrderType::classify(None, &[None, Some("aerial video of the bridge")]),
            OrderType::Shooting
        );
        assert_eq!(OrderType::classify(None, &[None, None]), OrderType::Work);
    }

    #[test]
    fn drain_rates_follow_type_table() {
        assert!((DroneType::Cargo.profile().drain_pct(1_000.0) - 0.5).abs() < 1e-9);
        assert!((DroneType::Operator.profile().drain_pct(2_500.0) - 1.0).abs() < 1e-9);
        assert!((DroneType::Cleaner.profile().drain_pct(3_000.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ids_parse_with_or_without_prefix() {
        assert_eq!("ord_7".parse::<OrderId>().unwrap(), OrderId(7));
        assert_eq!("7".parse::<OrderId>().unwrap(), OrderId(7));
        assert!("ord_x".parse::<OrderId>().is_err());
        assert_eq!(OrderId(3).to_string(), "ord_3");
    }

    #[test]
    fn weather_is_clamped() {
        assert_eq!(Weather::new(55.0).wind_mps, MAX_WIND_MPS);
        assert_eq!(Weather::new(-2.0).wind_mps, 0.0);
    }
}
