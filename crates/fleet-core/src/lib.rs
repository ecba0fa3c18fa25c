pub mod error;
pub mod graph;
pub mod models;
pub mod overlay;
pub mod planner;
pub mod rules;
pub mod scheduler;
pub mod search;
pub mod spatial;
pub mod zones;

pub use error::{FleetError, Result};
pub use graph::{
    build_graph, city_file_stem, Building, CityData, EdgeCategory, Graph, GraphEdge, GraphNode,
    NodeCategory, RoadEdge, RoadNetwork, RoadNode,
};
pub use models::{
    Charger, ChargerId, ChargerSpec, ChargingQueue, Drone, DroneId, DroneProfile, DroneStatus,
    DroneType, Inventory, Order, OrderId, OrderRequest, OrderStatus, OrderType, Snapshot, Weather,
};
pub use models::parse_inventory;
pub use planner::{plan_path, plan_with_charging, ChargePlan, ChargerStop, Path};
pub use rules::FleetRules;
pub use scheduler::{Scheduler, TickReport};
pub use spatial::{haversine_distance, GeoPoint};
pub use zones::{NoFlyZone, ZoneRequest};
