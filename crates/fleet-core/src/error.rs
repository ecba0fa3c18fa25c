//! Error types for graph building, planning and fleet operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    /// The road network handed to the graph builder had no nodes.
    #[error("road network is empty")]
    EmptyNetwork,
    /// No path within the energy budget (or its best-effort relaxation).
    #[error("no route found: {0}")]
    NoRouteFound(String),
    /// The graph has no connection at all between the two regions.
    #[error("node not reachable: {0}")]
    NodeNotReachable(String),
    /// Malformed coordinate pair supplied at the boundary.
    #[error("invalid point ({lat}, {lon})")]
    InvalidPoint { lat: f64, lon: f64 },
    #[error("no city graph loaded")]
    GraphNotLoaded,
    #[error("order not found: {0}")]
    OrderNotFound(String),
    /// The order is already completed or cancelled.
    #[error("order is closed: {0}")]
    OrderClosed(String),
    #[error("zone not found: {0}")]
    ZoneNotFound(String),
}

impl FleetError {
    /// Planning failures are recovered locally (order stays queued, drone holds).
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self,
            FleetError::NoRouteFound(_) | FleetError::NodeNotReachable(_) | FleetError::GraphNotLoaded
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
