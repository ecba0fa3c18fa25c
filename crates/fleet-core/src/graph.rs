//! Zone-weighted city graph.
//!
//! The graph is built once from a road network (plus building centroids for
//! airframes allowed over roofs), stamped with the no-fly zones active at
//! build time, and never mutated afterwards. Zone edits produce a new graph.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{FleetError, Result};
use crate::models::{DroneProfile, DroneType};
use crate::spatial::{degree_span, GeoPoint};
use crate::zones::NoFlyZone;

/// Upper bound on building centroids added to one graph.
pub const MAX_BUILDING_NODES: usize = 50;
/// Buildings farther than this from every road node are dropped.
pub const MAX_BUILDING_LINK_M: f64 = 1_100.0;
/// Cap on the last-resort linear scan in nearest-node lookups.
pub const MAX_FULL_SCAN_NODES: usize = 50_000;

const CELL_DEG: f64 = 0.01;
const NEAR_BOX_M: f64 = 1_000.0;
const WIDE_BOX_M: f64 = 10_000.0;
const MAX_BOX_CELLS: i64 = 40_000;

// ========== RAW INPUT ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadEdge {
    pub u: i64,
    pub v: i64,
    #[serde(default)]
    pub length_m: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub nodes: Vec<RoadNode>,
    pub edges: Vec<RoadEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub height_m: Option<f64>,
}

/// On-disk city description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityData {
    pub name: String,
    pub network: RoadNetwork,
    #[serde(default)]
    pub buildings: Vec<Building>,
}

const MAX_CITY_STEM: usize = 100;

/// File stem for a city name: keeps word characters and turns runs of
/// spaces and dashes into `_`.
pub fn city_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_sep = true;
        }
    }
    out.trim_matches('_').chars().take(MAX_CITY_STEM).collect()
}

// ========== GRAPH ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Road,
    Building,
    /// Per-call overlay node, never stored in a [`Graph`]
    Temporary,
    /// Node swallowed by a no-fly zone
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCategory {
    Road,
    /// Building-to-road link
    Connection,
    Temporary,
}

/// Source identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Road(i64),
    Building(usize),
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: NodeKey,
    pub position: GeoPoint,
    pub category: NodeCategory,
    pub weight: f64,
}

impl GraphNode {
    pub fn is_blocked(&self) -> bool {
        self.weight.is_infinite()
    }
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub a: usize,
    pub b: usize,
    pub length_m: f64,
    pub weight: f64,
    pub category: EdgeCategory,
}

impl GraphEdge {
    pub fn is_blocked(&self) -> bool {
        self.weight.is_infinite()
    }

    pub fn other(&self, node: usize) -> usize {
        if self.a == node {
            self.b
        } else {
            self.a
        }
    }
}

type CellKey = (i64, i64);

fn cell_of(point: &GeoPoint) -> CellKey {
    (
        (point.lat / CELL_DEG).floor() as i64,
        (point.lon / CELL_DEG).floor() as i64,
    )
}

/// Immutable routable graph for one drone type and one zone set.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    adjacency: Vec<Vec<usize>>,
    cells: HashMap<CellKey, Vec<usize>>,
    profile: DroneProfile,
    zones: Vec<NoFlyZone>,
    zone_version: u64,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Edges incident to `node`, paired with the node at the other end.
    pub fn incident(&self, node: usize) -> impl Iterator<Item = (usize, &GraphEdge)> + '_ {
        self.adjacency[node].iter().map(move |&edge_idx| {
            let edge = &self.edges[edge_idx];
            (edge.other(node), edge)
        })
    }

    pub fn profile(&self) -> &DroneProfile {
        &self.profile
    }

    pub fn drone_type(&self) -> DroneType {
        self.profile.drone_type
    }

    pub fn zones(&self) -> &[NoFlyZone] {
        &self.zones
    }

    pub fn zone_version(&self) -> u64 {
        self.zone_version
    }

    /// Stamp the zone generation this graph was built for.
    pub fn with_zone_version(mut self, zone_version: u64) -> Self {
        self.zone_version = zone_version;
        self
    }

    /// Closest passable node.
    pub fn nearest_node(&self, point: &GeoPoint) -> Option<usize> {
        self.k_nearest(point, 1).first().copied()
    }

    /// Up to `k` closest passable nodes, nearest first.
    ///
    /// Looks in a 1 km box, widens to 10 km, then falls back to a capped
    /// linear scan.
    pub fn k_nearest(&self, point: &GeoPoint, k: usize) -> Vec<usize> {
        if k == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        for radius_m in [NEAR_BOX_M, WIDE_BOX_M] {
            let Some(candidates) = self.box_candidates(point, radius_m) else {
                break;
            };
            let found = self.closest_of(point, candidates, k);
            if found.len() >= k || (radius_m == WIDE_BOX_M && !found.is_empty()) {
                return found;
            }
        }
        let scanned = (0..self.nodes.len().min(MAX_FULL_SCAN_NODES)).collect();
        self.closest_of(point, scanned, k)
    }

    /// Node indices from the cells covering a box of `radius_m` around `point`.
    /// `None` when the box spans too many cells to be worth walking.
    fn box_candidates(&self, point: &GeoPoint, radius_m: f64) -> Option<Vec<usize>> {
        let (dlat, dlon) = degree_span(radius_m, point.lat);
        let low = cell_of(&GeoPoint::new(point.lat - dlat, point.lon - dlon));
        let high = cell_of(&GeoPoint::new(point.lat + dlat, point.lon + dlon));
        if (high.0 - low.0 + 1) * (high.1 - low.1 + 1) > MAX_BOX_CELLS {
            return None;
        }
        let mut out = Vec::new();
        for lat_cell in low.0..=high.0 {
            for lon_cell in low.1..=high.1 {
                if let Some(bucket) = self.cells.get(&(lat_cell, lon_cell)) {
                    out.extend(bucket.iter().copied().filter(|&idx| {
                        let p = self.nodes[idx].position;
                        (p.lat - point.lat).abs() <= dlat && (p.lon - point.lon).abs() <= dlon
                    }));
                }
            }
        }
        Some(out)
    }

    fn closest_of(&self, point: &GeoPoint, candidates: Vec<usize>, k: usize) -> Vec<usize> {
        let mut ranked: Vec<(f64, usize)> = candidates
            .into_iter()
            .filter(|&idx| !self.nodes[idx].is_blocked())
            .map(|idx| (self.nodes[idx].position.distance_m(point), idx))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(k).map(|(_, idx)| idx).collect()
    }

    fn push_node(&mut self, key: NodeKey, position: GeoPoint, category: NodeCategory, weight: f64) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(GraphNode {
            key,
            position,
            category,
            weight,
        });
        self.adjacency.push(Vec::new());
        self.cells.entry(cell_of(&position)).or_default().push(idx);
        idx
    }

    fn push_edge(&mut self, a: usize, b: usize, length_m: f64, category: EdgeCategory) {
        let idx = self.edges.len();
        self.edges.push(GraphEdge {
            a,
            b,
            length_m,
            weight: length_m,
            category,
        });
        self.adjacency[a].push(idx);
        self.adjacency[b].push(idx);
    }

    fn apply_zones(&mut self) {
        if self.zones.is_empty() {
            return;
        }
        let mut blocked_nodes = 0usize;
        for node in &mut self.nodes {
            if self.zones.iter().any(|zone| zone.contains(&node.position)) {
                node.weight = f64::INFINITY;
                node.category = NodeCategory::Critical;
                blocked_nodes += 1;
            }
        }
        let mut blocked_edges = 0usize;
        for edge in &mut self.edges {
            let a = &self.nodes[edge.a];
            let b = &self.nodes[edge.b];
            let hit = a.is_blocked()
                || b.is_blocked()
                || self
                    .zones
                    .iter()
                    .any(|zone| zone.intersects_segment(&a.position, &b.position));
            if hit {
                edge.weight = f64::INFINITY;
                blocked_edges += 1;
            }
        }
        debug!(
            zones = self.zones.len(),
            blocked_nodes, blocked_edges, "Applied no-fly zones"
        );
    }
}

/// Build the routable graph for `drone_type` with `zones` applied.
pub fn build_graph(
    network: &RoadNetwork,
    buildings: &[Building],
    zones: &[NoFlyZone],
    drone_type: DroneType,
) -> Result<Graph> {
    if network.nodes.is_empty() {
        return Err(FleetError::EmptyNetwork);
    }
    let profile = drone_type.profile();
    let mut graph = Graph {
        nodes: Vec::with_capacity(network.nodes.len()),
        edges: Vec::with_capacity(network.edges.len()),
        adjacency: Vec::with_capacity(network.nodes.len()),
        cells: HashMap::new(),
        profile,
        zones: zones.to_vec(),
        zone_version: 0,
    };

    let mut by_id: HashMap<i64, usize> = HashMap::with_capacity(network.nodes.len());
    for raw in &network.nodes {
        let position = GeoPoint::new(raw.lat, raw.lon);
        if !position.is_valid() || by_id.contains_key(&raw.id) {
            continue;
        }
        let idx = graph.push_node(NodeKey::Road(raw.id), position, NodeCategory::Road, 1.0);
        by_id.insert(raw.id, idx);
    }
    if graph.nodes.is_empty() {
        return Err(FleetError::EmptyNetwork);
    }

    let mut skipped = 0usize;
    for raw in &network.edges {
        let (Some(&a), Some(&b)) = (by_id.get(&raw.u), by_id.get(&raw.v)) else {
            skipped += 1;
            continue;
        };
        if a == b {
            continue;
        }
        let length_m = raw
            .length_m
            .filter(|len| len.is_finite() && *len >= 0.0)
            .unwrap_or_else(|| graph.nodes[a].position.distance_m(&graph.nodes[b].position));
        graph.push_edge(a, b, length_m, EdgeCategory::Road);
    }
    if skipped > 0 {
        debug!(skipped, "Skipped edges referencing unknown nodes");
    }

    let road_count = graph.nodes.len();
    if profile.overflies_buildings {
        add_building_nodes(&mut graph, buildings, road_count);
    }

    graph.apply_zones();
    info!(
        drone_type = %drone_type,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        zones = graph.zones.len(),
        "Built city graph"
    );
    Ok(graph)
}

fn add_building_nodes(graph: &mut Graph, buildings: &[Building], road_count: usize) {
    let weight = graph.profile.building_weight();
    let mut added = 0usize;
    for (i, building) in buildings.iter().take(MAX_BUILDING_NODES).enumerate() {
        let position = GeoPoint::new(building.lat, building.lon);
        if !position.is_valid() {
            continue;
        }
        let Some(candidates) = graph.box_candidates(&position, MAX_BUILDING_LINK_M) else {
            continue;
        };
        let roads = candidates.into_iter().filter(|&idx| idx < road_count).collect();
        let Some(road) = graph.closest_of(&position, roads, 1).first().copied() else {
            continue;
        };
        let link_m = graph.nodes[road].position.distance_m(&position);
        if link_m > MAX_BUILDING_LINK_M {
            continue;
        }
        let idx = graph.push_node(NodeKey::Building(i), position, NodeCategory::Building, weight);
        graph.push_edge(idx, road, link_m, EdgeCategory::Connection);
        added += 1;
    }
    debug!(added, "Added building nodes");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_city_names() {
        assert_eq!(city_file_stem("Berlin, Germany"), "Berlin_Germany");
        assert_eq!(city_file_stem("  Saint - Petersburg "), "Saint_Petersburg");
        assert_eq!(city_file_stem("../../etc/passwd"), "etcpasswd");
        assert_eq!(city_file_stem("Москва"), "Москва");
        assert_eq!(city_file_stem("!!!"), "");
    }

    fn line_network() -> RoadNetwork {
        // three nodes along the equator, ~111 m apart
        RoadNetwork {
            nodes: vec![
                RoadNode { id: 1, lat: 0.0, lon: 0.000 },
                RoadNode { id: 2, lat: 0.0, lon: 0.001 },
                RoadNode { id: 3, lat: 0.0, lon: 0.002 },
            ],
            edges: vec![
                RoadEdge { u: 1, v: 2, length_m: Some(120.0) },
                RoadEdge { u: 2, v: 3, length_m: None },
                RoadEdge { u: 3, v: 99, length_m: None },
            ],
        }
    }

    #[test]
    fn empty_network_is_rejected() {
        let err = build_graph(&RoadNetwork::default(), &[], &[], DroneType::Cargo).unwrap_err();
        assert_eq!(err, FleetError::EmptyNetwork);
    }

    #[test]
    fn edges_keep_or_compute_length() {
        let graph = build_graph(&line_network(), &[], &[], DroneType::Cargo).unwrap();
        assert_eq!(graph.node_count(), 3);
        // edge to unknown node 99 skipped
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges()[0].length_m, 120.0);
        assert!((graph.edges()[1].length_m - 111.19).abs() < 0.1);
        assert!(graph.nodes().iter().all(|n| n.weight == 1.0));
    }

    #[test]
    fn cargo_graph_has_no_buildings() {
        let buildings = vec![Building { lat: 0.0005, lon: 0.001, height_m: None }];
        let graph = build_graph(&line_network(), &buildings, &[], DroneType::Cargo).unwrap();
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn operator_graph_links_nearby_buildings_only() {
        let mut buildings: Vec<Building> = (0..60)
            .map(|i| Building { lat: 0.0005, lon: 0.00001 * i as f64, height_m: None })
            .collect();
        // far away building is dropped
        buildings.insert(0, Building { lat: 1.0, lon: 1.0, height_m: None });
        let graph = build_graph(&line_network(), &buildings, &[], DroneType::Operator).unwrap();

        let building_nodes: Vec<_> = graph
            .nodes()
            .iter()
            .filter(|n| n.category == NodeCategory::Building)
            .collect();
        assert_eq!(building_nodes.len(), MAX_BUILDING_NODES - 1);
        assert!(building_nodes.iter().all(|n| n.weight == 10.0));
        assert!(graph
            .edges()
            .iter()
            .filter(|e| e.category == EdgeCategory::Connection)
            .all(|e| e.length_m <= MAX_BUILDING_LINK_M));
    }

    #[test]
    fn zone_blocks_inside_nodes_and_crossing_edges() {
        let zone = NoFlyZone::new("z", -0.0005, 0.0005, 0.0015, 0.0025).unwrap();
        let graph = build_graph(&line_network(), &[], &[zone], DroneType::Cargo).unwrap();
        assert!(graph.node(2).is_blocked());
        assert_eq!(graph.node(2).category, NodeCategory::Critical);
        assert!(!graph.node(1).is_blocked());
        assert!(!graph.edges()[0].is_blocked());
        assert!(graph.edges()[1].is_blocked());
    }

    #[test]
    fn nearest_node_skips_blocked() {
        let zone = NoFlyZone::new("z", -0.0005, 0.0005, 0.0015, 0.0025).unwrap();
        let graph = build_graph(&line_network(), &[], &[zone], DroneType::Cargo).unwrap();
        let near_blocked = GeoPoint::new(0.0, 0.0021);
        assert_eq!(graph.nearest_node(&near_blocked), Some(1));
        assert_eq!(graph.k_nearest(&near_blocked, 5), vec![1, 0]);
    }

    #[test]
    fn nearest_node_falls_back_to_full_scan() {
        let graph = build_graph(&line_network(), &[], &[], DroneType::Cargo).unwrap();
        // ~55 km away, outside both boxes
        assert_eq!(graph.nearest_node(&GeoPoint::new(0.5, 0.002)), Some(2));
    }
}
