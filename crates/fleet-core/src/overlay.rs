//! Per-call overlay that wires arbitrary points into a shared graph.
//!
//! Temporary nodes get indices starting at `graph.node_count()`. The base
//! graph is only read; dropping the overlay discards everything it added.

use std::collections::HashMap;

use crate::error::{FleetError, Result};
use crate::graph::{EdgeCategory, Graph, NodeCategory};
use crate::spatial::GeoPoint;
use crate::zones::NoFlyZone;

/// Neighbours a temporary node is wired to.
pub const TEMP_LINKS: usize = 5;
/// A point this close to a passable node uses the node directly.
pub const SNAP_TO_NODE_M: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct OverlayEdge {
    pub to: usize,
    pub length_m: f64,
    /// Search cost: length scaled by the weight of the node entered
    pub cost: f64,
    pub category: EdgeCategory,
}

pub struct Overlay<'g> {
    graph: &'g Graph,
    temp_nodes: Vec<GeoPoint>,
    temp_adjacency: HashMap<usize, Vec<OverlayEdge>>,
}

impl<'g> Overlay<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            temp_nodes: Vec::new(),
            temp_adjacency: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn temp_count(&self) -> usize {
        self.temp_nodes.len()
    }

    pub fn position(&self, node: usize) -> GeoPoint {
        let base = self.graph.node_count();
        if node < base {
            self.graph.node(node).position
        } else {
            self.temp_nodes[node - base]
        }
    }

    pub fn category(&self, node: usize) -> NodeCategory {
        if node < self.graph.node_count() {
            self.graph.node(node).category
        } else {
            NodeCategory::Temporary
        }
    }

    fn entry_weight(&self, node: usize) -> f64 {
        if node < self.graph.node_count() {
            self.graph.node(node).weight
        } else {
            1.0
        }
    }

    /// Resolve `point` to a routable node, creating a temporary one if needed.
    /// Temporary links never enter a no-fly zone.
    pub fn attach(&mut self, point: GeoPoint) -> Result<usize> {
        self.attach_with(point, false)
    }

    /// Like [`Overlay::attach`], but links may leave zones containing `point`,
    /// so a drone caught inside a freshly declared zone can fly out.
    pub fn attach_origin(&mut self, point: GeoPoint) -> Result<usize> {
        self.attach_with(point, true)
    }

    fn attach_with(&mut self, point: GeoPoint, may_leave_zone: bool) -> Result<usize> {
        if !point.is_valid() {
            return Err(FleetError::InvalidPoint {
                lat: point.lat,
                lon: point.lon,
            });
        }
        let nearest = self.graph.k_nearest(&point, TEMP_LINKS);
        if let Some(&first) = nearest.first() {
            if self.graph.node(first).position.distance_m(&point) <= SNAP_TO_NODE_M {
                return Ok(first);
            }
        }

        let blocking: Vec<&NoFlyZone> = self
            .graph
            .zones()
            .iter()
            .filter(|zone| !(may_leave_zone && zone.contains(&point)))
            .collect();
        let links: Vec<(usize, f64)> = nearest
            .into_iter()
            .filter_map(|target| {
                let target_pos = self.graph.node(target).position;
                let crosses = blocking
                    .iter()
                    .any(|zone| zone.intersects_segment(&point, &target_pos));
                (!crosses).then(|| (target, point.distance_m(&target_pos)))
            })
            .collect();
        if links.is_empty() {
            return Err(FleetError::NodeNotReachable(format!(
                "no zone-free link from ({:.6}, {:.6})",
                point.lat, point.lon
            )));
        }

        let idx = self.graph.node_count() + self.temp_nodes.len();
        self.temp_nodes.push(point);
        for (target, length_m) in links {
            self.link(idx, target, length_m);
        }
        Ok(idx)
    }

    fn link(&mut self, temp: usize, target: usize, length_m: f64) {
        let into_target = OverlayEdge {
            to: target,
            length_m,
            cost: length_m * self.entry_weight(target),
            category: EdgeCategory::Temporary,
        };
        let into_temp = OverlayEdge {
            to: temp,
            length_m,
            cost: length_m,
            category: EdgeCategory::Temporary,
        };
        self.temp_adjacency.entry(temp).or_default().push(into_target);
        self.temp_adjacency.entry(target).or_default().push(into_temp);
    }

    /// Passable edges leaving `node`. Blocked nodes and edges are never yielded.
    pub fn successors(&self, node: usize) -> Vec<OverlayEdge> {
        let mut out = Vec::new();
        if node < self.graph.node_count() {
            for (to, edge) in self.graph.incident(node) {
                let entry = self.graph.node(to).weight;
                if edge.is_blocked() || entry.is_infinite() {
                    continue;
                }
                out.push(OverlayEdge {
                    to,
                    length_m: edge.length_m,
                    cost: edge.weight * entry,
                    category: edge.category,
                });
            }
        }
        if let Some(extra) = self.temp_adjacency.get(&node) {
            out.extend(extra.iter().copied());
        }
        out
    }

    /// Shortest passable edge between two adjacent nodes.
    pub fn edge_length(&self, from: usize, to: usize) -> Option<f64> {
        self.successors(from)
            .into_iter()
            .filter(|edge| edge.to == to)
            .map(|edge| edge.length_m)
            .min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, RoadEdge, RoadNetwork, RoadNode};
    use crate::models::DroneType;

    fn square() -> Graph {
        let network = RoadNetwork {
            nodes: vec![
                RoadNode { id: 1, lat: 0.0, lon: 0.0 },
                RoadNode { id: 2, lat: 0.0, lon: 0.001 },
                RoadNode { id: 3, lat: 0.001, lon: 0.001 },
                RoadNode { id: 4, lat: 0.001, lon: 0.0 },
            ],
            edges: vec![
                RoadEdge { u: 1, v: 2, length_m: None },
                RoadEdge { u: 2, v: 3, length_m: None },
                RoadEdge { u: 3, v: 4, length_m: None },
                RoadEdge { u: 4, v: 1, length_m: None },
            ],
        };
        build_graph(&network, &[], &[], DroneType::Cargo).unwrap()
    }

    #[test]
    fn point_on_node_snaps() {
        let graph = square();
        let mut overlay = Overlay::new(&graph);
        assert_eq!(overlay.attach(GeoPoint::new(0.0, 0.001)).unwrap(), 1);
        assert_eq!(overlay.temp_count(), 0);
    }

    #[test]
    fn free_point_gets_temporary_links() {
        let graph = square();
        let mut overlay = Overlay::new(&graph);
        let idx = overlay.attach(GeoPoint::new(0.0005, 0.0005)).unwrap();
        assert_eq!(idx, graph.node_count());
        assert_eq!(overlay.category(idx), NodeCategory::Temporary);
        assert_eq!(overlay.successors(idx).len(), 4);
        assert!(overlay.successors(0).iter().any(|e| e.to == idx));
        // base graph untouched
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn only_origin_may_link_out_of_a_zone() {
        let graph = square();
        let zone = NoFlyZone::new("z", 0.0004, 0.0006, 0.0004, 0.0006).unwrap();
        let fenced = build_graph_with(&graph, zone);
        let inside = GeoPoint::new(0.0005, 0.0005);

        let mut overlay = Overlay::new(&fenced);
        assert!(matches!(
            overlay.attach(inside),
            Err(FleetError::NodeNotReachable(_))
        ));
        let idx = overlay.attach_origin(inside).unwrap();
        assert_eq!(idx, fenced.node_count());
        assert_eq!(overlay.successors(idx).len(), 4);
    }

    fn build_graph_with(graph: &Graph, zone: NoFlyZone) -> Graph {
        let network = RoadNetwork {
            nodes: graph
                .nodes()
                .iter()
                .enumerate()
                .map(|(i, n)| RoadNode { id: i as i64, lat: n.position.lat, lon: n.position.lon })
                .collect(),
            edges: graph
                .edges()
                .iter()
                .map(|e| RoadEdge { u: e.a as i64, v: e.b as i64, length_m: Some(e.length_m) })
                .collect(),
        };
        build_graph(&network, &[], &[zone], DroneType::Cargo).unwrap()
    }

    #[test]
    fn invalid_point_is_rejected() {
        let graph = square();
        let mut overlay = Overlay::new(&graph);
        let err = overlay.attach(GeoPoint::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, FleetError::InvalidPoint { .. }));
    }
}
