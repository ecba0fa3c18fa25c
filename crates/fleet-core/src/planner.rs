//! Door-to-door route planning over a [`Graph`], with optional charging stops.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};
use crate::graph::Graph;
use crate::models::ChargerId;
use crate::overlay::Overlay;
use crate::search::{range_limited_search, BEST_EFFORT_FACTOR};
use crate::spatial::GeoPoint;

/// Share of the nominal range a plan may consume.
pub const USABLE_RANGE_FRACTION: f64 = 0.9;
/// The destination must have a charger within this share of a full charge.
pub const ESCAPE_RANGE_FRACTION: f64 = 0.8;

/// A planned flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub points: Vec<GeoPoint>,
    pub length_m: f64,
    /// Longer than the requested range, accepted within the relaxation factor
    #[serde(default)]
    pub best_effort: bool,
}

/// Plan from `start` through `waypoints` to `end` within `max_range_m`.
///
/// Each leg is searched on a private overlay; the graph is never modified.
pub fn plan_path(
    graph: &Graph,
    start: GeoPoint,
    end: GeoPoint,
    max_range_m: f64,
    waypoints: &[GeoPoint],
) -> Result<Path> {
    let mut overlay = Overlay::new(graph);
    let mut stops = Vec::with_capacity(waypoints.len() + 2);
    stops.push(overlay.attach_origin(start).map_err(as_route_failure)?);
    for point in waypoints.iter().chain(std::iter::once(&end)) {
        stops.push(overlay.attach(*point).map_err(as_route_failure)?);
    }

    let mut points: Vec<GeoPoint> = Vec::new();
    let mut length_m = 0.0;
    let mut best_effort = false;
    for (leg, pair) in stops.windows(2).enumerate() {
        let found = range_limited_search(&overlay, pair[0], pair[1], max_range_m).map_err(|err| {
            debug!(leg, error = %err, "Leg search failed");
            as_route_failure(err)
        })?;
        length_m += found.length_m;
        best_effort |= found.best_effort;
        let skip = usize::from(!points.is_empty());
        points.extend(found.nodes.iter().skip(skip).map(|&node| overlay.position(node)));
    }

    if length_m > BEST_EFFORT_FACTOR * max_range_m {
        return Err(FleetError::NoRouteFound(format!(
            "route {length_m:.0} m exceeds range {max_range_m:.0} m"
        )));
    }
    best_effort |= length_m > max_range_m;
    Ok(Path {
        points,
        length_m,
        best_effort,
    })
}

/// A multi-stop plan fails as a whole: unreachable legs surface as `NoRouteFound`.
fn as_route_failure(err: FleetError) -> FleetError {
    match err {
        FleetError::NodeNotReachable(msg) => FleetError::NoRouteFound(msg),
        other => other,
    }
}

/// A charger the planner may stop at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargerStop {
    pub id: ChargerId,
    pub position: GeoPoint,
}

/// Result of energy-aware planning.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargePlan {
    pub path: Path,
    /// Charger the route stops at, if any
    pub via: Option<ChargerId>,
    /// Set when the route was accepted despite a soft check failing
    pub warning: Option<String>,
}

/// Range usable at `battery_pct` for a drone with `battery_range_m` on a full charge.
pub fn usable_range(battery_range_m: f64, battery_pct: f64) -> f64 {
    battery_range_m * (battery_pct.clamp(0.0, 100.0) / 100.0) * USABLE_RANGE_FRACTION
}

/// Plan a route respecting the battery, inserting one charging stop when needed.
///
/// `battery_range_m` is the flying drone's range on a full charge, which may
/// differ from the profile the graph was built for.
/// `chargers` are tried in the given order (base first); ties on total
/// length keep the earlier charger. A direct route that fits the battery but
/// ends out of reach of every charger is still returned, with a warning, if
/// no charging stop works.
pub fn plan_with_charging(
    graph: &Graph,
    start: GeoPoint,
    end: GeoPoint,
    waypoints: &[GeoPoint],
    battery_range_m: f64,
    battery_pct: f64,
    chargers: &[ChargerStop],
) -> Result<ChargePlan> {
    let usable_now = usable_range(battery_range_m, battery_pct);
    let usable_full = usable_range(battery_range_m, 100.0);
    let escape_m = ESCAPE_RANGE_FRACTION * battery_range_m;

    let direct = plan_path(graph, start, end, usable_now, waypoints);
    let direct_fits = matches!(&direct, Ok(path) if !path.best_effort && path.length_m <= usable_now);
    let can_escape = chargers
        .iter()
        .any(|charger| charger.position.distance_m(&end) <= escape_m);

    if direct_fits && can_escape {
        if let Ok(path) = direct {
            return Ok(ChargePlan {
                path,
                via: None,
                warning: None,
            });
        }
    }

    let mut best: Option<ChargePlan> = None;
    for charger in chargers {
        let first = match plan_path(graph, start, charger.position, usable_now, &[]) {
            Ok(path) if !path.best_effort => path,
            _ => continue,
        };
        let second = match plan_path(graph, charger.position, end, usable_full, waypoints) {
            Ok(path) if !path.best_effort => path,
            _ => continue,
        };
        let total = first.length_m + second.length_m;
        debug!(charger = %charger.id, total_m = total, "Charging stop candidate");
        if best.as_ref().map_or(true, |plan| total < plan.path.length_m) {
            let mut points = first.points;
            points.extend(second.points.into_iter().skip(1));
            best = Some(ChargePlan {
                path: Path {
                    points,
                    length_m: total,
                    best_effort: false,
                },
                via: Some(charger.id),
                warning: None,
            });
        }
    }

    if let Some(plan) = best {
        info!(via = ?plan.via, length_m = plan.path.length_m, "Planned route via charger");
        return Ok(plan);
    }

    match direct {
        Ok(path) if direct_fits => {
            let warning = format!(
                "no charger within {escape_m:.0} m of destination ({:.5}, {:.5})",
                end.lat, end.lon
            );
            warn!(%warning, "Accepting direct route without escape margin");
            Ok(ChargePlan {
                path,
                via: None,
                warning: Some(warning),
            })
        }
        Ok(path) => Err(FleetError::NoRouteFound(format!(
            "route {:.0} m exceeds usable range {usable_now:.0} m and no charging stop works",
            path.length_m
        ))),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, RoadEdge, RoadNetwork, RoadNode};
    use crate::models::DroneType;
    use crate::zones::NoFlyZone;

    fn two_nodes() -> Graph {
        // B is 500 m north of A
        let b = GeoPoint::new(0.0, 0.0).offset(500.0, 0.0);
        let network = RoadNetwork {
            nodes: vec![
                RoadNode { id: 1, lat: 0.0, lon: 0.0 },
                RoadNode { id: 2, lat: b.lat, lon: b.lon },
            ],
            edges: vec![RoadEdge { u: 1, v: 2, length_m: Some(500.0) }],
        };
        build_graph(&network, &[], &[], DroneType::Cargo).unwrap()
    }

    #[test]
    fn node_to_node_path() {
        let graph = two_nodes();
        let a = graph.node(0).position;
        let b = graph.node(1).position;
        let path = plan_path(&graph, a, b, 10_000.0, &[]).unwrap();
        assert_eq!(path.points, vec![a, b]);
        assert_eq!(path.length_m, 500.0);
        assert!(!path.best_effort);
    }

    #[test]
    fn free_points_go_through_temporary_links() {
        let graph = two_nodes();
        let start = GeoPoint::new(0.0, 0.0005);
        let end = graph.node(1).position.offset(40.0, std::f64::consts::FRAC_PI_2);
        let path = plan_path(&graph, start, end, 10_000.0, &[]).unwrap();
        assert_eq!(path.points.first(), Some(&start));
        assert_eq!(path.points.last(), Some(&end));
        assert!(path.length_m >= start.distance_m(&end));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn waypoint_legs_are_joined_without_duplicates() {
        let graph = two_nodes();
        let a = graph.node(0).position;
        let b = graph.node(1).position;
        let path = plan_path(&graph, a, a, 10_000.0, &[b]).unwrap();
        assert_eq!(path.points, vec![a, b, a]);
        assert_eq!(path.length_m, 1_000.0);
    }

    #[test]
    fn endpoint_fenced_off_fails() {
        let graph = two_nodes();
        let b = graph.node(1).position;
        let zone = NoFlyZone::new("z", b.lat - 0.001, b.lat + 0.001, b.lon - 0.001, b.lon + 0.001).unwrap();
        let network = RoadNetwork {
            nodes: vec![
                RoadNode { id: 1, lat: 0.0, lon: 0.0 },
                RoadNode { id: 2, lat: b.lat, lon: b.lon },
            ],
            edges: vec![RoadEdge { u: 1, v: 2, length_m: Some(500.0) }],
        };
        let fenced = build_graph(&network, &[], &[zone], DroneType::Cargo).unwrap();
        let err = plan_path(&fenced, GeoPoint::new(0.0, 0.0), b, 10_000.0, &[]).unwrap_err();
        assert!(matches!(err, FleetError::NoRouteFound(_)));
    }

    #[test]
    fn usable_range_keeps_reserve() {
        assert!((usable_range(15_000.0, 100.0) - 13_500.0).abs() < 1e-9);
        assert!((usable_range(20_000.0, 50.0) - 9_000.0).abs() < 1e-9);
    }

    #[test]
    fn direct_route_without_escape_is_returned_with_warning() {
        let graph = two_nodes();
        let a = graph.node(0).position;
        let b = graph.node(1).position;
        let range = graph.profile().battery_range_m;
        let plan = plan_with_charging(&graph, a, b, &[], range, 100.0, &[]).unwrap();
        assert_eq!(plan.via, None);
        assert!(plan.warning.is_some());
        assert_eq!(plan.path.length_m, 500.0);
    }
}
