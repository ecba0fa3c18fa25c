//! Range-limited shortest-path search with algorithmic fallbacks.

use ordered_float::OrderedFloat;
use pathfinding::prelude::{astar, bfs, dijkstra};
use tracing::{debug, warn};

use crate::error::{FleetError, Result};
use crate::overlay::Overlay;

/// Best-effort results are accepted up to this multiple of the range.
pub const BEST_EFFORT_FACTOR: f64 = 2.0;

/// Search strategies, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AStar,
    Dijkstra,
    /// Fewest hops, ignoring weights
    FewestHops,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Strategy::AStar, Strategy::Dijkstra, Strategy::FewestHops];
}

/// Node sequence found by a search, with its flown length.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePath {
    pub nodes: Vec<usize>,
    pub length_m: f64,
    pub best_effort: bool,
    pub strategy: Strategy,
}

fn run(overlay: &Overlay<'_>, strategy: Strategy, from: usize, to: usize) -> Option<Vec<usize>> {
    let successors = |node: &usize| {
        overlay
            .successors(*node)
            .into_iter()
            .map(|edge| (edge.to, OrderedFloat(edge.cost)))
            .collect::<Vec<_>>()
    };
    match strategy {
        Strategy::AStar => {
            let goal = overlay.position(to);
            astar(
                &from,
                successors,
                |node| OrderedFloat(overlay.position(*node).distance_m(&goal)),
                |node| *node == to,
            )
            .map(|(nodes, _)| nodes)
        }
        Strategy::Dijkstra => dijkstra(&from, successors, |node| *node == to).map(|(nodes, _)| nodes),
        Strategy::FewestHops => bfs(
            &from,
            |node| {
                overlay
                    .successors(*node)
                    .into_iter()
                    .map(|edge| edge.to)
                    .collect::<Vec<_>>()
            },
            |node| *node == to,
        ),
    }
}

/// Sum of edge lengths along `nodes`.
pub fn path_length(overlay: &Overlay<'_>, nodes: &[usize]) -> f64 {
    nodes
        .windows(2)
        .map(|pair| {
            overlay
                .edge_length(pair[0], pair[1])
                .unwrap_or_else(|| overlay.position(pair[0]).distance_m(&overlay.position(pair[1])))
        })
        .sum()
}

/// Find a path from `from` to `to` no longer than `max_range_m`.
///
/// The first strategy whose result fits the range wins. Failing that, the
/// shortest result is returned flagged `best_effort` if it is within
/// [`BEST_EFFORT_FACTOR`] of the range.
pub fn range_limited_search(
    overlay: &Overlay<'_>,
    from: usize,
    to: usize,
    max_range_m: f64,
) -> Result<NodePath> {
    let mut shortest: Option<NodePath> = None;
    for strategy in Strategy::ORDER {
        // all strategies share one successor function: if one finds nothing, none will
        let Some(nodes) = run(overlay, strategy, from, to) else {
            break;
        };
        let length_m = path_length(overlay, &nodes);
        debug!(?strategy, length_m, max_range_m, hops = nodes.len(), "Search result");
        if length_m <= max_range_m {
            return Ok(NodePath {
                nodes,
                length_m,
                best_effort: false,
                strategy,
            });
        }
        if shortest.as_ref().map_or(true, |best| length_m < best.length_m) {
            shortest = Some(NodePath {
                nodes,
                length_m,
                best_effort: true,
                strategy,
            });
        }
    }

    match shortest {
        None => Err(FleetError::NodeNotReachable(format!(
            "no connection between nodes {from} and {to}"
        ))),
        Some(path) if path.length_m <= BEST_EFFORT_FACTOR * max_range_m => {
            warn!(
                length_m = path.length_m,
                max_range_m, "Accepting best-effort path over range"
            );
            Ok(path)
        }
        Some(path) => Err(FleetError::NoRouteFound(format!(
            "shortest path {:.0} m exceeds range {:.0} m",
            path.length_m, max_range_m
        ))),
    }
}
