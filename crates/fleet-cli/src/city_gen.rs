//! Synthetic grid cities for demos and load tests.

use fleet_core::{Building, CityData, GeoPoint, RoadEdge, RoadNetwork, RoadNode};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct GridSpec {
    pub name: String,
    pub origin: GeoPoint,
    pub rows: usize,
    pub cols: usize,
    pub spacing_m: f64,
    /// Fraction of street segments removed at random
    pub drop_fraction: f64,
    pub buildings: usize,
}

/// Lay out a `rows x cols` street grid north and east of `origin`, remove a
/// share of the segments, and scatter buildings inside the grid.
pub fn generate_city<R: Rng>(spec: &GridSpec, rng: &mut R) -> CityData {
    let id = |row: usize, col: usize| (row * spec.cols + col) as i64;
    let east = std::f64::consts::FRAC_PI_2;

    let mut nodes = Vec::with_capacity(spec.rows * spec.cols);
    for row in 0..spec.rows {
        let west_edge = spec.origin.offset(row as f64 * spec.spacing_m, 0.0);
        for col in 0..spec.cols {
            let p = west_edge.offset(col as f64 * spec.spacing_m, east);
            nodes.push(RoadNode { id: id(row, col), lat: p.lat, lon: p.lon });
        }
    }

    let drop = spec.drop_fraction.clamp(0.0, 0.9);
    let mut edges = Vec::new();
    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let neighbours = [(row, col + 1), (row + 1, col)];
            for (r, c) in neighbours {
                if r >= spec.rows || c >= spec.cols || rng.random_bool(drop) {
                    continue;
                }
                edges.push(RoadEdge {
                    u: id(row, col),
                    v: id(r, c),
                    length_m: None,
                });
            }
        }
    }

    let north_span = spec.rows.saturating_sub(1) as f64 * spec.spacing_m;
    let east_span = spec.cols.saturating_sub(1) as f64 * spec.spacing_m;
    let buildings = (0..spec.buildings)
        .map(|_| {
            let p = spec
                .origin
                .offset(rng.random_range(0.0..=north_span), 0.0)
                .offset(rng.random_range(0.0..=east_span), east);
            Building {
                lat: p.lat,
                lon: p.lon,
                height_m: Some(rng.random_range(6.0..90.0)),
            }
        })
        .collect();

    CityData {
        name: spec.name.clone(),
        network: RoadNetwork { nodes, edges },
        buildings,
    }
}
