//! Rectangular no-fly zones.

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::spatial::{segments_intersect, GeoPoint};

/// Operator-declared axis-aligned rectangle where routing is forbidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoFlyZone {
    pub id: String,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// Zone as submitted by an operator; bounds may be given in any order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRequest {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    #[serde(default)]
    pub id: Option<String>,
}

impl NoFlyZone {
    /// Build a zone with normalised bounds. Fails on non-finite or out-of-range corners.
    pub fn new(id: impl Into<String>, lat_a: f64, lat_b: f64, lon_a: f64, lon_b: f64) -> Result<Self> {
        for corner in [GeoPoint::new(lat_a, lon_a), GeoPoint::new(lat_b, lon_b)] {
            if !corner.is_valid() {
                return Err(FleetError::InvalidPoint {
                    lat: corner.lat,
                    lon: corner.lon,
                });
            }
        }
        Ok(Self {
            id: id.into(),
            lat_min: lat_a.min(lat_b),
            lat_max: lat_a.max(lat_b),
            lon_min: lon_a.min(lon_b),
            lon_max: lon_a.max(lon_b),
        })
    }

    /// Inclusive membership test.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.lat_min <= point.lat
            && point.lat <= self.lat_max
            && self.lon_min <= point.lon
            && point.lon <= self.lon_max
    }

    /// True when segment `a-b` touches the rectangle: either endpoint inside,
    /// or the segment crosses one of the four boundary edges.
    pub fn intersects_segment(&self, a: &GeoPoint, b: &GeoPoint) -> bool {
        // bounding-box rejection
        if a.lat.max(b.lat) < self.lat_min
            || a.lat.min(b.lat) > self.lat_max
            || a.lon.max(b.lon) < self.lon_min
            || a.lon.min(b.lon) > self.lon_max
        {
            return false;
        }
        if self.contains(a) || self.contains(b) {
            return true;
        }

        let p = (a.lon, a.lat);
        let q = (b.lon, b.lat);
        let sw = (self.lon_min, self.lat_min);
        let se = (self.lon_max, self.lat_min);
        let ne = (self.lon_max, self.lat_max);
        let nw = (self.lon_min, self.lat_max);

        segments_intersect(p, q, sw, se)
            || segments_intersect(p, q, se, ne)
            || segments_intersect(p, q, ne, nw)
            || segments_intersect(p, q, nw, sw)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }
}

/// True when the point lies in any zone.
pub fn point_in_any(zones: &[NoFlyZone], point: &GeoPoint) -> bool {
    zones.iter().any(|zone| zone.contains(point))
}

/// True when the segment touches any zone.
pub fn segment_hits_any(zones: &[NoFlyZone], a: &GeoPoint, b: &GeoPoint) -> bool {
    zones.iter().any(|zone| zone.intersects_segment(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> NoFlyZone {
        NoFlyZone::new("z", 1.0, 0.0, 1.0, 0.0).unwrap()
    }

    #[test]
    fn bounds_are_normalised() {
        let z = zone();
        assert_eq!((z.lat_min, z.lat_max, z.lon_min, z.lon_max), (0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn invalid_corner_is_rejected() {
        let err = NoFlyZone::new("bad", 0.0, 95.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, FleetError::InvalidPoint { .. }));
    }

    #[test]
    fn membership_is_inclusive() {
        let z = zone();
        assert!(z.contains(&GeoPoint::new(0.5, 0.5)));
        assert!(z.contains(&GeoPoint::new(1.0, 0.0)));
        assert!(!z.contains(&GeoPoint::new(1.01, 0.5)));
    }

    #[test]
    fn segment_bisecting_zone_without_inside_endpoints_is_detected() {
        let z = zone();
        let a = GeoPoint::new(0.5, -1.0);
        let b = GeoPoint::new(0.5, 2.0);
        assert!(!z.contains(&a) && !z.contains(&b));
        assert!(z.intersects_segment(&a, &b));
    }

    #[test]
    fn segment_passing_beside_zone_is_clear() {
        let z = zone();
        // diagonal whose bounding box overlaps the zone but which passes the NE corner
        let a = GeoPoint::new(0.8, 1.5);
        let b = GeoPoint::new(1.5, 0.8);
        assert!(!z.intersects_segment(&a, &b));
        let c = GeoPoint::new(-0.5, 2.0);
        let d = GeoPoint::new(2.0, 1.2);
        assert!(!z.intersects_segment(&c, &d));
    }
}
