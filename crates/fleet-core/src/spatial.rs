//! Spatial math on WGS84 coordinates: distances, offsets and segment tests.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic point. Serialized as a `[lat, lon]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }

    /// Linear interpolation in lat/lon space; `fraction` is clamped to [0, 1].
    pub fn move_towards(&self, target: &GeoPoint, fraction: f64) -> GeoPoint {
        let t = fraction.clamp(0.0, 1.0);
        GeoPoint {
            lat: self.lat + (target.lat - self.lat) * t,
            lon: self.lon + (target.lon - self.lon) * t,
        }
    }

    /// Point `distance_m` away along `bearing_rad` (0 = north, π/2 = east).
    pub fn offset(&self, distance_m: f64, bearing_rad: f64) -> GeoPoint {
        let (lat, lon) = offset_by_bearing(self.lat, self.lon, distance_m, bearing_rad);
        GeoPoint { lat, lon }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

impl From<GeoPoint> for (f64, f64) {
    fn from(point: GeoPoint) -> Self {
        (point.lat, point.lon)
    }
}

/// Parses `"lat,lon"`, rejecting points outside WGS84 bounds.
impl std::str::FromStr for GeoPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'lat,lon', got '{s}'"))?;
        let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude '{lat}'"))?;
        let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude '{lon}'"))?;
        let point = GeoPoint::new(lat, lon);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(format!("point ({lat}, {lon}) is out of range"))
        }
    }
}

/// Haversine distance between two coordinates, in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let half_dphi = (lat2 - lat1).to_radians() / 2.0;
    let half_dlambda = (lon2 - lon1).to_radians() / 2.0;
    let a = half_dphi.sin().powi(2) + phi1.cos() * phi2.cos() * half_dlambda.sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Meters per degree of latitude (WGS84 series approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
}

/// Meters per degree of longitude at the given latitude.
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    (111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos()).max(1e-9)
}

/// Degrees of latitude and longitude spanned by `meters` around `ref_lat_deg`.
pub fn degree_span(meters: f64, ref_lat_deg: f64) -> (f64, f64) {
    (
        meters / meters_per_deg_lat(ref_lat_deg),
        meters / meters_per_deg_lon(ref_lat_deg),
    )
}

/// Offset a position by distance and bearing on a sphere.
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let y = bearing_rad.sin() * delta.sin() * lat1.cos();
    let x = delta.cos() - lat1.sin() * sin_lat2;
    let lon2 = (lon1 + y.atan2(x) + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Proper or touching intersection of segments `a1-a2` and `b1-b2` in a plane.
///
/// Coordinates are taken as (x, y) = (lon, lat); the test is orientation-based,
/// so a uniform scale per axis does not change the answer.
pub fn segments_intersect(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    const EPS: f64 = 1e-12;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        r.0 >= p.0.min(q.0) - EPS
            && r.0 <= p.0.max(q.0) + EPS
            && r.1 >= p.1.min(q.1) - EPS
            && r.1 <= p.1.max(q.1) + EPS
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if (o1 > EPS && o2 < -EPS || o1 < -EPS && o2 > EPS)
        && (o3 > EPS && o4 < -EPS || o3 < -EPS && o4 > EPS)
    {
        return true;
    }

    (o1.abs() <= EPS && on_segment(a1, a2, b1))
        || (o2.abs() <= EPS && on_segment(a1, a2, b2))
        || (o3.abs() <= EPS && on_segment(b1, b2, a1))
        || (o4.abs() <= EPS && on_segment(b1, b2, a2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lon_pairs() {
        assert_eq!("55.75, 37.61".parse::<GeoPoint>(), Ok(GeoPoint::new(55.75, 37.61)));
        assert!("91,0".parse::<GeoPoint>().is_err());
        assert!("1,2,3".parse::<GeoPoint>().is_err());
        assert!("55.75".parse::<GeoPoint>().is_err());
    }

    #[test]
    fn haversine_one_degree_latitude() {
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.9).abs() < 1.0);
    }

    #[test]
    fn offset_round_trips_through_haversine() {
        let origin = GeoPoint::new(52.52, 13.405);
        let moved = origin.offset(750.0, std::f64::consts::FRAC_PI_2);
        assert!((origin.distance_m(&moved) - 750.0).abs() < 0.01);
    }

    #[test]
    fn move_towards_clamps_fraction() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        assert_eq!(a.move_towards(&b, 2.0), b);
        assert_eq!(a.move_towards(&b, 0.5), GeoPoint::new(0.0, 0.5));
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect((0.0, 0.0), (1.0, 1.0), (0.0, 1.0), (1.0, 0.0)));
        assert!(!segments_intersect((0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)));
        // touching at an endpoint
        assert!(segments_intersect((0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0)));
    }

    #[test]
    fn geopoint_serializes_as_pair() {
        let json = serde_json::to_string(&GeoPoint::new(1.5, -2.25)).unwrap();
        assert_eq!(json, "[1.5,-2.25]");
        let back: GeoPoint = serde_json::from_str("[3.0, 4.0]").unwrap();
        assert_eq!(back, GeoPoint::new(3.0, 4.0));
    }

    #[test]
    fn validity_rejects_out_of_range() {
        assert!(GeoPoint::new(45.0, 10.0).is_valid());
        assert!(!GeoPoint::new(91.0, 10.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 10.0).is_valid());
    }
}
