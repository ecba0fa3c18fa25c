//! Server configuration from environment.

use std::env;
use std::path::PathBuf;

use fleet_core::{parse_inventory, ChargerSpec, DroneType, GeoPoint, Inventory};

const DEFAULT_BASE: GeoPoint = GeoPoint {
    lat: 55.7558,
    lon: 37.6173,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Directory holding `<city>.json` files
    pub data_dir: PathBuf,
    pub database_path: String,
    pub persist_enabled: bool,
    pub tick_ms: u64,
    pub broadcast_ms: u64,
    pub persist_interval_s: u64,
    pub base: ChargerSpec,
    pub stations: Vec<ChargerSpec>,
    pub inventory: Inventory,
    /// Airframe the city graph is built for
    pub drone_type: DroneType,
}

impl Config {
    pub fn from_env() -> Self {
        let base_position = env::var("FLEET_BASE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BASE);
        Self {
            server_port: env_parse("FLEET_PORT").unwrap_or(3000),
            data_dir: env::var("FLEET_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            database_path: env::var("FLEET_DB_PATH")
                .unwrap_or_else(|_| "data/fleet.db".to_string()),
            persist_enabled: env::var("FLEET_PERSIST")
                .map(|s| parse_flag(&s))
                .unwrap_or(true),
            tick_ms: env_parse("FLEET_TICK_MS").unwrap_or(1_000).max(10),
            broadcast_ms: env_parse("FLEET_BROADCAST_MS").unwrap_or(1_000).max(10),
            persist_interval_s: env_parse("FLEET_PERSIST_INTERVAL_S").unwrap_or(5).max(1),
            base: ChargerSpec {
                name: "Base".to_string(),
                position: base_position,
                capacity: env_parse("FLEET_BASE_CAPACITY").unwrap_or(4),
            },
            stations: env::var("FLEET_STATIONS")
                .map(|s| parse_stations(&s))
                .unwrap_or_default(),
            inventory: env::var("FLEET_INVENTORY")
                .map(|s| parse_inventory(&s))
                .unwrap_or_else(|_| default_inventory()),
            drone_type: env::var("FLEET_DRONE_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DroneType::Cargo),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// `"lat,lon,capacity;lat,lon,capacity"`; malformed entries are skipped.
pub fn parse_stations(value: &str) -> Vec<ChargerSpec> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .filter_map(|(i, entry)| {
            let (point, capacity) = entry.rsplit_once(',')?;
            Some(ChargerSpec {
                name: format!("Station {}", i + 1),
                position: point.parse().ok()?,
                capacity: capacity.trim().parse().ok()?,
            })
        })
        .collect()
}

fn default_inventory() -> Inventory {
    DroneType::ALL.into_iter().map(|kind| (kind, 2)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_station_list() {
        let stations = parse_stations("55.70,37.60,2; bad ;55.80,37.70,1");
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].capacity, 2);
        assert_eq!(stations[1].position, GeoPoint::new(55.80, 37.70));
    }

    #[test]
    fn parses_inventory_and_skips_unknown_types() {
        let inventory = parse_inventory("cargo=3, operator=1, tank=9");
        assert_eq!(inventory.get(&DroneType::Cargo), Some(&3));
        assert_eq!(inventory.get(&DroneType::Operator), Some(&1));
        assert_eq!(inventory.len(), 2);
    }

    #[test]
    fn station_with_bad_position_is_skipped() {
        assert!(parse_stations("91.0,10.0,2").is_empty());
        assert!(parse_stations("10.0,2").is_empty());
    }
}
