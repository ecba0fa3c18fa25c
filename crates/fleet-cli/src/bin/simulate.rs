//! Offline fleet run: load a city file, queue random orders and tick until
//! they all close.
//!
//! Usage:
//!   cargo run -p fleet-cli --bin simulate -- --city-file data/Line_Town.json --orders 20

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fleet_cli::sim::{self, SimConfig};
use fleet_core::{parse_inventory, CityData, DroneType, FleetRules, GeoPoint, ZoneRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the fleet scheduler against a city file")]
struct Args {
    /// City JSON (name, network, buildings)
    #[arg(long)]
    city_file: PathBuf,

    /// Airframe the graph is built for
    #[arg(long, default_value = "cargo")]
    drone_type: DroneType,

    #[arg(long, default_value_t = 10)]
    orders: usize,

    #[arg(long, default_value_t = 3_600)]
    ticks: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Wind speed in m/s
    #[arg(long, default_value_t = 0.0)]
    wind: f64,

    /// Base position as "lat,lon"; defaults to the first road node
    #[arg(long)]
    base: Option<GeoPoint>,

    #[arg(long, default_value_t = 4)]
    base_capacity: usize,

    /// Charging station as "lat,lon" (repeatable)
    #[arg(long = "station")]
    stations: Vec<GeoPoint>,

    /// Drones available per type, e.g. "cargo=3,operator=1"
    #[arg(long, default_value = "cargo=2,operator=2,cleaner=2")]
    inventory: String,

    /// No-fly zone as "lat_min,lat_max,lon_min,lon_max" (repeatable)
    #[arg(long = "zone", value_parser = parse_zone)]
    zones: Vec<ZoneRequest>,

    /// Print the final snapshot instead of the summary
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_zone(value: &str) -> Result<ZoneRequest, String> {
    let bounds = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid zone '{value}': {e}"))?;
    let [lat_min, lat_max, lon_min, lon_max] = bounds[..] else {
        return Err(format!("zone '{value}' needs four comma-separated bounds"));
    };
    Ok(ZoneRequest {
        lat_min,
        lat_max,
        lon_min,
        lon_max,
        id: None,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    fleet_cli::init_tracing(args.verbose);

    let raw = std::fs::read_to_string(&args.city_file)
        .with_context(|| format!("reading {}", args.city_file.display()))?;
    let city: CityData = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.city_file.display()))?;

    let cfg = SimConfig {
        drone_type: args.drone_type,
        orders: args.orders,
        max_ticks: args.ticks,
        wind_mps: args.wind,
        base: args.base,
        base_capacity: args.base_capacity,
        inventory: parse_inventory(&args.inventory),
        stations: args.stations,
        zones: args.zones,
        rules: FleetRules::default(),
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (summary, snapshot) = sim::run(&city, &cfg, &mut rng)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
