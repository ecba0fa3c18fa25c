//! Write a synthetic grid city the server can load.
//!
//! Usage:
//!   cargo run -p fleet-cli --bin generate_city -- --name "Grid Town" --rows 8 --cols 8

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use fleet_cli::city_gen::{generate_city, GridSpec};
use fleet_core::{city_file_stem, GeoPoint};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate a grid city JSON file")]
struct Args {
    #[arg(long, default_value = "Grid Town")]
    name: String,

    #[arg(long, default_value_t = 6)]
    rows: usize,

    #[arg(long, default_value_t = 6)]
    cols: usize,

    #[arg(long, default_value_t = 250.0)]
    spacing_m: f64,

    /// South-west corner as "lat,lon"
    #[arg(long, default_value = "55.7500,37.6000")]
    origin: GeoPoint,

    #[arg(long, default_value_t = 20)]
    buildings: usize,

    /// Share of street segments to remove (0.0 - 0.9)
    #[arg(long, default_value_t = 0.1)]
    drop_fraction: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output directory
    #[arg(long, default_value = "data")]
    out: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    fleet_cli::init_tracing(args.verbose);
    ensure!(args.rows > 0 && args.cols > 0, "grid needs at least one row and column");
    ensure!(args.spacing_m > 0.0, "spacing must be positive");

    let spec = GridSpec {
        name: args.name,
        origin: args.origin,
        rows: args.rows,
        cols: args.cols,
        spacing_m: args.spacing_m,
        drop_fraction: args.drop_fraction,
        buildings: args.buildings,
    };
    let city = generate_city(&spec, &mut StdRng::seed_from_u64(args.seed));

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let path = args.out.join(format!("{}.json", city_file_stem(&city.name)));
    std::fs::write(&path, serde_json::to_vec_pretty(&city)?)
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        nodes = city.network.nodes.len(),
        edges = city.network.edges.len(),
        buildings = city.buildings.len(),
        "City written"
    );
    Ok(())
}
