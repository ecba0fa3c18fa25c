//! Offline tooling shared by the fleet CLI binaries.

pub mod city_gen;
pub mod sim;

/// Log to stderr, `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
