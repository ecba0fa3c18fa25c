//! Fleet server - runs the scheduler and serves its state over HTTP and WebSocket.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_server::config::Config;
use fleet_server::state::AppState;
use fleet_server::{api, loops, persistence};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("fleet_server=debug".parse()?)
            .add_directive("fleet_core=info".parse()?))
        .init();

    tracing::info!("Starting fleet server...");

    let config = Config::from_env();
    let port = config.server_port;
    let state = if config.persist_enabled {
        let db = persistence::init_database(&config.database_path, 4).await?;
        let state = Arc::new(AppState::with_database(db, config));
        match state.load_from_database().await {
            Ok(true) => tracing::info!("Restored fleet state from database"),
            Ok(false) => tracing::info!("No saved fleet state, starting fresh"),
            Err(err) => tracing::warn!("Could not restore fleet state: {:#}", err),
        }
        state
    } else {
        Arc::new(AppState::new(config))
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles = vec![
        tokio::spawn(loops::tick_loop::run_tick_loop(state.clone(), shutdown_tx.subscribe())),
        tokio::spawn(loops::broadcast_loop::run_broadcast_loop(state.clone(), shutdown_tx.subscribe())),
    ];
    if state.database().is_some() {
        handles.push(tokio::spawn(loops::persist_loop::run_persist_loop(
            state.clone(),
            shutdown_tx.subscribe(),
        )));
    }

    let app = api::routes()
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Shutting down background loops");
    let _ = shutdown_tx.send(());
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::warn!("Background loop ended abnormally: {}", err);
        }
    }
    Ok(())
}
