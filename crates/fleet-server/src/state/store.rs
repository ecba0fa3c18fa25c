//! Shared application state around the fleet scheduler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use fleet_core::{build_graph, DroneType, Scheduler};
use serde::Serialize;
use tokio::sync::broadcast;

use super::cities::CityStore;
use crate::config::Config;
use crate::persistence::{self, Database};

const BROADCAST_CAPACITY: usize = 64;
/// Zone edits racing a rebuild make the result stale; retry this many times.
const MAX_REBUILD_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub zone_version: u64,
}

/// Application state. One coarse lock guards the scheduler; graph builds run
/// outside it and are swapped in afterwards.
pub struct AppState {
    scheduler: Mutex<Scheduler>,
    cities: CityStore,
    drone_type: Mutex<DroneType>,
    pub tx: broadcast::Sender<Arc<str>>,
    config: Config,
    database: Option<Database>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let mut scheduler = Scheduler::new(
            Default::default(),
            config.base.clone(),
            config.inventory.clone(),
        );
        scheduler.set_stations(config.stations.clone());
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            scheduler: Mutex::new(scheduler),
            cities: CityStore::new(config.data_dir.clone()),
            drone_type: Mutex::new(config.drone_type),
            tx,
            config,
            database: None,
        }
    }

    pub fn with_database(database: Database, config: Config) -> Self {
        Self {
            database: Some(database),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn cities(&self) -> &CityStore {
        &self.cities
    }

    /// Lock the scheduler. Never hold the guard across an `.await`.
    pub fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn drone_type(&self) -> DroneType {
        *self.drone_type.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a city and build its graph for `drone_type` (or the current type).
    pub async fn load_city(&self, city: &str, drone_type: Option<DroneType>) -> Result<GraphStats> {
        let data = self.cities.get(city).await?;
        if let Some(drone_type) = drone_type {
            *self.drone_type.lock().unwrap_or_else(PoisonError::into_inner) = drone_type;
        }
        self.build_and_install(city).await
    }

    /// Rebuild the current city's graph against the live zone set.
    /// Returns `None` when no city is loaded.
    pub async fn rebuild_graph(&self) -> Result<Option<GraphStats>> {
        let city = self.scheduler().city().map(str::to_string);
        match city {
            Some(city) => self.build_and_install(&city).await.map(Some),
            None => Ok(None),
        }
    }

    async fn build_and_install(&self, city: &str) -> Result<GraphStats> {
        let data = self.cities.get(city).await?;
        let drone_type = self.drone_type();

        for attempt in 1..=MAX_REBUILD_ATTEMPTS {
            let (zones, zone_version) = {
                let scheduler = self.scheduler();
                (scheduler.zones().to_vec(), scheduler.zone_version())
            };
            let data = data.clone();
            let graph = tokio::task::spawn_blocking(move || {
                build_graph(&data.network, &data.buildings, &zones, drone_type)
            })
            .await
            .context("graph build task failed")??
            .with_zone_version(zone_version);

            let stats = GraphStats {
                nodes: graph.node_count(),
                edges: graph.edge_count(),
                zone_version,
            };
            if self.scheduler().install_graph(city, Arc::new(graph)) {
                return Ok(stats);
            }
            tracing::debug!(city = %city, attempt, "Zones changed during graph build, rebuilding");
        }
        anyhow::bail!("zones kept changing while building the graph for '{}'", city)
    }

    /// Serialize the current snapshot and push it to websocket subscribers.
    pub fn broadcast_snapshot(&self) -> Result<usize> {
        let snapshot = self.scheduler().snapshot();
        let payload: Arc<str> = serde_json::to_string(&snapshot)?.into();
        // no subscribers is not an error
        Ok(self.tx.send(payload).unwrap_or(0))
    }

    /// Restore the last persisted snapshot and rebuild its city graph.
    pub async fn load_from_database(&self) -> Result<bool> {
        let Some(db) = self.database.as_ref() else {
            return Ok(false);
        };
        let Some(snapshot) = persistence::load_snapshot(db).await? else {
            return Ok(false);
        };
        let city = snapshot.city.clone();
        self.scheduler().restore(snapshot);
        if let Some(city) = city {
            if let Err(err) = self.build_and_install(&city).await {
                tracing::warn!(city = %city, "Restored state but could not rebuild graph: {:#}", err);
            }
        }
        Ok(true)
    }

    pub async fn persist(&self) -> Result<()> {
        let Some(db) = self.database.as_ref() else {
            return Ok(());
        };
        let snapshot = self.scheduler().snapshot();
        persistence::save_snapshot(db, &snapshot).await
    }
}
