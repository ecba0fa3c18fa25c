//! City data loading with an in-memory cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use fleet_core::{city_file_stem, CityData};

const MAX_CACHED_CITIES: usize = 8;
const CITY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

struct CachedCity {
    data: Arc<CityData>,
    fetched_at: Instant,
}

/// Reads `<data_dir>/<sanitized name>.json` and keeps recently used cities in memory.
pub struct CityStore {
    data_dir: PathBuf,
    cache: DashMap<String, CachedCity>,
}

impl CityStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: DashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, city: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", city_file_stem(city)))
    }

    pub async fn get(&self, city: &str) -> Result<Arc<CityData>> {
        let key = city_file_stem(city);
        if key.is_empty() {
            anyhow::bail!("city name '{}' has no usable characters", city);
        }
        if let Some(entry) = self.cache.get(&key) {
            if entry.fetched_at.elapsed() <= CITY_CACHE_TTL {
                return Ok(entry.data.clone());
            }
        }

        let path = self.path_for(city);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading city file {}", path.display()))?;
        let data: CityData = serde_json::from_str(&raw)
            .with_context(|| format!("parsing city file {}", path.display()))?;
        let data = Arc::new(data);
        tracing::info!(
            city = %city,
            nodes = data.network.nodes.len(),
            edges = data.network.edges.len(),
            buildings = data.buildings.len(),
            "Loaded city data"
        );

        self.cache.insert(
            key,
            CachedCity {
                data: data.clone(),
                fetched_at: Instant::now(),
            },
        );
        self.prune();
        Ok(data)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Drop expired entries, then the oldest ones beyond the size cap.
    fn prune(&self) {
        let mut entries: Vec<(String, Instant)> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().fetched_at))
            .collect();
        for (key, fetched_at) in &entries {
            if fetched_at.elapsed() > CITY_CACHE_TTL {
                self.cache.remove(key);
            }
        }
        if self.cache.len() <= MAX_CACHED_CITIES {
            return;
        }
        entries.sort_by_key(|(_, fetched_at)| *fetched_at);
        for (key, _) in entries {
            if self.cache.len() <= MAX_CACHED_CITIES {
                break;
            }
            self.cache.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{RoadNetwork, RoadNode};

    #[tokio::test]
    async fn loads_and_caches_city_files() {
        let dir = std::env::temp_dir().join(format!("fleet-cities-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let city = CityData {
            name: "Test Town".into(),
            network: RoadNetwork {
                nodes: vec![RoadNode { id: 1, lat: 1.0, lon: 2.0 }],
                edges: vec![],
            },
            buildings: vec![],
        };
        std::fs::write(dir.join("Test_Town.json"), serde_json::to_string(&city).unwrap()).unwrap();

        let store = CityStore::new(&dir);
        let loaded = store.get("Test Town").await.unwrap();
        assert_eq!(loaded.network.nodes.len(), 1);
        assert_eq!(store.cached_count(), 1);
        assert!(store.get("Nowhere").await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
