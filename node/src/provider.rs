// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Cached access to engine snapshots.
//!
//! Snapshots are keyed by `(config identity, coordinate key)`. The first
//! request for a key materialises it (disk, else one engine replay) and every
//! concurrent request for the same key waits on that one attempt. Entries are
//! never evicted.

use opml_kernel::config::SessionConfig;
use opml_kernel::snapshot::{PreimagePool, Snapshot};
use opml_kernel::types::{Coordinate, Hash32};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};

use crate::engine::{ExecutionEngine, ReplayRequest};
use crate::errors::DisputeError;
use crate::persistence::SnapshotStore;

type CacheKey = (Hash32, String);

pub struct SnapshotProvider {
    engine: Arc<dyn ExecutionEngine>,
    cells: Mutex<HashMap<CacheKey, Arc<OnceCell<Arc<Snapshot>>>>>,
    pools: Mutex<HashMap<Hash32, PreimagePool>>,
}

impl SnapshotProvider {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            cells: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of `coord` under the base `config`.
    pub async fn get(&self, config: &SessionConfig, coord: &Coordinate) -> Result<Arc<Snapshot>, DisputeError> {
        let identity = config.identity();
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry((identity, coord.key())).or_default().clone()
        };

        if let Some(snapshot) = cell.get() {
            metrics::increment_counter!("opml_snapshot_cache_hits_total", "source" => "memory");
            tracing::debug!(coordinate = %coord, root = %snapshot.root, "Snapshot cache hit");
            return Ok(snapshot.clone());
        }

        let snapshot = cell
            .get_or_try_init(|| async {
                let snapshot = self.materialize(config, coord).await?;
                self.pools.lock().await.entry(identity).or_default().merge(&snapshot);
                Ok::<_, DisputeError>(Arc::new(snapshot))
            })
            .await?;
        Ok(snapshot.clone())
    }

    /// Every preimage seen so far for `config`'s computation.
    pub async fn pool(&self, config: &SessionConfig) -> PreimagePool {
        self.pools
            .lock()
            .await
            .get(&config.identity())
            .cloned()
            .unwrap_or_default()
    }

    async fn materialize(&self, config: &SessionConfig, coord: &Coordinate) -> Result<Snapshot, DisputeError> {
        let store = SnapshotStore::for_config(config);
        if let Some(snapshot) = store.load(coord).await? {
            metrics::increment_counter!("opml_snapshot_cache_hits_total", "source" => "disk");
            tracing::debug!(coordinate = %coord, "Snapshot found on disk");
            return Ok(snapshot);
        }

        let request = ReplayRequest {
            config: config.branch_at(coord)?,
            coordinate: coord.clone(),
            output: store.path(coord),
        };

        let start = Instant::now();
        self.engine.replay(&request).await?;
        metrics::histogram!("opml_engine_replay_duration_seconds", start.elapsed().as_secs_f64());
        tracing::info!(coordinate = %coord, elapsed_ms = start.elapsed().as_millis() as u64, "Engine replay finished");

        store.load(coord).await?.ok_or_else(|| DisputeError::EngineReplayFailed {
            coordinate: coord.clone(),
            reason: format!("engine wrote no snapshot at {:?}", request.output),
        })
    }
}
