// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use opml_kernel::config::{SessionConfig, CHECKPOINT_DIR, DATA_DIR};
use opml_kernel::snapshot::Snapshot;
use opml_kernel::types::Coordinate;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::DisputeError;

/// Suffix source for temporary files; concurrent writers of one path never
/// share a temporary.
static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

/// On-disk snapshot layout of one base directory:
/// `<basedir>/checkpoint/<key>.json` and `<basedir>/data/<key>.dat`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    basedir: PathBuf,
}

impl SnapshotStore {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self { basedir: basedir.into() }
    }

    pub fn for_config(config: &SessionConfig) -> Self {
        Self::new(&config.basedir)
    }

    pub fn path(&self, coord: &Coordinate) -> PathBuf {
        self.basedir.join(CHECKPOINT_DIR).join(format!("{}.json", coord.key()))
    }

    /// Output of the step at `coord`, read as input by its child layer.
    pub fn data_path(&self, coord: &Coordinate) -> PathBuf {
        self.basedir.join(DATA_DIR).join(format!("{}.dat", coord.key()))
    }

    /// `None` when no snapshot was written for `coord` yet.
    pub async fn load(&self, coord: &Coordinate) -> Result<Option<Snapshot>, DisputeError> {
        let path = self.path(coord);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(coord, format!("read {:?}: {}", path, e))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.corrupt(coord, format!("parse {:?}: {}", path, e)))
    }

    /// Writes to a temporary file and renames it into place, so readers
    /// never see a partial snapshot.
    pub async fn save(&self, coord: &Coordinate, snapshot: &Snapshot) -> Result<(), DisputeError> {
        let path = self.path(coord);
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| self.corrupt(coord, e.to_string()))?;
        self.write_atomic(coord, &path, &json).await
    }

    pub async fn save_data(&self, coord: &Coordinate, data: &[u8]) -> Result<(), DisputeError> {
        let path = self.data_path(coord);
        self.write_atomic(coord, &path, data).await
    }

    async fn write_atomic(&self, coord: &Coordinate, path: &Path, data: &[u8]) -> Result<(), DisputeError> {
        let io = |e: std::io::Error| self.corrupt(coord, format!("write {:?}: {}", path, e));
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io)?;
        }
        let tmp_path = path.with_extension(format!("tmp{}", NEXT_TMP.fetch_add(1, Ordering::Relaxed)));
        tokio::fs::write(&tmp_path, data).await.map_err(io)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io)?;
        Ok(())
    }

    fn corrupt(&self, coord: &Coordinate, reason: String) -> DisputeError {
        DisputeError::EngineReplayFailed { coordinate: coord.clone(), reason }
    }
}
