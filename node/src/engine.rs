// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Boundary to the deterministic execution engine.
//!
//! The engine replays the program up to one coordinate and writes the
//! snapshot file itself. That file is the only channel back to the client.

use async_trait::async_trait;
use opml_kernel::config::SessionConfig;
use opml_kernel::types::Coordinate;
use std::path::PathBuf;
use tokio::process::Command;

use crate::errors::DisputeError;

/// One replay: a config already branched at `coordinate`.
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub config: SessionConfig,
    pub coordinate: Coordinate,
    /// Where the engine is expected to leave the snapshot.
    pub output: PathBuf,
}

impl ReplayRequest {
    /// Command line understood by the engine's multi-phase mode.
    pub fn args(&self) -> Vec<String> {
        let cfg = &self.config;
        let step_count = serde_json::to_string(&cfg.step_count).unwrap_or_else(|_| "[]".into());

        let mut args = vec![
            "--mp".to_string(),
            format!("--basedir={}", cfg.basedir),
            format!("--program={}", cfg.program_path),
            format!("--model={}", cfg.model_path),
            format!("--data={}", cfg.data_path),
            format!("--modelName={}", cfg.model_name),
            format!("--curPhase={}", cfg.cur_phase),
            format!("--totalPhase={}", cfg.total_phase),
            format!("--checkpoints={}", self.coordinate.key()),
            format!("--stepCount={}", step_count),
        ];
        if let Some(cmd) = &cfg.exec_command {
            args.push(format!("--execCommand={}", cmd));
        }
        args
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Runs one replay to completion. Success means the snapshot file exists.
    async fn replay(&self, request: &ReplayRequest) -> Result<(), DisputeError>;
}

/// Runs the engine binary once per replay.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    bin: PathBuf,
}

impl SubprocessEngine {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl ExecutionEngine for SubprocessEngine {
    async fn replay(&self, request: &ReplayRequest) -> Result<(), DisputeError> {
        let failed = |reason: String| DisputeError::EngineReplayFailed {
            coordinate: request.coordinate.clone(),
            reason,
        };

        tracing::debug!(bin = ?self.bin, coordinate = %request.coordinate, "Spawning engine");
        let output = Command::new(&self.bin)
            .args(request.args())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| failed(format!("spawn {:?}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            return Err(failed(format!("{}: {}", output.status, tail)));
        }
        Ok(())
    }
}
