// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Per-role session configuration and protocol constants.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::{Coordinate, Hash32, LayerCursor};

/// Number of layers of the default pipeline: phases, then instructions.
pub const DEFAULT_TOTAL_PHASE: u32 = 2;

/// Subdirectory of `basedir` holding one snapshot file per coordinate.
pub const CHECKPOINT_DIR: &str = "checkpoint";

/// Subdirectory of `basedir` holding per-step outputs used as child inputs.
pub const DATA_DIR: &str = "data";

/// Everything the execution engine needs to replay one coordinate.
///
/// Each role owns one base value. It is refreshed in place from the judge at
/// the start of a round, and every snapshot request works on a clone produced
/// by [`SessionConfig::branch_at`]; two roles never share a value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub basedir: String,
    pub program_path: String,
    pub model_path: String,
    /// Input of the outermost layer. Branches overwrite it with the parent
    /// step's output.
    pub data_path: String,
    pub model_name: String,
    pub cur_phase: u32,
    pub total_phase: u32,
    pub checkpoints: Vec<i64>,
    pub step_count: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_command: Option<String>,
}

impl SessionConfig {
    pub fn new(
        basedir: impl Into<String>,
        program_path: impl Into<String>,
        model_path: impl Into<String>,
        data_path: impl Into<String>,
        model_name: impl Into<String>,
        total_phase: u32,
    ) -> Self {
        Self {
            basedir: basedir.into(),
            program_path: program_path.into(),
            model_path: model_path.into(),
            data_path: data_path.into(),
            model_name: model_name.into(),
            cur_phase: 0,
            total_phase,
            checkpoints: Vec::new(),
            step_count: Vec::new(),
            exec_command: None,
        }
    }

    /// The coordinate the checkpoints currently point at.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.checkpoints.clone())
    }

    /// Input file for a replay of `coord`: the configured input in the
    /// outermost layer, otherwise the output of the parent step.
    pub fn data_path_for(&self, coord: &Coordinate) -> String {
        match coord.parent() {
            None => self.data_path.clone(),
            Some(parent) => format!("{}/{}/{}.dat", self.basedir, DATA_DIR, parent.key()),
        }
    }

    /// Deep copy pointed at `coord`. The receiver is left untouched.
    pub fn branch_at(&self, coord: &Coordinate) -> Result<Self> {
        let layer = coord.layer()?;
        if layer as u32 >= self.total_phase {
            return Err(KernelError::InvalidCoordinate);
        }
        let mut branch = self.clone();
        branch.data_path = self.data_path_for(coord);
        branch.checkpoints = coord.indices().to_vec();
        branch.cur_phase = layer as u32;
        Ok(branch)
    }

    /// Replaces local checkpoints and step counts with the judge's values for
    /// layers `0..=current_layer`. Nothing from earlier rounds survives.
    pub fn refresh(&mut self, current_layer: u32, cursors: &[LayerCursor]) -> Result<()> {
        let len = current_layer as usize + 1;
        if cursors.len() != len {
            return Err(KernelError::ProtocolInvariantViolation(format!(
                "judge reported {} layer cursors for layer {}",
                cursors.len(),
                current_layer
            )));
        }
        self.cur_phase = current_layer;
        self.checkpoints = cursors.iter().map(|c| c.checkpoint).collect();
        self.step_count = cursors.iter().map(|c| c.step_count).collect();
        Ok(())
    }

    /// Identity of the deterministic computation this config replays.
    ///
    /// Two configs with the same identity produce the same snapshot for the
    /// same coordinate, so it is half of the snapshot cache key.
    pub fn identity(&self) -> Hash32 {
        let mut hasher = blake3::Hasher::new();
        for field in [
            self.basedir.as_str(),
            self.program_path.as_str(),
            self.model_path.as_str(),
            self.data_path.as_str(),
            self.model_name.as_str(),
            self.exec_command.as_deref().unwrap_or(""),
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(&self.total_phase.to_le_bytes());
        Hash32(*hasher.finalize().as_bytes())
    }
}
