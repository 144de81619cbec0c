//! Addresses of snapshots in the nested-layer execution trace.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Index meaning "the final step of this sub-run". Passed to the engine as-is.
pub const FINAL_STEP: i64 = -1;

/// Position in the trace, one index per layer: `[phase, step, ...]`.
///
/// Coordinates are values. Every derivation (`child`, `with_last`, `parent`)
/// returns a new coordinate.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(Vec<i64>);

impl Coordinate {
    pub fn new(indices: Vec<i64>) -> Self {
        Coordinate(indices)
    }

    pub fn root(index: i64) -> Self {
        Coordinate(vec![index])
    }

    pub fn indices(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer this coordinate addresses (`len - 1`).
    pub fn layer(&self) -> Result<usize> {
        self.0.len().checked_sub(1).ok_or(KernelError::InvalidCoordinate)
    }

    /// Extends into the next finer layer.
    pub fn child(&self, index: i64) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Coordinate(indices)
    }

    /// Same prefix, different index in the finest layer.
    pub fn with_last(&self, index: i64) -> Result<Self> {
        if self.0.is_empty() {
            return Err(KernelError::InvalidCoordinate);
        }
        let mut indices = self.0.clone();
        let last = indices.len() - 1;
        indices[last] = index;
        Ok(Coordinate(indices))
    }

    /// The coordinate of the enclosing step, or `None` at the outermost layer.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Coordinate(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Canonical cache and file key, e.g. `[0,3,-1]`.
    pub fn key(&self) -> String {
        let mut out = String::with_capacity(2 + self.0.len() * 4);
        out.push('[');
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            // Writing to a String cannot fail.
            let _ = write!(out, "{}", idx);
        }
        out.push(']');
        out
    }
}

impl From<Vec<i64>> for Coordinate {
    fn from(indices: Vec<i64>) -> Self {
        Coordinate(indices)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coordinate{}", self.key())
    }
}
