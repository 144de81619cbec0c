// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshots produced by the execution engine.
//!
//! A snapshot is written once per coordinate by the engine and read back by
//! the client. File format (JSON):
//!
//! ```text
//! {
//!   "root": "0x<64 hex>",
//!   "checkpoints": [0, 3],          // optional
//!   "stepCount": [7, 120],
//!   "preimages": { "0x<64 hex>": "<base64 node bytes>", ... }
//! }
//! ```

pub mod node;
pub mod pool;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::types::Hash32;

pub use node::EncodedNode;
pub use pool::PreimagePool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub root: Hash32,
    #[serde(default)]
    pub checkpoints: Vec<i64>,
    /// Per-layer step counters at the time of capture.
    #[serde(default)]
    pub step_count: Vec<u64>,
    #[serde(default)]
    pub preimages: BTreeMap<Hash32, EncodedNode>,
}

impl Snapshot {
    /// Step counter of `layer`, if the engine reported one.
    pub fn step_count_at(&self, layer: usize) -> Option<u64> {
        self.step_count.get(layer).copied()
    }
}
