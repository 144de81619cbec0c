//! Merged preimages available to the witness resolver.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::snapshot::{EncodedNode, Snapshot};
use crate::types::Hash32;

/// hash -> raw node bytes, merged from one or more snapshots.
///
/// Merging is additive: an entry already present is never replaced, so a
/// pool only grows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreimagePool {
    nodes: BTreeMap<Hash32, Vec<u8>>,
}

impl PreimagePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a Snapshot>) -> Self {
        let mut pool = Self::new();
        for snapshot in snapshots {
            pool.merge(snapshot);
        }
        pool
    }

    pub fn merge(&mut self, snapshot: &Snapshot) {
        for (hash, node) in &snapshot.preimages {
            self.nodes
                .entry(*hash)
                .or_insert_with(|| node.bytes().to_vec());
        }
    }

    pub fn insert(&mut self, hash: Hash32, node: EncodedNode) {
        self.nodes.entry(hash).or_insert_with(|| node.into_bytes());
    }

    pub fn get(&self, hash: &Hash32) -> Option<&[u8]> {
        self.nodes.get(hash).map(Vec::as_slice)
    }

    pub fn contains(&self, hash: &Hash32) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
