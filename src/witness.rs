// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Witness discovery from judge revert reasons.
//!
//! The judge executes a call against a committed root and reverts with the
//! identifier of the first trie node it does not have. This module turns such
//! a revert into a tagged [`RevertSignal`] and accumulates the answers in a
//! bounded [`WitnessCollector`]. The probing itself (calling the judge) lives
//! in the node crate.
//!
//! Revert token shapes:
//! - 64 hex chars: missing trie node, by hash.
//! - 128 hex chars: missing hash-oracle chunk, 64 hex hash + 64 hex offset.
//! - anything else: opaque failure.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::snapshot::PreimagePool;
use crate::types::Hash32;

const REVERT_PREFIX: &str = "execution reverted: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevertSignal {
    NeedNode(Hash32),
    NeedOracleChunk { hash: Hash32, offset: u64 },
    Opaque,
}

/// Pulls the revert reason out of a transport error message.
///
/// Providers report either `... execution reverted: <reason>` or wrap the
/// reason in single quotes.
pub fn revert_reason(message: &str) -> Option<&str> {
    if let Some(idx) = message.find(REVERT_PREFIX) {
        let rest = &message[idx + REVERT_PREFIX.len()..];
        let end = rest
            .find(|c: char| c == '"' || c == '\'' || c.is_whitespace())
            .unwrap_or(rest.len());
        return Some(&rest[..end]);
    }
    let mut quoted = message.split('\'');
    quoted.next()?;
    quoted.next().filter(|s| !s.is_empty())
}

pub fn classify(message: &str) -> RevertSignal {
    let token = revert_reason(message).unwrap_or(message).trim();
    let token = token.strip_prefix("0x").unwrap_or(token);
    if !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return RevertSignal::Opaque;
    }
    match token.len() {
        64 => Hash32::from_hex(token)
            .map(RevertSignal::NeedNode)
            .unwrap_or(RevertSignal::Opaque),
        128 => {
            let hash = match Hash32::from_hex(&token[..64]) {
                Ok(hash) => hash,
                Err(_) => return RevertSignal::Opaque,
            };
            match parse_offset(&token[64..]) {
                Some(offset) => RevertSignal::NeedOracleChunk { hash, offset },
                None => RevertSignal::Opaque,
            }
        }
        _ => RevertSignal::Opaque,
    }
}

/// 64 hex chars, big-endian. Offsets that do not fit a u64 are malformed.
fn parse_offset(s: &str) -> Option<u64> {
    let (high, low) = s.split_at(s.len() - 16);
    if !high.bytes().all(|b| b == b'0') {
        return None;
    }
    u64::from_str_radix(low, 16).ok()
}

/// Trie nodes in discovery order. The judge must receive them in this order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WitnessSet {
    nodes: Vec<Vec<u8>>,
    hashes: Vec<Hash32>,
}

impl WitnessSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Vec<u8>] {
        &self.nodes
    }

    pub fn hashes(&self) -> &[Hash32] {
        &self.hashes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, hash: &Hash32) -> bool {
        self.hashes.contains(hash)
    }

    fn push(&mut self, hash: Hash32, node: Vec<u8>) {
        self.hashes.push(hash);
        self.nodes.push(node);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessError {
    /// The judge wants a node the preimage pool does not have.
    MissingNode(Hash32),
    /// The judge asked again for a node it was already given.
    RepeatedRequest(Hash32),
    /// More probes than the pool has nodes.
    BoundExceeded { limit: usize },
    /// Raw data chunk request; not a trie node.
    MissingHashOracleInput { hash: Hash32, offset: u64 },
    /// Revert reason of any other shape.
    Opaque(String),
}

impl fmt::Display for WitnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WitnessError::MissingNode(hash) => write!(f, "node {} not in preimage pool", hash),
            WitnessError::RepeatedRequest(hash) => {
                write!(f, "node {} requested again after it was supplied", hash)
            }
            WitnessError::BoundExceeded { limit } => {
                write!(f, "witness exceeded the pool size of {} nodes", limit)
            }
            WitnessError::MissingHashOracleInput { hash, offset } => {
                write!(f, "hash oracle chunk {} at offset {} requested", hash, offset)
            }
            WitnessError::Opaque(msg) => write!(f, "judge call failed: {}", msg),
        }
    }
}

/// Grows a witness set one node per failed probe.
///
/// Every successful [`absorb`](Self::absorb) adds exactly one node that was
/// not in the set before. The set can never be larger than the pool, and the
/// collector refuses to grow past that size explicitly.
pub struct WitnessCollector<'a> {
    pool: &'a PreimagePool,
    set: WitnessSet,
    limit: usize,
}

impl<'a> WitnessCollector<'a> {
    pub fn new(pool: &'a PreimagePool) -> Self {
        Self {
            pool,
            set: WitnessSet::new(),
            limit: pool.len(),
        }
    }

    pub fn witness(&self) -> &WitnessSet {
        &self.set
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Consumes one failed probe. `Ok` means the set grew and the call should
    /// be retried with it.
    pub fn absorb(&mut self, revert_message: &str) -> Result<Hash32, WitnessError> {
        match classify(revert_message) {
            RevertSignal::NeedNode(hash) => {
                if self.set.contains(&hash) {
                    return Err(WitnessError::RepeatedRequest(hash));
                }
                if self.set.len() >= self.limit {
                    return Err(WitnessError::BoundExceeded { limit: self.limit });
                }
                let node = self.pool.get(&hash).ok_or(WitnessError::MissingNode(hash))?;
                self.set.push(hash, node.to_vec());
                Ok(hash)
            }
            RevertSignal::NeedOracleChunk { hash, offset } => {
                Err(WitnessError::MissingHashOracleInput { hash, offset })
            }
            RevertSignal::Opaque => Err(WitnessError::Opaque(revert_message.to_string())),
        }
    }

    pub fn finish(self) -> WitnessSet {
        self.set
    }
}
