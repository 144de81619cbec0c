// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Client-side view of a challenge owned by the judge.

use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::hash::Hash32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(pub u64);

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two parties of a dispute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Defender of the submitted result.
    Submitter,
    Challenger,
}

impl Role {
    pub fn is_challenger(&self) -> bool {
        matches!(self, Role::Challenger)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Submitter => "submitter",
            Role::Challenger => "challenger",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-layer values the judge stores: where the layer was entered and how
/// many steps it spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerCursor {
    pub checkpoint: i64,
    pub step_count: u64,
}

/// Snapshot of the judge's challenge state taken at the start of a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeView {
    pub id: ChallengeId,
    pub current_layer: u32,
    pub total_layer: u32,
    pub step_number: u64,
    pub node_id: u64,
    pub is_searching: bool,
    pub proposed_state: Hash32,
    /// Cursors for layers `0..=current_layer`, in order.
    pub layers: Vec<LayerCursor>,
}
