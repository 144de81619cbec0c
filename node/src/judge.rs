// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The judge as seen by one role.
//!
//! A [`Judge`] handle is bound to the account of a single role, like a
//! signer. Queries are free; mutations change the challenge and must only be
//! issued in turn. `call_with_witness` is a dry run: it executes a settling
//! or initiating call with extra trie nodes and reports the first node it is
//! still missing as a revert.

use async_trait::async_trait;
use opml_kernel::protocol::JudgeCall;
use opml_kernel::types::{ChallengeId, ChallengeView, Hash32, LayerCursor, Role};
use thiserror::Error;

use crate::errors::DisputeError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgeError {
    /// The call executed and reverted with this reason.
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type JudgeResult<T> = Result<T, JudgeError>;

#[async_trait]
pub trait Judge: Send + Sync {
    /// The account this handle signs mutations with.
    fn role(&self) -> Role;

    async fn current_step(&self, id: ChallengeId) -> JudgeResult<u64>;
    async fn current_layer(&self, id: ChallengeId) -> JudgeResult<u32>;
    async fn total_layer(&self, id: ChallengeId) -> JudgeResult<u32>;
    async fn node_id(&self, id: ChallengeId) -> JudgeResult<u64>;
    async fn is_searching(&self, id: ChallengeId) -> JudgeResult<bool>;
    async fn proposed_state(&self, id: ChallengeId) -> JudgeResult<Hash32>;
    async fn checkpoint_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<i64>;
    async fn step_count_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<u64>;
    /// Final root published by the submitter; zero until one is published.
    async fn claimed_result(&self) -> JudgeResult<Hash32>;

    /// Publishes the submitter's final root.
    async fn submit_result(&self, root: Hash32) -> JudgeResult<()>;
    async fn initiate_challenge(
        &self,
        root: Hash32,
        step_total: u64,
        total_layers: u32,
    ) -> JudgeResult<ChallengeId>;
    async fn propose_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()>;
    async fn respond_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()>;
    async fn advance_layer(
        &self,
        id: ChallengeId,
        start_root: Hash32,
        end_root: Hash32,
        end_step_count: u64,
    ) -> JudgeResult<()>;
    async fn confirm_transition(&self, id: ChallengeId) -> JudgeResult<()>;
    async fn deny_transition(&self, id: ChallengeId) -> JudgeResult<()>;

    /// Dry run of `call` with `nodes` made available to the judge.
    async fn call_with_witness(&self, call: &JudgeCall, nodes: &[Vec<u8>]) -> JudgeResult<()>;

    /// Stores one trie node on the judge side.
    async fn supply_node(&self, node: &[u8]) -> JudgeResult<()>;
}

/// Reads the full challenge view, including every layer cursor up to the
/// current layer. Nothing is cached between calls.
pub async fn fetch_view(judge: &dyn Judge, id: ChallengeId) -> Result<ChallengeView, DisputeError> {
    let q = |op: &'static str| move |e: JudgeError| DisputeError::from_judge(op, e);

    let current_layer = judge.current_layer(id).await.map_err(q("currentLayer"))?;
    let total_layer = judge.total_layer(id).await.map_err(q("totalLayer"))?;
    let step_number = judge.current_step(id).await.map_err(q("currentStep"))?;
    let node_id = judge.node_id(id).await.map_err(q("nodeID"))?;
    let is_searching = judge.is_searching(id).await.map_err(q("isSearching"))?;
    let proposed_state = judge.proposed_state(id).await.map_err(q("proposedState"))?;

    let mut layers = Vec::with_capacity(current_layer as usize + 1);
    for layer in 0..=current_layer {
        let checkpoint = judge.checkpoint_at(id, layer).await.map_err(q("checkpointAt"))?;
        let step_count = judge.step_count_at(id, layer).await.map_err(q("stepCountAt"))?;
        layers.push(LayerCursor { checkpoint, step_count });
    }

    Ok(ChallengeView {
        id,
        current_layer,
        total_layer,
        step_number,
        node_id,
        is_searching,
        proposed_state,
        layers,
    })
}
