// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Round decisions for the layered bisection game.
//!
//! The judge owns the game. At the start of every round a role observes a
//! [`ChallengeView`], refreshes its [`SessionConfig`] from it and asks
//! [`decide`] what to do. The answer depends on three inputs only:
//!
//! - where the current layer sits (`Outer` or `Finest`),
//! - whether the judge is still searching,
//! - whose turn it is, read from `proposedState`.
//!
//! Layer dispatch is a lookup in [`TRANSITIONS`], so deeper pipelines (three,
//! four layers) reuse the same shape: every layer above the finest one
//! descends once its search converges.

use alloc::format;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{KernelError, Result};
use crate::snapshot::Snapshot;
use crate::types::{ChallengeId, ChallengeView, Coordinate, Hash32, Role, FINAL_STEP};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerPosition {
    /// Any layer with a finer one below it.
    Outer,
    /// `current_layer == total_layer - 1`.
    Finest,
}

impl LayerPosition {
    pub fn of(current_layer: u32, total_layer: u32) -> Result<Self> {
        if total_layer == 0 || current_layer >= total_layer {
            return Err(KernelError::ProtocolInvariantViolation(format!(
                "layer {} outside a {}-layer challenge",
                current_layer, total_layer
            )));
        }
        if current_layer + 1 == total_layer {
            Ok(LayerPosition::Finest)
        } else {
            Ok(LayerPosition::Outer)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerState {
    /// Search in progress: propose or respond.
    Bisecting,
    /// Outer search converged on a step that must be drilled into.
    ReadyToDescend,
    /// Finest search converged on one disputed step.
    Converged,
}

/// `(position, is_searching) -> state`.
pub const TRANSITIONS: [(LayerPosition, bool, LayerState); 4] = [
    (LayerPosition::Outer, true, LayerState::Bisecting),
    (LayerPosition::Outer, false, LayerState::ReadyToDescend),
    (LayerPosition::Finest, true, LayerState::Bisecting),
    (LayerPosition::Finest, false, LayerState::Converged),
];

impl LayerState {
    pub fn classify(current_layer: u32, total_layer: u32, is_searching: bool) -> Result<Self> {
        let position = LayerPosition::of(current_layer, total_layer)?;
        TRANSITIONS
            .iter()
            .find(|(p, s, _)| *p == position && *s == is_searching)
            .map(|(_, _, state)| *state)
            .ok_or_else(|| {
                KernelError::ProtocolInvariantViolation(format!(
                    "no transition for {:?} with searching={}",
                    position, is_searching
                ))
            })
    }

    pub fn of(view: &ChallengeView) -> Result<Self> {
        Self::classify(view.current_layer, view.total_layer, view.is_searching)
    }
}

/// Whose move the current bisection round expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Turn {
    Propose,
    Respond,
}

impl Turn {
    /// A zero `proposedState` means nobody has proposed this round yet.
    pub fn from_proposed(proposed: &Hash32) -> Self {
        if proposed.is_zero() {
            Turn::Propose
        } else {
            Turn::Respond
        }
    }

    pub fn is_proposing(&self) -> bool {
        matches!(self, Turn::Propose)
    }

    /// The challenger proposes, the submitter responds.
    pub fn actor(&self) -> Role {
        match self {
            Turn::Propose => Role::Challenger,
            Turn::Respond => Role::Submitter,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Not this role's turn. No judge call.
    Wait { turn: Turn },
    /// Submit the root of the snapshot at `coordinate`.
    Submit { turn: Turn, coordinate: Coordinate },
    /// Enter the next layer with the child sub-run's first and final snapshots.
    Descend {
        start: Coordinate,
        end: Coordinate,
        child_layer: usize,
    },
    /// Finest search converged; move to assertion.
    End,
}

fn ensure_checkpoints(view: &ChallengeView, config: &SessionConfig) -> Result<()> {
    let expected = view.current_layer as usize + 1;
    if config.checkpoints.len() != expected {
        return Err(KernelError::ProtocolInvariantViolation(format!(
            "{} checkpoints for layer {} (expected {})",
            config.checkpoints.len(),
            view.current_layer,
            expected
        )));
    }
    Ok(())
}

/// Decides one round for `role`. `config` must already be refreshed from
/// `view`.
pub fn decide(view: &ChallengeView, config: &SessionConfig, role: Role) -> Result<Decision> {
    ensure_checkpoints(view, config)?;

    match LayerState::of(view)? {
        LayerState::Converged => Ok(Decision::End),
        LayerState::ReadyToDescend => {
            let parent = config.coordinate();
            Ok(Decision::Descend {
                start: parent.child(0),
                end: parent.child(FINAL_STEP),
                child_layer: view.current_layer as usize + 1,
            })
        }
        LayerState::Bisecting => {
            let turn = Turn::from_proposed(&view.proposed_state);
            if turn.actor() != role {
                return Ok(Decision::Wait { turn });
            }
            Ok(Decision::Submit {
                turn,
                coordinate: config.coordinate(),
            })
        }
    }
}

/// `endStepCount` submitted with a descent: the final child snapshot's own
/// counter for the child layer.
pub fn descent_step_count(end: &Snapshot, child_layer: usize) -> Result<u64> {
    end.step_count_at(child_layer).ok_or_else(|| {
        KernelError::ProtocolInvariantViolation(format!(
            "final snapshot has no step count for layer {}",
            child_layer
        ))
    })
}

/// The two adjacent coordinates whose transition is settled by assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionPlan {
    pub disputed: Coordinate,
    pub next: Coordinate,
}

/// Pins the disputed step: the finest index is the judge's step pointer, the
/// enclosing index is the node the layer drills into.
pub fn assertion_plan(view: &ChallengeView, config: &SessionConfig) -> Result<AssertionPlan> {
    ensure_checkpoints(view, config)?;
    if LayerState::of(view)? != LayerState::Converged {
        return Err(KernelError::ProtocolInvariantViolation(format!(
            "challenge {} has not converged at the finest layer",
            view.id
        )));
    }

    let step = index(view.step_number, "step number")?;
    let after = step.checked_add(1).ok_or_else(|| {
        KernelError::ProtocolInvariantViolation(format!("step number {} has no successor", step))
    })?;

    let mut indices = config.checkpoints.clone();
    let last = indices.len() - 1;
    indices[last] = step;
    if last > 0 {
        indices[last - 1] = index(view.node_id, "node id")?;
    }
    let disputed = Coordinate::new(indices);
    let next = disputed.with_last(after)?;
    Ok(AssertionPlan { disputed, next })
}

/// A judge counter as a coordinate index.
fn index(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        KernelError::ProtocolInvariantViolation(format!("{} {} exceeds the coordinate range", what, value))
    })
}

/// Calls that the judge can only execute with a witness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum JudgeCall {
    #[serde(rename_all = "camelCase")]
    InitiateChallenge {
        root: Hash32,
        step_total: u64,
        total_layers: u32,
    },
    /// Challenger claims the disputed transition.
    ConfirmStateTransition { id: ChallengeId },
    /// Defender claims the disputed transition.
    DenyStateTransition { id: ChallengeId },
}

impl JudgeCall {
    /// The settling call each role makes in its favour.
    pub fn settle(id: ChallengeId, role: Role) -> Self {
        match role {
            Role::Challenger => JudgeCall::ConfirmStateTransition { id },
            Role::Submitter => JudgeCall::DenyStateTransition { id },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JudgeCall::InitiateChallenge { .. } => "initiateChallenge",
            JudgeCall::ConfirmStateTransition { .. } => "confirmStateTransition",
            JudgeCall::DenyStateTransition { .. } => "denyStateTransition",
        }
    }
}
