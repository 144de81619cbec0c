// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use opml_kernel::error::KernelError;
use opml_kernel::types::{ChallengeId, Coordinate, Hash32, Role};
use opml_kernel::witness::WitnessError;
use std::fmt;
use thiserror::Error;

use crate::judge::JudgeError;

#[derive(Error, Debug)]
pub enum DisputeError {
    #[error("Unresolvable witness: node {hash} is not in the preimage pool")]
    UnresolvableWitness { hash: Hash32 },
    #[error("Unresolvable witness: {detail}")]
    MalformedWitness { detail: String },
    #[error("Witness loop exceeded its bound of {limit} nodes")]
    WitnessBoundExceeded { limit: usize },
    #[error("Missing hash oracle input {hash} at offset {offset}")]
    MissingHashOracleInput { hash: Hash32, offset: u64 },
    #[error("Judge call {op} failed: {reason}")]
    JudgeCallFailed { op: &'static str, reason: String },
    #[error("Judge call {op} reverted: {reason}")]
    JudgeReverted { op: &'static str, reason: String },
    #[error("Protocol invariant violation: {0}")]
    ProtocolInvariantViolation(String),
    #[error("Engine replay failed at {coordinate}: {reason}")]
    EngineReplayFailed { coordinate: Coordinate, reason: String },
    #[error("Session cancelled")]
    Cancelled,
}

/// Taxonomy kind, used in reports and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnresolvableWitness,
    MissingHashOracleInput,
    JudgeCallFailed,
    ProtocolInvariantViolation,
    EngineReplayFailed,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnresolvableWitness => "UnresolvableWitness",
            ErrorKind::MissingHashOracleInput => "MissingHashOracleInput",
            ErrorKind::JudgeCallFailed => "JudgeCallFailed",
            ErrorKind::ProtocolInvariantViolation => "ProtocolInvariantViolation",
            ErrorKind::EngineReplayFailed => "EngineReplayFailed",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DisputeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DisputeError::UnresolvableWitness { .. }
            | DisputeError::MalformedWitness { .. }
            | DisputeError::WitnessBoundExceeded { .. } => ErrorKind::UnresolvableWitness,
            DisputeError::MissingHashOracleInput { .. } => ErrorKind::MissingHashOracleInput,
            DisputeError::JudgeCallFailed { .. } | DisputeError::JudgeReverted { .. } => {
                ErrorKind::JudgeCallFailed
            }
            DisputeError::ProtocolInvariantViolation(_) => ErrorKind::ProtocolInvariantViolation,
            DisputeError::EngineReplayFailed { .. } => ErrorKind::EngineReplayFailed,
            DisputeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transport faults are retried. A revert or a local failure would
    /// recur unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DisputeError::JudgeCallFailed { .. })
    }

    pub fn from_judge(op: &'static str, err: JudgeError) -> Self {
        match err {
            JudgeError::Transport(reason) => DisputeError::JudgeCallFailed { op, reason },
            JudgeError::Reverted(reason) => DisputeError::JudgeReverted { op, reason },
        }
    }

    /// Maps a witness collector failure for the call named `op`.
    pub fn from_witness(op: &'static str, err: WitnessError) -> Self {
        match err {
            WitnessError::MissingNode(hash) => DisputeError::UnresolvableWitness { hash },
            WitnessError::RepeatedRequest(hash) => DisputeError::MalformedWitness {
                detail: format!("judge requested node {} twice", hash),
            },
            WitnessError::BoundExceeded { limit } => DisputeError::WitnessBoundExceeded { limit },
            WitnessError::MissingHashOracleInput { hash, offset } => {
                DisputeError::MissingHashOracleInput { hash, offset }
            }
            WitnessError::Opaque(reason) => DisputeError::JudgeReverted { op, reason },
        }
    }
}

impl From<KernelError> for DisputeError {
    fn from(e: KernelError) -> Self {
        DisputeError::ProtocolInvariantViolation(e.to_string())
    }
}

/// A fatal session error with the context needed to act on it.
#[derive(Error, Debug)]
#[error("{kind} in challenge {challenge_id} ({role}{}): {source}", .coordinate.as_ref().map(|c| format!(" at {}", c)).unwrap_or_default())]
pub struct SessionFailure {
    pub kind: ErrorKind,
    pub challenge_id: ChallengeId,
    pub role: Role,
    pub coordinate: Option<Coordinate>,
    #[source]
    pub source: DisputeError,
}

impl SessionFailure {
    pub fn new(challenge_id: ChallengeId, role: Role, source: DisputeError) -> Self {
        let coordinate = match &source {
            DisputeError::EngineReplayFailed { coordinate, .. } => Some(coordinate.clone()),
            _ => None,
        };
        Self { kind: source.kind(), challenge_id, role, coordinate, source }
    }

    pub fn at(mut self, coordinate: Coordinate) -> Self {
        self.coordinate.get_or_insert(coordinate);
        self
    }
}
