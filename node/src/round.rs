// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! One round of the bisection game for one role.

use opml_kernel::config::SessionConfig;
use opml_kernel::protocol::{decide, descent_step_count, Decision};
use opml_kernel::types::{ChallengeId, ChallengeView, Hash32};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::DisputeError;
use crate::judge::{fetch_view, Judge};
use crate::provider::SnapshotProvider;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not our turn; nothing was sent.
    Wait,
    Proposed { root: Hash32 },
    Responded { root: Hash32 },
    Descended { start: Hash32, end: Hash32, end_step_count: u64 },
    /// Finest layer converged.
    Ended,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Wait => "wait",
            Outcome::Proposed { .. } => "proposed",
            Outcome::Responded { .. } => "responded",
            Outcome::Descended { .. } => "descended",
            Outcome::Ended => "ended",
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Outcome::Ended)
    }

    /// Root sent to the judge this round, if any.
    pub fn root(&self) -> Option<Hash32> {
        match self {
            Outcome::Proposed { root } | Outcome::Responded { root } => Some(*root),
            Outcome::Descended { end, .. } => Some(*end),
            Outcome::Wait | Outcome::Ended => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RoundController {
    provider: Arc<SnapshotProvider>,
    cancel: CancellationToken,
}

impl RoundController {
    pub fn new(provider: Arc<SnapshotProvider>, cancel: CancellationToken) -> Self {
        Self { provider, cancel }
    }

    /// Observes the challenge, then acts for `judge.role()`.
    pub async fn step(
        &self,
        judge: &dyn Judge,
        id: ChallengeId,
        config: &mut SessionConfig,
    ) -> Result<Outcome, DisputeError> {
        let view = fetch_view(judge, id).await?;
        self.apply(judge, &view, config).await
    }

    /// Acts on an already fetched view. `config` is refreshed from it first.
    pub async fn apply(
        &self,
        judge: &dyn Judge,
        view: &ChallengeView,
        config: &mut SessionConfig,
    ) -> Result<Outcome, DisputeError> {
        let role = judge.role();
        config.refresh(view.current_layer, &view.layers)?;

        let outcome = match decide(view, config, role)? {
            Decision::Wait { turn } => {
                tracing::debug!(%role, ?turn, challenge = %view.id, "Waiting for the other party");
                Outcome::Wait
            }
            Decision::End => Outcome::Ended,
            Decision::Submit { turn, coordinate } => {
                let snapshot = self.provider.get(config, &coordinate).await?;
                let root = snapshot.root;
                self.ensure_live()?;
                if turn.is_proposing() {
                    judge
                        .propose_state(view.id, root)
                        .await
                        .map_err(|e| DisputeError::from_judge("proposeState", e))?;
                    Outcome::Proposed { root }
                } else {
                    judge
                        .respond_state(view.id, root)
                        .await
                        .map_err(|e| DisputeError::from_judge("respondState", e))?;
                    Outcome::Responded { root }
                }
            }
            Decision::Descend { start, end, child_layer } => {
                let (start_snap, end_snap) = tokio::try_join!(
                    self.provider.get(config, &start),
                    self.provider.get(config, &end),
                )?;
                let end_step_count = descent_step_count(&end_snap, child_layer)?;
                self.ensure_live()?;
                judge
                    .advance_layer(view.id, start_snap.root, end_snap.root, end_step_count)
                    .await
                    .map_err(|e| DisputeError::from_judge("advanceLayer", e))?;
                Outcome::Descended {
                    start: start_snap.root,
                    end: end_snap.root,
                    end_step_count,
                }
            }
        };

        metrics::increment_counter!(
            "opml_rounds_total",
            "role" => role.as_str(),
            "outcome" => outcome.as_str()
        );
        match outcome.root() {
            Some(root) => tracing::info!(
                %role,
                challenge = %view.id,
                layer = view.current_layer,
                %root,
                %outcome,
                "Round"
            ),
            None => tracing::info!(
                %role,
                challenge = %view.id,
                layer = view.current_layer,
                %outcome,
                "Round"
            ),
        }
        Ok(outcome)
    }

    fn ensure_live(&self) -> Result<(), DisputeError> {
        if self.cancel.is_cancelled() {
            return Err(DisputeError::Cancelled);
        }
        Ok(())
    }
}
