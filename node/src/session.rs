// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! A complete dispute: initiation, bisection rounds for both roles, then
//! assertion of the disputed step by each side.

use opml_kernel::config::SessionConfig;
use opml_kernel::protocol::{assertion_plan, JudgeCall};
use opml_kernel::snapshot::{PreimagePool, Snapshot};
use opml_kernel::types::{ChallengeId, Coordinate, Hash32, Role, FINAL_STEP};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::errors::{DisputeError, SessionFailure};
use crate::judge::{fetch_view, Judge};
use crate::provider::SnapshotProvider;
use crate::resolver::WitnessResolver;
use crate::round::{Outcome, RoundController};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssertionOutcome {
    /// The settling call went through.
    Settled,
    /// The judge refused the settling call.
    Rejected { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionReport {
    pub role: Role,
    pub disputed: Coordinate,
    pub witness_nodes: usize,
    pub outcome: AssertionOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionResult {
    pub challenge_id: ChallengeId,
    pub rounds: u32,
    /// False when `max_rounds` ran out before convergence.
    pub ended: bool,
    /// Challenger first, then submitter. Empty unless `ended`.
    pub assertions: Vec<AssertionReport>,
}

impl SessionResult {
    pub fn assertion(&self, role: Role) -> Option<&AssertionReport> {
        self.assertions.iter().find(|a| a.role == role)
    }

    /// The role whose settling call the judge accepted.
    pub fn winner(&self) -> Option<Role> {
        self.assertions
            .iter()
            .find(|a| a.outcome == AssertionOutcome::Settled)
            .map(|a| a.role)
    }
}

pub struct DisputeSession {
    challenger: Arc<dyn Judge>,
    submitter: Arc<dyn Judge>,
    provider: Arc<SnapshotProvider>,
    rounds: RoundController,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl DisputeSession {
    pub fn new(
        challenger: Arc<dyn Judge>,
        submitter: Arc<dyn Judge>,
        provider: Arc<SnapshotProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_cancellation(challenger, submitter, provider, retry, CancellationToken::new())
    }

    pub fn with_cancellation(
        challenger: Arc<dyn Judge>,
        submitter: Arc<dyn Judge>,
        provider: Arc<SnapshotProvider>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let rounds = RoundController::new(provider.clone(), cancel.clone());
        Self { challenger, submitter, provider, rounds, retry, cancel }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn provider(&self) -> &Arc<SnapshotProvider> {
        &self.provider
    }

    fn judge(&self, role: Role) -> &dyn Judge {
        match role {
            Role::Challenger => self.challenger.as_ref(),
            Role::Submitter => self.submitter.as_ref(),
        }
    }

    /// Genesis snapshot at `[0]`, the state the judge is deployed with.
    pub async fn golden_snapshot(&self, config: &SessionConfig) -> Result<Arc<Snapshot>, DisputeError> {
        self.provider.get(config, &Coordinate::root(0)).await
    }

    /// Opens a challenge against the submitted result with the challenger's
    /// own final state.
    pub async fn start_challenge(&self, config: &SessionConfig) -> Result<ChallengeId, DisputeError> {
        let mut attempt = 1;
        loop {
            match self.try_start_challenge(config).await {
                Ok(id) => return Ok(id),
                Err(e) => self.backoff("initiateChallenge", attempt, e).await?,
            }
            attempt += 1;
        }
    }

    /// Publishes the submitter's final root on the judge.
    pub async fn publish_result(&self, config: &SessionConfig) -> Result<Hash32, DisputeError> {
        let last = self.provider.get(config, &Coordinate::root(FINAL_STEP)).await?;
        let mut attempt = 1;
        loop {
            self.ensure_live()?;
            match self.judge(Role::Submitter).submit_result(last.root).await {
                Ok(()) => break,
                Err(e) => {
                    let err = DisputeError::from_judge("submitResult", e);
                    self.backoff("submitResult", attempt, err).await?
                }
            }
            attempt += 1;
        }
        tracing::info!(root = %last.root, "Result published");
        Ok(last.root)
    }

    /// Opens a challenge only when the challenger's own final root differs
    /// from the published one. `None` when both agree.
    pub async fn challenge_if_disputed(
        &self,
        config: &SessionConfig,
    ) -> Result<Option<ChallengeId>, DisputeError> {
        let claimed = self.claimed_result().await?;
        if claimed.is_zero() {
            return Err(DisputeError::ProtocolInvariantViolation(
                "no result has been published".into(),
            ));
        }

        let own = self.provider.get(config, &Coordinate::root(FINAL_STEP)).await?;
        if own.root == claimed {
            tracing::info!(root = %claimed, "Published result matches, nothing to challenge");
            return Ok(None);
        }
        tracing::info!(%claimed, own = %own.root, "Published result differs");
        self.start_challenge(config).await.map(Some)
    }

    async fn claimed_result(&self) -> Result<Hash32, DisputeError> {
        let mut attempt = 1;
        loop {
            match self.judge(Role::Challenger).claimed_result().await {
                Ok(root) => return Ok(root),
                Err(e) => {
                    let err = DisputeError::from_judge("claimedResult", e);
                    self.backoff("claimedResult", attempt, err).await?
                }
            }
            attempt += 1;
        }
    }

    async fn try_start_challenge(&self, config: &SessionConfig) -> Result<ChallengeId, DisputeError> {
        let judge = self.judge(Role::Challenger);
        let last = self.provider.get(config, &Coordinate::root(FINAL_STEP)).await?;
        let step_total = last.step_count_at(0).ok_or_else(|| {
            DisputeError::ProtocolInvariantViolation("final snapshot has no outer step count".into())
        })?;

        let call = JudgeCall::InitiateChallenge {
            root: last.root,
            step_total,
            total_layers: config.total_phase,
        };
        let pool = PreimagePool::from_snapshots([last.as_ref()]);
        let witness = WitnessResolver::resolve(judge, &call, &pool).await?;
        self.ensure_live()?;
        WitnessResolver::supply(judge, &witness).await?;
        self.ensure_live()?;

        let id = judge
            .initiate_challenge(last.root, step_total, config.total_phase)
            .await
            .map_err(|e| DisputeError::from_judge(call.name(), e))?;
        tracing::info!(challenge = %id, root = %last.root, step_total, "Challenge initiated");
        Ok(id)
    }

    /// Drives both roles until the finest layer converges or `max_rounds`
    /// pass, then settles the disputed step from both sides.
    pub async fn run(
        &self,
        id: ChallengeId,
        submitter: &mut SessionConfig,
        challenger: &mut SessionConfig,
        max_rounds: u32,
    ) -> Result<SessionResult, SessionFailure> {
        let mut rounds = 0;
        let mut ended = false;

        while rounds < max_rounds && !ended {
            rounds += 1;
            tracing::debug!(challenge = %id, round = rounds, "Round start");
            for (role, config) in [(Role::Challenger, &mut *challenger), (Role::Submitter, &mut *submitter)] {
                let outcome = match self.step_with_retry(id, role, config).await {
                    Ok(outcome) => outcome,
                    Err(e) => return Err(self.fail(id, role, config, e)),
                };
                if outcome.is_ended() {
                    ended = true;
                    break;
                }
            }
        }

        if !ended {
            tracing::warn!(challenge = %id, rounds, "Round budget exhausted before convergence");
            return Ok(SessionResult { challenge_id: id, rounds, ended, assertions: Vec::new() });
        }

        let mut assertions = Vec::with_capacity(2);
        for (role, config) in [(Role::Challenger, &mut *challenger), (Role::Submitter, &mut *submitter)] {
            match self.assert_with_retry(id, role, config).await {
                Ok(report) => assertions.push(report),
                Err(e) => return Err(self.fail(id, role, config, e)),
            }
        }

        Ok(SessionResult { challenge_id: id, rounds, ended, assertions })
    }

    async fn step_with_retry(
        &self,
        id: ChallengeId,
        role: Role,
        config: &mut SessionConfig,
    ) -> Result<Outcome, DisputeError> {
        let mut attempt = 1;
        loop {
            match self.rounds.step(self.judge(role), id, config).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => self.backoff("round", attempt, e).await?,
            }
            attempt += 1;
        }
    }

    async fn assert_with_retry(
        &self,
        id: ChallengeId,
        role: Role,
        config: &mut SessionConfig,
    ) -> Result<AssertionReport, DisputeError> {
        let mut attempt = 1;
        loop {
            match self.assert_role(id, role, config).await {
                Ok(report) => return Ok(report),
                Err(e) => self.backoff("assertion", attempt, e).await?,
            }
            attempt += 1;
        }
    }

    /// Settles the converged step in `role`'s favour. A judge refusal is a
    /// normal result for the losing side and is reported, not raised.
    pub async fn assert_role(
        &self,
        id: ChallengeId,
        role: Role,
        config: &mut SessionConfig,
    ) -> Result<AssertionReport, DisputeError> {
        let judge = self.judge(role);
        let view = fetch_view(judge, id).await?;
        config.refresh(view.current_layer, &view.layers)?;
        let plan = assertion_plan(&view, config)?;

        let (disputed, _next) = tokio::try_join!(
            self.provider.get(config, &plan.disputed),
            self.provider.get(config, &plan.next),
        )?;
        // Both snapshots are merged into the pool by the time they are returned.
        let pool = self.provider.pool(config).await;
        let call = JudgeCall::settle(id, role);

        let mut report = AssertionReport {
            role,
            disputed: plan.disputed.clone(),
            witness_nodes: 0,
            outcome: AssertionOutcome::Settled,
        };

        let result = async {
            let witness = WitnessResolver::resolve(judge, &call, &pool).await?;
            report.witness_nodes = witness.len();
            self.ensure_live()?;
            WitnessResolver::supply(judge, &witness).await?;
            self.ensure_live()?;
            let sent = match role {
                Role::Challenger => judge.confirm_transition(id).await,
                Role::Submitter => judge.deny_transition(id).await,
            };
            sent.map_err(|e| DisputeError::from_judge(call.name(), e))
        }
        .await;

        match result {
            Ok(()) => {}
            Err(DisputeError::JudgeReverted { reason, .. }) => {
                report.outcome = AssertionOutcome::Rejected { reason };
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            %role,
            challenge = %id,
            coordinate = %plan.disputed,
            root = %disputed.root,
            nodes = report.witness_nodes,
            outcome = ?report.outcome,
            "Assertion"
        );
        Ok(report)
    }

    /// Waits out the backoff for a retryable error, or hands the error back.
    async fn backoff(&self, op: &'static str, attempt: u32, err: DisputeError) -> Result<(), DisputeError> {
        if !err.is_retryable() || attempt >= self.retry.max_attempts {
            return Err(err);
        }
        let delay = self.retry.delay_for(attempt);
        metrics::increment_counter!("opml_judge_retries_total", "op" => op);
        tracing::warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DisputeError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn ensure_live(&self) -> Result<(), DisputeError> {
        if self.cancel.is_cancelled() {
            return Err(DisputeError::Cancelled);
        }
        Ok(())
    }

    fn fail(&self, id: ChallengeId, role: Role, config: &SessionConfig, e: DisputeError) -> SessionFailure {
        let failure = SessionFailure::new(id, role, e).at(config.coordinate());
        tracing::error!(kind = %failure.kind, challenge = %id, %role, error = %failure, "Session failed");
        metrics::increment_counter!("opml_session_failures_total", "kind" => failure.kind.as_str());
        failure
    }
}
