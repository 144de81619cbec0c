// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::Parser;
use opml_kernel::types::Role;
use opml_node::config::NodeConfig;
use opml_node::engine::SubprocessEngine;
use opml_node::network::JudgeRpcClient;
use opml_node::provider::SnapshotProvider;
use opml_node::session::DisputeSession;
use opml_node::telemetry;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let cfg = NodeConfig::parse();
    tracing::info!("Initializing dispute client with config: {:?}", cfg);

    let http = reqwest::Client::new();
    let challenger = Arc::new(JudgeRpcClient::with_client(http.clone(), &cfg.judge_url, Role::Challenger));
    let submitter = Arc::new(JudgeRpcClient::with_client(http, &cfg.judge_url, Role::Submitter));
    let provider = Arc::new(SnapshotProvider::new(Arc::new(SubprocessEngine::new(&cfg.engine_bin))));
    let session = DisputeSession::new(challenger, submitter, provider, cfg.retry.clone());

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping before the next judge call");
            cancel.cancel();
        }
    });

    let mut submitter_cfg = cfg.role_config(Role::Submitter);
    let mut challenger_cfg = cfg.role_config(Role::Challenger);

    let code = match play(&session, &cfg, &mut submitter_cfg, &mut challenger_cfg).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    };

    let metrics_path = cfg.submitter_dir.join("metrics.prom");
    if let Err(e) = tokio::fs::write(&metrics_path, telemetry::get_metrics()).await {
        tracing::warn!("Failed to write metrics to {:?}: {}", metrics_path, e);
    }
    std::process::exit(code);
}

async fn play(
    session: &DisputeSession,
    cfg: &NodeConfig,
    submitter_cfg: &mut opml_kernel::config::SessionConfig,
    challenger_cfg: &mut opml_kernel::config::SessionConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let golden = session.golden_snapshot(submitter_cfg).await?;
    tracing::info!("Golden root {}", golden.root);

    session.publish_result(submitter_cfg).await?;
    let id = match session.challenge_if_disputed(challenger_cfg).await? {
        Some(id) => id,
        None => {
            tracing::info!("Both roles agree on the final result");
            return Ok(());
        }
    };
    let result = session.run(id, submitter_cfg, challenger_cfg, cfg.max_rounds).await?;

    if !result.ended {
        return Err(format!("challenge {} did not converge in {} rounds", id, result.rounds).into());
    }
    for report in &result.assertions {
        tracing::info!(role = %report.role, coordinate = %report.disputed, outcome = ?report.outcome, "Settlement");
    }
    match result.winner() {
        Some(role) => tracing::info!(challenge = %id, winner = %role, "Dispute settled"),
        None => tracing::warn!(challenge = %id, "Neither settling call was accepted"),
    }
    Ok(())
}
