// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Tracing
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "opml_node=debug".into()),
    );
    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }

    // 2. Metrics (Prometheus)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            return;
        }
    }

    metrics::describe_counter!("opml_rounds_total", "Rounds played, by role and outcome");
    metrics::describe_counter!("opml_witness_nodes_total", "Trie nodes supplied to the judge");
    metrics::describe_counter!("opml_snapshot_cache_hits_total", "Snapshots served without an engine replay");
    metrics::describe_histogram!("opml_engine_replay_duration_seconds", "Time taken by one engine replay");
    metrics::describe_counter!("opml_judge_retries_total", "Judge operations retried after a transport failure");
    metrics::describe_counter!("opml_session_failures_total", "Sessions aborted, by error kind");

    metrics::gauge!("opml_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
