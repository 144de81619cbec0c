// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Args, Parser};
use opml_kernel::config::{SessionConfig, DEFAULT_TOTAL_PHASE};
use opml_kernel::types::Role;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_JUDGE_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_ENGINE_BIN: &str = "mlvm/mlvm";
pub const DEFAULT_SUBMITTER_DIR: &str = "/tmp/cannon";
pub const DEFAULT_CHALLENGER_DIR: &str = "/tmp/cannon_fault";
pub const DEFAULT_PROGRAM: &str = "./mlgo/ml_mips/ml_mips.bin";
pub const DEFAULT_MODEL: &str = "./mlgo/examples/mnist/models/mnist/ggml-model-small-f32.bin";
pub const DEFAULT_DATA: &str = "./mlgo/examples/mnist/models/mnist/input_7";
pub const DEFAULT_MODEL_NAME: &str = "MNIST";
pub const DEFAULT_MAX_ROUNDS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RetryPolicy {
    /// Attempts per judge operation, including the first one.
    #[arg(
        long = "retry-attempts",
        env = "OPML_RETRY_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_attempts: u32,
    #[arg(long = "retry-delay-ms", env = "OPML_RETRY_DELAY_MS", default_value_t = 500)]
    pub base_delay_ms: u64,
    #[arg(long = "retry-max-delay-ms", env = "OPML_RETRY_MAX_DELAY_MS", default_value_t = 10_000)]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Exponential backoff for the attempt that just failed (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Node settings. Every field is a flag with an `OPML_*` environment
/// fallback; malformed values are rejected at startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "opml-node", about = "Plays a bisection dispute between a submitter and a challenger")]
pub struct NodeConfig {
    /// JSON-RPC endpoint of the judge gateway.
    #[arg(long, env = "OPML_JUDGE_URL", default_value = DEFAULT_JUDGE_URL)]
    pub judge_url: String,
    /// Execution engine binary (replays one coordinate per invocation).
    #[arg(long, env = "OPML_ENGINE_BIN", default_value = DEFAULT_ENGINE_BIN)]
    pub engine_bin: PathBuf,
    #[arg(long, env = "OPML_SUBMITTER_DIR", default_value = DEFAULT_SUBMITTER_DIR)]
    pub submitter_dir: PathBuf,
    #[arg(long, env = "OPML_CHALLENGER_DIR", default_value = DEFAULT_CHALLENGER_DIR)]
    pub challenger_dir: PathBuf,
    #[arg(long = "program", env = "OPML_PROGRAM", default_value = DEFAULT_PROGRAM)]
    pub program_path: String,
    #[arg(long = "model", env = "OPML_MODEL", default_value = DEFAULT_MODEL)]
    pub model_path: String,
    #[arg(long = "data", env = "OPML_DATA", default_value = DEFAULT_DATA)]
    pub data_path: String,
    #[arg(long, env = "OPML_MODEL_NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,
    /// Number of nested layers in the dispute.
    #[arg(
        long,
        env = "OPML_TOTAL_PHASE",
        default_value_t = DEFAULT_TOTAL_PHASE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub total_phase: u32,
    #[arg(long, env = "OPML_EXEC_COMMAND")]
    pub exec_command: Option<String>,
    #[arg(
        long,
        env = "OPML_MAX_ROUNDS",
        default_value_t = DEFAULT_MAX_ROUNDS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_rounds: u32,
    #[command(flatten)]
    pub retry: RetryPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            judge_url: DEFAULT_JUDGE_URL.to_string(),
            engine_bin: PathBuf::from(DEFAULT_ENGINE_BIN),
            submitter_dir: PathBuf::from(DEFAULT_SUBMITTER_DIR),
            challenger_dir: PathBuf::from(DEFAULT_CHALLENGER_DIR),
            program_path: DEFAULT_PROGRAM.to_string(),
            model_path: DEFAULT_MODEL.to_string(),
            data_path: DEFAULT_DATA.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            total_phase: DEFAULT_TOTAL_PHASE,
            exec_command: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            retry: RetryPolicy::default(),
        }
    }
}

impl NodeConfig {
    pub fn basedir(&self, role: Role) -> &PathBuf {
        match role {
            Role::Submitter => &self.submitter_dir,
            Role::Challenger => &self.challenger_dir,
        }
    }

    /// A fresh, independent session config for `role`.
    pub fn role_config(&self, role: Role) -> SessionConfig {
        let mut cfg = SessionConfig::new(
            self.basedir(role).to_string_lossy(),
            self.program_path.clone(),
            self.model_path.clone(),
            self.data_path.clone(),
            self.model_name.clone(),
            self.total_phase,
        );
        cfg.exec_command = self.exec_command.clone();
        cfg
    }
}
