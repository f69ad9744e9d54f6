use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_program() -> String {
    "claude".to_string()
}

fn default_max_finished_sessions() -> usize {
    100
}

fn default_finished_ttl_secs() -> u64 {
    30 * 60
}

fn default_output_log_max_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Coding-agent CLI launched for each session.
    #[serde(default = "default_program")]
    pub program: String,
    /// Used when a spawn request carries no working directory.
    #[serde(default)]
    pub default_working_dir: Option<PathBuf>,
    #[serde(default = "default_max_finished_sessions")]
    pub max_finished_sessions: usize,
    #[serde(default = "default_finished_ttl_secs")]
    pub finished_ttl_secs: u64,
    #[serde(default = "default_output_log_max_bytes")]
    pub output_log_max_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            default_working_dir: None,
            max_finished_sessions: default_max_finished_sessions(),
            finished_ttl_secs: default_finished_ttl_secs(),
            output_log_max_bytes: default_output_log_max_bytes(),
        }
    }
}

impl AgentConfig {
    pub fn finished_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_ttl_secs)
    }
}
