use aiden_proto::TransportMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::AgentConfig;
use crate::paths::ConfigPaths;
use crate::server::ServerConfig;
use crate::terminal::TerminalConfig;

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            anthropic_base_url: default_anthropic_base_url(),
            openai_base_url: default_openai_base_url(),
            github_api_url: default_github_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Base URL of the host's HTTP surface, used by the remote transport.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Defaults to `~/.aiden/aiden.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(skip)]
    paths: Option<ConfigPaths>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            server_url: default_server_url(),
            database_path: None,
            auth_token: None,
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            terminal: TerminalConfig::default(),
            ai: AiConfig::default(),
            paths: None,
        }
    }
}

impl AppConfig {
    pub fn paths(&self) -> anyhow::Result<ConfigPaths> {
        match &self.paths {
            Some(p) => Ok(p.clone()),
            None => ConfigPaths::new(),
        }
    }

    pub fn set_paths(&mut self, paths: ConfigPaths) {
        self.paths = Some(paths);
    }

    /// Load from `~/.aiden/config.toml`, then apply `AIDEN_*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let paths = ConfigPaths::new()?;
        Self::load_from(&paths)
    }

    pub fn load_from(paths: &ConfigPaths) -> anyhow::Result<Self> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// Like `load_from`, but reads overrides through `lookup` instead of the
    /// process environment.
    pub fn load_with_env(
        paths: &ConfigPaths,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let config_file = paths.config_path();
        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str::<AppConfig>(&content)?
        } else {
            Self::default()
        };
        config.paths = Some(paths.clone());
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(mode) = lookup("AIDEN_MODE").filter(|v| !v.is_empty()) {
            self.mode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!("AIDEN_MODE: {e}"))?;
        }
        if let Some(url) = lookup("AIDEN_SERVER_URL").filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
        if let Some(path) = lookup("AIDEN_DB_PATH").filter(|v| !v.is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(token) = lookup("AIDEN_AUTH_TOKEN").filter(|v| !v.is_empty()) {
            self.auth_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }
        if self.server_url.trim().is_empty() {
            anyhow::bail!("server_url must not be empty");
        }
        if self.agent.program.trim().is_empty() {
            anyhow::bail!("agent.program must not be empty");
        }
        if self.agent.max_finished_sessions == 0 {
            anyhow::bail!("agent.max_finished_sessions must be greater than 0");
        }
        if self.agent.output_log_max_bytes == 0 {
            anyhow::bail!("agent.output_log_max_bytes must be greater than 0");
        }
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            anyhow::bail!("terminal.cols and terminal.rows must be greater than 0");
        }
        Ok(())
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.paths()?.database_path()),
        }
    }

    /// Token from config or env, else the one written by `aidend token`.
    pub fn resolve_auth_token(&self) -> Option<String> {
        if let Some(token) = &self.auth_token {
            return Some(token.clone());
        }
        let path = self.paths().ok()?.token_path();
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_paths() -> (tempfile::TempDir, ConfigPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::with_base(dir.path().to_path_buf());
        (dir, paths)
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── defaults ─────────────────────────────────────────────────────

    #[test]
    fn default_produces_expected_values() {
        let config = AppConfig::default();
        assert_eq!(config.mode, TransportMode::Local);
        assert_eq!(config.server_url, "http://localhost:3000");
        assert!(config.auth_token.is_none());
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.agent.max_finished_sessions, 100);
        assert_eq!(config.terminal.cols, 80);
        assert_eq!(config.terminal.rows, 24);
    }

    #[test]
    fn database_path_falls_back_to_config_dir() {
        let (_dir, paths) = test_paths();
        let config = AppConfig::load_with_env(&paths, no_env).unwrap();
        assert_eq!(config.database_path().unwrap(), paths.database_path());
    }

    // ── loading ──────────────────────────────────────────────────────

    #[test]
    fn load_with_no_file_returns_default() {
        let (_dir, paths) = test_paths();
        let config = AppConfig::load_with_env(&paths, no_env).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn load_with_partial_toml_fills_defaults() {
        let (_dir, paths) = test_paths();
        std::fs::write(
            paths.config_path(),
            "mode = \"remote\"\n[server]\nport = 7777\n[agent]\nprogram = \"my-agent\"\n",
        )
        .unwrap();
        let config = AppConfig::load_with_env(&paths, no_env).unwrap();
        assert_eq!(config.mode, TransportMode::Remote);
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.agent.program, "my-agent");
        assert_eq!(config.agent.finished_ttl_secs, 1800);
        assert_eq!(config.server_url, "http://localhost:3000");
    }

    #[test]
    fn load_with_invalid_toml_returns_error() {
        let (_dir, paths) = test_paths();
        std::fs::write(paths.config_path(), "not valid {{{{ toml").unwrap();
        assert!(AppConfig::load_with_env(&paths, no_env).is_err());
    }

    // ── env overrides ────────────────────────────────────────────────

    #[test]
    fn env_overrides_take_priority_over_file() {
        let (_dir, paths) = test_paths();
        std::fs::write(paths.config_path(), "server_url = \"http://file:1\"\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("AIDEN_MODE", "hybrid"),
            ("AIDEN_SERVER_URL", "http://env:2"),
            ("AIDEN_DB_PATH", "/tmp/x.db"),
            ("AIDEN_AUTH_TOKEN", "secret"),
        ]);
        let config =
            AppConfig::load_with_env(&paths, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.mode, TransportMode::Hybrid);
        assert_eq!(config.server_url, "http://env:2");
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/x.db"));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|_| Some(String::new()))
            .unwrap();
        assert_eq!(config.mode, TransportMode::Local);
        assert_eq!(config.server_url, "http://localhost:3000");
    }

    #[test]
    fn unknown_mode_in_env_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| (k == "AIDEN_MODE").then(|| "cloud".into()));
        assert!(result.is_err());
    }

    // ── validation ───────────────────────────────────────────────────

    #[test]
    fn validate_rejects_port_zero() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_server_url() {
        let mut config = AppConfig::default();
        config.server_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_session_bound() {
        let mut config = AppConfig::default();
        config.agent.max_finished_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_keeps_mode() {
        let mut config = AppConfig::default();
        config.mode = TransportMode::Remote;
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.mode, TransportMode::Remote);
        assert_eq!(parsed.server.port, config.server.port);
    }

    // ── auth token ───────────────────────────────────────────────────

    #[test]
    fn resolve_auth_token_reads_token_file() {
        let (_dir, paths) = test_paths();
        std::fs::write(paths.token_path(), "abc123\n").unwrap();
        let config = AppConfig::load_with_env(&paths, no_env).unwrap();
        assert_eq!(config.resolve_auth_token().as_deref(), Some("abc123"));
    }

    #[test]
    fn resolve_auth_token_prefers_configured_value() {
        let (_dir, paths) = test_paths();
        std::fs::write(paths.token_path(), "from-file").unwrap();
        let mut config = AppConfig::load_with_env(&paths, no_env).unwrap();
        config.auth_token = Some("from-config".to_string());
        assert_eq!(config.resolve_auth_token().as_deref(), Some("from-config"));
    }
}
