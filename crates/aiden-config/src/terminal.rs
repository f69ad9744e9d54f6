use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// When false the host reports the PTY capability as unavailable.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides `$SHELL`.
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            shell: None,
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}
