use serde::{Deserialize, Serialize};

/// Which backing substrate the active transport talks to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Local,
    Remote,
    /// Local host bridge, reported separately so callers can tell it apart.
    Hybrid,
}

impl TransportMode {
    pub fn uses_host_bridge(self) -> bool {
        matches!(self, TransportMode::Local | TransportMode::Hybrid)
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Local => write!(f, "local"),
            TransportMode::Remote => write!(f, "remote"),
            TransportMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TransportMode::Local),
            "remote" => Ok(TransportMode::Remote),
            "hybrid" => Ok(TransportMode::Hybrid),
            other => Err(format!("Unknown transport mode: {}", other)),
        }
    }
}
