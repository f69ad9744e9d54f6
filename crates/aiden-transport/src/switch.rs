use crate::bridge::HostBridge;
use crate::capability::Transport;
use crate::error::TransportError;
use crate::local::LocalTransport;
use crate::remote::RemoteTransport;
use aiden_proto::TransportMode;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// What the switch needs to build either kind of transport.
#[derive(Debug, Clone, Default)]
pub struct SwitchConfig {
    /// Mode used by `resolve(None)` when nothing is active yet.
    pub default_mode: TransportMode,
    /// Required for local and hybrid modes.
    pub bridge: Option<HostBridge>,
    /// Required for remote mode.
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
}

/// Holds the single active transport and replaces it on a mode switch.
pub struct TransportSwitch {
    config: SwitchConfig,
    active: Mutex<Option<Arc<dyn Transport>>>,
}

impl TransportSwitch {
    pub fn new(config: SwitchConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    /// Return the active transport if it matches `mode` (any mode when
    /// `None`), otherwise build one for `mode`, dispose the previous one and
    /// make the new one active. Building performs no I/O.
    pub fn resolve(&self, mode: Option<TransportMode>) -> Result<Arc<dyn Transport>, TransportError> {
        let mut active = self.lock();
        if let Some(current) = active.as_ref() {
            if mode.map_or(true, |m| m == current.mode()) {
                return Ok(current.clone());
            }
        }

        let mode = mode.unwrap_or(self.config.default_mode);
        let next = self.build(mode)?;
        if let Some(previous) = active.take() {
            tracing::info!(from = %previous.mode(), to = %mode, "switching transport");
            previous.dispose();
        }
        *active = Some(next.clone());
        Ok(next)
    }

    pub fn current(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.lock().clone().ok_or(TransportError::NotInitialized)
    }

    pub fn active_mode(&self) -> Option<TransportMode> {
        self.lock().as_ref().map(|t| t.mode())
    }

    /// Dispose the active transport, if any.
    pub fn reset(&self) {
        if let Some(previous) = self.lock().take() {
            previous.dispose();
        }
    }

    fn build(&self, mode: TransportMode) -> Result<Arc<dyn Transport>, TransportError> {
        match mode {
            TransportMode::Local | TransportMode::Hybrid => {
                let bridge = self
                    .config
                    .bridge
                    .clone()
                    .ok_or(TransportError::HostUnavailable)?;
                Ok(Arc::new(LocalTransport::with_mode(bridge, mode)))
            }
            TransportMode::Remote => {
                let url = self
                    .config
                    .server_url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        TransportError::InvalidRequest(
                            "remote mode requires a server URL".to_string(),
                        )
                    })?;
                Ok(Arc::new(RemoteTransport::new(
                    url,
                    self.config.auth_token.clone(),
                )))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn Transport>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

static GLOBAL: OnceLock<TransportSwitch> = OnceLock::new();

/// Install the process-wide switch. Fails if one is already installed.
pub fn install_global(switch: TransportSwitch) -> Result<&'static TransportSwitch, TransportError> {
    GLOBAL.set(switch).map_err(|_| {
        TransportError::InvalidRequest("a transport switch is already installed".to_string())
    })?;
    global()
}

pub fn global() -> Result<&'static TransportSwitch, TransportError> {
    GLOBAL.get().ok_or(TransportError::NotInitialized)
}
