use crate::session::{PtySession, SessionStreams};
use crate::utf8::Utf8Carry;
use aiden_config::TerminalConfig;
use aiden_proto::{
    channels, HostEvent, SpawnTerminalRequest, TerminalSessionInfo, TerminalStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

struct TerminalEntry {
    info: TerminalSessionInfo,
    pty: Option<Arc<PtySession>>,
}

/// Owns every terminal session on the host.
///
/// The registry write lock is held across each state change and the event it
/// produces, so `terminal:*` events for one id are totally ordered.
#[derive(Clone)]
pub struct TerminalManager {
    sessions: Arc<RwLock<HashMap<String, TerminalEntry>>>,
    config: TerminalConfig,
    availability: Result<(), String>,
    events: broadcast::Sender<HostEvent>,
}

impl TerminalManager {
    /// Probes the host once; a failed probe or `enabled = false` makes every
    /// spawn return a degraded session.
    pub fn new(config: TerminalConfig, events: broadcast::Sender<HostEvent>) -> Self {
        let availability = if !config.enabled {
            Err("Terminal support is disabled in configuration".to_string())
        } else {
            crate::probe().map_err(|e| e.to_string())
        };
        if let Err(reason) = &availability {
            tracing::warn!(%reason, "terminal capability unavailable");
        }
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            availability,
            events,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_ok()
    }

    pub async fn spawn(&self, req: SpawnTerminalRequest) -> TerminalSessionInfo {
        let id = req
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let cwd = req.cwd.clone().unwrap_or_else(default_cwd);
        let cols = req.cols.unwrap_or(self.config.cols);
        let rows = req.rows.unwrap_or(self.config.rows);

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&id) {
            if existing.info.status == TerminalStatus::Running {
                return existing.info.clone();
            }
        }

        let mut info = TerminalSessionInfo {
            id: id.clone(),
            status: TerminalStatus::Running,
            pid: None,
            cwd: cwd.clone(),
            cols,
            rows,
            error: None,
            created_at: chrono::Utc::now(),
        };

        if let Err(reason) = &self.availability {
            return self.degrade(&mut sessions, info, reason.clone());
        }

        let shell = self.shell();
        let env = vec![("TERM".to_string(), "xterm-256color".to_string())];
        let (pty, streams) = match PtySession::spawn(&id, &shell, &[], &cwd, env, cols, rows) {
            Ok(spawned) => spawned,
            Err(e) => {
                return self.degrade(&mut sessions, info, format!("Failed to spawn terminal: {e}"))
            }
        };

        let pty = Arc::new(pty);
        info.pid = pty.child_pid;
        sessions.insert(
            id.clone(),
            TerminalEntry {
                info: info.clone(),
                pty: Some(pty.clone()),
            },
        );
        self.emit(
            channels::TERMINAL_STARTED,
            json!({ "sessionId": id, "pid": info.pid }),
        );
        drop(sessions);

        self.spawn_forwarder(pty, streams);
        info
    }

    fn degrade(
        &self,
        sessions: &mut HashMap<String, TerminalEntry>,
        mut info: TerminalSessionInfo,
        reason: String,
    ) -> TerminalSessionInfo {
        tracing::warn!(session_id = %info.id, %reason, "terminal session degraded");
        info.status = TerminalStatus::Error;
        info.error = Some(reason.clone());
        sessions.insert(
            info.id.clone(),
            TerminalEntry {
                info: info.clone(),
                pty: None,
            },
        );
        self.emit(
            channels::TERMINAL_ERROR,
            json!({ "sessionId": info.id, "error": reason }),
        );
        info
    }

    /// Forwards PTY output as `terminal:output` until the process exits, then
    /// drains what is left and retires the session.
    fn spawn_forwarder(&self, pty: Arc<PtySession>, streams: SessionStreams) {
        let manager = self.clone();
        let SessionStreams {
            mut output,
            mut exit,
        } = streams;
        tokio::spawn(async move {
            let id = pty.id.clone();
            let mut carry = Utf8Carry::default();
            let exit_code = loop {
                tokio::select! {
                    biased;
                    chunk = output.recv() => match chunk {
                        Ok(bytes) => manager.forward(&pty, carry.push(&bytes)).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(session_id = %id, skipped = n, "terminal output lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break None,
                    },
                    code = exit.recv() => break code.ok().flatten(),
                }
            };

            while let Ok(bytes) = output.try_recv() {
                manager.forward(&pty, carry.push(&bytes)).await;
            }
            manager.forward(&pty, carry.finish()).await;
            manager.finish(&pty, exit_code).await;
        });
    }

    async fn forward(&self, pty: &Arc<PtySession>, data: String) {
        if data.is_empty() {
            return;
        }
        // once killed or replaced, nothing more is reported for this PTY
        let sessions = self.sessions.read().await;
        if owns(&sessions, pty) {
            self.emit(
                channels::TERMINAL_OUTPUT,
                json!({ "sessionId": pty.id, "data": data }),
            );
        }
    }

    async fn finish(&self, pty: &Arc<PtySession>, exit_code: Option<u32>) {
        let mut sessions = self.sessions.write().await;
        if !owns(&sessions, pty) {
            return;
        }
        sessions.remove(&pty.id);
        tracing::info!(session_id = %pty.id, ?exit_code, "terminal session exited");
        self.emit(
            channels::TERMINAL_CLOSED,
            json!({ "sessionId": pty.id, "exitCode": exit_code }),
        );
    }

    pub async fn write(&self, id: &str, data: &str) -> bool {
        let Some(pty) = self.pty(id).await else {
            return false;
        };
        match pty.write(data.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "terminal write failed");
                false
            }
        }
    }

    pub async fn resize(&self, id: &str, cols: u16, rows: u16) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(id) else {
            return false;
        };
        let Some(pty) = entry.pty.clone() else {
            return false;
        };
        match pty.resize(cols, rows).await {
            Ok(()) => {
                entry.info.cols = cols;
                entry.info.rows = rows;
                true
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "terminal resize failed");
                false
            }
        }
    }

    pub async fn kill(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.remove(id) else {
            return false;
        };
        if let Some(pty) = &entry.pty {
            if let Err(e) = pty.kill().await {
                tracing::warn!(session_id = %id, error = %e, "terminal kill failed");
            }
        }
        self.emit(
            channels::TERMINAL_CLOSED,
            json!({ "sessionId": id, "exitCode": null }),
        );
        true
    }

    pub async fn get(&self, id: &str) -> Option<TerminalSessionInfo> {
        self.sessions.read().await.get(id).map(|e| e.info.clone())
    }

    pub async fn list(&self) -> Vec<TerminalSessionInfo> {
        let mut list: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub async fn kill_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            self.kill(&id).await;
        }
    }

    async fn pty(&self, id: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().await.get(id)?.pty.clone()
    }

    fn shell(&self) -> String {
        if let Some(shell) = &self.config.shell {
            return shell.clone();
        }
        if cfg!(windows) {
            return "powershell.exe".to_string();
        }
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "bash".to_string())
    }

    fn emit(&self, channel: &str, payload: serde_json::Value) {
        // no subscribers is fine
        let _ = self.events.send(HostEvent::new(channel, payload));
    }
}

fn default_cwd() -> PathBuf {
    dirs::home_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Whether `pty` is still the process registered under its id.
fn owns(sessions: &HashMap<String, TerminalEntry>, pty: &Arc<PtySession>) -> bool {
    sessions
        .get(&pty.id)
        .and_then(|e| e.pty.as_ref())
        .is_some_and(|p| Arc::ptr_eq(p, pty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> (TerminalManager, broadcast::Receiver<HostEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let config = TerminalConfig {
            enabled: false,
            ..TerminalConfig::default()
        };
        (TerminalManager::new(config, tx), rx)
    }

    // ── degraded mode ────────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_terminal_returns_error_session() {
        let (manager, mut rx) = disabled();
        assert!(!manager.is_available());

        let info = manager
            .spawn(SpawnTerminalRequest {
                id: Some("t1".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(info.id, "t1");
        assert_eq!(info.status, TerminalStatus::Error);
        assert!(info.error.as_deref().unwrap().contains("disabled"));
        assert_eq!((info.cols, info.rows), (80, 24));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, channels::TERMINAL_ERROR);
        assert_eq!(event.payload["sessionId"], "t1");
    }

    #[tokio::test]
    async fn write_and_resize_fail_without_pty() {
        let (manager, _rx) = disabled();
        manager
            .spawn(SpawnTerminalRequest {
                id: Some("t1".into()),
                ..Default::default()
            })
            .await;
        assert!(!manager.write("t1", "ls\n").await);
        assert!(!manager.resize("t1", 100, 40).await);
        assert!(!manager.write("missing", "ls\n").await);
    }

    #[tokio::test]
    async fn kill_removes_degraded_session_once() {
        let (manager, mut rx) = disabled();
        manager
            .spawn(SpawnTerminalRequest {
                id: Some("t1".into()),
                ..Default::default()
            })
            .await;
        let _ = rx.recv().await.unwrap();

        assert!(manager.kill("t1").await);
        assert!(!manager.kill("t1").await);
        assert!(manager.list().await.is_empty());

        let closed = rx.recv().await.unwrap();
        assert_eq!(closed.channel, channels::TERMINAL_CLOSED);
        assert!(rx.try_recv().is_err());
    }

    // ── respawned ids ────────────────────────────────────────────────

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn output_from_a_replaced_pty_is_not_reported() {
        let (tx, mut rx) = broadcast::channel(256);
        let config = TerminalConfig {
            shell: Some("sh".into()),
            ..TerminalConfig::default()
        };
        let manager = TerminalManager::new(config, tx);
        if !manager.is_available() {
            return;
        }
        let req = || SpawnTerminalRequest {
            id: Some("t1".into()),
            ..Default::default()
        };

        manager.spawn(req()).await;
        let old = manager.pty("t1").await.unwrap();
        assert!(manager.kill("t1").await);
        manager.spawn(req()).await;
        let new = manager.pty("t1").await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));

        manager.forward(&old, "stale".to_string()).await;
        manager.forward(&new, "fresh".to_string()).await;

        let mut outputs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.channel == channels::TERMINAL_OUTPUT {
                outputs.push(event.payload["data"].as_str().unwrap_or_default().to_string());
            }
        }
        assert!(!outputs.iter().any(|d| d == "stale"));
        assert_eq!(outputs.iter().filter(|d| *d == "fresh").count(), 1);
        manager.kill_all().await;
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let (manager, _rx) = disabled();
        let a = manager.spawn(SpawnTerminalRequest::default()).await;
        let b = manager.spawn(SpawnTerminalRequest::default()).await;
        assert_ne!(a.id, b.id);
        assert_eq!(manager.list().await.len(), 2);
    }
}
