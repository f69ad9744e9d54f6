mod reconcile;
mod supervisor;

use crate::events;
use crate::output_log::OutputLog;
use crate::process;
use crate::records::SessionRecords;
use crate::runner::{AgentRunner, ClaudeCliRunner, LaunchSpec};
use aiden_config::AgentConfig;
use aiden_proto::{channels, AgentSessionInfo, AgentStatus, HostEvent, SpawnAgentRequest};
use aiden_store::AgentSessionPatch;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) struct AgentEntry {
    /// `output` stays empty here; the log is the source of truth.
    pub info: AgentSessionInfo,
    pub log: OutputLog,
    pub finished_at: Option<Instant>,
    pub cancel: CancellationToken,
}

impl AgentEntry {
    fn snapshot(&self) -> AgentSessionInfo {
        let mut info = self.info.clone();
        info.output = self.log.snapshot();
        info
    }
}

/// Lifecycle of spawned coding-agent processes.
///
/// Every status change is persisted and then emitted while the registry
/// write lock is held, so a `get` issued after an event never observes an
/// older state.
#[derive(Clone)]
pub struct AgentManager {
    pub(crate) sessions: Arc<RwLock<HashMap<Uuid, AgentEntry>>>,
    pub(crate) records: Arc<dyn SessionRecords>,
    runner: Arc<dyn AgentRunner>,
    pub(crate) config: AgentConfig,
    events: broadcast::Sender<HostEvent>,
}

impl AgentManager {
    pub fn new(
        config: AgentConfig,
        records: Arc<dyn SessionRecords>,
        events: broadcast::Sender<HostEvent>,
    ) -> Self {
        let runner = Arc::new(ClaudeCliRunner::new(config.program.clone()));
        Self::with_runner(config, runner, records, events)
    }

    pub fn with_runner(
        config: AgentConfig,
        runner: Arc<dyn AgentRunner>,
        records: Arc<dyn SessionRecords>,
        events: broadcast::Sender<HostEvent>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            records,
            runner,
            config,
            events,
        }
    }

    /// Launch an agent run. Never fails: launch errors leave a `failed`
    /// session behind and emit `agent:failed`.
    pub async fn spawn(&self, req: SpawnAgentRequest) -> AgentSessionInfo {
        self.evict_finished().await;

        let working_directory = self.resolve_working_dir(req.working_directory.clone());
        let workspace = working_directory.to_string_lossy().to_string();
        let record_id = match self.records.create(&req.story_id, Some(&workspace)) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(story_id = %req.story_id, error = %e, "failed to create agent session record");
                None
            }
        };

        let id = Uuid::new_v4();
        let mut info = AgentSessionInfo {
            id,
            record_id,
            story_id: req.story_id.clone(),
            status: AgentStatus::Queued,
            progress: 0,
            output: Vec::new(),
            error: None,
            pid: None,
            working_directory,
            created_at: chrono::Utc::now(),
        };

        // the record reads `running` before the process exists
        self.persist(
            &info,
            AgentSessionPatch {
                status: Some(AgentStatus::Running),
                started_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        );

        let spec = LaunchSpec {
            system_prompt: req.system_prompt.as_deref(),
            user_prompt: &req.user_prompt,
            working_dir: &info.working_directory,
        };
        let launched = tokio::process::Command::new(self.runner.command())
            .args(self.runner.args(&spec))
            .envs(self.runner.env())
            .current_dir(&info.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let cancel = CancellationToken::new();
        let mut sessions = self.sessions.write().await;
        self.emit(events::lifecycle(channels::AGENT_CREATED, &info));

        match launched {
            Ok(child) => {
                info.status = AgentStatus::Running;
                info.pid = child.id();
                self.emit(events::lifecycle(channels::AGENT_STARTED, &info));
                sessions.insert(id, self.entry(&info, None, cancel.clone()));
                drop(sessions);

                tracing::info!(
                    session_id = %id,
                    story_id = %info.story_id,
                    pid = ?info.pid,
                    runner = self.runner.name(),
                    "agent session started"
                );
                self.spawn_supervisor(id, child, cancel);
            }
            Err(e) => {
                let message = format!("Failed to spawn agent: {e}");
                tracing::warn!(session_id = %id, error = %e, "agent launch failed");
                info.status = AgentStatus::Failed;
                info.error = Some(message.clone());
                self.persist(
                    &info,
                    AgentSessionPatch {
                        status: Some(AgentStatus::Failed),
                        error: Some(message),
                        completed_at: Some(chrono::Utc::now()),
                        ..Default::default()
                    },
                );
                self.emit(events::lifecycle(channels::AGENT_FAILED, &info));
                sessions.insert(id, self.entry(&info, Some(Instant::now()), cancel));
            }
        }

        info
    }

    /// SIGSTOP a running session. False for unknown ids, any other state,
    /// or platforms without job control.
    pub async fn pause(&self, id: Uuid) -> bool {
        if !process::supports_job_control() {
            return false;
        }
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };
        if entry.info.status != AgentStatus::Running
            || !entry.info.status.can_transition_to(AgentStatus::Paused)
        {
            return false;
        }
        let Some(pid) = entry.info.pid else {
            return false;
        };
        if !process::pause_process(pid) {
            tracing::warn!(session_id = %id, pid, "SIGSTOP failed");
            return false;
        }

        entry.info.status = AgentStatus::Paused;
        self.persist(&entry.info, AgentSessionPatch::status(AgentStatus::Paused));
        self.emit(events::lifecycle(channels::AGENT_PAUSED, &entry.info));
        tracing::info!(session_id = %id, pid, "agent session paused");
        true
    }

    pub async fn resume(&self, id: Uuid) -> bool {
        if !process::supports_job_control() {
            return false;
        }
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };
        if entry.info.status != AgentStatus::Paused {
            return false;
        }
        let Some(pid) = entry.info.pid else {
            return false;
        };
        if !process::resume_process(pid) {
            tracing::warn!(session_id = %id, pid, "SIGCONT failed");
            return false;
        }

        entry.info.status = AgentStatus::Running;
        self.persist(&entry.info, AgentSessionPatch::status(AgentStatus::Running));
        self.emit(events::lifecycle(channels::AGENT_RESUMED, &entry.info));
        tracing::info!(session_id = %id, pid, "agent session resumed");
        true
    }

    /// Terminate a non-terminal session and drop it from the registry. The
    /// supervisor escalates to a hard kill if SIGTERM is ignored.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(entry) if !entry.info.status.is_terminal() => {}
            _ => return false,
        }
        let Some(mut entry) = sessions.remove(&id) else {
            return false;
        };

        if let Some(pid) = entry.info.pid {
            process::terminate_process(pid);
            if entry.info.status == AgentStatus::Paused {
                // a stopped process only acts on SIGTERM once continued
                process::resume_process(pid);
            }
        }
        entry.cancel.cancel();

        entry.info.status = AgentStatus::Cancelled;
        self.persist(
            &entry.info,
            AgentSessionPatch {
                status: Some(AgentStatus::Cancelled),
                completed_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        );
        self.emit(events::lifecycle(channels::AGENT_CANCELLED, &entry.info));
        tracing::info!(session_id = %id, "agent session cancelled");
        true
    }

    pub async fn get(&self, id: Uuid) -> Option<AgentSessionInfo> {
        self.sessions.read().await.get(&id).map(AgentEntry::snapshot)
    }

    pub async fn list(&self) -> Vec<AgentSessionInfo> {
        self.evict_finished().await;
        let mut list: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(AgentEntry::snapshot)
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Cancel everything still in flight.
    pub async fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, e)| !e.info.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.cancel(id).await;
        }
    }

    /// Drop finished sessions older than the TTL, then the oldest ones
    /// beyond `max_finished_sessions`.
    pub(crate) async fn evict_finished(&self) {
        let ttl = self.config.finished_ttl();
        let max = self.config.max_finished_sessions;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, e| e.finished_at.map_or(true, |at| at.elapsed() < ttl));

        let mut finished: Vec<(Uuid, Instant)> = sessions
            .iter()
            .filter_map(|(id, e)| e.finished_at.map(|at| (*id, at)))
            .collect();
        if finished.len() > max {
            finished.sort_by_key(|(_, at)| *at);
            let excess = finished.len() - max;
            for (id, _) in finished.into_iter().take(excess) {
                sessions.remove(&id);
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted finished agent sessions");
        }
    }

    fn entry(
        &self,
        info: &AgentSessionInfo,
        finished_at: Option<Instant>,
        cancel: CancellationToken,
    ) -> AgentEntry {
        AgentEntry {
            info: info.clone(),
            log: OutputLog::new(self.config.output_log_max_bytes),
            finished_at,
            cancel,
        }
    }

    fn resolve_working_dir(&self, requested: Option<PathBuf>) -> PathBuf {
        requested
            .or_else(|| self.config.default_working_dir.clone())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub(crate) fn persist(&self, info: &AgentSessionInfo, patch: AgentSessionPatch) {
        let Some(record_id) = &info.record_id else {
            return;
        };
        if let Err(e) = self.records.update(record_id, patch) {
            tracing::warn!(session_id = %info.id, record_id = %record_id, error = %e, "failed to persist agent session");
        }
    }

    pub(crate) fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }
}
