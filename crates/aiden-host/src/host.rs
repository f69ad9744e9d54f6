use aiden_agent::AgentManager;
use aiden_ai::{CredentialSource, ProviderClient, StaticCredentials, StreamCoordinator};
use aiden_config::AppConfig;
use aiden_proto::{HostEvent, HostRequest, User, WireError};
use aiden_pty::TerminalManager;
use aiden_store::Store;
use aiden_transport::{BridgeRequest, HostBridge};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::credentials::SettingsCredentials;
use crate::error::HostError;
use crate::git;
use crate::github::GithubClient;
use crate::journal::StreamJournal;

const EVENT_CAPACITY: usize = 1024;
const BRIDGE_CAPACITY: usize = 256;

/// The privileged side: owns the store, the session managers and every
/// collaborator, and answers [`HostRequest`]s from either front door.
#[derive(Clone)]
pub struct Host {
    store: Arc<Store>,
    agents: AgentManager,
    terminals: TerminalManager,
    streams: StreamCoordinator,
    journal: StreamJournal,
    github: GithubClient,
    events: broadcast::Sender<HostEvent>,
}

impl Host {
    /// Credentials come from the local user's settings, then the environment.
    pub fn new(config: &AppConfig, store: Arc<Store>) -> Self {
        let credentials = Arc::new(SettingsCredentials::new(
            store.clone(),
            User::local_demo().id,
            StaticCredentials::from_env(),
        ));
        Self::with_credentials(config, store, credentials)
    }

    /// Must be called inside a tokio runtime.
    pub fn with_credentials(
        config: &AppConfig,
        store: Arc<Store>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let agents = AgentManager::new(config.agent.clone(), store.clone(), events.clone());
        let terminals = TerminalManager::new(config.terminal.clone(), events.clone());
        let streams = StreamCoordinator::new(
            ProviderClient::new(&config.ai),
            credentials,
            events.clone(),
        );
        let journal = StreamJournal::spawn(&events);
        let github = GithubClient::new(&config.ai.github_api_url, store.clone(), User::local_demo().id);
        Self {
            store,
            agents,
            terminals,
            streams,
            journal,
            github,
            events,
        }
    }

    pub fn with_github(mut self, github: GithubClient) -> Self {
        self.github = github;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &broadcast::Sender<HostEvent> {
        &self.events
    }

    pub fn journal(&self) -> &StreamJournal {
        &self.journal
    }

    pub fn agents(&self) -> &AgentManager {
        &self.agents
    }

    pub fn terminals(&self) -> &TerminalManager {
        &self.terminals
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Fail persisted agent sessions a previous host left in flight.
    pub async fn reconcile(&self) -> usize {
        let failed = self.agents.reconcile_records().await;
        if failed > 0 {
            tracing::info!(failed, "reconciled stale agent session records");
        }
        failed
    }

    /// Stop every agent and terminal.
    pub async fn shutdown(&self) {
        self.agents.shutdown_all().await;
        self.terminals.kill_all().await;
    }

    /// Open the in-process front door: a bridge for a local transport and
    /// the task serving it. The task ends when every bridge clone is dropped.
    pub fn bridge(&self) -> (HostBridge, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(BRIDGE_CAPACITY);
        let task = tokio::spawn(serve_bridge(self.clone(), rx));
        (HostBridge::new(tx, self.events.clone()), task)
    }

    /// Wire form of [`Host::dispatch`].
    pub async fn handle(&self, request: HostRequest) -> Result<Value, WireError> {
        let op = request.op_name();
        self.dispatch(request).await.map_err(|e| {
            tracing::debug!(op, error = %e, "host request failed");
            e.to_wire()
        })
    }

    pub async fn dispatch(&self, request: HostRequest) -> Result<Value, HostError> {
        match request {
            HostRequest::Db(op) => {
                let store = self.store.clone();
                blocking(move || Ok(store.execute(op)?)).await
            }

            HostRequest::FsReadFile { path } => {
                blocking(move || Ok(json!(aiden_fs::read_file(&path)?))).await
            }
            HostRequest::FsWriteFile { path, content } => {
                blocking(move || {
                    aiden_fs::write_file(&path, &content)?;
                    Ok(Value::Null)
                })
                .await
            }
            HostRequest::FsReadDir { path } => {
                blocking(move || Ok(json!(aiden_fs::read_dir(&path)?))).await
            }
            HostRequest::FsExists { path } => {
                blocking(move || Ok(json!(aiden_fs::exists(&path)))).await
            }
            HostRequest::FsMkdir { path, recursive } => {
                blocking(move || {
                    aiden_fs::mkdir(&path, recursive)?;
                    Ok(Value::Null)
                })
                .await
            }
            HostRequest::FsRemove { path } => {
                blocking(move || {
                    aiden_fs::remove(&path)?;
                    Ok(Value::Null)
                })
                .await
            }

            HostRequest::AuthCurrentUser => to_json(User::local_demo()),

            HostRequest::AgentSpawn(req) => to_json(self.agents.spawn(req).await),
            HostRequest::AgentPause { session_id } => Ok(json!(self.agents.pause(session_id).await)),
            HostRequest::AgentResume { session_id } => {
                Ok(json!(self.agents.resume(session_id).await))
            }
            HostRequest::AgentCancel { session_id } => {
                Ok(json!(self.agents.cancel(session_id).await))
            }
            HostRequest::AgentGet { session_id } => to_json(self.agents.get(session_id).await),
            HostRequest::AgentList => to_json(self.agents.list().await),

            HostRequest::TerminalSpawn(req) => to_json(self.terminals.spawn(req).await),
            HostRequest::TerminalWrite { session_id, data } => {
                Ok(json!(self.terminals.write(&session_id, &data).await))
            }
            HostRequest::TerminalResize {
                session_id,
                cols,
                rows,
            } => Ok(json!(self.terminals.resize(&session_id, cols, rows).await)),
            HostRequest::TerminalKill { session_id } => {
                Ok(json!(self.terminals.kill(&session_id).await))
            }
            HostRequest::TerminalList => to_json(self.terminals.list().await),

            HostRequest::MemoryList { project_id, filter } => {
                let store = self.store.clone();
                blocking(move || Ok(json!(store.list_memories(&project_id, &filter)?))).await
            }
            HostRequest::MemoryCreate { data } => {
                let store = self.store.clone();
                blocking(move || Ok(store.create_memory(data)?)).await
            }
            HostRequest::MemoryUpdate { id, data } => {
                let store = self.store.clone();
                blocking(move || Ok(store.update_memory(&id, data)?)).await
            }
            HostRequest::MemoryDeprecate { id, reason } => {
                let store = self.store.clone();
                blocking(move || Ok(store.deprecate_memory(&id, &reason)?)).await
            }
            HostRequest::MemorySearch {
                project_id,
                query,
                limit,
            } => {
                let store = self.store.clone();
                blocking(move || Ok(json!(store.search_memories(&project_id, &query, limit)?)))
                    .await
            }
            HostRequest::MemoryStats { project_id } => {
                let store = self.store.clone();
                blocking(move || Ok(json!(store.memory_stats(&project_id)?))).await
            }
            HostRequest::MemoryEnrichContext {
                project_id,
                story_id,
            } => {
                let store = self.store.clone();
                blocking(move || Ok(store.enrich_context(&project_id, story_id.as_deref())?)).await
            }

            HostRequest::Git { work_dir, command } => {
                blocking(move || git::execute(&work_dir, command)).await
            }

            HostRequest::AiChat(params) => Ok(json!(self.streams.chat(params).await?)),
            HostRequest::StreamStart { endpoint, payload } => {
                let stream_id = self.streams.start(&endpoint, payload)?;
                Ok(json!({ "streamId": stream_id }))
            }
            HostRequest::StreamCancel { stream_id } => {
                let cancelled = self.streams.cancel(&stream_id);
                self.journal.cancel(&stream_id);
                Ok(json!(cancelled))
            }

            HostRequest::GithubAuthenticate { token } => {
                to_json(self.github.authenticate(&token).await?)
            }
            HostRequest::GithubUser => to_json(self.github.user().await?),
            HostRequest::GithubRepos => to_json(self.github.repos().await?),
            HostRequest::GithubBranches { owner, repo } => {
                to_json(self.github.branches(&owner, &repo).await?)
            }
            HostRequest::GithubClone {
                owner,
                repo,
                dest,
                branch,
            } => to_json(
                self.github
                    .clone_repo(&owner, &repo, &dest, branch.as_deref())
                    .await?,
            ),
        }
    }
}

/// Answer bridge requests until every sender is gone. Each request runs on
/// its own task, so a slow one never holds up the rest.
pub async fn serve_bridge(host: Host, mut requests: mpsc::Receiver<BridgeRequest>) {
    while let Some(BridgeRequest { request, reply }) = requests.recv().await {
        let host = host.clone();
        tokio::spawn(async move {
            let answer = host.handle(request).await;
            let _ = reply.send(answer);
        });
    }
    tracing::debug!("bridge closed");
}

async fn blocking<F>(f: F) -> Result<Value, HostError>
where
    F: FnOnce() -> Result<Value, HostError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn to_json<T: Serialize>(value: T) -> Result<Value, HostError> {
    serde_json::to_value(value).map_err(|e| HostError::Internal(e.to_string()))
}
