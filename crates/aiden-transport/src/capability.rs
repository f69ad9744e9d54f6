//! The capability contract every transport implements.
//!
//! Request/response capabilities are provided methods over [`Invoke`]: a
//! transport only has to move a [`HostRequest`] to the host and bring the
//! JSON reply back. Events and streaming are push-based and implemented by
//! each transport.

use crate::error::TransportError;
use crate::events::EventListener;
use crate::streams::{DataListener, DoneListener, ErrorListener, StreamHandlers};
use crate::subscription::Subscription;
use aiden_proto::{
    AgentSessionInfo, ChatParams, DbOperation, DirEntry, Entity, GitBranches, GitCommand,
    GitLogEntry, GitStatus, GithubRepo, GithubUser, HostRequest, MemoryFilter, MemoryStats,
    RecordFilter, SpawnAgentRequest, SpawnTerminalRequest, TerminalSessionInfo, TransportMode,
    User,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One request to the host, one JSON reply.
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(&self, request: HostRequest) -> Result<Value, TransportError>;
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

fn optional<T: DeserializeOwned>(value: Value) -> Result<Option<T>, TransportError> {
    if value.is_null() {
        Ok(None)
    } else {
        decode(value).map(Some)
    }
}

#[async_trait]
pub trait DataAccess: Invoke {
    async fn db(&self, op: DbOperation) -> Result<Value, TransportError> {
        self.invoke(HostRequest::Db(op)).await
    }

    async fn list_records(
        &self,
        entity: Entity,
        filter: RecordFilter,
    ) -> Result<Vec<Value>, TransportError> {
        decode(self.db(DbOperation::List { entity, filter }).await?)
    }

    async fn get_record(&self, entity: Entity, id: &str) -> Result<Option<Value>, TransportError> {
        let id = id.to_string();
        optional(self.db(DbOperation::Get { entity, id }).await?)
    }

    async fn create_record(&self, entity: Entity, data: Value) -> Result<Value, TransportError> {
        self.db(DbOperation::Create { entity, data }).await
    }

    /// Shallow merge of `data` into the stored document.
    async fn update_record(
        &self,
        entity: Entity,
        id: &str,
        data: Value,
    ) -> Result<Value, TransportError> {
        let id = id.to_string();
        self.db(DbOperation::Update { entity, id, data }).await
    }

    async fn delete_record(&self, entity: Entity, id: &str) -> Result<bool, TransportError> {
        let id = id.to_string();
        decode(self.db(DbOperation::Delete { entity, id }).await?)
    }

    async fn settings(&self, user_id: &str) -> Result<Option<Value>, TransportError> {
        let user_id = user_id.to_string();
        optional(self.db(DbOperation::GetSettings { user_id }).await?)
    }

    async fn upsert_settings(&self, user_id: &str, data: Value) -> Result<Value, TransportError> {
        let user_id = user_id.to_string();
        self.db(DbOperation::UpsertSettings { user_id, data }).await
    }
}

/// Named host events, delivered per channel in emission order.
pub trait Events: Send + Sync {
    fn on(&self, channel: &str, listener: EventListener) -> Subscription;
}

#[async_trait]
pub trait Streaming: Send + Sync {
    /// Returns the stream id once the request is accepted.
    async fn start_stream(&self, endpoint: &str, payload: Value) -> Result<String, TransportError>;

    fn subscribe_stream(&self, stream_id: &str, handlers: StreamHandlers) -> Subscription;

    /// Idempotent; true only for the call that stopped a live stream.
    async fn cancel_stream(&self, stream_id: &str) -> Result<bool, TransportError>;

    fn on_stream_data(&self, stream_id: &str, listener: DataListener) -> Subscription {
        self.subscribe_stream(stream_id, StreamHandlers::new().on_data(move |e| listener(e)))
    }

    fn on_stream_done(&self, stream_id: &str, listener: DoneListener) -> Subscription {
        self.subscribe_stream(stream_id, StreamHandlers::new().on_done(move || listener()))
    }

    fn on_stream_error(&self, stream_id: &str, listener: ErrorListener) -> Subscription {
        self.subscribe_stream(stream_id, StreamHandlers::new().on_error(move |m| listener(m)))
    }
}

#[async_trait]
pub trait Filesystem: Invoke {
    async fn read_file(&self, path: &Path) -> Result<String, TransportError> {
        let path = path.to_path_buf();
        decode(self.invoke(HostRequest::FsReadFile { path }).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<(), TransportError> {
        let path = path.to_path_buf();
        let content = content.to_string();
        self.invoke(HostRequest::FsWriteFile { path, content }).await?;
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, TransportError> {
        let path = path.to_path_buf();
        decode(self.invoke(HostRequest::FsReadDir { path }).await?)
    }

    async fn exists(&self, path: &Path) -> Result<bool, TransportError> {
        let path = path.to_path_buf();
        decode(self.invoke(HostRequest::FsExists { path }).await?)
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), TransportError> {
        let path = path.to_path_buf();
        self.invoke(HostRequest::FsMkdir { path, recursive }).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), TransportError> {
        let path = path.to_path_buf();
        self.invoke(HostRequest::FsRemove { path }).await?;
        Ok(())
    }
}

#[async_trait]
pub trait Auth: Invoke {
    async fn current_user(&self) -> Result<Option<User>, TransportError> {
        optional(self.invoke(HostRequest::AuthCurrentUser).await?)
    }

    async fn is_authenticated(&self) -> Result<bool, TransportError> {
        Ok(self.current_user().await?.is_some())
    }
}

#[async_trait]
pub trait Agents: Invoke {
    async fn spawn_agent(
        &self,
        request: SpawnAgentRequest,
    ) -> Result<AgentSessionInfo, TransportError> {
        decode(self.invoke(HostRequest::AgentSpawn(request)).await?)
    }

    async fn pause_agent(&self, session_id: Uuid) -> Result<bool, TransportError> {
        decode(self.invoke(HostRequest::AgentPause { session_id }).await?)
    }

    async fn resume_agent(&self, session_id: Uuid) -> Result<bool, TransportError> {
        decode(self.invoke(HostRequest::AgentResume { session_id }).await?)
    }

    async fn cancel_agent(&self, session_id: Uuid) -> Result<bool, TransportError> {
        decode(self.invoke(HostRequest::AgentCancel { session_id }).await?)
    }

    async fn agent(&self, session_id: Uuid) -> Result<Option<AgentSessionInfo>, TransportError> {
        optional(self.invoke(HostRequest::AgentGet { session_id }).await?)
    }

    async fn agents(&self) -> Result<Vec<AgentSessionInfo>, TransportError> {
        decode(self.invoke(HostRequest::AgentList).await?)
    }
}

#[async_trait]
pub trait Terminals: Invoke {
    async fn spawn_terminal(
        &self,
        request: SpawnTerminalRequest,
    ) -> Result<TerminalSessionInfo, TransportError> {
        decode(self.invoke(HostRequest::TerminalSpawn(request)).await?)
    }

    async fn write_terminal(&self, session_id: &str, data: &str) -> Result<bool, TransportError> {
        let session_id = session_id.to_string();
        let data = data.to_string();
        decode(self.invoke(HostRequest::TerminalWrite { session_id, data }).await?)
    }

    async fn resize_terminal(
        &self,
        session_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<bool, TransportError> {
        let session_id = session_id.to_string();
        decode(
            self.invoke(HostRequest::TerminalResize {
                session_id,
                cols,
                rows,
            })
            .await?,
        )
    }

    async fn kill_terminal(&self, session_id: &str) -> Result<bool, TransportError> {
        let session_id = session_id.to_string();
        decode(self.invoke(HostRequest::TerminalKill { session_id }).await?)
    }

    async fn terminals(&self) -> Result<Vec<TerminalSessionInfo>, TransportError> {
        decode(self.invoke(HostRequest::TerminalList).await?)
    }
}

#[async_trait]
pub trait Memory: Invoke {
    async fn list_memories(
        &self,
        project_id: &str,
        filter: MemoryFilter,
    ) -> Result<Vec<Value>, TransportError> {
        let project_id = project_id.to_string();
        decode(self.invoke(HostRequest::MemoryList { project_id, filter }).await?)
    }

    async fn create_memory(&self, data: Value) -> Result<Value, TransportError> {
        self.invoke(HostRequest::MemoryCreate { data }).await
    }

    async fn update_memory(&self, id: &str, data: Value) -> Result<Value, TransportError> {
        let id = id.to_string();
        self.invoke(HostRequest::MemoryUpdate { id, data }).await
    }

    async fn deprecate_memory(&self, id: &str, reason: &str) -> Result<Value, TransportError> {
        let id = id.to_string();
        let reason = reason.to_string();
        self.invoke(HostRequest::MemoryDeprecate { id, reason }).await
    }

    async fn search_memories(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, TransportError> {
        let project_id = project_id.to_string();
        let query = query.to_string();
        decode(
            self.invoke(HostRequest::MemorySearch {
                project_id,
                query,
                limit,
            })
            .await?,
        )
    }

    async fn memory_stats(&self, project_id: &str) -> Result<MemoryStats, TransportError> {
        let project_id = project_id.to_string();
        decode(self.invoke(HostRequest::MemoryStats { project_id }).await?)
    }

    /// `{memories, story?}` for prompting an agent.
    async fn enrich_context(
        &self,
        project_id: &str,
        story_id: Option<&str>,
    ) -> Result<Value, TransportError> {
        let project_id = project_id.to_string();
        let story_id = story_id.map(str::to_string);
        self.invoke(HostRequest::MemoryEnrichContext {
            project_id,
            story_id,
        })
        .await
    }
}

#[async_trait]
pub trait Git: Invoke {
    async fn git(&self, work_dir: &Path, command: GitCommand) -> Result<Value, TransportError> {
        let work_dir = work_dir.to_path_buf();
        self.invoke(HostRequest::Git { work_dir, command }).await
    }

    async fn git_status(&self, work_dir: &Path) -> Result<GitStatus, TransportError> {
        decode(self.git(work_dir, GitCommand::Status).await?)
    }

    /// Returns the new commit hash.
    async fn git_commit(&self, work_dir: &Path, message: &str) -> Result<String, TransportError> {
        let message = message.to_string();
        decode(self.git(work_dir, GitCommand::Commit { message }).await?)
    }

    async fn git_diff(&self, work_dir: &Path, staged: bool) -> Result<String, TransportError> {
        decode(self.git(work_dir, GitCommand::Diff { staged }).await?)
    }

    async fn git_log(&self, work_dir: &Path, limit: usize) -> Result<Vec<GitLogEntry>, TransportError> {
        decode(self.git(work_dir, GitCommand::Log { limit }).await?)
    }

    async fn git_branches(&self, work_dir: &Path) -> Result<GitBranches, TransportError> {
        decode(self.git(work_dir, GitCommand::Branch).await?)
    }
}

#[async_trait]
pub trait Ai: Invoke + Streaming {
    async fn chat(&self, params: ChatParams) -> Result<String, TransportError> {
        decode(self.invoke(HostRequest::AiChat(params)).await?)
    }

    /// Start a `chat` stream; subscribe with [`Streaming::subscribe_stream`].
    async fn stream_chat(&self, params: ChatParams) -> Result<String, TransportError> {
        let payload = serde_json::to_value(&params)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        self.start_stream("chat", payload).await
    }
}

#[async_trait]
pub trait SourceHosting: Invoke {
    async fn github_authenticate(&self, token: &str) -> Result<GithubUser, TransportError> {
        let token = token.to_string();
        decode(self.invoke(HostRequest::GithubAuthenticate { token }).await?)
    }

    async fn github_user(&self) -> Result<Option<GithubUser>, TransportError> {
        optional(self.invoke(HostRequest::GithubUser).await?)
    }

    async fn github_repos(&self) -> Result<Vec<GithubRepo>, TransportError> {
        decode(self.invoke(HostRequest::GithubRepos).await?)
    }

    async fn github_branches(&self, owner: &str, repo: &str) -> Result<Vec<String>, TransportError> {
        let owner = owner.to_string();
        let repo = repo.to_string();
        decode(self.invoke(HostRequest::GithubBranches { owner, repo }).await?)
    }

    /// Returns the checkout path.
    async fn github_clone(
        &self,
        owner: &str,
        repo: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<PathBuf, TransportError> {
        decode(
            self.invoke(HostRequest::GithubClone {
                owner: owner.to_string(),
                repo: repo.to_string(),
                dest: dest.to_path_buf(),
                branch: branch.map(str::to_string),
            })
            .await?,
        )
    }
}

/// The full capability bundle. Exactly one is active per process; see
/// [`crate::TransportSwitch`].
pub trait Transport:
    DataAccess
    + Events
    + Streaming
    + Filesystem
    + Auth
    + Agents
    + Terminals
    + Memory
    + Git
    + Ai
    + SourceHosting
{
    fn mode(&self) -> TransportMode;

    fn is_connected(&self) -> bool;

    /// Sever every subscription and stop background pumps. Calls made
    /// afterwards fail with [`TransportError::Disposed`].
    fn dispose(&self);
}
