use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::session::{SpawnAgentRequest, SpawnTerminalRequest};
use crate::types::{ChatParams, MemoryFilter};

/// Durable entity kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Project,
    Epic,
    Story,
    Spec,
    AgentSession,
    ChatSession,
    ChatMessage,
    Memory,
    UserSettings,
    Activity,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Entity::Project => "project",
            Entity::Epic => "epic",
            Entity::Story => "story",
            Entity::Spec => "spec",
            Entity::AgentSession => "agent_session",
            Entity::ChatSession => "chat_session",
            Entity::ChatMessage => "chat_message",
            Entity::Memory => "memory",
            Entity::UserSettings => "user_settings",
            Entity::Activity => "activity",
        }
    }
}

/// Equality filter over top-level document fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordFilter {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn by(field: &str, value: impl Into<Value>) -> Self {
        let mut filter = Self::default();
        filter.fields.insert(field.to_string(), value.into());
        filter
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Durable-store operations. The store matches on every variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "action",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum DbOperation {
    List {
        entity: Entity,
        #[serde(default)]
        filter: RecordFilter,
    },
    Get {
        entity: Entity,
        id: String,
    },
    Create {
        entity: Entity,
        data: Value,
    },
    Update {
        entity: Entity,
        id: String,
        data: Value,
    },
    Delete {
        entity: Entity,
        id: String,
    },
    GetSettings {
        user_id: String,
    },
    UpsertSettings {
        user_id: String,
        data: Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "command",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GitCommand {
    Status,
    Init,
    Commit {
        message: String,
    },
    Diff {
        #[serde(default)]
        staged: bool,
    },
    Log {
        #[serde(default = "default_log_limit")]
        limit: usize,
    },
    Branch,
    Checkout {
        branch: String,
        #[serde(default)]
        create: bool,
    },
    Push {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
    Pull {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
    Add {
        files: Vec<String>,
    },
}

fn default_log_limit() -> usize {
    20
}

/// Every operation a transport can ask of the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "op",
    content = "params",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum HostRequest {
    Db(DbOperation),

    FsReadFile { path: PathBuf },
    FsWriteFile { path: PathBuf, content: String },
    FsReadDir { path: PathBuf },
    FsExists { path: PathBuf },
    FsMkdir { path: PathBuf, recursive: bool },
    FsRemove { path: PathBuf },

    AuthCurrentUser,

    AgentSpawn(SpawnAgentRequest),
    AgentPause { session_id: Uuid },
    AgentResume { session_id: Uuid },
    AgentCancel { session_id: Uuid },
    AgentGet { session_id: Uuid },
    AgentList,

    TerminalSpawn(SpawnTerminalRequest),
    TerminalWrite { session_id: String, data: String },
    TerminalResize { session_id: String, cols: u16, rows: u16 },
    TerminalKill { session_id: String },
    TerminalList,

    MemoryList { project_id: String, filter: MemoryFilter },
    MemoryCreate { data: Value },
    MemoryUpdate { id: String, data: Value },
    MemoryDeprecate { id: String, reason: String },
    MemorySearch { project_id: String, query: String, limit: usize },
    MemoryStats { project_id: String },
    MemoryEnrichContext { project_id: String, story_id: Option<String> },

    Git { work_dir: PathBuf, command: GitCommand },

    AiChat(ChatParams),
    StreamStart { endpoint: String, payload: Value },
    StreamCancel { stream_id: String },

    GithubAuthenticate { token: String },
    GithubUser,
    GithubRepos,
    GithubBranches { owner: String, repo: String },
    GithubClone {
        owner: String,
        repo: String,
        dest: PathBuf,
        branch: Option<String>,
    },
}

impl HostRequest {
    /// Terminal operations need the host's PTY and are never served remotely.
    pub fn is_terminal_op(&self) -> bool {
        matches!(
            self,
            HostRequest::TerminalSpawn(_)
                | HostRequest::TerminalWrite { .. }
                | HostRequest::TerminalResize { .. }
                | HostRequest::TerminalKill { .. }
                | HostRequest::TerminalList
        )
    }

    /// Short name for logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            HostRequest::Db(_) => "db",
            HostRequest::FsReadFile { .. } => "fs_read_file",
            HostRequest::FsWriteFile { .. } => "fs_write_file",
            HostRequest::FsReadDir { .. } => "fs_read_dir",
            HostRequest::FsExists { .. } => "fs_exists",
            HostRequest::FsMkdir { .. } => "fs_mkdir",
            HostRequest::FsRemove { .. } => "fs_remove",
            HostRequest::AuthCurrentUser => "auth_current_user",
            HostRequest::AgentSpawn(_) => "agent_spawn",
            HostRequest::AgentPause { .. } => "agent_pause",
            HostRequest::AgentResume { .. } => "agent_resume",
            HostRequest::AgentCancel { .. } => "agent_cancel",
            HostRequest::AgentGet { .. } => "agent_get",
            HostRequest::AgentList => "agent_list",
            HostRequest::TerminalSpawn(_) => "terminal_spawn",
            HostRequest::TerminalWrite { .. } => "terminal_write",
            HostRequest::TerminalResize { .. } => "terminal_resize",
            HostRequest::TerminalKill { .. } => "terminal_kill",
            HostRequest::TerminalList => "terminal_list",
            HostRequest::MemoryList { .. } => "memory_list",
            HostRequest::MemoryCreate { .. } => "memory_create",
            HostRequest::MemoryUpdate { .. } => "memory_update",
            HostRequest::MemoryDeprecate { .. } => "memory_deprecate",
            HostRequest::MemorySearch { .. } => "memory_search",
            HostRequest::MemoryStats { .. } => "memory_stats",
            HostRequest::MemoryEnrichContext { .. } => "memory_enrich_context",
            HostRequest::Git { .. } => "git",
            HostRequest::AiChat(_) => "ai_chat",
            HostRequest::StreamStart { .. } => "stream_start",
            HostRequest::StreamCancel { .. } => "stream_cancel",
            HostRequest::GithubAuthenticate { .. } => "github_authenticate",
            HostRequest::GithubUser => "github_user",
            HostRequest::GithubRepos => "github_repos",
            HostRequest::GithubBranches { .. } => "github_branches",
            HostRequest::GithubClone { .. } => "github_clone",
        }
    }
}
