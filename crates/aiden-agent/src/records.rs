use aiden_store::{AgentSessionPatch, AgentSessionRecord, Store, StoreError};

/// Durable side of agent sessions.
pub trait SessionRecords: Send + Sync {
    /// Create a `queued` record and return its id.
    fn create(&self, story_id: &str, workspace_path: Option<&str>) -> Result<String, StoreError>;
    fn update(&self, id: &str, patch: AgentSessionPatch) -> Result<(), StoreError>;
    /// Records still marked queued, running or paused.
    fn active(&self) -> Result<Vec<AgentSessionRecord>, StoreError>;
}

impl SessionRecords for Store {
    fn create(&self, story_id: &str, workspace_path: Option<&str>) -> Result<String, StoreError> {
        Ok(self.create_agent_session(story_id, workspace_path)?.id)
    }

    fn update(&self, id: &str, patch: AgentSessionPatch) -> Result<(), StoreError> {
        self.update_agent_session(id, patch).map(|_| ())
    }

    fn active(&self) -> Result<Vec<AgentSessionRecord>, StoreError> {
        self.active_agent_sessions()
    }
}
