use crate::store::Store;
use crate::StoreError;
use aiden_proto::{AgentStatus, Entity, RecordFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Typed view over an `agent_session` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionRecord {
    pub id: String,
    pub story_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSessionPatch {
    pub status: Option<AgentStatus>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentSessionPatch {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn into_json(self) -> Value {
        let mut map = Map::new();
        if let Some(status) = self.status {
            map.insert("status".into(), json!(status));
        }
        if let Some(progress) = self.progress {
            map.insert("progress".into(), json!(progress));
        }
        if let Some(error) = self.error {
            map.insert("error".into(), json!(error));
        }
        if let Some(at) = self.started_at {
            map.insert("startedAt".into(), json!(at));
        }
        if let Some(at) = self.completed_at {
            map.insert("completedAt".into(), json!(at));
        }
        Value::Object(map)
    }
}

impl Store {
    pub fn create_agent_session(
        &self,
        story_id: &str,
        workspace_path: Option<&str>,
    ) -> Result<AgentSessionRecord, StoreError> {
        let doc = self.create(
            Entity::AgentSession,
            json!({
                "storyId": story_id,
                "status": AgentStatus::Queued,
                "progress": 0,
                "workspacePath": workspace_path,
                "error": null,
            }),
        )?;
        Ok(serde_json::from_value(doc)?)
    }

    pub fn update_agent_session(
        &self,
        id: &str,
        patch: AgentSessionPatch,
    ) -> Result<AgentSessionRecord, StoreError> {
        let doc = self.update(Entity::AgentSession, id, patch.into_json())?;
        Ok(serde_json::from_value(doc)?)
    }

    pub fn agent_session(&self, id: &str) -> Result<Option<AgentSessionRecord>, StoreError> {
        self.get(Entity::AgentSession, id)?
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .transpose()
    }

    /// Records still in `queued`, `running` or `paused`.
    pub fn active_agent_sessions(&self) -> Result<Vec<AgentSessionRecord>, StoreError> {
        let mut active = Vec::new();
        for status in [AgentStatus::Queued, AgentStatus::Running, AgentStatus::Paused] {
            let docs = self.list(
                Entity::AgentSession,
                &RecordFilter::by("status", status.as_str()),
            )?;
            for doc in docs {
                active.push(serde_json::from_value(doc)?);
            }
        }
        Ok(active)
    }
}
