pub mod agent_sessions;
pub mod memory;
pub mod migrations;
pub mod store;

pub use agent_sessions::{AgentSessionPatch, AgentSessionRecord};
pub use store::Store;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Invalid filter field: {0}")]
    InvalidField(String),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
