use serde::{Deserialize, Serialize};

/// Failure kinds shared by the host and both transports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotInitialized,
    NotFound,
    UnsupportedInRemoteMode,
    SpawnFailure,
    ProcessFailure,
    NetworkFailure,
    CredentialMissing,
    InvalidRequest,
    Unauthorized,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UnsupportedInRemoteMode => "UNSUPPORTED_IN_REMOTE_MODE",
            ErrorCode::SpawnFailure => "SPAWN_FAILURE",
            ErrorCode::ProcessFailure => "PROCESS_FAILURE",
            ErrorCode::NetworkFailure => "NETWORK_FAILURE",
            ErrorCode::CredentialMissing => "CREDENTIAL_MISSING",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error as it travels over the bridge or the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}
