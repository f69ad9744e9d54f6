use aiden_ai::AiError;
use aiden_fs::FsError;
use aiden_proto::{ErrorCode, WireError};
use aiden_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Everything a host request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0} is not supported in remote mode")]
    Unsupported(&'static str),
    #[error("{0}")]
    CredentialMissing(String),
    #[error("{0}")]
    Git(String),
    #[error("GitHub returned HTTP {status}: {message}")]
    Github { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("{0}")]
    Internal(String),
}

impl HostError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HostError::NotFound(_) => ErrorCode::NotFound,
            HostError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            HostError::Unsupported(_) => ErrorCode::UnsupportedInRemoteMode,
            HostError::CredentialMissing(_) => ErrorCode::CredentialMissing,
            HostError::Git(_) => ErrorCode::ProcessFailure,
            HostError::Github { status: 401, .. } => ErrorCode::Unauthorized,
            HostError::Github { .. } | HostError::Network(_) => ErrorCode::NetworkFailure,
            HostError::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorCode::NotFound,
                StoreError::InvalidDocument(_) | StoreError::InvalidField(_) => {
                    ErrorCode::InvalidRequest
                }
                StoreError::Sqlite(_) | StoreError::Json(_) => ErrorCode::InternalError,
            },
            HostError::Fs(e) => match e {
                FsError::NotFound(_) => ErrorCode::NotFound,
                FsError::Io(_) => ErrorCode::InternalError,
                _ => ErrorCode::InvalidRequest,
            },
            HostError::Ai(e) => match e {
                AiError::MissingCredential(_) => ErrorCode::CredentialMissing,
                AiError::UnknownEndpoint(_) => ErrorCode::NotFound,
                AiError::InvalidPayload(_) => ErrorCode::InvalidRequest,
                AiError::Http { .. } | AiError::Network(_) | AiError::Protocol(_) => {
                    ErrorCode::NetworkFailure
                }
            },
            HostError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            HostError::Network(_) => true,
            HostError::Github { status, .. } => *status == 429 || *status >= 500,
            HostError::Ai(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn to_wire(&self) -> WireError {
        let err = WireError::new(self.code(), self.to_string());
        if self.is_retryable() {
            err.retryable()
        } else {
            err
        }
    }
}

impl From<tokio::task::JoinError> for HostError {
    fn from(e: tokio::task::JoinError) -> Self {
        HostError::Internal(format!("Blocking task failed: {e}"))
    }
}

/// Body of every non-2xx response. `code` is always an [`ErrorCode`]
/// string, so clients can read it back as a [`WireError`].
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Authentication required")
    }

    pub fn invalid_token() -> Self {
        Self::new(ErrorCode::Unauthorized, "Invalid or expired token")
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", resource))
    }
}

#[derive(Debug)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let body = serde_json::to_string(&self.error).unwrap_or_default();
        (self.status, [("content-type", "application/json")], body).into_response()
    }
}

impl From<(StatusCode, ApiError)> for ApiErrorResponse {
    fn from((status, error): (StatusCode, ApiError)) -> Self {
        Self { status, error }
    }
}

impl From<WireError> for ApiErrorResponse {
    fn from(err: WireError) -> Self {
        let status = match err.code {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidRequest
            | ErrorCode::UnsupportedInRemoteMode
            | ErrorCode::CredentialMissing => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NetworkFailure => StatusCode::BAD_GATEWAY,
            ErrorCode::NotInitialized
            | ErrorCode::SpawnFailure
            | ErrorCode::ProcessFailure
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: ApiError {
                code: err.code.as_str().to_string(),
                message: err.message,
                details: None,
                retryable: err.retryable,
            },
        }
    }
}

impl From<HostError> for ApiErrorResponse {
    fn from(err: HostError) -> Self {
        err.to_wire().into()
    }
}
