use aiden_proto::{ErrorCode, WireError};

/// Failures surfaced by any transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport not initialized")]
    NotInitialized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    UnsupportedInRemoteMode(String),
    #[error("{0}")]
    SpawnFailure(String),
    #[error("{0}")]
    ProcessFailure(String),
    #[error("{0}")]
    NetworkFailure(String),
    #[error("{0}")]
    CredentialMissing(String),
    #[error("Host bridge is closed")]
    HostUnavailable,
    #[error("Transport has been disposed")]
    Disposed,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("{message}")]
    Host { code: ErrorCode, message: String },
}

impl TransportError {
    pub fn unsupported(op: &str) -> Self {
        Self::UnsupportedInRemoteMode(format!("{op} is not supported in remote mode"))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::NotInitialized => ErrorCode::NotInitialized,
            TransportError::NotFound(_) => ErrorCode::NotFound,
            TransportError::UnsupportedInRemoteMode(_) => ErrorCode::UnsupportedInRemoteMode,
            TransportError::SpawnFailure(_) => ErrorCode::SpawnFailure,
            TransportError::ProcessFailure(_) => ErrorCode::ProcessFailure,
            TransportError::NetworkFailure(_) | TransportError::HostUnavailable => {
                ErrorCode::NetworkFailure
            }
            TransportError::CredentialMissing(_) => ErrorCode::CredentialMissing,
            TransportError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            TransportError::Disposed | TransportError::InvalidResponse(_) => {
                ErrorCode::InternalError
            }
            TransportError::Host { code, .. } => *code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::NetworkFailure(_) | TransportError::HostUnavailable
        )
    }
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        let WireError { code, message, .. } = err;
        match code {
            ErrorCode::NotInitialized => TransportError::NotInitialized,
            ErrorCode::NotFound => TransportError::NotFound(message),
            ErrorCode::UnsupportedInRemoteMode => TransportError::UnsupportedInRemoteMode(message),
            ErrorCode::SpawnFailure => TransportError::SpawnFailure(message),
            ErrorCode::ProcessFailure => TransportError::ProcessFailure(message),
            ErrorCode::NetworkFailure => TransportError::NetworkFailure(message),
            ErrorCode::CredentialMissing => TransportError::CredentialMissing(message),
            ErrorCode::InvalidRequest => TransportError::InvalidRequest(message),
            ErrorCode::Unauthorized | ErrorCode::InternalError => {
                TransportError::Host { code, message }
            }
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::NetworkFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_error_keeps_its_kind() {
        let err: TransportError = WireError::new(ErrorCode::NotFound, "Story not found").into();
        assert_eq!(err, TransportError::NotFound("Story not found".into()));
        assert_eq!(err.to_string(), "Story not found");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn unmapped_host_codes_stay_host_errors() {
        let err: TransportError = WireError::new(ErrorCode::InternalError, "db locked").into();
        assert_eq!(
            err,
            TransportError::Host {
                code: ErrorCode::InternalError,
                message: "db locked".into()
            }
        );
    }

    #[test]
    fn unsupported_names_the_operation() {
        let err = TransportError::unsupported("terminal_spawn");
        assert_eq!(err.code(), ErrorCode::UnsupportedInRemoteMode);
        assert_eq!(err.to_string(), "terminal_spawn is not supported in remote mode");
        assert!(!err.is_retryable());
    }

    #[test]
    fn network_failures_are_retryable() {
        assert!(TransportError::NetworkFailure("HTTP 502: bad gateway".into()).is_retryable());
        assert!(TransportError::HostUnavailable.is_retryable());
    }
}
