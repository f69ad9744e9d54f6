use aiden_proto::AiProvider;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("No API key configured for {0}")]
    MissingCredential(AiProvider),
    #[error("Unknown stream endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected provider response: {0}")]
    Protocol(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Network(_) => true,
            AiError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
