//! AI provider access: one-shot chat and cancellable incremental streams.

pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod frames;
pub mod provider;

pub use coordinator::StreamCoordinator;
pub use credentials::{CredentialSource, StaticCredentials};
pub use error::AiError;
pub use provider::ProviderClient;
