//! The privileged host process: request dispatch over the in-process bridge
//! and the HTTP surface remote transports talk to.

pub mod auth;
pub mod credentials;
pub mod error;
pub mod git;
pub mod github;
pub mod host;
pub mod journal;
pub mod rest;
pub mod router;
pub mod state;

pub use credentials::SettingsCredentials;
pub use error::{ApiError, ApiErrorResponse, HostError};
pub use github::GithubClient;
pub use host::{serve_bridge, Host};
pub use journal::StreamJournal;
pub use router::build_router;
pub use state::AppState;
