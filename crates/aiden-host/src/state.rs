use aiden_config::ServerConfig;

use crate::auth::hash_token;
use crate::host::Host;

#[derive(Clone)]
pub struct AppState {
    pub host: Host,
    pub server: ServerConfig,
    /// SHA-256 of the bearer token; `None` leaves the surface open.
    pub token_hash: Option<String>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(host: Host, server: ServerConfig, token: Option<&str>) -> Self {
        Self {
            host,
            server,
            token_hash: token.map(hash_token),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
