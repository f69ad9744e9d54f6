pub mod agent;
pub mod app;
pub mod paths;
pub mod server;
pub mod terminal;

pub use agent::AgentConfig;
pub use app::{AiConfig, AppConfig};
pub use paths::ConfigPaths;
pub use server::ServerConfig;
pub use terminal::TerminalConfig;
