mod events;
mod manager;
pub mod output_log;
pub mod process;
pub mod progress;
pub mod records;
pub mod runner;

pub use manager::AgentManager;
pub use output_log::OutputLog;
pub use records::SessionRecords;
pub use runner::{AgentRunner, ClaudeCliRunner, LaunchSpec};
