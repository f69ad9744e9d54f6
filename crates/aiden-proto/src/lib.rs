//! Types shared by the host and every transport: modes, session snapshots,
//! host requests and events, and push-stream framing.

pub mod error;
pub mod event;
pub mod framing;
pub mod mode;
pub mod request;
pub mod session;
pub mod types;

pub use error::{ErrorCode, WireError};
pub use event::{channels, HostEvent, StreamSignal};
pub use framing::{DataLineDecoder, Frame};
pub use mode::TransportMode;
pub use request::{DbOperation, Entity, GitCommand, HostRequest, RecordFilter};
pub use session::{
    AgentSessionInfo, AgentStatus, OutputStream, SpawnAgentRequest, SpawnTerminalRequest,
    TerminalSessionInfo, TerminalStatus,
};
pub use types::{
    AiProvider, ChatMessage, ChatParams, DirEntry, EntryKind, GitBranches, GitFileStatus,
    GitLogEntry, GitStatus, GithubRepo, GithubUser, MemoryFilter, MemoryStats, StreamEvent,
    StreamEventKind, User,
};
