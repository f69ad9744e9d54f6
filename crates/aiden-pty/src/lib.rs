pub mod manager;
mod reader;
pub mod session;
mod utf8;

pub use manager::TerminalManager;
pub use session::{PtySession, SessionStreams};

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("PTY unavailable: {0}")]
    Unavailable(String),
    #[error("PTY error: {0}")]
    Pty(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open and immediately drop a tiny PTY to learn whether this host can
/// provide one at all.
pub fn probe() -> Result<(), PtyError> {
    portable_pty::native_pty_system()
        .openpty(portable_pty::PtySize {
            rows: 1,
            cols: 1,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map(|_| ())
        .map_err(|e| PtyError::Unavailable(e.to_string()))
}
