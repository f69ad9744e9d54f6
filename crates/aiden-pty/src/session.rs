use crate::reader::{create_session_channels, spawn_reader_thread, ReaderThreadContext, SharedChild};
use crate::PtyError;
use portable_pty::{native_pty_system, MasterPty, PtySize};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Receivers subscribed before the reader thread starts, so no early output
/// is lost.
pub struct SessionStreams {
    pub output: broadcast::Receiver<Vec<u8>>,
    pub exit: broadcast::Receiver<Option<u32>>,
}

pub struct PtySession {
    pub id: String,
    pub child_pid: Option<u32>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: SharedChild,
    exit_tx: broadcast::Sender<Option<u32>>,
    // checked from the reader thread as well as async code
    stopped: Arc<AtomicBool>,
}

impl PtySession {
    pub fn spawn(
        session_id: &str,
        program: &str,
        args: &[&str],
        working_dir: &Path,
        env: Vec<(String, String)>,
        cols: u16,
        rows: u16,
    ) -> Result<(Self, SessionStreams), PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Pty(e.to_string()))?;

        let mut cmd = portable_pty::CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(working_dir);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Pty(e.to_string()))?;

        let channels = create_session_channels();
        let streams = SessionStreams {
            output: channels.output_tx.subscribe(),
            exit: channels.exit_tx.subscribe(),
        };

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Pty(e.to_string()))?;

        let child_pid = child.process_id();
        let child: SharedChild = Arc::new(std::sync::Mutex::new(child));

        spawn_reader_thread(ReaderThreadContext {
            reader,
            output_tx: channels.output_tx,
            exit_tx: channels.exit_tx.clone(),
            stopped: channels.stopped.clone(),
            child: child.clone(),
            session_id: session_id.to_string(),
        })?;

        tracing::info!(session_id, program, ?child_pid, "PTY session spawned");

        let session = Self {
            id: session_id.to_string(),
            child_pid,
            master: Arc::new(Mutex::new(pair.master)),
            writer: Arc::new(Mutex::new(writer)),
            child,
            exit_tx: channels.exit_tx,
            stopped: channels.stopped,
        };
        Ok((session, streams))
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        tracing::trace!(session_id = %self.id, len = data.len(), "writing to PTY");
        let mut writer = self.writer.lock().await;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        tracing::debug!(session_id = %self.id, cols, rows, "resizing PTY");
        let master = self.master.lock().await;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Pty(e.to_string()))
    }

    pub async fn kill(&self) -> Result<(), PtyError> {
        if self.is_stopped() {
            return Ok(());
        }

        tracing::info!(session_id = %self.id, "killing PTY session");
        {
            let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
            child.kill().map_err(|e| PtyError::Pty(e.to_string()))?;
        }

        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.exit_tx.send(None);
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
