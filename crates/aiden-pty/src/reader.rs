use portable_pty::Child;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) type SharedChild = Arc<std::sync::Mutex<Box<dyn Child + Send + Sync>>>;

/// Channels and shared state created for each PTY session.
pub(crate) struct SessionChannels {
    pub output_tx: broadcast::Sender<Vec<u8>>,
    pub exit_tx: broadcast::Sender<Option<u32>>,
    pub stopped: Arc<AtomicBool>,
}

pub(crate) fn create_session_channels() -> SessionChannels {
    let (output_tx, _) = broadcast::channel(4096);
    let (exit_tx, _) = broadcast::channel(4);
    SessionChannels {
        output_tx,
        exit_tx,
        stopped: Arc::new(AtomicBool::new(false)),
    }
}

/// Read errors are checked against `try_wait`; the exit code is collected
/// once the stream ends.
pub(crate) struct ReaderThreadContext {
    pub reader: Box<dyn Read + Send>,
    pub output_tx: broadcast::Sender<Vec<u8>>,
    pub exit_tx: broadcast::Sender<Option<u32>>,
    pub stopped: Arc<AtomicBool>,
    pub child: SharedChild,
    pub session_id: String,
}

pub(crate) fn spawn_reader_thread(ctx: ReaderThreadContext) -> std::io::Result<()> {
    let thread_name = format!("pty-reader-{}", ctx.session_id);
    std::thread::Builder::new().name(thread_name).spawn(move || {
        tracing::debug!(session_id = %ctx.session_id, "reader thread started");
        run_reader_loop(ctx);
    })?;
    Ok(())
}

fn run_reader_loop(ctx: ReaderThreadContext) {
    let ReaderThreadContext {
        mut reader,
        output_tx,
        exit_tx,
        stopped,
        child,
        session_id,
    } = ctx;

    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let _ = output_tx.send(buf[..n].to_vec());
            }
            Err(err) => {
                if err.kind() == std::io::ErrorKind::Interrupted
                    || err.kind() == std::io::ErrorKind::WouldBlock
                {
                    continue;
                }
                let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
                if !matches!(child.try_wait(), Ok(Some(_))) {
                    tracing::debug!(session_id = %session_id, error = %err, "reader error before child exit");
                }
                break;
            }
        }
    }

    stopped.store(true, Ordering::SeqCst);

    let exit_code = {
        let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
        child.wait().ok().map(|s| s.exit_code())
    };

    let _ = exit_tx.send(exit_code);
    tracing::debug!(session_id = %session_id, ?exit_code, "reader thread finished");
}
