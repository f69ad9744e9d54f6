use super::AgentManager;
use crate::events;
use crate::progress::progress_from_line;
use aiden_proto::{channels, AgentStatus, OutputStream};
use aiden_store::AgentSessionPatch;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a cancelled process gets between SIGTERM and SIGKILL.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

impl AgentManager {
    /// One task per process; it is the only writer of the exit path.
    pub(super) fn spawn_supervisor(&self, id: Uuid, mut child: Child, cancel: CancellationToken) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut pumps = Vec::new();
            if let Some(stdout) = child.stdout.take() {
                pumps.push(tokio::spawn(manager.clone().pump(id, stdout, OutputStream::Stdout)));
            }
            if let Some(stderr) = child.stderr.take() {
                pumps.push(tokio::spawn(manager.clone().pump(id, stderr, OutputStream::Stderr)));
            }

            let exit = tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel.cancelled() => None,
            };
            let Some(status) = exit else {
                // grandchildren may hold the pipes open; nothing is reported
                // for a cancelled session anyway
                for pump in &pumps {
                    pump.abort();
                }
                reap_cancelled(id, &mut child).await;
                return;
            };

            // all output lands before the terminal event
            for pump in pumps {
                let _ = pump.await;
            }
            manager.finish(id, status).await;
        });
    }

    async fn pump<R>(self, id: Uuid, reader: R, stream: OutputStream)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line).into_owned();
                    self.append_output(id, stream, text).await;
                }
                Err(e) => {
                    tracing::debug!(session_id = %id, ?stream, error = %e, "agent output stream closed");
                    break;
                }
            }
        }
    }

    async fn append_output(&self, id: Uuid, stream: OutputStream, text: String) {
        let progress = match stream {
            OutputStream::Stdout => progress_from_line(&text),
            OutputStream::Stderr => None,
        };

        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return;
        };
        if entry.info.status.is_terminal() {
            return;
        }

        self.emit(events::output(&entry.info, stream, &text));
        entry.log.push(text);

        if let Some(progress) = progress {
            // progress never goes backwards
            if progress > entry.info.progress {
                entry.info.progress = progress;
                self.persist(
                    &entry.info,
                    AgentSessionPatch {
                        progress: Some(progress),
                        ..Default::default()
                    },
                );
            }
        }
    }

    async fn finish(&self, id: Uuid, status: std::io::Result<ExitStatus>) {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return;
        };
        if entry.info.status.is_terminal() {
            return;
        }

        let (next, error) = match status {
            Ok(s) if s.success() => (AgentStatus::Completed, None),
            Ok(s) => (
                AgentStatus::Failed,
                Some(match s.code() {
                    Some(code) => format!("Process exited with code {code}"),
                    None => "Process terminated by signal".to_string(),
                }),
            ),
            Err(e) => (
                AgentStatus::Failed,
                Some(format!("Failed to wait for agent process: {e}")),
            ),
        };

        entry.info.status = next;
        entry.info.progress = 100;
        entry.info.error = error.clone();
        entry.finished_at = Some(Instant::now());

        self.persist(
            &entry.info,
            AgentSessionPatch {
                status: Some(next),
                progress: Some(100),
                error,
                completed_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        );
        let channel = if next == AgentStatus::Completed {
            channels::AGENT_COMPLETED
        } else {
            channels::AGENT_FAILED
        };
        self.emit(events::lifecycle(channel, &entry.info));
        tracing::info!(session_id = %id, status = %next, error = ?entry.info.error, "agent session finished");
    }
}

async fn reap_cancelled(id: Uuid, child: &mut Child) {
    if !cfg!(unix) {
        let _ = child.start_kill();
    }
    if tokio::time::timeout(CANCEL_GRACE, child.wait()).await.is_err() {
        tracing::warn!(session_id = %id, "agent ignored SIGTERM, killing");
        if let Err(e) = child.kill().await {
            tracing::warn!(session_id = %id, error = %e, "failed to kill agent process");
        }
    }
}
