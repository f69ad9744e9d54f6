//! Shared helpers used by the `aidend` binary.

use aiden_config::AppConfig;
use aiden_host::Host;
use aiden_proto::{ChatMessage, ChatParams, StreamEventKind, StreamSignal, TransportMode};
use aiden_store::Store;
use aiden_transport::{Ai, StreamHandlers, Streaming, SwitchConfig, Transport};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Build-time version string; `AIDEN_VERSION` overrides the crate version.
pub const DAEMON_VERSION: &str = match option_env!("AIDEN_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

// ---------------------------------------------------------------------------
// PID file management
// ---------------------------------------------------------------------------

/// Reads the host PID from `path`, returning `None` if missing or invalid.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn write_pid_file(path: &Path) -> anyhow::Result<()> {
    fs::write(path, std::process::id().to_string())?;
    Ok(())
}

pub fn remove_pid_file(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Returns `true` when a process with `pid` appears to be alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // Safety: signal 0 only checks that the process exists.
        unsafe { libc::kill(raw, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

// ---------------------------------------------------------------------------
// Transport wiring
// ---------------------------------------------------------------------------

/// Switch settings for `mode`. Bridge modes get an in-process host opened on
/// the configured database; the host is returned so the caller keeps it alive.
pub fn switch_config(
    config: &AppConfig,
    mode: TransportMode,
) -> anyhow::Result<(SwitchConfig, Option<Host>)> {
    let mut switch = SwitchConfig {
        default_mode: mode,
        bridge: None,
        server_url: Some(config.server_url.clone()),
        auth_token: config.resolve_auth_token(),
    };
    if !mode.uses_host_bridge() {
        return Ok((switch, None));
    }

    let store = Arc::new(Store::open(&config.database_path()?)?);
    let host = Host::new(config, store);
    let (bridge, _task) = host.bridge();
    switch.bridge = Some(bridge);
    Ok((switch, Some(host)))
}

/// Stream one chat turn, handing each text delta to `on_text` as it
/// arrives. Returns the full reply.
pub async fn chat_once<T>(
    transport: &T,
    prompt: &str,
    mut on_text: impl FnMut(&str),
) -> anyhow::Result<String>
where
    T: Transport + ?Sized,
{
    let params = ChatParams {
        messages: vec![ChatMessage::user(prompt)],
        ..Default::default()
    };
    let stream_id = transport.stream_chat(params).await?;
    tracing::debug!(stream_id = %stream_id, mode = %transport.mode(), "chat started");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (done_tx, error_tx) = (tx.clone(), tx.clone());
    let _subscription = transport.subscribe_stream(
        &stream_id,
        StreamHandlers::new()
            .on_data(move |event| {
                let _ = tx.send(StreamSignal::Data {
                    event: event.clone(),
                });
            })
            .on_done(move || {
                let _ = done_tx.send(StreamSignal::Done);
            })
            .on_error(move |message| {
                let _ = error_tx.send(StreamSignal::Error {
                    message: message.to_string(),
                });
            }),
    );

    let mut reply = String::new();
    while let Some(signal) = rx.recv().await {
        match signal {
            StreamSignal::Data { event } => {
                if event.kind != StreamEventKind::Text {
                    continue;
                }
                if let Some(text) = event.content.as_deref() {
                    on_text(text);
                    reply.push_str(text);
                }
            }
            StreamSignal::Done => return Ok(reply),
            StreamSignal::Error { message } => anyhow::bail!("Chat failed: {message}"),
        }
    }
    anyhow::bail!("Chat stream {stream_id} ended without a result")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use aiden_config::ConfigPaths;

    // -- PID file management -----------------------------------------------

    #[test]
    fn read_pid_file_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        fs::write(&path, "12345\n").unwrap();
        assert_eq!(read_pid_file(&path), Some(12345));
    }

    #[test]
    fn read_pid_file_missing_or_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_pid_file(&dir.path().join("missing.pid")), None);
        let path = dir.path().join("garbage.pid");
        fs::write(&path, "not-a-number").unwrap();
        assert_eq!(read_pid_file(&path), None);
    }

    #[test]
    fn write_then_remove_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aidend.pid");
        write_pid_file(&path).unwrap();
        assert_eq!(read_pid_file(&path), Some(std::process::id()));
        remove_pid_file(&path);
        assert!(!path.exists());
        // removing twice is fine
        remove_pid_file(&path);
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    // -- transport wiring --------------------------------------------------

    #[test]
    fn remote_mode_needs_no_host() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.set_paths(ConfigPaths::with_base(dir.path().to_path_buf()));
        config.server_url = "http://10.0.0.5:3000".to_string();
        config.auth_token = Some("tok".to_string());

        let (switch, host) = switch_config(&config, TransportMode::Remote).unwrap();
        assert!(host.is_none());
        assert!(switch.bridge.is_none());
        assert_eq!(switch.default_mode, TransportMode::Remote);
        assert_eq!(switch.server_url.as_deref(), Some("http://10.0.0.5:3000"));
        assert_eq!(switch.auth_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn local_mode_opens_a_host_on_the_configured_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.set_paths(ConfigPaths::with_base(dir.path().to_path_buf()));
        config.terminal.enabled = false;

        let (switch, host) = switch_config(&config, TransportMode::Hybrid).unwrap();
        assert!(host.is_some());
        assert!(switch.bridge.is_some());
        assert!(dir.path().join("aiden.db").exists());
    }
}
