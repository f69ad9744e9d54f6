#![cfg(unix)]

use aiden_config::TerminalConfig;
use aiden_proto::{channels, HostEvent, SpawnTerminalRequest, TerminalStatus};
use aiden_pty::TerminalManager;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

fn manager() -> (TerminalManager, broadcast::Receiver<HostEvent>) {
    let (tx, rx) = broadcast::channel(1024);
    let config = TerminalConfig {
        shell: Some("/bin/sh".to_string()),
        ..TerminalConfig::default()
    };
    (TerminalManager::new(config, tx), rx)
}

fn request(id: &str, dir: &std::path::Path) -> SpawnTerminalRequest {
    SpawnTerminalRequest {
        id: Some(id.to_string()),
        cwd: Some(dir.to_path_buf()),
        cols: None,
        rows: None,
    }
}

/// Collect events until one on `channel` arrives.
async fn wait_for(
    rx: &mut broadcast::Receiver<HostEvent>,
    channel: &str,
) -> (Vec<HostEvent>, HostEvent) {
    let mut seen = Vec::new();
    let deadline = Duration::from_secs(10);
    loop {
        let event = timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for event")
            .unwrap();
        if event.channel == channel {
            return (seen, event);
        }
        seen.push(event);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawn_write_and_read_output() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut rx) = manager();

    let info = manager.spawn(request("t1", dir.path())).await;
    assert_eq!(info.status, TerminalStatus::Running);
    assert!(info.pid.is_some());

    let (_, started) = wait_for(&mut rx, channels::TERMINAL_STARTED).await;
    assert_eq!(started.payload["sessionId"], "t1");

    assert!(manager.write("t1", "echo aiden-$((40+2))\n").await);

    let mut output = String::new();
    while !output.contains("aiden-42") {
        let (_, event) = wait_for(&mut rx, channels::TERMINAL_OUTPUT).await;
        output.push_str(event.payload["data"].as_str().unwrap());
    }

    assert!(manager.kill("t1").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exit_closes_and_removes_session() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut rx) = manager();

    manager.spawn(request("t-exit", dir.path())).await;
    assert!(manager.write("t-exit", "exit 3\n").await);

    let (_, closed) = wait_for(&mut rx, channels::TERMINAL_CLOSED).await;
    assert_eq!(closed.payload["sessionId"], "t-exit");
    assert_eq!(closed.payload["exitCode"], 3);
    assert!(manager.get("t-exit").await.is_none());
    assert!(!manager.kill("t-exit").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_emits_closed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut rx) = manager();

    manager.spawn(request("t-kill", dir.path())).await;
    assert!(manager.kill("t-kill").await);
    assert!(!manager.kill("t-kill").await);

    wait_for(&mut rx, channels::TERMINAL_CLOSED).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Ok(event) = rx.try_recv() {
        assert_ne!(event.channel, channels::TERMINAL_CLOSED, "second closed event");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawn_with_running_id_returns_existing_session() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _rx) = manager();

    let first = manager.spawn(request("t-dup", dir.path())).await;
    let second = manager.spawn(request("t-dup", dir.path())).await;
    assert_eq!(first.pid, second.pid);
    assert_eq!(manager.list().await.len(), 1);

    manager.kill_all().await;
    assert!(manager.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resize_updates_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _rx) = manager();

    manager.spawn(request("t-size", dir.path())).await;
    assert!(manager.resize("t-size", 120, 40).await);
    let info = manager.get("t-size").await.unwrap();
    assert_eq!((info.cols, info.rows), (120, 40));
    assert!(!manager.resize("missing", 1, 1).await);

    manager.kill("t-size").await;
}
