//! Control socket server/client round trip.

use crate::cli::commands::follow::follow_until_settled;
use crate::cli::control_socket::{send_command, spawn_control_listener};
use dlpanel_core::catalog::StaticCatalog;
use dlpanel_core::config::PanelConfig;
use dlpanel_core::control::ControlCommand;
use dlpanel_core::{Engine, JobKind, JobRequest, JobState};
use std::sync::Arc;
use std::time::Duration;

/// Downloader stand-in that leaves partial files behind and takes its time
/// to exit on SIGTERM.
const SLOW_TO_DIE: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -d) dir="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'partial' > "$dir/$out"
printf 'resume' > "$dir/$out.aria2"
trap 'sleep 1.5; exit 1' TERM
printf '[#a1b2c3 1.0MiB/10MiB(10%%) CN:1 DL:1.0MiB ETA:9s]\n'
sleep 30 &
wait
"#;

#[tokio::test]
async fn status_and_stop_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let engine = Arc::new(Engine::with_catalog(
        PanelConfig::default(),
        Arc::new(StaticCatalog::default()),
    ));
    let handle = spawn_control_listener(engine, &path).unwrap();

    let status = send_command(&path, ControlCommand::Status(JobKind::Batch))
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["state"], "idle");

    let stop = send_command(&path, ControlCommand::Stop(JobKind::Single))
        .await
        .unwrap();
    let stop: serde_json::Value = serde_json::from_str(&stop).unwrap();
    assert_eq!(stop["accepted"], true);

    handle.shutdown().await;
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_stop_completes_before_foreground_returns() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("slow-aria2c.sh");
    std::fs::write(&script, SLOW_TO_DIE).unwrap();
    let mut config = PanelConfig::default();
    config.models_root = dir.path().join("models");
    config.default_destination = config.models_root.clone();
    config.downloader.program = "sh".to_string();
    config.downloader.base_args = vec![script.display().to_string()];
    config.stop_grace_ms = 3_000;
    config.settle_ms = 1_000;
    let dest = config.models_root.join("loras").join("remote.bin");
    let engine = Arc::new(Engine::with_catalog(config, Arc::new(StaticCatalog::default())));

    let socket = dir.path().join("control.sock");
    let listener = spawn_control_listener(Arc::clone(&engine), &socket).unwrap();
    let ack = engine.start(
        JobKind::Single,
        JobRequest::Single {
            locator: "https://models.example.test/remote.bin".into(),
            category: "lora".into(),
            filename: None,
            auth_token: None,
            destination_override: None,
        },
    );
    assert!(ack.accepted, "{:?}", ack.reason);
    for _ in 0..500 {
        if engine.status(JobKind::Single).percent > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.status(JobKind::Single).percent, 10);

    let client = {
        let socket = socket.clone();
        tokio::spawn(async move { send_command(&socket, ControlCommand::Stop(JobKind::Single)).await })
    };
    let settled = follow_until_settled(&engine, JobKind::Single).await;
    listener.shutdown().await;

    assert_eq!(settled.state, JobState::Idle);
    assert!(!dest.exists(), "partial file left behind");
    assert!(!dest.with_extension("bin.aria2").exists(), "control file left behind");
    let reply: serde_json::Value = serde_json::from_str(&client.await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["accepted"], true);
    assert_eq!(reply["was_running"], true);
    assert!(!socket.exists());
}
