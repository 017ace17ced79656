//! Foreground job loop shared by the job-starting commands.
//!
//! Starts the job, serves the control socket while it runs, prints progress
//! twice a second, and stops the job on Ctrl-C.

use anyhow::{bail, Result};
use dlpanel_core::{Engine, JobKind, JobRequest, JobState, JobStatus};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub(super) fn progress_line(kind: JobKind, s: &JobStatus) -> String {
    match kind {
        JobKind::Tool => format!("[{}] {}", s.state, s.message),
        _ => format!(
            "[{}] {:>3}%  {} / {}  {}  ETA {}  ({}/{})  {}",
            s.state,
            s.percent,
            s.bytes_done,
            s.bytes_total,
            s.rate,
            s.eta,
            s.completed_items,
            s.total_items,
            s.message
        ),
    }
}

/// Poll `kind` until its job has settled and print each changed progress line.
/// Ctrl-C stops the job. `Stopped` is not final: it is set at the start of a
/// stop (possibly a remote one on the control socket), and the class reaches
/// `Idle` only after the process group is gone and partial files are removed.
pub(in crate::cli) async fn follow_until_settled(engine: &Engine, kind: JobKind) -> JobStatus {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut last_line = String::new();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = engine.status(kind);
                let line = progress_line(kind, &status);
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
                match status.state {
                    JobState::Completed | JobState::Error | JobState::Idle => return status,
                    JobState::Running | JobState::Stopped => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                engine.stop(kind).await;
                return engine.status(kind);
            }
        }
    }
}

pub(super) async fn follow_job(engine: Arc<Engine>, kind: JobKind, request: JobRequest) -> Result<()> {
    let ack = engine.start(kind, request);
    if !ack.accepted {
        bail!(
            "job not started: {}",
            ack.reason.unwrap_or_else(|| "rejected".to_string())
        );
    }

    let listener = match dlpanel_core::control::default_control_socket_path() {
        Ok(path) => match control_socket::spawn_control_listener(Arc::clone(&engine), &path) {
            Ok(listener) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(listener)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("control socket path: {}", e);
            None
        }
    };

    let final_status = follow_until_settled(&engine, kind).await;

    if let Some(listener) = listener {
        listener.shutdown().await;
    }

    match final_status.state {
        JobState::Error => bail!("{}", final_status.message),
        JobState::Completed => {
            println!("{}", final_status.message);
            Ok(())
        }
        _ => {
            println!("Stopped.");
            Ok(())
        }
    }
}
