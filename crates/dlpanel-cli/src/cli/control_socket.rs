//! Control socket: server (while a job runs in the foreground) and client
//! (for `dlpanel stop` / `dlpanel status`).
//! Protocol: one command line in, one JSON line out. See `dlpanel_core::control`.

use anyhow::{Context, Result};
use dlpanel_core::control::{self, ControlCommand};
use dlpanel_core::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

/// A running control socket server. Dropping it closes the socket without
/// waiting; [`shutdown`](Self::shutdown) waits for in-flight commands.
pub struct ControlListener {
    path: PathBuf,
    closing: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ControlListener {
    /// Stop accepting connections, let commands already being handled (a
    /// `stop` in particular) finish and send their reply, then remove the
    /// socket file. Idle connections are closed.
    pub async fn shutdown(self) {
        let _ = self.closing.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("control socket task failed: {}", e);
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Binds `path` and spawns a task that answers each command line against `engine`.
/// A stale socket file from an earlier run is replaced.
pub fn spawn_control_listener(engine: Arc<Engine>, path: impl AsRef<Path>) -> Result<ControlListener> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let (closing, mut closed) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        connections.spawn(serve_connection(Arc::clone(&engine), stream, closed.clone()));
                    }
                    Err(e) => tracing::debug!("control socket accept: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = closed.changed() => break,
            }
        }
        drop(listener);
        while let Some(res) = connections.join_next().await {
            if let Err(e) = res {
                tracing::debug!("control connection task: {}", e);
            }
        }
    });
    Ok(ControlListener {
        path,
        closing,
        task,
    })
}

async fn serve_connection(engine: Arc<Engine>, stream: UnixStream, mut closed: watch::Receiver<bool>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        // Only the wait for the next line is interruptible; a command in
        // progress always runs to its reply.
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
            _ = closed.changed() => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let mut reply = control::handle_line(&engine, &line).await;
        reply.push('\n');
        if let Err(e) = write.write_all(reply.as_bytes()).await {
            tracing::debug!("control socket write: {}", e);
            break;
        }
    }
}

/// Sends one command and returns the JSON reply line.
pub async fn send_command(socket_path: &Path, command: ControlCommand) -> Result<String> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(command.to_line().as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    Ok(reply)
}
