//! Runs one external process per transfer (or setup script) and streams its output.
//!
//! The child is spawned as the leader of a new process group. Its handle is
//! registered in the job class's [`ProcessSlot`] for as long as it runs so a
//! stop request can signal the whole group.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cancel::{self, GroupSignal};
use crate::config::{DownloaderConfig, PanelConfig, TokenInjection};
use crate::error::SpawnError;
use crate::progress;
use crate::resolver::TransferSpec;

/// Live external process of a job class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub pgid: i32,
    /// Files to delete if the process is stopped before finishing.
    pub cleanup: Vec<PathBuf>,
}

/// Holds the handle of the process currently running for a job class.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    inner: Mutex<Option<ProcessHandle>>,
}

impl ProcessSlot {
    /// Record `handle` unless `token` is already cancelled. The check and the
    /// store happen under the slot lock, so a stop either sees the handle or
    /// the executor sees the cancellation.
    fn register<'a>(
        &'a self,
        handle: ProcessHandle,
        token: &CancellationToken,
    ) -> Option<Registration<'a>> {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if token.is_cancelled() {
            return None;
        }
        let pid = handle.pid;
        *slot = Some(handle);
        Some(Registration { slot: self, pid })
    }

    /// Remove and return the live handle, if any.
    pub fn take(&self) -> Option<ProcessHandle> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    #[cfg(test)]
    fn current(&self) -> Option<ProcessHandle> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn clear(&self, pid: u32) {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|h| h.pid == pid) {
            *slot = None;
        }
    }
}

/// Clears the slot entry when the process has been waited on.
struct Registration<'a> {
    slot: &'a ProcessSlot,
    pid: u32,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.slot.clear(self.pid);
    }
}

/// What to run.
#[derive(Debug, Clone, Copy)]
pub enum Launch<'a> {
    Transfer(&'a TransferSpec),
    /// An executable setup script, run with no arguments.
    Script(&'a Path),
}

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure { code: i32, stderr_tail: Vec<String> },
    /// Terminated by a signal (or no exit code was available).
    Killed { signal: Option<i32> },
    /// The line callback asked to let the process keep running on its own.
    Detached { pid: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub outcome: ExitOutcome,
    /// An already-satisfied phrase appeared on stdout or stderr.
    pub already_satisfied: bool,
}

/// Builds downloader argument vectors from transfer specs.
#[derive(Debug, Clone)]
pub struct DownloaderCommand {
    config: DownloaderConfig,
}

impl DownloaderCommand {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Arguments for `spec`: base args, destination, extra options, auth, locator.
    pub fn args(&self, spec: &TransferSpec) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        args.push("-d".to_string());
        args.push(spec.dest_dir.display().to_string());
        args.push("-o".to_string());
        args.push(spec.filename.clone());
        args.extend(spec.extra_options.iter().cloned());
        if let (Some(token), TokenInjection::Header) = (&spec.auth_token, &self.config.token) {
            args.push(format!("--header=Authorization: Bearer {token}"));
        }
        args.push(spec.effective_locator(&self.config.token).to_string());
        args
    }

    /// Same as [`args`](Self::args) with the token masked, for logging.
    pub fn redacted_args(&self, spec: &TransferSpec) -> Vec<String> {
        let args = self.args(spec);
        match &spec.auth_token {
            Some(token) if !token.is_empty() => args
                .into_iter()
                .map(|a| a.replace(token.as_str(), "***"))
                .collect(),
            _ => args,
        }
    }

    /// Files to remove when a transfer of `spec` is stopped. A destination
    /// that is already complete (present with no control file) is kept.
    pub fn artifacts(&self, spec: &TransferSpec) -> Vec<PathBuf> {
        let dest = spec.dest_path();
        let control = spec.control_path(&self.config.control_suffix);
        if dest.exists() && !control.exists() {
            vec![control]
        } else {
            vec![dest, control]
        }
    }
}

/// Spawns and supervises external processes for one job class.
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    command: DownloaderCommand,
    stderr_tail_lines: usize,
}

impl TransferExecutor {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            command: DownloaderCommand::new(config.downloader.clone()),
            stderr_tail_lines: config.stderr_tail_lines.max(1),
        }
    }

    pub fn command(&self) -> &DownloaderCommand {
        &self.command
    }

    /// Run to completion, passing every stdout line (split on `\n` and `\r`) to `on_line`.
    ///
    /// If `token` is cancelled before the handle is registered, the new group
    /// is killed straight away and the report says `Killed`. When `on_line`
    /// breaks, the process is left running: its output is drained in the
    /// background, it is no longer stoppable through `slot`, and the report
    /// says `Detached`.
    pub async fn run<F>(
        &self,
        launch: Launch<'_>,
        slot: &ProcessSlot,
        token: &CancellationToken,
        mut on_line: F,
    ) -> Result<ExitReport, SpawnError>
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let (program, args, cleanup) = match launch {
            Launch::Transfer(spec) => {
                tokio::fs::create_dir_all(&spec.dest_dir)
                    .await
                    .map_err(|source| SpawnError::CreateDir {
                        path: spec.dest_dir.clone(),
                        source,
                    })?;
                tracing::info!(
                    program = self.command.program(),
                    args = ?self.command.redacted_args(spec),
                    "starting transfer"
                );
                (
                    self.command.program().to_string(),
                    self.command.args(spec),
                    self.command.artifacts(spec),
                )
            }
            Launch::Script(path) => {
                tracing::info!(script = %path.display(), "starting setup script");
                (path.display().to_string(), Vec::new(), Vec::new())
            }
        };

        // A setup script may leave a server behind; that must outlive us.
        let detachable = matches!(launch, Launch::Script(_));
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(!detachable);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        let handle = ProcessHandle {
            pid,
            pgid: pid as i32,
            cleanup,
        };
        let registration = slot.register(handle, token);
        if registration.is_none() {
            tracing::debug!(pid, "stop requested during spawn, killing new process group");
            cancel::signal_group(pid as i32, GroupSignal::Kill);
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            let cap = self.stderr_tail_lines;
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(cap);
                let mut satisfied = false;
                let mut reader = BufReader::new(stderr);
                let read = for_each_line(&mut reader, |line| {
                    satisfied |= progress::is_already_satisfied(line);
                    if tail.len() == cap {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                    ControlFlow::Continue(())
                })
                .await;
                if let Err(e) = read {
                    tracing::debug!("stderr read ended: {}", e);
                }
                (Vec::from(tail), satisfied)
            })
        });

        let mut satisfied = false;
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let read = for_each_line(&mut reader, |line| {
                satisfied |= progress::is_already_satisfied(line);
                on_line(line)
            })
            .await;
            match read {
                Ok(ControlFlow::Break(())) if detachable => {
                    drop(registration);
                    tracing::info!(pid, "leaving process running");
                    tokio::spawn(async move {
                        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                        match child.wait().await {
                            Ok(status) => tracing::info!(pid, %status, "detached process exited"),
                            Err(e) => tracing::debug!(pid, "detached process wait: {}", e),
                        }
                    });
                    return Ok(ExitReport {
                        outcome: ExitOutcome::Detached { pid },
                        already_satisfied: satisfied,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("stdout read ended: {}", e),
            }
        }

        let status = child.wait().await.map_err(|source| SpawnError::Wait {
            program: program.clone(),
            source,
        })?;
        drop(registration);
        let (stderr_tail, stderr_satisfied) = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => (Vec::new(), false),
        };

        let outcome = match status.code() {
            Some(0) => ExitOutcome::Success,
            Some(code) => ExitOutcome::Failure { code, stderr_tail },
            None => ExitOutcome::Killed {
                signal: exit_signal(&status),
            },
        };
        tracing::info!(pid, ?outcome, "process exited");
        Ok(ExitReport {
            outcome,
            already_satisfied: satisfied || stderr_satisfied,
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Feed each non-empty trimmed line of `reader` to `f` until `f` breaks or
/// the stream ends. Both `\n` and `\r` end a line, so carriage-return
/// progress redraws arrive one at a time. Bytes after a break are consumed
/// up to the line end only.
async fn for_each_line<R, F>(reader: &mut R, mut f: F) -> std::io::Result<ControlFlow<()>>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str) -> ControlFlow<()>,
{
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let mut used = 0;
        let mut flow = ControlFlow::Continue(());
        for &b in chunk {
            used += 1;
            if b == b'\n' || b == b'\r' {
                flow = emit_line(&mut pending, &mut f);
                if flow.is_break() {
                    break;
                }
            } else {
                pending.push(b);
            }
        }
        reader.consume(used);
        if flow.is_break() {
            return Ok(flow);
        }
    }
    Ok(emit_line(&mut pending, &mut f))
}

fn emit_line<F>(pending: &mut Vec<u8>, f: &mut F) -> ControlFlow<()>
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    if pending.is_empty() {
        return ControlFlow::Continue(());
    }
    let line = String::from_utf8_lossy(pending);
    let line = line.trim();
    let flow = if line.is_empty() {
        ControlFlow::Continue(())
    } else {
        f(line)
    };
    pending.clear();
    flow
}
