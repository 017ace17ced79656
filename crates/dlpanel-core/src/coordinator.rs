//! Sequential execution of a job's transfer specs.
//!
//! Specs run strictly one after another, in order. The first failure ends the
//! job with `Error`; already-present files count as completed. Once the job's
//! cancellation token fires the worker writes nothing more, so the stop path
//! owns the status from then on.

use std::ops::ControlFlow;

use tokio_util::sync::CancellationToken;

use crate::executor::{ExitOutcome, Launch, ProcessSlot, TransferExecutor};
use crate::progress::{self, LineKind};
use crate::resolver::TransferSpec;
use crate::status::{JobState, StatusCell, StatusPatch};

pub const ALL_COMPLETED: &str = "All downloads completed successfully!";

/// Everything a worker needs from its job class.
pub struct WorkerContext<'a> {
    pub status: &'a StatusCell,
    pub process: &'a ProcessSlot,
    pub executor: &'a TransferExecutor,
    pub token: &'a CancellationToken,
}

impl<'a> WorkerContext<'a> {
    /// Apply `patch` unless the job has been cancelled. Check and write share one lock.
    pub(crate) fn publish(&self, patch: StatusPatch) -> bool {
        let token = self.token;
        self.status.apply_if(patch, |_| !token.is_cancelled())
    }
}

/// Overall job percent: completed specs plus the fraction of the one in flight.
pub fn overall_percent(completed: usize, item_percent: u32, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    let scaled = completed * 100 + item_percent.min(100) as usize;
    ((scaled / total) as u32).min(100)
}

fn all_present_message(total: usize) -> String {
    if total == 1 {
        "File already present; no network transfer occurred".to_string()
    } else {
        format!("All {total} files already present; no network transfer occurred")
    }
}

/// Run `specs` in order, attaching `auth_token` to specs that carry none.
pub async fn execute(
    ctx: &WorkerContext<'_>,
    specs: Vec<TransferSpec>,
    auth_token: Option<&str>,
) {
    let total = specs.len();
    let mut completed = 0usize;
    let mut existing = 0usize;

    for (i, spec) in specs.into_iter().enumerate() {
        if ctx.token.is_cancelled() {
            tracing::debug!("job cancelled before spec {}/{}", i + 1, total);
            return;
        }
        let index = i + 1;
        let spec = spec.with_auth_token(auth_token);
        let label = spec.label.as_str();
        let heading = format!("Downloading {label} ({index}/{total})...");
        ctx.publish(
            StatusPatch::default()
                .current(index, label)
                .message(heading.as_str())
                .percent(overall_percent(completed, 0, total)),
        );

        let mut last_percent = 0u32;
        let on_line = |line: &str| {
            match progress::classify(line) {
                LineKind::Progress(sample) => {
                    if sample.percent_in_range() && sample.percent >= last_percent {
                        last_percent = sample.percent;
                        ctx.publish(
                            StatusPatch::default()
                                .transfer(
                                    sample.bytes_done,
                                    sample.bytes_total,
                                    format!("{}/s", sample.rate),
                                    sample.eta,
                                )
                                .percent(overall_percent(completed, sample.percent, total))
                                .message(format!("{heading} {}%", sample.percent)),
                        );
                    } else {
                        tracing::debug!(label, percent = sample.percent, "skipping progress sample");
                    }
                }
                _ => {
                    ctx.publish(StatusPatch::default().message(line));
                }
            }
            ControlFlow::Continue(())
        };

        let report = ctx
            .executor
            .run(Launch::Transfer(&spec), ctx.process, ctx.token, on_line)
            .await;
        if ctx.token.is_cancelled() {
            tracing::debug!(label, "job cancelled during transfer");
            return;
        }

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(label, "could not run downloader: {}", e);
                ctx.publish(
                    StatusPatch::default()
                        .state(JobState::Error)
                        .message(format!("Error downloading {label} ({index}/{total}): {e}")),
                );
                return;
            }
        };

        if report.already_satisfied && spec.dest_path().exists() {
            completed += 1;
            existing += 1;
            tracing::info!(label, "already present, no transfer needed");
            ctx.publish(
                StatusPatch::default()
                    .completed(completed, existing)
                    .percent(overall_percent(completed, 0, total))
                    .message(format!("{label} already present ({index}/{total})")),
            );
            continue;
        }

        match report.outcome {
            ExitOutcome::Success => {
                completed += 1;
                tracing::info!(label, "transfer finished ({}/{})", index, total);
                ctx.publish(
                    StatusPatch::default()
                        .completed(completed, existing)
                        .percent(overall_percent(completed, 0, total))
                        .message(format!("Finished {label} ({index}/{total})")),
                );
            }
            ExitOutcome::Failure { code, stderr_tail } => {
                tracing::error!(label, code, stderr = ?stderr_tail, "transfer failed");
                let mut message =
                    format!("Error downloading {label} ({index}/{total}). Return code: {code}");
                if let Some(last) = stderr_tail.last() {
                    message.push_str(": ");
                    message.push_str(last);
                }
                ctx.publish(StatusPatch::default().state(JobState::Error).message(message));
                return;
            }
            ExitOutcome::Detached { pid } => {
                tracing::error!(label, pid, "downloader detached unexpectedly");
                ctx.publish(StatusPatch::default().state(JobState::Error).message(format!(
                    "Error downloading {label} ({index}/{total}): downloader did not finish"
                )));
                return;
            }
            ExitOutcome::Killed { signal } => {
                tracing::error!(label, ?signal, "downloader terminated by signal");
                let how = signal.map_or_else(|| "unknown signal".to_string(), |s| format!("signal {s}"));
                ctx.publish(StatusPatch::default().state(JobState::Error).message(format!(
                    "Download of {label} ({index}/{total}) was terminated by {how}"
                )));
                return;
            }
        }
    }

    let message = if total > 0 && existing == total {
        all_present_message(total)
    } else {
        ALL_COMPLETED.to_string()
    };
    ctx.publish(
        StatusPatch::default()
            .state(JobState::Completed)
            .percent(100)
            .completed(completed, existing)
            .message(message),
    );
}
