//! Tool installation jobs: run a setup script and mirror its output.
//!
//! A script that ends by starting the tool's web server never exits. Once it
//! prints a server-ready marker the install counts as done and the server is
//! left running.

use std::ops::ControlFlow;
use std::path::Path;

use crate::coordinator::WorkerContext;
use crate::executor::{ExitOutcome, Launch};
use crate::progress::{self, LineKind};
use crate::status::{JobState, StatusPatch};

pub async fn run_install(ctx: &WorkerContext<'_>, tool: &str, script: &Path) {
    ctx.publish(
        StatusPatch::default()
            .current(1, tool)
            .message(format!("Installing {tool}...")),
    );

    let report = ctx
        .executor
        .run(Launch::Script(script), ctx.process, ctx.token, |line| {
            ctx.publish(StatusPatch::default().output_line(line).message(line));
            match progress::classify(line) {
                LineKind::ServerReady => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
        .await;
    if ctx.token.is_cancelled() {
        tracing::debug!(tool, "install cancelled");
        return;
    }

    let patch = match report {
        Ok(report) => match report.outcome {
            ExitOutcome::Success => {
                tracing::info!(tool, "installed");
                StatusPatch::default()
                    .state(JobState::Completed)
                    .percent(100)
                    .completed(1, 0)
                    .message(format!("{tool} installed successfully"))
            }
            ExitOutcome::Detached { pid } => {
                tracing::info!(tool, pid, "installed, server left running");
                StatusPatch::default()
                    .state(JobState::Completed)
                    .percent(100)
                    .completed(1, 0)
                    .message(format!("{tool} installed and server started successfully"))
            }
            ExitOutcome::Failure { code, stderr_tail } => {
                tracing::error!(tool, code, stderr = ?stderr_tail, "setup script failed");
                // stderr is not streamed; keep the tail visible next to stdout.
                for line in stderr_tail {
                    ctx.publish(StatusPatch::default().output_line(line));
                }
                StatusPatch::default()
                    .state(JobState::Error)
                    .message(format!("Installation failed with return code {code}"))
            }
            ExitOutcome::Killed { signal } => {
                tracing::error!(tool, ?signal, "setup script terminated by signal");
                StatusPatch::default()
                    .state(JobState::Error)
                    .message("Installation was terminated before finishing")
            }
        },
        Err(e) => {
            tracing::error!(tool, "could not run setup script: {}", e);
            StatusPatch::default()
                .state(JobState::Error)
                .message(format!("Installation failed: {e}"))
        }
    };
    ctx.publish(patch);
}
