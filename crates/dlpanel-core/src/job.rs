//! One job class: its status record, its worker task and its live process.
//!
//! At most one job runs per class. `start` spawns a supervised worker task,
//! `status` serves snapshots (and detects workers that vanished), `stop`
//! cancels the worker, terminates the process group, removes partial files
//! and returns the class to `Idle`.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel;
use crate::config::PanelConfig;
use crate::coordinator::{self, WorkerContext};
use crate::executor::{ProcessSlot, TransferExecutor};
use crate::resolver::JobPlan;
use crate::status::{JobState, JobStatus, StatusCell, StatusPatch};
use crate::tool;

pub const STOPPED_MESSAGE: &str = "Download stopped by user";
pub const LOST_MESSAGE: &str = "Download process exited unexpectedly. Please try again.";

/// Independent job classes; each has its own status and at most one running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One ad-hoc download.
    Single,
    /// A batch of catalog items.
    Batch,
    /// A tool setup script.
    Tool,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Single, JobKind::Batch, JobKind::Tool];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Batch => "batch",
            JobKind::Tool => "tool",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(JobKind::Single),
            "batch" => Ok(JobKind::Batch),
            "tool" => Ok(JobKind::Tool),
            other => Err(format!("unknown job class: {other}")),
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StartAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Result of a stop request. A stop is always accepted; `was_running` says
/// whether there was anything to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopAck {
    pub accepted: bool,
    pub was_running: bool,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    stopping: bool,
}

impl WorkerSlot {
    fn alive(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

pub struct JobClass {
    kind: JobKind,
    status: StatusCell,
    process: ProcessSlot,
    worker: Mutex<WorkerSlot>,
    executor: TransferExecutor,
    stop_grace: Duration,
    settle: Duration,
}

impl JobClass {
    pub fn new(kind: JobKind, config: &PanelConfig) -> Self {
        Self {
            kind,
            status: StatusCell::new(config.output_tail_lines),
            process: ProcessSlot::default(),
            worker: Mutex::new(WorkerSlot::default()),
            executor: TransferExecutor::new(config),
            stop_grace: config.stop_grace(),
            settle: config.settle_delay(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    fn worker(&self) -> std::sync::MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// True while a worker task exists and has not finished.
    pub fn is_active(&self) -> bool {
        self.worker().alive()
    }

    /// Launch a worker for `plan`. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>, plan: JobPlan) -> StartAck {
        let mut worker = self.worker();
        if worker.stopping {
            return StartAck::rejected(format!("a stop of the {} job is in progress", self.kind));
        }
        if worker.alive() {
            return StartAck::rejected(format!("a {} job is already running", self.kind));
        }

        let (total, message) = match &plan {
            JobPlan::Transfers { specs, .. } => (specs.len(), "Starting downloads...".to_string()),
            JobPlan::InstallTool { tool, .. } => (1, format!("Installing {tool}...")),
        };
        self.status.begin(total, message);

        let token = CancellationToken::new();
        let this = Arc::clone(self);
        let worker_token = token.clone();
        let task = tokio::spawn(async move {
            this.run_worker(plan, worker_token).await;
        });
        worker.task = Some(task);
        worker.cancel = Some(token);
        tracing::info!(class = %self.kind, total, "job started");
        StartAck::accepted()
    }

    async fn run_worker(&self, plan: JobPlan, token: CancellationToken) {
        let ctx = WorkerContext {
            status: &self.status,
            process: &self.process,
            executor: &self.executor,
            token: &token,
        };
        match plan {
            JobPlan::Transfers { specs, auth_token } => {
                coordinator::execute(&ctx, specs, auth_token.as_deref()).await
            }
            JobPlan::InstallTool { tool, script } => tool::run_install(&ctx, &tool, &script).await,
        }
    }

    /// Current status. A `Running` status whose worker is gone is corrected
    /// to `Error` before being returned.
    pub fn status(&self) -> JobStatus {
        let snapshot = self.status.read();
        if snapshot.state != JobState::Running {
            return snapshot;
        }
        let lost = {
            let worker = self.worker();
            !worker.stopping && !worker.alive()
        };
        if lost {
            let corrected = self.status.apply_if(
                StatusPatch::default()
                    .state(JobState::Error)
                    .message(LOST_MESSAGE),
                |s| s.state == JobState::Running,
            );
            if corrected {
                tracing::warn!(class = %self.kind, "worker vanished while running");
            }
            return self.status.read();
        }
        snapshot
    }

    /// Stop the running job, if any, and return the class to `Idle`.
    ///
    /// Order: mark Stopped and cancel the worker, terminate the process group
    /// (SIGTERM, grace, SIGKILL), delete partial files, join the worker, wait
    /// the settle delay, reset to Idle. With nothing running, a settled
    /// terminal status is reset and an Idle one is left untouched.
    pub async fn stop(&self) -> StopAck {
        let (task, token) = {
            let mut worker = self.worker();
            if worker.stopping {
                return StopAck {
                    accepted: true,
                    was_running: true,
                };
            }
            if !worker.alive() {
                worker.task = None;
                worker.cancel = None;
                drop(worker);
                if self.status.read().state.is_terminal() {
                    self.status.reset();
                }
                return StopAck {
                    accepted: true,
                    was_running: false,
                };
            }
            worker.stopping = true;
            (worker.task.take(), worker.cancel.take())
        };

        tracing::info!(class = %self.kind, "stopping job");
        if let Some(token) = &token {
            token.cancel();
        }
        self.status.apply(
            StatusPatch::default()
                .state(JobState::Stopped)
                .message(STOPPED_MESSAGE),
        );

        if let Some(handle) = self.process.take() {
            let outcome = cancel::terminate_group(handle.pgid, self.stop_grace).await;
            tracing::info!(class = %self.kind, pid = handle.pid, ?outcome, "process group terminated");
            cancel::remove_artifacts(&handle.cleanup);
        }

        if let Some(mut task) = task {
            match tokio::time::timeout(self.stop_grace, &mut task).await {
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!(class = %self.kind, "worker panicked: {}", e)
                }
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(class = %self.kind, "worker did not exit, aborting");
                    task.abort();
                }
            }
        }

        tokio::time::sleep(self.settle).await;
        self.status.reset();
        self.worker().stopping = false;
        tracing::info!(class = %self.kind, "job stopped");
        StopAck {
            accepted: true,
            was_running: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips_through_str() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert_eq!(" Batch ".parse::<JobKind>().unwrap(), JobKind::Batch);
        assert!("hf".parse::<JobKind>().is_err());
    }

    #[tokio::test]
    async fn idle_stop_is_a_no_op() {
        let class = JobClass::new(JobKind::Single, &PanelConfig::default());
        let ack = class.stop().await;
        assert!(ack.accepted);
        assert!(!ack.was_running);
        assert_eq!(class.status().state, JobState::Idle);
    }

    #[tokio::test]
    async fn running_status_without_worker_becomes_error() {
        let class = JobClass::new(JobKind::Batch, &PanelConfig::default());
        class.status.begin(2, "Starting downloads...");
        let status = class.status();
        assert_eq!(status.state, JobState::Error);
        assert_eq!(status.message, LOST_MESSAGE);
    }

    #[tokio::test]
    async fn finished_worker_does_not_block_a_new_start() {
        let class = Arc::new(JobClass::new(JobKind::Batch, &PanelConfig::default()));
        let plan = JobPlan::Transfers {
            specs: vec![],
            auth_token: None,
        };
        assert!(class.start(plan.clone()).accepted);
        for _ in 0..100 {
            if !class.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(class.status().state, JobState::Completed);
        assert!(class.start(plan).accepted);
    }
}
