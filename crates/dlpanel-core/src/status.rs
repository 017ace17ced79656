//! Per-job-class status record.
//!
//! One [`StatusCell`] exists per job class for the life of the engine. The
//! class's active worker is the only writer while a job runs; pollers take
//! cloned snapshots with [`StatusCell::read`].

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::Serialize;

use crate::progress::UNKNOWN_ETA;

/// Byte counters before any readout arrives.
pub const ZERO_BYTES: &str = "0B";
/// Rate before any readout arrives.
pub const ZERO_RATE: &str = "0B/s";

/// Lifecycle state of a job class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Stopped,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Error | JobState::Stopped
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot served to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub message: String,
    pub bytes_done: String,
    pub bytes_total: String,
    /// Overall progress of the job, 0..=100.
    pub percent: u32,
    pub rate: String,
    pub eta: String,
    /// 1-based index of the spec in flight (0 before the first starts).
    pub current_index: usize,
    pub total_items: usize,
    pub completed_items: usize,
    /// Items that were already present and needed no transfer.
    pub existing_item_count: usize,
    pub current_item: String,
    /// Tail of raw process output (tool installs only).
    pub output: Vec<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            message: String::new(),
            bytes_done: ZERO_BYTES.to_string(),
            bytes_total: ZERO_BYTES.to_string(),
            percent: 0,
            rate: ZERO_RATE.to_string(),
            eta: UNKNOWN_ETA.to_string(),
            current_index: 0,
            total_items: 0,
            completed_items: 0,
            existing_item_count: 0,
            current_item: String::new(),
            output: Vec::new(),
        }
    }
}

/// A set of field updates applied in one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub state: Option<JobState>,
    pub message: Option<String>,
    pub bytes_done: Option<String>,
    pub bytes_total: Option<String>,
    pub percent: Option<u32>,
    pub rate: Option<String>,
    pub eta: Option<String>,
    pub current_index: Option<usize>,
    pub completed_items: Option<usize>,
    pub existing_item_count: Option<usize>,
    pub current_item: Option<String>,
    pub output_line: Option<String>,
}

impl StatusPatch {
    pub fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn percent(mut self, percent: u32) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn transfer(
        mut self,
        bytes_done: impl Into<String>,
        bytes_total: impl Into<String>,
        rate: impl Into<String>,
        eta: impl Into<String>,
    ) -> Self {
        self.bytes_done = Some(bytes_done.into());
        self.bytes_total = Some(bytes_total.into());
        self.rate = Some(rate.into());
        self.eta = Some(eta.into());
        self
    }

    pub fn current(mut self, index: usize, item: impl Into<String>) -> Self {
        self.current_index = Some(index);
        self.current_item = Some(item.into());
        self
    }

    pub fn completed(mut self, completed_items: usize, existing_item_count: usize) -> Self {
        self.completed_items = Some(completed_items);
        self.existing_item_count = Some(existing_item_count);
        self
    }

    pub fn output_line(mut self, line: impl Into<String>) -> Self {
        self.output_line = Some(line.into());
        self
    }

    fn apply_to(self, status: &mut JobStatus, output_cap: usize) {
        if let Some(v) = self.state {
            status.state = v;
        }
        if let Some(v) = self.message {
            status.message = v;
        }
        if let Some(v) = self.bytes_done {
            status.bytes_done = v;
        }
        if let Some(v) = self.bytes_total {
            status.bytes_total = v;
        }
        if let Some(v) = self.percent {
            status.percent = v.min(100);
        }
        if let Some(v) = self.rate {
            status.rate = v;
        }
        if let Some(v) = self.eta {
            status.eta = v;
        }
        if let Some(v) = self.current_index {
            status.current_index = v;
        }
        if let Some(v) = self.completed_items {
            status.completed_items = v;
        }
        if let Some(v) = self.existing_item_count {
            status.existing_item_count = v;
        }
        if let Some(v) = self.current_item {
            status.current_item = v;
        }
        if let Some(line) = self.output_line {
            let mut tail: VecDeque<String> = std::mem::take(&mut status.output).into();
            tail.push_back(line);
            while tail.len() > output_cap {
                tail.pop_front();
            }
            status.output = tail.into();
        }
    }
}

/// Owned status record of one job class.
#[derive(Debug)]
pub struct StatusCell {
    inner: RwLock<JobStatus>,
    output_cap: usize,
}

impl StatusCell {
    pub fn new(output_cap: usize) -> Self {
        Self {
            inner: RwLock::new(JobStatus::default()),
            output_cap: output_cap.max(1),
        }
    }

    /// Consistent snapshot of the current status.
    pub fn read(&self) -> JobStatus {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply every field of `patch` in one step.
    pub fn apply(&self, patch: StatusPatch) {
        self.apply_if(patch, |_| true);
    }

    /// Apply `patch` only if `guard` accepts the current status; returns whether it was applied.
    /// Guard and write happen under the same lock.
    pub fn apply_if(&self, patch: StatusPatch, guard: impl FnOnce(&JobStatus) -> bool) -> bool {
        let mut status = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard(&status) {
            return false;
        }
        patch.apply_to(&mut status, self.output_cap);
        true
    }

    /// Start a fresh cycle: Running with all counters reset.
    pub fn begin(&self, total_items: usize, message: impl Into<String>) {
        let mut status = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *status = JobStatus {
            state: JobState::Running,
            message: message.into(),
            total_items,
            ..JobStatus::default()
        };
    }

    /// Back to Idle with default fields.
    pub fn reset(&self) {
        let mut status = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *status = JobStatus::default();
    }
}
