//! Process-group termination and partial-artifact cleanup.
//!
//! Every downloader runs as the leader of its own process group, so stopping
//! a job signals the whole group: SIGTERM first, SIGKILL once the grace
//! period runs out.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Interval between liveness checks while waiting for a group to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for the kernel to tear the group down after SIGKILL.
const KILL_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    Terminate,
    Kill,
}

/// How a group went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No member was alive when the stop began.
    AlreadyGone,
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
    /// Still alive after SIGKILL (e.g. stuck in uninterruptible I/O).
    Lingering,
}

/// Send `signal` to every process in group `pgid`. Returns false if the group does not exist.
#[cfg(unix)]
pub fn signal_group(pgid: i32, signal: GroupSignal) -> bool {
    if pgid <= 1 {
        return false;
    }
    let sig = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, sig) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            "killpg({:?}): {}",
            signal,
            std::io::Error::last_os_error()
        );
    }
    rc == 0
}

#[cfg(not(unix))]
pub fn signal_group(_pgid: i32, _signal: GroupSignal) -> bool {
    false
}

/// True while group `pgid` has at least one member that is not a zombie.
#[cfg(unix)]
pub fn group_alive(pgid: i32) -> bool {
    if pgid <= 1 {
        return false;
    }
    // SAFETY: signal 0 only performs the existence/permission check.
    let rc = unsafe { libc::killpg(pgid, 0) };
    if rc != 0 {
        return std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    }
    // Zombies still count for killpg; consult /proc where available.
    match live_members_from_proc(pgid) {
        Some(n) => n > 0,
        None => true,
    }
}

#[cfg(not(unix))]
pub fn group_alive(_pgid: i32) -> bool {
    false
}

/// Number of non-zombie processes in `pgid` according to `/proc`, or None without procfs.
fn live_members_from_proc(pgid: i32) -> Option<usize> {
    let entries = std::fs::read_dir("/proc").ok()?;
    let mut live = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_str().is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit())) {
            continue;
        }
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some((state, pgrp)) = parse_proc_stat(&stat) {
            if pgrp == pgid && state != 'Z' && state != 'X' {
                live += 1;
            }
        }
    }
    Some(live)
}

/// State and process group from a `/proc/<pid>/stat` line.
fn parse_proc_stat(stat: &str) -> Option<(char, i32)> {
    // comm may contain spaces and parentheses; fields resume after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

async fn wait_gone(pgid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if !group_alive(pgid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL whatever is left.
pub async fn terminate_group(pgid: i32, grace: Duration) -> Termination {
    if !group_alive(pgid) {
        return Termination::AlreadyGone;
    }
    tracing::info!(pgid, "sending SIGTERM to process group");
    signal_group(pgid, GroupSignal::Terminate);
    if wait_gone(pgid, grace).await {
        return Termination::Terminated;
    }
    tracing::warn!(pgid, ?grace, "process group survived SIGTERM, sending SIGKILL");
    signal_group(pgid, GroupSignal::Kill);
    if wait_gone(pgid, KILL_SETTLE).await {
        Termination::Killed
    } else {
        tracing::warn!(pgid, "process group still alive after SIGKILL");
        Termination::Lingering
    }
}

/// Best-effort removal of partial downloads and control files. Returns how many were deleted.
pub fn remove_artifacts(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted partial download file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "could not delete partial file: {}", e),
        }
    }
    removed
}
