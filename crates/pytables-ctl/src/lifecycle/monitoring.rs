//! Daemon readiness monitoring.
//!
//! Provides helpers for evaluating health snapshots and waiting for a freshly
//! spawned server to become ready.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use camino::Utf8PathBuf;
use pytables_config::{DaemonStatus, HealthSnapshot, RuntimePaths, process_alive, read_health};

use super::error::LifecycleError;
use super::spawning::{ChildState, LaunchedDaemon};

pub(super) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of evaluating a health snapshot during daemon startup.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub(crate) enum HealthCheckOutcome {
    /// Daemon is ready; startup succeeded with the given snapshot.
    Ready(HealthSnapshot),
    /// Daemon reported a terminal status; startup was aborted.
    Aborted {
        path: Utf8PathBuf,
        status: DaemonStatus,
    },
    /// No actionable snapshot yet; polling should continue.
    Continue,
}

/// Context for monitoring daemon process startup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessMonitorContext {
    pub started_at: SystemTime,
    pub expected_pid: u32,
    /// Set once the spawned process exited cleanly: the daemon forked and
    /// writes snapshots under a new PID, which must belong to a live process.
    pub daemonized: bool,
}

/// Waits for the spawned server to publish a fresh `ready` snapshot.
///
/// The child is polled before each snapshot read so that a clean exit (the
/// server daemonized) is noticed before a PID mismatch discards the
/// snapshot.
///
/// # Errors
///
/// Fails when the child exits with an error (`StartupFailed`), reports
/// `stopping` or `failed` first (`StartupAborted`), or stays silent past
/// `timeout` (`StartupTimeout`).
pub(super) fn wait_for_ready<C: LaunchedDaemon>(
    paths: &RuntimePaths,
    child: &mut C,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, LifecycleError> {
    let deadline = Instant::now() + timeout;
    let expected_pid = child.id();
    let mut daemonized = false;
    while Instant::now() < deadline {
        if !daemonized {
            match child
                .state()
                .map_err(|source| LifecycleError::MonitorChild { source })?
            {
                ChildState::Running => {}
                ChildState::Exited(Some(0)) => daemonized = true,
                ChildState::Exited(exit_status) => {
                    return Err(LifecycleError::StartupFailed { exit_status });
                }
            }
        }
        let monitor = ProcessMonitorContext {
            started_at,
            expected_pid,
            daemonized,
        };
        match check_health_snapshot(paths, monitor)? {
            HealthCheckOutcome::Ready(snapshot) => return Ok(snapshot),
            HealthCheckOutcome::Aborted { path, status } => {
                return Err(LifecycleError::StartupAborted {
                    path,
                    status: status.to_string(),
                });
            }
            HealthCheckOutcome::Continue => {}
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout,
    })
}

/// Evaluates the current health snapshot for readiness or failure.
pub(crate) fn check_health_snapshot(
    paths: &RuntimePaths,
    monitor: ProcessMonitorContext,
) -> Result<HealthCheckOutcome, LifecycleError> {
    let Some(snapshot) = read_health(paths.health_path())? else {
        return Ok(HealthCheckOutcome::Continue);
    };
    // Within the same second a crashed predecessor's snapshot still looks
    // fresh; only a live writer counts once the child has forked.
    let pid_ok = snapshot.pid == monitor.expected_pid
        || (monitor.daemonized && process_alive(snapshot.pid));
    if !pid_ok || !snapshot.is_fresh_since(monitor.started_at) {
        return Ok(HealthCheckOutcome::Continue);
    }
    match snapshot.status {
        DaemonStatus::Ready => Ok(HealthCheckOutcome::Ready(snapshot)),
        status @ (DaemonStatus::Stopping | DaemonStatus::Failed) => {
            Ok(HealthCheckOutcome::Aborted {
                path: paths.health_path().to_path_buf(),
                status,
            })
        }
        DaemonStatus::Starting => Ok(HealthCheckOutcome::Continue),
    }
}
