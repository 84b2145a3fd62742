//! Single-threaded cooperative scheduler.
//!
//! Every task is a `!Send` future driven by a tokio current-thread runtime
//! inside a [`LocalSet`]; tasks only yield at `.await` points. Tasks share
//! fate: the first error or panic cancels the [`ShutdownToken`], aborts the
//! remaining tasks and fails the run.

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet, LocalSet};
use tracing::{debug, error, info, warn};

use crate::process::{ShutdownError, ShutdownFuture};

pub(crate) const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");

/// Unit of work accepted by the scheduler.
pub type LocalTask = Pin<Box<dyn Future<Output = Result<(), TaskError>>>>;

/// Error reported by a task when it cannot continue.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TaskError(Box<dyn StdError + Send + Sync + 'static>);

impl TaskError {
    /// Wraps any error type.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self(source.into())
    }
}

/// Errors returned by [`Scheduler::run`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The runtime backing the scheduler could not be built.
    #[error("failed to build scheduler runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A task returned an error; every other task was aborted.
    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        /// Name the task was registered with.
        task: String,
        /// Error returned by the task.
        #[source]
        source: TaskError,
    },
    /// A task panicked; every other task was aborted.
    #[error("task panicked: {source}")]
    TaskPanicked {
        /// Join error carrying the panic.
        #[source]
        source: JoinError,
    },
    /// Listening for the shutdown signal failed.
    #[error("failed to listen for shutdown: {source}")]
    Shutdown {
        /// Underlying listener error.
        #[source]
        source: ShutdownError,
    },
}

/// Cancellation flag handed to every task.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown is requested or the scheduler is gone.
    pub async fn cancelled(&mut self) {
        // A closed channel means the scheduler was dropped.
        self.receiver.wait_for(|cancelled| *cancelled).await.ok();
    }
}

/// Cooperative scheduler driving registered tasks to completion.
pub struct Scheduler {
    grace: Duration,
    cancel: watch::Sender<bool>,
    tasks: Vec<(String, LocalTask)>,
}

impl Scheduler {
    /// Builds an empty scheduler. After a shutdown signal, tasks get `grace`
    /// to finish before they are aborted.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        let (cancel, _receiver) = watch::channel(false);
        Self {
            grace,
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Token observed by tasks to learn about shutdown.
    #[must_use]
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.cancel.subscribe(),
        }
    }

    /// Registers a task. Nothing runs until [`Scheduler::run`].
    pub fn add(&mut self, name: impl Into<String>, task: LocalTask) {
        self.tasks.push((name.into(), task));
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drives every task until all complete, one fails, or `shutdown`
    /// resolves.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TaskFailed`] or
    /// [`SchedulerError::TaskPanicked`] when a task fails, including while
    /// draining after a signal.
    pub fn run(self, shutdown: ShutdownFuture) -> Result<(), SchedulerError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| SchedulerError::Runtime { source })?;
        let local = LocalSet::new();
        local.block_on(&runtime, self.drive(shutdown))
    }

    async fn drive(self, mut shutdown: ShutdownFuture) -> Result<(), SchedulerError> {
        let Self {
            grace,
            cancel,
            tasks,
        } = self;
        let mut running = JoinSet::new();
        for (name, task) in tasks {
            debug!(target: SCHEDULER_TARGET, task = %name, "task scheduled");
            running.spawn_local(async move { (name, task.await) });
        }
        info!(
            target: SCHEDULER_TARGET,
            tasks = running.len(),
            "scheduler running"
        );
        loop {
            tokio::select! {
                joined = running.join_next() => {
                    let Some(joined) = joined else {
                        info!(target: SCHEDULER_TARGET, "all tasks completed");
                        return Ok(());
                    };
                    if let Err(failure) = settle(joined) {
                        cancel.send_replace(true);
                        running.shutdown().await;
                        return Err(failure);
                    }
                }
                signalled = &mut shutdown => {
                    signalled.map_err(|source| SchedulerError::Shutdown { source })?;
                    info!(
                        target: SCHEDULER_TARGET,
                        grace_ms = grace.as_millis(),
                        "shutdown requested; cancelling tasks"
                    );
                    cancel.send_replace(true);
                    return drain(&mut running, grace).await;
                }
            }
        }
    }
}

type Joined = Result<(String, Result<(), TaskError>), JoinError>;

async fn drain(
    running: &mut JoinSet<(String, Result<(), TaskError>)>,
    grace: Duration,
) -> Result<(), SchedulerError> {
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            joined = running.join_next() => {
                let Some(joined) = joined else {
                    info!(target: SCHEDULER_TARGET, "all tasks drained");
                    return Ok(());
                };
                if let Err(failure) = settle(joined) {
                    running.shutdown().await;
                    return Err(failure);
                }
            }
            () = &mut deadline => {
                warn!(
                    target: SCHEDULER_TARGET,
                    remaining = running.len(),
                    "grace period elapsed; aborting remaining tasks"
                );
                running.shutdown().await;
                return Ok(());
            }
        }
    }
}

fn settle(joined: Joined) -> Result<(), SchedulerError> {
    match joined {
        Ok((name, Ok(()))) => {
            debug!(target: SCHEDULER_TARGET, task = %name, "task finished");
            Ok(())
        }
        Ok((task, Err(source))) => {
            error!(
                target: SCHEDULER_TARGET,
                task = %task,
                error = %source,
                "task failed; aborting every task"
            );
            Err(SchedulerError::TaskFailed { task, source })
        }
        Err(source) if source.is_cancelled() => Ok(()),
        Err(source) => {
            error!(
                target: SCHEDULER_TARGET,
                error = %source,
                "task panicked; aborting every task"
            );
            Err(SchedulerError::TaskPanicked { source })
        }
    }
}
