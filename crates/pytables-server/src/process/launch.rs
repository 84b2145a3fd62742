//! Supervises daemon launch sequencing and runtime orchestration.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use pytables_config::{
    Config, DaemonStatus, FOREGROUND_ENV_VAR, IDLE_TIMEOUT, Mode, RuntimePaths, SHUTDOWN_GRACE,
};
use tracing::{error, info, warn};

use crate::instance::{
    AcknowledgingHandler, InstanceSettings, Runnable, ServerFactory, UnixServerFactory,
};
use crate::scheduler::Scheduler;

use super::PROCESS_TARGET;
use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::ProcessGuard;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; used by supervisors and tests.
    Foreground,
}

impl LaunchMode {
    /// Foreground when requested on the command line or through
    /// `PYTABLES_FOREGROUND`.
    #[must_use]
    pub fn detect(foreground: bool) -> Self {
        if foreground || env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) mode: LaunchMode,
    pub(crate) daemonizer: D,
    pub(crate) shutdown: S,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<'a, F, D, S> {
    pub(crate) config: &'a Config,
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) factory: F,
    pub(crate) grace: Duration,
}

/// Daemon whose instances are bound but not yet running.
struct Daemon<I> {
    mode: Mode,
    guard: ProcessGuard,
    instances: Vec<I>,
}

impl<I: Runnable> Daemon<I> {
    fn setup<F>(config: &Config, factory: &F) -> Result<Self, LaunchError>
    where
        F: ServerFactory<Instance = I>,
    {
        let mode = config.resolve_mode()?;
        let paths = RuntimePaths::from_config(config)?;
        let guard = ProcessGuard::acquire(paths, mode)?;
        let settings = InstanceSettings {
            mode,
            config,
            paths: guard.paths(),
        };
        let instances = mode
            .variants()
            .iter()
            .map(|&variant| {
                factory
                    .instantiate(variant, &settings)
                    .map_err(|source| LaunchError::Instance { variant, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            mode,
            guard,
            instances,
        })
    }

    fn main<D, S>(self, process: ProcessControl<D, S>, grace: Duration) -> Result<(), LaunchError>
    where
        D: Daemonizer,
        S: ShutdownSignal,
    {
        let Self {
            mode,
            mut guard,
            instances,
        } = self;
        let ProcessControl {
            mode: launch_mode,
            daemonizer,
            shutdown,
        } = process;
        if matches!(launch_mode, LaunchMode::Background) {
            daemonizer.daemonize(guard.paths())?;
        }
        guard.write_pid(std::process::id())?;
        guard.write_health(DaemonStatus::Starting)?;
        let shutdown = shutdown.install()?;

        let mut scheduler = Scheduler::new(grace);
        for instance in instances {
            let name = format!("server-{}", instance.variant());
            let token = scheduler.token();
            scheduler.add(name, instance.run(false, token));
        }
        guard.write_health(DaemonStatus::Ready)?;
        info!(
            target: PROCESS_TARGET,
            mode = %mode,
            instances = scheduler.len(),
            "daemon ready"
        );

        match scheduler.run(shutdown) {
            Ok(()) => {
                guard.write_health(DaemonStatus::Stopping)?;
                info!(target: PROCESS_TARGET, "shutdown sequence completed");
                Ok(())
            }
            Err(source) => {
                error!(
                    target: PROCESS_TARGET,
                    error = %source,
                    "scheduler terminated with an error"
                );
                if let Err(health) = guard.write_health(DaemonStatus::Failed) {
                    warn!(
                        target: PROCESS_TARGET,
                        error = %health,
                        "failed to record failed health state"
                    );
                }
                Err(LaunchError::Scheduler { source })
            }
        }
    }
}

/// Runs the daemon for `config` using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when setup fails, another daemon is running or a
/// server instance fails while serving.
pub fn run_daemon(config: &Config, foreground: bool) -> Result<(), LaunchError> {
    let handler = Arc::new(AcknowledgingHandler);
    let plan = LaunchPlan {
        config,
        process: ProcessControl {
            mode: LaunchMode::detect(foreground),
            daemonizer: SystemDaemonizer::new(),
            shutdown: SystemShutdownSignal::new(),
        },
        factory: UnixServerFactory::new(handler, IDLE_TIMEOUT),
        grace: SHUTDOWN_GRACE,
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<F, D, S>(plan: LaunchPlan<'_, F, D, S>) -> Result<(), LaunchError>
where
    F: ServerFactory,
    D: Daemonizer,
    S: ShutdownSignal,
{
    let LaunchPlan {
        config,
        process,
        factory,
        grace,
    } = plan;
    info!(
        target: PROCESS_TARGET,
        mode = %config.mode,
        launch = ?process.mode,
        "starting daemon runtime"
    );
    let daemon = Daemon::setup(config, &factory)?;
    daemon.main(process, grace)
}
