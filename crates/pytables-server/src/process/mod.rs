//! Daemon process supervision: singleton guard, daemonisation, runtime
//! files and signal-driven shutdown.

mod daemonizer;
mod errors;
mod files;
mod guard;
mod launch;
mod shutdown;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use launch::{LaunchMode, run_daemon};
pub use shutdown::{ShutdownError, ShutdownFuture, ShutdownSignal, SystemShutdownSignal};

pub(crate) use launch::{LaunchPlan, ProcessControl, run_daemon_with};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
