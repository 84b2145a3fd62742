//! The `pytables-server` daemon.
//!
//! One process serves every variant of the configured mode: each variant is
//! a server instance listening on its own Unix domain socket, and all of
//! them share a single-threaded cooperative scheduler. The process guards
//! itself with a lock, a PID file and a JSON health snapshot in the runtime
//! directory so that the `pytables` control tool can start, stop and probe
//! it.

mod cli;
mod frontend;
pub mod instance;
mod process;
pub mod scheduler;
mod telemetry;

pub use frontend::run;
pub use process::{
    DaemonizeError, Daemonizer, LaunchError, LaunchMode, ShutdownError, ShutdownFuture,
    ShutdownSignal, SystemDaemonizer, SystemShutdownSignal, run_daemon,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
