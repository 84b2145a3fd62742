//! Lifecycle management for `pytables-server`.
//!
//! This module is split into focused submodules so each concern remains small and
//! testable:
//! - [`types`] defines the command model and IO helpers.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] launches the server process.
//! - [`monitoring`] waits for the server to report ready.
//! - [`shutdown`] signals the daemon and clears leftovers.
//! - [`controller`] implements the verbs on top of the helpers.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod spawning;
mod types;

pub use controller::{LifecycleController, SystemLifecycle};
pub use error::LifecycleError;
pub use shutdown::{ProcessSignaller, SystemSignaller};
pub use spawning::{
    ChildState, DaemonLauncher, LaunchedDaemon, SERVER_BIN_ENV_VAR, SystemChild, SystemLauncher,
};
pub use types::{LifecycleCommand, LifecycleContext, LifecycleOutput};
