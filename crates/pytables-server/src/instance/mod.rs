//! Per-variant server instances listening on Unix domain sockets.
//!
//! A [`ServerFactory`] turns a [`Variant`] into a bound instance during
//! daemon setup; the instance becomes a [`LocalTask`] on the scheduler once
//! [`Runnable::run`] is called.

mod connection;
mod errors;
mod listener;

use std::fmt;
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::time::Duration;

use pytables_config::{Config, Mode, RuntimePaths, Variant};
use tracing::info;

use crate::scheduler::{LocalTask, ShutdownToken, TaskError};

pub use connection::{AcknowledgingHandler, MessageHandler};
pub use errors::InstanceError;

use listener::{SocketFile, bind_unix};

pub(crate) const INSTANCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::instance");

/// Everything an instance needs to know about the daemon it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct InstanceSettings<'a> {
    /// Resolved mode of the daemon.
    pub mode: Mode,
    /// Configuration shared by every instance.
    pub config: &'a Config,
    /// Runtime directory layout.
    pub paths: &'a RuntimePaths,
}

/// Creates server instances for the variants of a mode.
pub trait ServerFactory {
    /// Instance type produced by this factory.
    type Instance: Runnable;

    /// Builds the instance serving `variant`.
    ///
    /// # Errors
    ///
    /// Fails when the instance cannot claim its resources.
    fn instantiate(
        &self,
        variant: Variant,
        settings: &InstanceSettings<'_>,
    ) -> Result<Self::Instance, InstanceError>;
}

/// A configured instance ready to be handed to the scheduler.
pub trait Runnable {
    /// Variant served by the instance.
    fn variant(&self) -> Variant;

    /// Returns the lazy task serving clients until `shutdown` is cancelled,
    /// or, with `enable_timeout`, until the instance has been idle for its
    /// idle timeout.
    fn run(self, enable_timeout: bool, shutdown: ShutdownToken) -> LocalTask;
}

/// Factory binding one Unix socket per variant under the runtime directory.
#[derive(Clone)]
pub struct UnixServerFactory {
    handler: Arc<dyn MessageHandler>,
    idle_timeout: Duration,
}

impl UnixServerFactory {
    /// Builds a factory whose instances answer messages with `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn MessageHandler>, idle_timeout: Duration) -> Self {
        Self {
            handler,
            idle_timeout,
        }
    }
}

impl fmt::Debug for UnixServerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnixServerFactory")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl ServerFactory for UnixServerFactory {
    type Instance = ServerInstance;

    fn instantiate(
        &self,
        variant: Variant,
        settings: &InstanceSettings<'_>,
    ) -> Result<ServerInstance, InstanceError> {
        let path = settings.paths.socket_path(variant);
        let listener = bind_unix(&path)?;
        info!(
            target: INSTANCE_TARGET,
            variant = %variant,
            mode = %settings.mode,
            debug = settings.config.debug,
            disk = settings.config.disk,
            socket = %path,
            "server instance created"
        );
        Ok(ServerInstance {
            variant,
            mode: settings.mode,
            listener,
            socket: SocketFile::new(path),
            handler: Arc::clone(&self.handler),
            idle_timeout: self.idle_timeout,
        })
    }
}

/// Server instance bound to its socket but not yet accepting clients.
pub struct ServerInstance {
    variant: Variant,
    mode: Mode,
    listener: UnixListener,
    socket: SocketFile,
    handler: Arc<dyn MessageHandler>,
    idle_timeout: Duration,
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInstance")
            .field("variant", &self.variant)
            .field("mode", &self.mode)
            .field("socket", &self.socket)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl ServerInstance {
    /// Path of the socket the instance listens on.
    #[must_use]
    pub fn socket_path(&self) -> &camino::Utf8Path {
        self.socket.path()
    }
}

impl Runnable for ServerInstance {
    fn variant(&self) -> Variant {
        self.variant
    }

    fn run(self, enable_timeout: bool, shutdown: ShutdownToken) -> LocalTask {
        Box::pin(async move {
            listener::serve(self, enable_timeout, shutdown)
                .await
                .map_err(TaskError::new)
        })
    }
}

#[cfg(test)]
mod tests;
