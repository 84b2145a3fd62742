use std::future::Future;
use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::pin::Pin;

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::low_level::{pipe, unregister};
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

/// Future resolving when the daemon should shut down.
pub type ShutdownFuture = Pin<Box<dyn Future<Output = Result<(), ShutdownError>>>>;

/// Signals that stop the daemon.
const SHUTDOWN_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal {
    /// Arms the listener and returns the future the scheduler awaits.
    ///
    /// Arming happens before the daemon reports ready so a signal delivered
    /// right after readiness is never lost. The returned future is lazy and
    /// must be polled inside the scheduler runtime.
    ///
    /// # Errors
    ///
    /// Fails when the signal handlers cannot be installed.
    fn install(self) -> Result<ShutdownFuture, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting on the self-pipe failed.
    #[error("failed to wait for shutdown signals: {source}")]
    Listen {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener backed by a self-pipe written from the signal handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Handler registrations removed when the listener goes away.
struct Registrations(Vec<SigId>);

impl Drop for Registrations {
    fn drop(&mut self) {
        for id in self.0.drain(..) {
            unregister(id);
        }
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn install(self) -> Result<ShutdownFuture, ShutdownError> {
        let install = |source| ShutdownError::Install { source };
        let (reader, writer) = StdUnixStream::pair().map_err(install)?;
        let mut registrations = Registrations(Vec::with_capacity(SHUTDOWN_SIGNALS.len()));
        for signal in SHUTDOWN_SIGNALS {
            let writer = writer.try_clone().map_err(install)?;
            registrations
                .0
                .push(pipe::register(signal, writer).map_err(install)?);
        }
        reader.set_nonblocking(true).map_err(install)?;
        debug!(
            target: PROCESS_TARGET,
            signals = ?SHUTDOWN_SIGNALS,
            "shutdown signal handlers installed"
        );
        Ok(Box::pin(wait_for_signal(reader, registrations)))
    }
}

async fn wait_for_signal(
    reader: StdUnixStream,
    registrations: Registrations,
) -> Result<(), ShutdownError> {
    let _registrations = registrations;
    let listen = |source| ShutdownError::Listen { source };
    let reader = tokio::net::UnixStream::from_std(reader).map_err(listen)?;
    let mut buffer = [0_u8; 16];
    loop {
        reader.readable().await.map_err(listen)?;
        match reader.try_read(&mut buffer) {
            Ok(_) => break,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
            Err(error) => return Err(listen(error)),
        }
    }
    info!(target: PROCESS_TARGET, "shutdown signal received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use signal_hook::low_level::raise;

    use super::*;

    #[rstest]
    fn raised_signal_resolves_the_listener() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let listener = SystemShutdownSignal::new()
            .install()
            .expect("install handlers");
        // SIGHUP would terminate the test process without a handler; the
        // pipe registration replaces the default action.
        raise(SIGHUP).expect("raise signal");
        runtime
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), listener).await })
            .expect("listener resolves in time")
            .expect("listener succeeds");
    }
}
