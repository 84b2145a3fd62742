//! Error types for server instances.

use std::io;

use camino::Utf8PathBuf;
use pytables_config::Variant;
use thiserror::Error;

/// Errors surfaced while binding or running a server instance.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// Another process is serving on the socket.
    #[error("existing unix socket {path} is already in use")]
    InUse {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// The socket path cannot be used for a Unix socket.
    #[error("invalid socket path {path}: {reason}")]
    BindConfig {
        /// Socket path.
        path: Utf8PathBuf,
        /// What is wrong with the path.
        reason: &'static str,
    },
    /// A non-socket file occupies the socket path.
    #[error("unix socket path {path} is not a socket")]
    NotSocket {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// Inspecting an existing socket file failed.
    #[error("failed to inspect unix socket {path}: {source}")]
    Metadata {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed unexpectedly.
    #[error("failed to probe unix socket {path}: {source}")]
    Connect {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket file failed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    Cleanup {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding the socket failed.
    #[error("failed to bind unix listener at {path}: {source}")]
    Bind {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Registering the listener with the runtime failed.
    #[error("failed to register {variant} listener: {source}")]
    Listener {
        /// Variant being served.
        variant: Variant,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Accepting a client failed irrecoverably.
    #[error("failed to accept {variant} client: {source}")]
    Accept {
        /// Variant being served.
        variant: Variant,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
