//! Socket binding and the accept loop of a server instance.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use pytables_config::Variant;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::scheduler::ShutdownToken;

use super::connection::{MessageHandler, serve_connection};
use super::{INSTANCE_TARGET, InstanceError, ServerInstance};

/// Longest path accepted in `sockaddr_un.sun_path`, excluding the NUL.
const MAX_SOCKET_PATH: usize = 107;

/// Socket file removed when the owning instance goes away.
#[derive(Debug)]
pub(super) struct SocketFile {
    path: Utf8PathBuf,
}

impl SocketFile {
    pub(super) const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub(super) fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: INSTANCE_TARGET,
                error = %error,
                path = %self.path,
                "failed to remove unix socket file"
            );
        }
    }
}

pub(super) fn bind_unix(path: &Utf8Path) -> Result<StdUnixListener, InstanceError> {
    if path.as_str().len() > MAX_SOCKET_PATH {
        return Err(InstanceError::BindConfig {
            path: path.to_path_buf(),
            reason: "path is too long for a unix socket",
        });
    }
    if path.file_name().is_none() {
        return Err(InstanceError::BindConfig {
            path: path.to_path_buf(),
            reason: "path does not name a file",
        });
    }
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| InstanceError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(InstanceError::NotSocket {
                path: path.to_path_buf(),
            });
        }
        match StdUnixStream::connect(path) {
            Ok(_stream) => {
                return Err(InstanceError::InUse {
                    path: path.to_path_buf(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                debug!(
                    target: INSTANCE_TARGET,
                    path = %path,
                    "removing stale unix socket"
                );
                fs::remove_file(path).map_err(|source| InstanceError::Cleanup {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(InstanceError::Connect {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    StdUnixListener::bind(path).map_err(|source| InstanceError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

type Connections = JoinSet<io::Result<()>>;

/// Accepts clients until shutdown, an accept failure or, with
/// `enable_timeout`, an idle period without clients.
pub(super) async fn serve(
    instance: ServerInstance,
    enable_timeout: bool,
    mut shutdown: ShutdownToken,
) -> Result<(), InstanceError> {
    let ServerInstance {
        variant,
        mode,
        listener,
        socket,
        handler,
        idle_timeout,
    } = instance;
    let listener = register(listener, variant)?;
    info!(
        target: INSTANCE_TARGET,
        variant = %variant,
        mode = %mode,
        socket = %socket.path(),
        enable_timeout,
        "server instance listening"
    );

    let mut connections = Connections::new();
    let idle = sleep(idle_timeout);
    tokio::pin!(idle);
    let outcome = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!(
                    target: INSTANCE_TARGET,
                    variant = %variant,
                    "shutdown requested; closing instance"
                );
                break Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    accept(&mut connections, stream, variant, &handler);
                }
                Err(error) if is_transient(&error) => {
                    debug!(
                        target: INSTANCE_TARGET,
                        variant = %variant,
                        error = %error,
                        "transient accept error"
                    );
                }
                Err(source) => break Err(InstanceError::Accept { variant, source }),
            },
            Some(joined) = connections.join_next() => {
                settle(variant, joined);
                if enable_timeout && connections.is_empty() {
                    info!(
                        target: INSTANCE_TARGET,
                        variant = %variant,
                        "no clients left, starting timeout"
                    );
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                }
            }
            () = &mut idle, if enable_timeout && connections.is_empty() => {
                info!(
                    target: INSTANCE_TARGET,
                    variant = %variant,
                    "timeout waiting for clients"
                );
                break Ok(());
            }
        }
    };

    connections.shutdown().await;
    drop(listener);
    drop(socket);
    info!(
        target: INSTANCE_TARGET,
        variant = %variant,
        "terminated"
    );
    outcome
}

fn register(listener: StdUnixListener, variant: Variant) -> Result<UnixListener, InstanceError> {
    let listener_error = |source| InstanceError::Listener { variant, source };
    listener.set_nonblocking(true).map_err(listener_error)?;
    UnixListener::from_std(listener).map_err(listener_error)
}

fn accept(
    connections: &mut Connections,
    stream: UnixStream,
    variant: Variant,
    handler: &Arc<dyn MessageHandler>,
) {
    match stream.peer_cred() {
        Ok(cred) => info!(
            target: INSTANCE_TARGET,
            variant = %variant,
            pid = ?cred.pid(),
            uid = cred.uid(),
            gid = cred.gid(),
            "client connected"
        ),
        Err(error) => warn!(
            target: INSTANCE_TARGET,
            variant = %variant,
            error = %error,
            "client connected; peer credentials unavailable"
        ),
    }
    connections.spawn_local(serve_connection(stream, variant, Arc::clone(handler)));
}

fn settle(variant: Variant, joined: Result<io::Result<()>, JoinError>) {
    match joined {
        Ok(Ok(())) => debug!(
            target: INSTANCE_TARGET,
            variant = %variant,
            "client disconnected"
        ),
        Ok(Err(error)) => warn!(
            target: INSTANCE_TARGET,
            variant = %variant,
            error = %error,
            "client connection failed"
        ),
        Err(error) => warn!(
            target: INSTANCE_TARGET,
            variant = %variant,
            error = %error,
            "client task ended abnormally"
        ),
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
