use std::env;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

#[cfg(unix)]
use dirs::{runtime_dir, state_dir};
#[cfg(unix)]
use libc::geteuid;

/// Name of the daemon executable; runtime artefacts are named after it.
pub const SERVICE_NAME: &str = "pytables-server";

/// Well-known configuration file consulted when no override is supplied.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pytables/server.toml";

/// Environment variable providing the default for `--debug`/`--no-debug`.
pub const DEBUG_ENV_VAR: &str = "PYTABLES_DEBUG";

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV_VAR: &str = "PYTABLES_CONFIG";

/// Environment variable overriding the runtime directory.
pub const RUNTIME_DIR_ENV_VAR: &str = "PYTABLES_RUNTIME_DIR";

/// Environment variable keeping the daemon attached to the terminal.
pub const FOREGROUND_ENV_VAR: &str = "PYTABLES_FOREGROUND";

/// Idle period after which an instance started with a timeout gives up.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Time the scheduler grants running tasks to wind down after a signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SYSTEM_RUNTIME_DIR: &str = "/var/run/pytables";
const SYSTEM_LOG_DIR: &str = "/var/log";

/// Default value of the `disk` logging flag.
#[must_use]
pub const fn default_disk() -> bool {
    true
}

/// Default value of the `console` logging flag.
#[must_use]
pub const fn default_console() -> bool {
    false
}

/// Default value of the `debug` flag when neither the command line, the
/// environment nor the configuration file sets it.
#[must_use]
pub const fn default_debug() -> bool {
    false
}

/// Default mode when `--mode` is omitted.
#[must_use]
pub fn default_mode() -> String {
    crate::Mode::default().as_str().to_owned()
}

/// Directory holding the PID, lock, health and socket files.
///
/// Root uses the system run directory; other users get a per-user directory
/// so development runs never collide with an installed service.
#[must_use]
pub fn default_runtime_dir() -> Utf8PathBuf {
    default_runtime_dir_inner()
}

/// Directory receiving the rotating log files when `disk` logging is on.
#[must_use]
pub fn default_log_dir() -> Utf8PathBuf {
    default_log_dir_inner()
}

/// Default location of the externally managed watchdog PID file.
#[must_use]
pub fn default_watchdog_pid_path(runtime_dir: &Utf8Path) -> Utf8PathBuf {
    runtime_dir.join("pytables-watchdog.pid")
}

#[cfg(unix)]
fn is_superuser() -> bool {
    // SAFETY: `geteuid(2)` has no preconditions and cannot fail.
    unsafe { geteuid() == 0 }
}

#[cfg(unix)]
fn default_runtime_dir_inner() -> Utf8PathBuf {
    if is_superuser() {
        return Utf8PathBuf::from(SYSTEM_RUNTIME_DIR);
    }
    if let Some(dir) = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join("pytables");
    }
    fallback_base_directory().join("pytables").join(user_namespace())
}

#[cfg(unix)]
fn default_log_dir_inner() -> Utf8PathBuf {
    if is_superuser() {
        return Utf8PathBuf::from(SYSTEM_LOG_DIR);
    }
    if let Some(dir) = state_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join("pytables");
    }
    fallback_base_directory().join("pytables").join(user_namespace())
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: see `is_superuser`.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(not(unix))]
fn default_runtime_dir_inner() -> Utf8PathBuf {
    let _ = SYSTEM_RUNTIME_DIR;
    fallback_base_directory().join("pytables")
}

#[cfg(not(unix))]
fn default_log_dir_inner() -> Utf8PathBuf {
    let _ = SYSTEM_LOG_DIR;
    fallback_base_directory().join("pytables")
}
