use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

use camino::Utf8Path;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use pytables_config::{DaemonStatus, HealthSnapshot, Mode, RuntimePaths, read_pid};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::files::atomic_write;

/// Owns the lock, PID and health files for the lifetime of the daemon.
#[derive(Debug)]
pub(super) struct ProcessGuard {
    paths: RuntimePaths,
    mode: Mode,
    lock: File,
    pid: Option<u32>,
    last_status: Option<DaemonStatus>,
}

impl ProcessGuard {
    pub(super) fn acquire(paths: RuntimePaths, mode: Mode) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            mode,
            lock,
            pid: None,
            last_status: None,
        })
    }

    pub(super) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        self.restamp_lock(pid)?;
        let path = self.paths.pid_path();
        let pid_error = |source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        };
        let mut file = private_file()
            .truncate(true)
            .create(true)
            .open(path)
            .map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path,
            "pid file written"
        );
        Ok(())
    }

    pub(super) fn write_health(&mut self, status: DaemonStatus) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::MissingPid)?;
        let path = self.paths.health_path();
        let snapshot = HealthSnapshot::now(status, pid, self.mode.as_str())?;
        let mut payload = serde_json::to_vec(&snapshot)?;
        payload.push(b'\n');
        atomic_write(path, &payload).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        self.last_status = Some(status);
        info!(
            target: PROCESS_TARGET,
            status = %status,
            file = %path,
            "health snapshot updated"
        );
        Ok(())
    }

    // The lock names the launcher; after a fork it must name the daemon.
    fn restamp_lock(&mut self, pid: u32) -> Result<(), LaunchError> {
        let lock_error = |source| LaunchError::LockCreate {
            path: self.paths.lock_path().to_path_buf(),
            source,
        };
        self.lock.set_len(0).map_err(lock_error)?;
        self.lock.seek(SeekFrom::Start(0)).map_err(lock_error)?;
        writeln!(self.lock, "{pid}").map_err(lock_error)
    }

    pub(super) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        remove_quietly(self.paths.lock_path(), "lock");
        remove_quietly(self.paths.pid_path(), "pid");
        // A failed daemon leaves its snapshot behind for `status`.
        if self.last_status != Some(DaemonStatus::Failed) {
            remove_quietly(self.paths.health_path(), "health");
        }
    }
}

fn remove_quietly(path: &Utf8Path, kind: &'static str) {
    if let Err(error) = fs::remove_file(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: PROCESS_TARGET,
            file = %path,
            kind,
            error = %error,
            "failed to remove runtime file"
        );
    }
}

fn private_file() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).mode(0o600);
    options
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    match private_file().create_new(true).open(paths.lock_path()) {
        Ok(mut file) => {
            // The lock records its creator so a concurrent launch can tell a
            // live startup from a crashed one.
            writeln!(file, "{}", std::process::id()).map_err(|source| {
                LaunchError::LockCreate {
                    path: paths.lock_path().to_path_buf(),
                    source,
                }
            })?;
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path()).ok().flatten()
        && check_process(pid)?
    {
        info!(
            target: PROCESS_TARGET,
            pid,
            "refusing to start: existing daemon alive"
        );
        return Err(LaunchError::AlreadyRunning { pid });
    }
    if let Some(pid) = read_pid(paths.lock_path()).ok().flatten()
        && pid != std::process::id()
        && check_process(pid)?
    {
        return Err(LaunchError::StartupInProgress {
            lock: paths.lock_path().to_path_buf(),
            pid,
        });
    }
    warn!(
        target: PROCESS_TARGET,
        lock = %paths.lock_path(),
        "existing daemon not detected; cleaning stale files"
    );
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    acquire_lock(paths)
}

fn remove_file(path: &Utf8Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn check_process(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(LaunchError::CheckProcess { pid, source }),
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use pytables_config::{Config, read_health};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    const UNUSED_PID: u32 = 4_194_305;

    struct Runtime {
        _temp: TempDir,
        paths: RuntimePaths,
    }

    #[fixture]
    fn runtime() -> Runtime {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 path");
        let config = Config {
            runtime_dir: dir.clone(),
            watchdog_pid_path: dir.join("watchdog.pid"),
            ..Config::default()
        };
        let paths = RuntimePaths::from_config(&config).expect("runtime paths");
        Runtime { _temp: temp, paths }
    }

    #[rstest]
    fn lock_is_exclusive_while_held(runtime: Runtime) {
        let mut guard =
            ProcessGuard::acquire(runtime.paths.clone(), Mode::All).expect("first lock");
        guard.write_pid(std::process::id()).expect("pid");
        let error = ProcessGuard::acquire(runtime.paths.clone(), Mode::All)
            .expect_err("second lock must fail");
        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
    }

    #[rstest]
    fn stale_artefacts_are_cleaned(runtime: Runtime) {
        fs::write(runtime.paths.lock_path(), format!("{UNUSED_PID}\n")).expect("stale lock");
        fs::write(runtime.paths.pid_path(), format!("{UNUSED_PID}\n")).expect("stale pid");

        let guard = ProcessGuard::acquire(runtime.paths.clone(), Mode::Ipv4)
            .expect("stale lock is reclaimed");

        assert!(runtime.paths.lock_path().exists());
        assert!(!runtime.paths.pid_path().exists());
        drop(guard);
    }

    #[rstest]
    fn pid_write_restamps_the_lock(runtime: Runtime) {
        let mut guard = ProcessGuard::acquire(runtime.paths.clone(), Mode::All).expect("lock");
        guard.write_pid(UNUSED_PID).expect("pid");
        let owner = read_pid(runtime.paths.lock_path()).expect("read lock");
        assert_eq!(owner, Some(UNUSED_PID));
    }

    #[rstest]
    fn health_requires_a_pid(runtime: Runtime) {
        let mut guard = ProcessGuard::acquire(runtime.paths.clone(), Mode::All).expect("lock");
        let error = guard
            .write_health(DaemonStatus::Starting)
            .expect_err("pid missing");
        assert!(matches!(error, LaunchError::MissingPid));
    }

    #[rstest]
    fn clean_drop_removes_every_file(runtime: Runtime) {
        let mut guard = ProcessGuard::acquire(runtime.paths.clone(), Mode::Ipv6).expect("lock");
        guard.write_pid(std::process::id()).expect("pid");
        guard.write_health(DaemonStatus::Ready).expect("health");
        let snapshot = read_health(runtime.paths.health_path())
            .expect("read health")
            .expect("health present");
        assert_eq!(snapshot.status, DaemonStatus::Ready);
        assert_eq!(snapshot.mode, "ipv6");

        guard.write_health(DaemonStatus::Stopping).expect("health");
        drop(guard);

        assert!(!runtime.paths.lock_path().exists());
        assert!(!runtime.paths.pid_path().exists());
        assert!(!runtime.paths.health_path().exists());
    }

    #[rstest]
    fn failed_drop_keeps_the_health_snapshot(runtime: Runtime) {
        let mut guard = ProcessGuard::acquire(runtime.paths.clone(), Mode::All).expect("lock");
        guard.write_pid(std::process::id()).expect("pid");
        guard.write_health(DaemonStatus::Failed).expect("health");
        drop(guard);

        assert!(!runtime.paths.pid_path().exists());
        let snapshot = read_health(runtime.paths.health_path())
            .expect("read health")
            .expect("health kept");
        assert_eq!(snapshot.status, DaemonStatus::Failed);
    }
}
