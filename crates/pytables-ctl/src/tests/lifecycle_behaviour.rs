//! Behavioural tests for the lifecycle verbs, driven through the CLI runtime
//! with a fake server launcher and signaller.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::process::ExitCode;
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8PathBuf;
use pytables_config::{Config, DaemonStatus, HealthSnapshot, RuntimePaths, process_alive};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::lifecycle::{
    ChildState, DaemonLauncher, LaunchedDaemon, LifecycleController, LifecycleError,
    ProcessSignaller,
};
use crate::run_with_controller;

// Above the kernel's pid_max ceiling, so never a live process.
const UNUSED_PID: u32 = 4_194_305;
const TIMEOUT: Duration = Duration::from_millis(500);
/// How long a daemonizing fake takes to report ready after its launcher exits.
const FORK_DELAY: Duration = Duration::from_millis(100);

type StepResult = Result<(), String>;

#[derive(Debug, Clone, Copy)]
enum LaunchBehaviour {
    Ready,
    Daemonizing,
    Exit(i32),
    Silent,
}

struct FakeChild {
    state: ChildState,
    _daemon: Option<JoinHandle<io::Result<()>>>,
}

impl LaunchedDaemon for FakeChild {
    fn id(&self) -> u32 {
        std::process::id()
    }

    fn state(&mut self) -> io::Result<ChildState> {
        Ok(self.state)
    }
}

/// Pretends to be `pytables-server`: a ready launch publishes the PID file
/// and a fresh health snapshot under the test process's own PID.
struct FakeLauncher {
    paths: RuntimePaths,
    behaviour: LaunchBehaviour,
    launches: Rc<RefCell<Vec<Vec<OsString>>>>,
}

impl DaemonLauncher for FakeLauncher {
    type Child = FakeChild;

    fn launch(&self, arguments: &[OsString]) -> Result<Self::Child, LifecycleError> {
        self.launches.borrow_mut().push(arguments.to_vec());
        let mut daemon = None;
        let state = match self.behaviour {
            LaunchBehaviour::Ready => {
                publish_running_daemon(&self.paths).map_err(|source| {
                    LifecycleError::LaunchDaemon {
                        binary: OsString::from("fake"),
                        source,
                    }
                })?;
                ChildState::Running
            }
            LaunchBehaviour::Daemonizing => {
                // The launcher exits at once; the forked daemon reports later.
                let paths = self.paths.clone();
                daemon = Some(thread::spawn(move || {
                    thread::sleep(FORK_DELAY);
                    publish_running_daemon(&paths)
                }));
                ChildState::Exited(Some(0))
            }
            LaunchBehaviour::Exit(code) => ChildState::Exited(Some(code)),
            LaunchBehaviour::Silent => ChildState::Running,
        };
        Ok(FakeChild {
            state,
            _daemon: daemon,
        })
    }
}

/// Records termination requests; an obedient daemon removes its PID file and
/// lock the way the real guard does on exit.
struct FakeSignaller {
    paths: RuntimePaths,
    obeys: bool,
    signalled: Rc<RefCell<Vec<u32>>>,
}

impl ProcessSignaller for FakeSignaller {
    fn terminate(&self, pid: u32) -> Result<(), LifecycleError> {
        self.signalled.borrow_mut().push(pid);
        if self.obeys {
            for path in [self.paths.pid_path(), self.paths.lock_path()] {
                if path.exists() {
                    fs::remove_file(path).map_err(|source| LifecycleError::SignalFailed {
                        pid,
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        if self.obeys && self.signalled.borrow().contains(&pid) {
            return false;
        }
        process_alive(pid)
    }
}

fn publish_running_daemon(paths: &RuntimePaths) -> io::Result<()> {
    fs::create_dir_all(paths.runtime_dir())?;
    let pid = std::process::id();
    fs::write(paths.pid_path(), format!("{pid}\n"))?;
    fs::write(paths.lock_path(), format!("{pid}\n"))?;
    let snapshot = HealthSnapshot::now(DaemonStatus::Ready, pid, "all")
        .map_err(|error| io::Error::other(error.to_string()))?;
    let json = serde_json::to_string(&snapshot).map_err(io::Error::other)?;
    fs::write(paths.health_path(), json)
}

struct LifecycleWorld {
    _temp: TempDir,
    config_path: Utf8PathBuf,
    paths: RuntimePaths,
    behaviour: LaunchBehaviour,
    obeys: bool,
    launches: Rc<RefCell<Vec<Vec<OsString>>>>,
    signalled: Rc<RefCell<Vec<u32>>>,
    exit: Option<ExitCode>,
    stdout: String,
    stderr: String,
    files_before: Vec<Option<Vec<u8>>>,
}

impl LifecycleWorld {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 temp dir");
        let runtime_dir = root.join("run");
        let config = Config {
            watchdog_pid_path: runtime_dir.join("pytables-watchdog.pid"),
            runtime_dir,
            ..Config::default()
        };
        Self {
            _temp: temp,
            config_path: root.join("absent.toml"),
            paths: RuntimePaths::from_config_readonly(&config),
            behaviour: LaunchBehaviour::Ready,
            obeys: true,
            launches: Rc::default(),
            signalled: Rc::default(),
            exit: None,
            stdout: String::new(),
            stderr: String::new(),
            files_before: Vec::new(),
        }
    }

    /// Contents of the PID, lock and health files, in that order.
    fn runtime_files(&self) -> Vec<Option<Vec<u8>>> {
        [
            self.paths.pid_path(),
            self.paths.lock_path(),
            self.paths.health_path(),
        ]
        .into_iter()
        .map(|path| fs::read(path).ok())
        .collect()
    }

    fn prepare_runtime_dir(&self) -> io::Result<()> {
        fs::create_dir_all(self.paths.runtime_dir())
    }

    fn run(&mut self, arguments: &str) {
        self.files_before = self.runtime_files();
        let controller = LifecycleController::new(
            FakeLauncher {
                paths: self.paths.clone(),
                behaviour: self.behaviour,
                launches: Rc::clone(&self.launches),
            },
            FakeSignaller {
                paths: self.paths.clone(),
                obeys: self.obeys,
                signalled: Rc::clone(&self.signalled),
            },
        )
        .with_timeouts(TIMEOUT, TIMEOUT);
        let mut argv = vec![
            OsString::from("pytables"),
            OsString::from("--config-path"),
            OsString::from(self.config_path.as_str()),
            OsString::from("--runtime-dir"),
            OsString::from(self.paths.runtime_dir().as_str()),
        ];
        argv.extend(arguments.split_whitespace().map(OsString::from));
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        self.exit = Some(run_with_controller(
            argv,
            &mut stdout,
            &mut stderr,
            &controller,
        ));
        self.stdout = String::from_utf8_lossy(&stdout).into_owned();
        self.stderr = String::from_utf8_lossy(&stderr).into_owned();
    }
}

#[fixture]
fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}

#[given("a fresh lifecycle world")]
fn given_world(world: &RefCell<LifecycleWorld>) {
    *world.borrow_mut() = LifecycleWorld::new();
}

#[given("the daemon is running")]
fn given_daemon_running(world: &RefCell<LifecycleWorld>) -> StepResult {
    publish_running_daemon(&world.borrow().paths).map_err(|error| error.to_string())
}

#[given("a stale pid file exists")]
fn given_stale_pid(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    world.prepare_runtime_dir().map_err(|error| error.to_string())?;
    let stale = format!("{UNUSED_PID}\n");
    for path in [world.paths.pid_path(), world.paths.lock_path()] {
        fs::write(path, &stale).map_err(|error| error.to_string())?;
    }
    fs::write(world.paths.health_path(), "{}").map_err(|error| error.to_string())
}

#[given("a watchdog is running")]
fn given_watchdog(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    world.prepare_runtime_dir().map_err(|error| error.to_string())?;
    fs::write(
        world.paths.watchdog_pid_path(),
        std::process::id().to_string(),
    )
    .map_err(|error| error.to_string())
}

#[given("the server exits with status {code} when launched")]
fn given_server_exits(world: &RefCell<LifecycleWorld>, code: String) -> StepResult {
    let code = code.parse().map_err(|_| format!("invalid status '{code}'"))?;
    world.borrow_mut().behaviour = LaunchBehaviour::Exit(code);
    Ok(())
}

#[given("a crashed daemon left a failed health snapshot")]
fn given_failed_snapshot(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    world.prepare_runtime_dir().map_err(|error| error.to_string())?;
    let snapshot = HealthSnapshot::now(DaemonStatus::Failed, UNUSED_PID, "all")
        .map_err(|error| error.to_string())?;
    let json = serde_json::to_string(&snapshot).map_err(|error| error.to_string())?;
    fs::write(world.paths.health_path(), json).map_err(|error| error.to_string())
}

#[given("the server daemonizes before reporting ready")]
fn given_daemonizing_server(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().behaviour = LaunchBehaviour::Daemonizing;
}

#[given("the server never reports ready")]
fn given_silent_server(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().behaviour = LaunchBehaviour::Silent;
}

#[given("the daemon ignores termination requests")]
fn given_stubborn_daemon(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().obeys = false;
}

#[when("the operator runs \"{arguments}\"")]
fn when_operator_runs(world: &RefCell<LifecycleWorld>, arguments: String) {
    world.borrow_mut().run(&arguments);
}

#[then("the exit code is {code}")]
fn then_exit_code(world: &RefCell<LifecycleWorld>, code: String) -> StepResult {
    let expected: u8 = code.parse().map_err(|_| format!("invalid code '{code}'"))?;
    let world = world.borrow();
    let exit = world.exit.ok_or("the command has not run")?;
    if exit != ExitCode::from(expected) {
        return Err(format!(
            "expected exit code {expected}, got {exit:?}; stdout: {}; stderr: {}",
            world.stdout, world.stderr
        ));
    }
    Ok(())
}

#[then("the server launch count is {count}")]
fn then_launch_count(world: &RefCell<LifecycleWorld>, count: String) -> StepResult {
    let expected: usize = count.parse().map_err(|_| format!("invalid count '{count}'"))?;
    let launches = world.borrow().launches.borrow().len();
    assert_eq!(launches, expected, "unexpected number of server launches");
    Ok(())
}

#[then("the forwarded arguments include \"{flags}\"")]
fn then_forwarded_arguments(world: &RefCell<LifecycleWorld>, flags: String) {
    let world = world.borrow();
    let launches = world.launches.borrow();
    let forwarded = launches.last().expect("server was launched");
    let rendered: Vec<String> = forwarded
        .iter()
        .map(|argument| argument.to_string_lossy().into_owned())
        .collect();
    assert!(
        rendered.join(" ").contains(&flags),
        "forwarded arguments {rendered:?} lack '{flags}'"
    );
}

#[then("the daemon was signalled")]
fn then_signalled(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    assert_eq!(*world.signalled.borrow(), vec![std::process::id()]);
}

#[then("the daemon was not signalled")]
fn then_not_signalled(world: &RefCell<LifecycleWorld>) {
    assert!(world.borrow().signalled.borrow().is_empty());
}

#[then("stdout mentions \"{text}\"")]
fn then_stdout_mentions(world: &RefCell<LifecycleWorld>, text: String) {
    let world = world.borrow();
    assert!(
        world.stdout.contains(&text),
        "stdout lacks '{text}': {}",
        world.stdout
    );
}

#[then("stderr mentions \"{text}\"")]
fn then_stderr_mentions(world: &RefCell<LifecycleWorld>, text: String) {
    let world = world.borrow();
    assert!(
        world.stderr.contains(&text),
        "stderr lacks '{text}': {}",
        world.stderr
    );
}

#[then("the runtime files are removed")]
fn then_runtime_files_removed(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    for path in [
        world.paths.pid_path(),
        world.paths.lock_path(),
        world.paths.health_path(),
    ] {
        assert!(!path.exists(), "{path} should have been removed");
    }
}

#[then("the pid file still exists")]
fn then_pid_file_kept(world: &RefCell<LifecycleWorld>) {
    assert!(world.borrow().paths.pid_path().exists());
}

#[then("the pid file is unchanged")]
fn then_pid_file_unchanged(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    let before = world.files_before.first().cloned().flatten();
    assert!(before.is_some(), "no pid file existed before the command");
    assert_eq!(fs::read(world.paths.pid_path()).ok(), before);
}

#[then("the runtime files are unchanged")]
fn then_runtime_files_unchanged(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    assert_eq!(world.runtime_files(), world.files_before);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start launches the server and waits for it to become ready")]
fn start_waits_for_ready(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start leaves a running daemon alone")]
fn start_with_running_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start ignores the failed snapshot of a crashed daemon")]
fn start_after_crash(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start rejects an invalid mode before spawning")]
fn start_with_invalid_mode(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start defers to a running watchdog")]
fn start_with_watchdog(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start passes the server exit status through")]
fn start_passes_exit_status(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Start gives up when the server never reports ready")]
fn start_times_out(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Stop signals the daemon and clears leftovers")]
fn stop_signals_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Stop is a no-op when the daemon is not running")]
fn stop_without_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Stop removes a stale pid file")]
fn stop_removes_stale_pid(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Stop warns about a running watchdog")]
fn stop_warns_about_watchdog(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Stop fails when the daemon ignores the request")]
fn stop_times_out(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Status reports a running daemon")]
fn status_running(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Status reports a stale pid file without touching it")]
fn status_stale(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Status reports a stopped daemon")]
fn status_stopped(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Restart stops and starts the daemon")]
fn restart_cycles_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Reload starts a stopped daemon")]
fn reload_starts_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Condrestart ignores a stopped daemon")]
fn condrestart_without_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "Condrestart restarts a running daemon")]
fn condrestart_with_daemon(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_lifecycle.feature", name = "An unknown verb prints usage")]
fn unknown_verb_prints_usage(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}
