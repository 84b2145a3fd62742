use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use pytables_config::{Config, Mode, RuntimePaths, Variant};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tokio::sync::Notify;

use super::*;
use crate::scheduler::{Scheduler, SchedulerError};

const GRACE: Duration = Duration::from_millis(200);
const IDLE: Duration = Duration::from_millis(150);
const WAIT: Duration = Duration::from_secs(5);

struct Echo;

impl MessageHandler for Echo {
    fn handle(&self, variant: Variant, message: &str) -> Vec<String> {
        vec![format!("{variant}"), message.to_owned()]
    }
}

struct Runtime {
    _temp: TempDir,
    config: Config,
    paths: RuntimePaths,
}

impl Runtime {
    fn settings(&self) -> InstanceSettings<'_> {
        InstanceSettings {
            mode: Mode::All,
            config: &self.config,
            paths: &self.paths,
        }
    }
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
    Runtime {
        _temp: temp,
        config,
        paths,
    }
}

fn factory() -> UnixServerFactory {
    UnixServerFactory::new(Arc::new(AcknowledgingHandler), IDLE)
}

struct Running {
    handle: thread::JoinHandle<Result<(), SchedulerError>>,
    stop: Arc<Notify>,
}

impl Running {
    fn start(instance: ServerInstance, enable_timeout: bool) -> Self {
        let stop = Arc::new(Notify::new());
        let signal = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut scheduler = Scheduler::new(GRACE);
            let token = scheduler.token();
            scheduler.add("instance", instance.run(enable_timeout, token));
            scheduler.run(Box::pin(async move {
                signal.notified().await;
                Ok(())
            }))
        });
        Self { handle, stop }
    }

    fn stop(self) -> Result<(), SchedulerError> {
        self.stop.notify_one();
        self.join()
    }

    fn join(self) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + WAIT;
        while !self.handle.is_finished() {
            assert!(Instant::now() < deadline, "instance did not finish in time");
            thread::sleep(Duration::from_millis(10));
        }
        self.handle.join().expect("instance thread panicked")
    }
}

struct Client {
    writer: StdUnixStream,
    reader: BufReader<StdUnixStream>,
}

impl Client {
    fn connect(path: &camino::Utf8Path) -> Self {
        let stream = StdUnixStream::connect(path).expect("connect client");
        stream
            .set_read_timeout(Some(WAIT))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self {
            writer: stream,
            reader,
        }
    }

    fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).expect("send request");
    }

    fn reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read reply");
        line
    }
}

#[rstest]
fn instantiation_binds_the_variant_socket(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv6, &runtime.settings())
        .expect("instantiate");
    let path = runtime.paths.socket_path(Variant::Ipv6);
    assert_eq!(instance.variant(), Variant::Ipv6);
    assert_eq!(instance.socket_path(), path.as_path());
    let file_type = fs::symlink_metadata(&path).expect("socket exists").file_type();
    assert!(file_type.is_socket());

    drop(instance);
    assert!(!path.exists(), "dropping an instance removes its socket");
}

#[rstest]
fn live_socket_is_reported_in_use(runtime: Runtime) {
    let _first = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("first instance");
    let error = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect_err("second bind must fail");
    assert!(matches!(error, InstanceError::InUse { .. }));
}

#[rstest]
fn stale_socket_file_is_replaced(runtime: Runtime) {
    let path = runtime.paths.socket_path(Variant::Ipv4);
    {
        let _stale = StdUnixListener::bind(&path).expect("bind stale listener");
    }
    assert!(path.exists(), "stale socket should remain");

    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("stale socket is cleaned");
    StdUnixStream::connect(instance.socket_path()).expect("new socket accepts");
}

#[rstest]
fn regular_file_blocks_the_socket_path(runtime: Runtime) {
    fs::write(runtime.paths.socket_path(Variant::Ipv4), "not a socket").expect("seed file");
    let error = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect_err("regular file must not be removed");
    assert!(matches!(error, InstanceError::NotSocket { .. }));
}

#[rstest]
fn overlong_socket_path_is_rejected() {
    let dir = Utf8PathBuf::from(format!("/tmp/{}", "d".repeat(120)));
    let config = Config {
        runtime_dir: dir.clone(),
        watchdog_pid_path: dir.join("watchdog.pid"),
        ..Config::default()
    };
    let paths = RuntimePaths::from_config_readonly(&config);
    let settings = InstanceSettings {
        mode: Mode::Ipv4,
        config: &config,
        paths: &paths,
    };
    let error = factory()
        .instantiate(Variant::Ipv4, &settings)
        .expect_err("path too long");
    assert!(matches!(error, InstanceError::BindConfig { .. }));
}

#[rstest]
fn replies_are_framed_per_connection(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("instantiate");
    let path = instance.socket_path().to_path_buf();
    let running = Running::start(instance, false);

    let mut first = Client::connect(&path);
    first.send("1 LOAD\n2 SYNC\n");
    assert_eq!(first.reply(), "000 OK\n");
    assert_eq!(first.reply(), "001 OK\n");

    let mut second = Client::connect(&path);
    second.send("9 BOOT\n");
    assert_eq!(second.reply(), "000 OK\n");

    drop(first);
    drop(second);
    running.stop().expect("clean shutdown");
    assert!(!path.exists(), "socket removed on exit");
}

#[rstest]
fn malformed_lines_are_discarded(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("instantiate");
    let path = instance.socket_path().to_path_buf();
    let running = Running::start(instance, false);

    let mut client = Client::connect(&path);
    client.send("garbage\n4 LOAD\n");
    assert_eq!(client.reply(), "000 OK\n");

    drop(client);
    running.stop().expect("clean shutdown");
}

#[rstest]
fn handler_replies_are_each_framed(runtime: Runtime) {
    let instance = UnixServerFactory::new(Arc::new(Echo), IDLE)
        .instantiate(Variant::Ipv6, &runtime.settings())
        .expect("instantiate");
    let path = instance.socket_path().to_path_buf();
    let running = Running::start(instance, false);

    let mut client = Client::connect(&path);
    client.send("3 TABLE/filter\n");
    assert_eq!(client.reply(), "000 ipv6\n");
    assert_eq!(client.reply(), "001 TABLE/filter\n");

    drop(client);
    running.stop().expect("clean shutdown");
}

#[rstest]
fn idle_instance_finishes_when_timeout_enabled(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("instantiate");
    let path = instance.socket_path().to_path_buf();
    let started = Instant::now();

    Running::start(instance, true)
        .join()
        .expect("idle timeout is a clean exit");

    assert!(started.elapsed() >= IDLE);
    assert!(!path.exists(), "socket removed on exit");
}

#[rstest]
fn connected_client_holds_off_the_idle_timeout(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("instantiate");
    let path = instance.socket_path().to_path_buf();
    let running = Running::start(instance, true);

    let mut client = Client::connect(&path);
    client.send("1 LOAD\n");
    assert_eq!(client.reply(), "000 OK\n");
    thread::sleep(IDLE * 3);
    assert!(
        !running.handle.is_finished(),
        "instance must stay up while a client is connected"
    );

    drop(client);
    running.join().expect("timeout after the last client left");
}

#[rstest]
fn instance_without_timeout_waits_for_shutdown(runtime: Runtime) {
    let instance = factory()
        .instantiate(Variant::Ipv4, &runtime.settings())
        .expect("instantiate");
    let running = Running::start(instance, false);

    thread::sleep(IDLE * 3);
    assert!(!running.handle.is_finished());
    running.stop().expect("clean shutdown");
}
