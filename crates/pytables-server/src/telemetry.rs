//! Structured telemetry initialisation for the daemon.

use std::fs;
use std::io::{self, IsTerminal};

use camino::Utf8PathBuf;
use once_cell::sync::OnceCell;
use pytables_config::{Config, LogFormat};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter, time::UtcTime};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 5;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type Subscriber = Layered<Vec<BoxedLayer>, Registry>;

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// The log directory could not be created.
    #[error("failed to create log directory '{path}': {source}")]
    LogDirectory {
        /// Log directory.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The rolling log file could not be opened.
    #[error("failed to open log file in '{path}': {source}")]
    Appender {
        /// Log directory.
        path: Utf8PathBuf,
        /// Underlying appender error.
        #[source]
        source: InitError,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// `console` logs to standard error, `disk` to a daily rotated file named
/// after [`Config::service_name`] under `log_dir`; with neither, events are
/// discarded. Repeated calls are idempotent.
///
/// # Errors
///
/// Fails when the log directory or file cannot be prepared or a subscriber
/// is already installed by someone else.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
        })
        .map(|_| TelemetryHandle)
}

fn build_subscriber(config: &Config) -> Result<Subscriber, TelemetryError> {
    let level = if config.debug { "debug" } else { "info" };
    let mut layers = Vec::new();
    if config.console {
        let ansi = io::stderr().is_terminal();
        layers.push(format_layer(io::stderr, config.log_format, ansi, level)?);
    }
    if config.disk {
        let appender = rolling_appender(config)?;
        layers.push(format_layer(appender, config.log_format, false, level)?);
    }
    Ok(tracing_subscriber::registry().with(layers))
}

// Writes are synchronous: a background writer thread would not survive the
// daemonising fork.
fn rolling_appender(config: &Config) -> Result<RollingFileAppender, TelemetryError> {
    let log_dir = &config.log_dir;
    fs::create_dir_all(log_dir).map_err(|source| TelemetryError::LogDirectory {
        path: log_dir.clone(),
        source,
    })?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.service_name())
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|source| TelemetryError::Appender {
            path: log_dir.clone(),
            source,
        })
}

fn format_layer<W>(
    writer: W,
    format: LogFormat,
    ansi: bool,
    level: &str,
) -> Result<BoxedLayer, TelemetryError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_new(level).map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339());
    Ok(match format {
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
    })
}
