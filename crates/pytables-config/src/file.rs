//! On-disk configuration file schema.
//!
//! The file is TOML with two top-level keys and one table per mode:
//!
//! ```toml
//! runtime_dir = "/var/run/pytables"
//! watchdog_pid = "/var/run/pytables/pytables-watchdog.pid"
//!
//! [default]
//! disk = true
//!
//! [ipv6]
//! debug = true
//! ```
//!
//! A mode table overrides `[default]` one field at a time.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::logging::LogFormat;

/// Options that may appear in `[default]` or in a per-mode table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Section {
    /// Verbose logging.
    pub debug: Option<bool>,
    /// Write logs to the rotating log file.
    pub disk: Option<bool>,
    /// Write logs to standard error.
    pub console: Option<bool>,
    /// Formatter used by every log sink.
    pub log_format: Option<LogFormat>,
    /// Directory receiving log files.
    pub log_dir: Option<Utf8PathBuf>,
}

impl Section {
    /// Combines `self` over `fallback`, field by field.
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        Self {
            debug: self.debug.or(fallback.debug),
            disk: self.disk.or(fallback.disk),
            console: self.console.or(fallback.console),
            log_format: self.log_format.or(fallback.log_format),
            log_dir: self.log_dir.clone().or_else(|| fallback.log_dir.clone()),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Directory for PID, lock, health and socket files.
    pub runtime_dir: Option<Utf8PathBuf>,
    /// PID file maintained by the companion watchdog.
    pub watchdog_pid: Option<Utf8PathBuf>,
    /// Options shared by every mode.
    #[serde(default)]
    pub default: Section,
    /// Options applied when running in `ipv4` mode.
    #[serde(default)]
    pub ipv4: Section,
    /// Options applied when running in `ipv6` mode.
    #[serde(default)]
    pub ipv6: Section,
    /// Options applied when running in `all` mode.
    #[serde(default)]
    pub all: Section,
}

impl ConfigFile {
    /// Reads the file at `path`. A missing file yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file exists but cannot be read
    /// and [`ConfigError::Parse`] when its contents are not valid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses configuration text; `path` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when `content` is not valid.
    pub fn parse(path: &Utf8Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Effective section for `mode`: the mode table layered over `[default]`.
    ///
    /// Unknown mode names fall back to `[default]` alone; the mode registry
    /// reports them separately.
    #[must_use]
    pub fn section_for(&self, mode: &str) -> Section {
        let specific = match crate::mode::parse_mode(mode) {
            Ok(crate::Mode::Ipv4) => &self.ipv4,
            Ok(crate::Mode::Ipv6) => &self.ipv6,
            Ok(crate::Mode::All) => &self.all,
            Err(_) => return self.default.clone(),
        };
        specific.or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SAMPLE: &str = r#"
runtime_dir = "/srv/run"

[default]
debug = false
disk = true
log_format = "json"

[ipv6]
debug = true
console = true
"#;

    fn sample() -> ConfigFile {
        ConfigFile::parse(Utf8Path::new("sample.toml"), SAMPLE).expect("sample should parse")
    }

    #[rstest]
    fn mode_table_overrides_default_per_field() {
        let section = sample().section_for("ipv6");
        assert_eq!(section.debug, Some(true));
        assert_eq!(section.console, Some(true));
        assert_eq!(section.disk, Some(true));
        assert_eq!(section.log_format, Some(LogFormat::Json));
    }

    #[rstest]
    #[case("ipv4")]
    #[case("bogus")]
    fn other_modes_see_default_values(#[case] mode: &str) {
        let section = sample().section_for(mode);
        assert_eq!(section.debug, Some(false));
        assert_eq!(section.console, None);
    }

    #[rstest]
    fn missing_file_is_empty_configuration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.toml"))
            .expect("utf-8 temp path");
        let file = ConfigFile::load(&path).expect("missing file is not an error");
        assert_eq!(file, ConfigFile::default());
    }

    #[rstest]
    #[case("runtime_dir = [")]
    #[case("[default]\nunknown = 1")]
    #[case("[default]\nlog_format = \"yaml\"")]
    fn malformed_content_is_rejected(#[case] content: &str) {
        let error = ConfigFile::parse(Utf8Path::new("bad.toml"), content)
            .expect_err("malformed file must fail");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }
}
