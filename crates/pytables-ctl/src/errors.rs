//! Error types for the control tool runtime.

use pytables_config::ConfigError;
use thiserror::Error;

use crate::lifecycle::{LifecycleCommand, LifecycleError};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[from] ConfigError),
    #[error("{command} failed: {source}")]
    Lifecycle {
        command: LifecycleCommand,
        #[source]
        source: LifecycleError,
    },
}

impl AppError {
    /// Exit status reported for this failure.
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::CliUsage(_) | Self::LoadConfiguration(_) => 1,
            Self::Lifecycle { source, .. } => source.exit_code(),
        }
    }
}
