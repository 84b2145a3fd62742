//! Operating modes and the variants each one instantiates.
//!
//! A [`Mode`] is what the operator selects on the command line; a
//! [`Variant`] is one concrete server instance bound to a single address
//! family. The mapping between the two is a fixed table so adding a mode is an
//! exhaustiveness error rather than a runtime key lookup failure.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Operating mode selected by `--mode`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Serve the IPv4 rule set only.
    Ipv4,
    /// Serve the IPv6 rule set only.
    Ipv6,
    /// Serve both address families from one process.
    #[default]
    All,
}

/// Address-family variant served by a single server instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    /// IPv4 server instance.
    Ipv4,
    /// IPv6 server instance.
    Ipv6,
}

const IPV4_ONLY: &[Variant] = &[Variant::Ipv4];
const IPV6_ONLY: &[Variant] = &[Variant::Ipv6];
const EVERY_FAMILY: &[Variant] = &[Variant::Ipv4, Variant::Ipv6];

impl Mode {
    /// Every mode accepted on the command line, in documentation order.
    pub const ALL: [Self; 3] = [Self::Ipv4, Self::Ipv6, Self::All];

    /// Ordered, duplicate-free list of variants this mode instantiates.
    #[must_use]
    pub const fn variants(self) -> &'static [Variant] {
        match self {
            Self::Ipv4 => IPV4_ONLY,
            Self::Ipv6 => IPV6_ONLY,
            Self::All => EVERY_FAMILY,
        }
    }

    /// Lowercase name used on the command line and in file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl Variant {
    /// Lowercase name used for socket and log naming.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Errors raised by the mode registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    /// The requested mode is not one of `ipv4`, `ipv6` or `all`.
    #[error("invalid mode '{name}' (expected one of: ipv4, ipv6, all)")]
    InvalidMode {
        /// Mode name supplied by the operator.
        name: String,
    },
}

/// Parses a user-facing mode name.
///
/// # Errors
///
/// Returns [`ModeError::InvalidMode`] for names outside the registry.
pub fn parse_mode(name: &str) -> Result<Mode, ModeError> {
    Mode::from_str(name.trim()).map_err(|_| ModeError::InvalidMode {
        name: name.to_owned(),
    })
}

/// Resolves a user-facing mode name to the variants it must instantiate.
///
/// This is a pure lookup: an unknown name fails before anything is
/// constructed.
///
/// # Errors
///
/// Returns [`ModeError::InvalidMode`] for names outside the registry.
pub fn resolve(name: &str) -> Result<&'static [Variant], ModeError> {
    parse_mode(name).map(Mode::variants)
}
