//! Bridge configuration (`wapi.toml`)
//!
//! ```toml
//! [capabilities]
//! weak_references = "auto"   # or "disabled"
//! bigint = "auto"
//!
//! [wrap]
//! degraded_policy = "omit-finalizer"   # or "reject"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// How a capability reported by the host is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityOverride {
    /// Use whatever the host runtime reports
    #[default]
    Auto,
    /// Treat the feature as missing even if the host has it
    Disabled,
}

impl CapabilityOverride {
    /// Combine with the host's answer. A feature can be turned off, never on.
    pub fn apply(self, detected: bool) -> bool {
        match self {
            CapabilityOverride::Auto => detected,
            CapabilityOverride::Disabled => false,
        }
    }
}

/// Capability overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub weak_references: CapabilityOverride,
    pub bigint: CapabilityOverride,
}

/// What `wrap` does with a finalizer when weak references are unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradedWrapPolicy {
    /// Wrap anyway, skip finalizer registration; the caller must dispose
    #[default]
    OmitFinalizer,
    /// Fail the wrap with a pending exception
    Reject,
}

/// Wrap behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapConfig {
    pub degraded_policy: DegradedWrapPolicy,
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub capabilities: CapabilityConfig,
    pub wrap: WrapConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }
}

impl FromStr for BridgeConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(content)?)
    }
}
