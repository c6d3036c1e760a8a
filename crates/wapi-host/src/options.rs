//! Host runtime options
//!
//! Lets a test emulate runtimes of different ages:
//!
//! ```toml
//! weak_references = false   # no WeakRef / FinalizationRegistry
//! bigint = false
//! feature_queries = true     # false: queries answer "unknown"
//! external_buffer_limit = 65536
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading host options
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Failed to read host options: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse host options: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Feature set and limits of a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// `WeakRef` and `FinalizationRegistry` are available
    pub weak_references: bool,

    /// `BigInt` is available
    pub bigint: bool,

    /// Whether feature queries get an answer at all
    pub feature_queries: bool,

    /// Largest external buffer accepted without copying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_buffer_limit: Option<usize>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            weak_references: true,
            bigint: true,
            feature_queries: true,
            external_buffer_limit: None,
        }
    }
}

impl HostOptions {
    /// A runtime predating weak references and big integers
    pub fn legacy() -> Self {
        Self {
            weak_references: false,
            bigint: false,
            ..Self::default()
        }
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }
}

impl FromStr for HostOptions {
    type Err = OptionsError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(content)?)
    }
}
