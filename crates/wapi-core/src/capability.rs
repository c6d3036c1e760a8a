//! Capability detection
//!
//! The host's feature set is fixed for the life of the process, so a context
//! queries once at construction and keeps the answer.

use crate::config::CapabilityConfig;
use crate::host::HostRuntime;

/// Optional host runtime features the bridge cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `WeakRef` + `FinalizationRegistry`
    WeakReferences,
    /// Arbitrary-precision integers
    BigInt,
}

/// Detected capabilities of a host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    weak_references: bool,
    bigint: bool,
}

impl Capabilities {
    /// Query a host runtime, applying configured overrides
    pub fn detect(host: &dyn HostRuntime, config: &CapabilityConfig) -> Self {
        Self::from_query(|feature| host.query_feature(feature), config)
    }

    /// Build from an arbitrary feature query. An unanswered query counts as unsupported.
    pub fn from_query(query: impl Fn(Feature) -> Option<bool>, config: &CapabilityConfig) -> Self {
        let weak_references = config
            .weak_references
            .apply(query(Feature::WeakReferences).unwrap_or(false));
        let bigint = config.bigint.apply(query(Feature::BigInt).unwrap_or(false));

        Self {
            weak_references,
            bigint,
        }
    }

    #[inline]
    pub fn supports_weak_references(&self) -> bool {
        self.weak_references
    }

    #[inline]
    pub fn supports_bigint(&self) -> bool {
        self.bigint
    }

    #[inline]
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::WeakReferences => self.weak_references,
            Feature::BigInt => self.bigint,
        }
    }
}
