// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Engine configuration.

use lenq_guard::NullNavigationPolicy;

/// Settings fixed for the lifetime of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Conversions into a non-nullable value type over a chain that may hold
    /// an absent record.
    pub null_navigation: NullNavigationPolicy,
    /// Register the string and math builtins.
    pub builtins: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            null_navigation: NullNavigationPolicy::Raise,
            builtins: true,
        }
    }
}

impl EngineConfig {
    /// Reject ambiguous null navigation while composing.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Leave ambiguous null navigation unguarded.
    pub fn lenient() -> Self {
        Self {
            null_navigation: NullNavigationPolicy::Allow,
            ..Self::default()
        }
    }

    pub fn with_null_navigation(mut self, policy: NullNavigationPolicy) -> Self {
        self.null_navigation = policy;
        self
    }

    pub fn with_builtins(mut self, builtins: bool) -> Self {
        self.builtins = builtins;
        self
    }
}
