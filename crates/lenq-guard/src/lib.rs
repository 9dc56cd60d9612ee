// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Null-guard rewriting for lenq expression trees.
//!
//! Rewrites a lambda body so that navigating through an absent record yields
//! the default value of the navigated type instead of a dereference fault:
//! - `x.L1.L2.Name` → `IIF(x.L1 == null, default, IIF(x.L1.L2 == null, default, x.L1.L2.Name))`
//! - `x.L1.Flag()` → `IIF(x.L1 != null, x.L1.Flag(), false)`
//! - `x.L1.Decimal > 25` → `(x.L1 != null) && (.. > 25)`
//!
//! This pass runs when an operation is composed onto a query, before lowering.

mod rewrite;

use std::fmt;
use std::str::FromStr;

pub use rewrite::NullGuardRewriter;

/// What to do with a conversion into a non-nullable value type whose operand
/// navigates through a record that may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NullNavigationPolicy {
    /// Reject the expression while rewriting.
    #[default]
    Raise,
    /// Leave the conversion unguarded; a missing record faults at execution.
    Allow,
}

impl fmt::Display for NullNavigationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullNavigationPolicy::Raise => write!(f, "raise"),
            NullNavigationPolicy::Allow => write!(f, "allow"),
        }
    }
}

impl FromStr for NullNavigationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" | "error" | "strict" => Ok(NullNavigationPolicy::Raise),
            "allow" | "lenient" => Ok(NullNavigationPolicy::Allow),
            other => Err(format!(
                "unknown null navigation policy `{}`; expected `raise` or `allow`",
                other
            )),
        }
    }
}

/// Error raised while inserting null guards.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewriteError {
    #[error("unsupported expression node `{kind}` in lambda body")]
    UnsupportedNode { kind: &'static str },

    #[error(
        "ambiguous null navigation into non-nullable type in `{expr}`: an ancestor may be absent \
         and `{target}` has no null value; set `EngineConfig::null_navigation` to \
         `NullNavigationPolicy::Allow`, or cast to a nullable type instead (e.g. `({target}?) ...`)"
    )]
    NullNavigation { expr: String, target: String },

    #[error("expected a lambda, found `{kind}`")]
    NotALambda { kind: &'static str },
}
