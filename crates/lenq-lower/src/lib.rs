// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Plan lowering for lenq.
//!
//! Queries are composed against the provider vocabulary (`Queryable.where`,
//! `Queryable.select`, ...) with quoted lambda arguments. Before execution the
//! plan is lowered: query placeholders are replaced by their data or their
//! pending expression, and every provider call is re-bound to the matching
//! in-memory sequence operation with plain delegate arguments.

mod lower;
pub mod ops;

pub use lower::PlanLowerer;
pub use ops::{Flavor, OpDef, ParamShape, ReturnShape};

use lenq_guard::RewriteError;

/// Error raised while binding or lowering operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LowerError {
    #[error("no matching sequence operation `{name}` for arguments ({shapes})")]
    NoMatchingMethod { name: String, shapes: String },

    #[error("unknown query operation `{0}`")]
    UnknownOperation(String),

    #[error("cannot infer type arguments for `{name}`: {reason}")]
    TypeInference { name: String, reason: String },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}
