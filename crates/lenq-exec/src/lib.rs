// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Plan execution for lenq.
//!
//! An [`Executor`] lowers a plan, compiles it once into a tree of closures
//! and runs it. Lambda parameters are resolved to frame slots at compile
//! time; sequence operations run eagerly over in-memory lists.

mod compile;
mod executor;
pub mod method_names;
mod operators;
mod registry;
mod sequence;

pub use executor::{CompiledPlan, Executor};
pub use registry::{FunctionFn, MethodFn, MethodRegistry};

use lenq_lower::LowerError;

/// Whether the executor implements the sequence operation `name`.
pub fn is_implemented(name: &str) -> bool {
    compile::is_ordering(name) || sequence::lookup(name).is_some()
}

/// Error raised while compiling or running a plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("null reference: cannot access `{member}` on a null `{ty}`")]
    NullReference { member: String, ty: String },

    #[error("nullable object must have a value")]
    NoValue,

    #[error("cannot convert null to non-nullable type `{ty}`")]
    NullConversion { ty: String },

    #[error("division by zero; check divisor before dividing")]
    DivisionByZero,

    #[error("arithmetic overflow in `{op}`")]
    Overflow { op: &'static str },

    #[error("{0}")]
    TypeError(String),

    #[error("sequence contains no elements")]
    EmptySequence,

    #[error("sequence contains more than one element")]
    MoreThanOneElement,

    #[error("index {index} is out of range for a sequence of {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("expected {expected} argument{}, got {got}", if *.expected == 1 { "" } else { "s" })]
    ArityMismatch { expected: usize, got: usize },

    #[error("no method `{method}` on type `{ty}`")]
    NoSuchMethod { ty: String, method: String },

    #[error("no function `{owner}.{name}`")]
    NoSuchFunction { owner: String, name: String },

    #[error("unknown sequence operation `{0}`")]
    UnknownOperation(String),

    #[error("unbound parameter `{0}`")]
    UnboundParameter(String),

    #[error("`{kind}` cannot be executed here")]
    Unsupported { kind: &'static str },

    #[error("provider operation `{0}` was not lowered before execution")]
    Unlowered(String),

    #[error(transparent)]
    Lower(#[from] LowerError),
}
