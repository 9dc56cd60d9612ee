// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Executor method name constants.
//!
//! Every operation and builtin handled by the executor is listed here.
//! The drift test in tests/drift_test.rs cross-checks these against the
//! operation table in lenq-lower.

// ---------------------------------------------------------------------------
// Sequence operations (compile.rs ordering, sequence.rs everything else)
// ---------------------------------------------------------------------------

pub const SEQUENCE_OPERATIONS: &[&str] = &[
    "where", "select",
    "order_by", "order_by_descending", "then_by", "then_by_descending", "reverse",
    "skip", "take", "distinct", "concat",
    "first", "first_or_default", "last", "last_or_default",
    "single", "single_or_default", "element_at",
    "count", "any", "all", "contains",
    "sum", "min", "max", "average",
    "to_list",
];

// ---------------------------------------------------------------------------
// Builtins (registry.rs)
// ---------------------------------------------------------------------------

/// Methods on string values, registered under `String`
pub const STRING_METHODS: &[&str] = &[
    "contains", "starts_with", "ends_with", "to_upper", "to_lower", "trim",
];

/// Functions under `string`
pub const STRING_FUNCTIONS: &[&str] = &["is_null_or_empty"];

/// Functions under `math`
pub const MATH_FUNCTIONS: &[&str] = &["abs", "min", "max", "round"];
