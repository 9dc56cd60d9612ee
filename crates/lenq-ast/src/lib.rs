// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression trees for the lenq query engine.
//!
//! This crate defines the node vocabulary shared by the null-guard rewriter,
//! the plan lowerer and the executor, together with the static types carried
//! by every node and the runtime values the executor produces.

pub mod expr;
pub mod format;
pub mod ty;
pub mod value;

pub use expr::{
    BinOp, Expr, ExprKind, MemberBinding, MemberRef, MethodKind, MethodRef, NewExpr, Param,
    UnaryOp,
};
pub use ty::Ty;
pub use value::{QuerySource, Record, Value};
