// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! lenq: null-safe deferred queries over in-memory records.
//!
//! An [`Engine`] wraps a list of records in a [`Query`]. Operations composed
//! onto a query (`filter`, `select`, `order_by`, ...) only build an expression;
//! their lambdas are rewritten so that navigating through an absent record
//! yields a default value instead of a fault. Enumeration or a scalar
//! operation lowers the expression to in-memory sequence operations,
//! compiles it once and runs it.
//!
//! Conversions into a non-nullable value type over such a chain are
//! ambiguous; [`EngineConfig::null_navigation`] decides whether they are
//! rejected or left to fault at run time.

mod config;
mod convert;
mod engine;
mod error;
mod query;

pub use config::EngineConfig;
pub use convert::FromValue;
pub use engine::Engine;
pub use error::{Error, Result};
pub use query::Query;

pub use lenq_ast::{
    BinOp, Expr, ExprKind, MemberBinding, MemberRef, MethodKind, MethodRef, NewExpr, Param, Record,
    Ty, UnaryOp, Value,
};
pub use lenq_exec::{ExecError, MethodRegistry};
pub use lenq_guard::{NullNavigationPolicy, RewriteError};
pub use lenq_lower::LowerError;

/// Build the single-parameter lambda `name => body(name)`.
pub fn lambda(name: &str, ty: Ty, body: impl FnOnce(Expr) -> Expr) -> Expr {
    let param = Param::new(name, ty);
    let body = body(Expr::param(&param));
    Expr::lambda(vec![param], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lambda_helper() {
        let f = lambda("x", Ty::record("Row"), |x| x.member("Name", Ty::String));
        let (params, body) = f.as_lambda().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(f.to_string(), "x => x.Name");
        assert_eq!(body.ty(), Ty::String);
    }
}
