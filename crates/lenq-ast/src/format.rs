// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Human-readable rendering of expression trees.
//!
//! Used in error messages and `Display` for deferred queries, e.g.
//! `Queryable.where(<query of Level0>, x => (x.L1 != null) && (x.L1.Integer > 25))`.

use std::fmt::{self, Display, Write};

use crate::expr::{Expr, ExprKind, NewExpr, UnaryOp};
use crate::value::Value;

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant { value, .. } => match value {
                Value::String(s) => write!(f, "{:?}", s.as_ref()),
                other => write!(f, "{:?}", other),
            },
            ExprKind::Parameter(p) => write!(f, "{}", p.name),
            ExprKind::Member { target, member } => write!(f, "{}.{}", target, member.name),
            ExprKind::Call { target, method, args } => {
                match target {
                    Some(t) => write!(f, "{}.{}", t, method.name)?,
                    None => write!(f, "{}.{}", method.owner, method.name)?,
                }
                write_list(f, "(", args, ")")
            }
            ExprKind::Unary { op, operand, ty, .. } => match op {
                UnaryOp::Convert => write!(f, "Convert({}, {})", operand, ty),
                UnaryOp::ConvertChecked => write!(f, "ConvertChecked({}, {})", operand, ty),
                UnaryOp::Negate => write!(f, "-{}", operand),
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Increment => write!(f, "Increment({})", operand),
                UnaryOp::Decrement => write!(f, "Decrement({})", operand),
                UnaryOp::UnaryPlus => write!(f, "+{}", operand),
                UnaryOp::Quote => write!(f, "{}", operand),
            },
            ExprKind::Binary { op, left, right, .. } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ExprKind::Conditional { test, if_true, if_false, .. } => {
                write!(f, "IIF({}, {}, {})", test, if_true, if_false)
            }
            ExprKind::New(new) => write_new(f, new),
            ExprKind::MemberInit { new, bindings } => {
                write_new(f, new)?;
                f.write_str(" {")?;
                for (i, b) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, " {} = {}", b.member.name, b.value)?;
                }
                f.write_str(" }")
            }
            ExprKind::ListInit { new, groups } => {
                write_new(f, new)?;
                f.write_str(" {")?;
                for (i, group) in groups.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    f.write_char(' ')?;
                    if group.len() == 1 {
                        write!(f, "{}", group[0])?;
                    } else {
                        write_list(f, "{", group, "}")?;
                    }
                }
                f.write_str(" }")
            }
            ExprKind::ArrayInit { elem_ty, elements } => {
                write!(f, "new {}[] ", elem_ty)?;
                write_list(f, "{", elements, "}")
            }
            ExprKind::Lambda { params, body } => {
                if params.len() == 1 {
                    write!(f, "{} => {}", params[0].name, body)
                } else {
                    f.write_char('(')?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(&p.name)?;
                    }
                    write!(f, ") => {}", body)
                }
            }
            ExprKind::Default(ty) => write!(f, "default({})", ty),
        }
    }
}

fn write_new(f: &mut fmt::Formatter<'_>, new: &NewExpr) -> fmt::Result {
    write!(f, "new {}", new.ty)?;
    if new.members.is_empty() {
        return write_list(f, "(", &new.args, ")");
    }
    f.write_str("(")?;
    for (i, (name, arg)) in new.members.iter().zip(&new.args).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{} = {}", name, arg)?;
    }
    f.write_str(")")
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Expr], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}
