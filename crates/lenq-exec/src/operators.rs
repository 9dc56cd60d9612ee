// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Operator and member semantics.
//!
//! Operators are lifted over `Null`: arithmetic and bitwise operators yield
//! `Null` for a `Null` operand, ordering comparisons yield `false`, and
//! equality treats `Null == Null` as true. Mixing `Int` and `Float` widens
//! to `Float`.

use std::cmp::Ordering;

use lenq_ast::{BinOp, Ty, UnaryOp, Value};

use crate::ExecError;

type Result<T> = std::result::Result<T, ExecError>;

/// Truth value of a test operand. A lifted `Null` is false.
pub(crate) fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(ExecError::TypeError(format!(
            "expected bool, found {}",
            other.type_name()
        ))),
    }
}

/// Read `name` from a non-nullable target.
pub(crate) fn member(target: &Value, name: &str, static_ty: &Ty) -> Result<Value> {
    match target {
        Value::Null => Err(ExecError::NullReference {
            member: name.to_string(),
            ty: static_ty.to_string(),
        }),
        // An unset field reads as absent
        Value::Record(record) => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
        Value::String(s) if name == "Length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) if name == "Count" || name == "Length" => {
            Ok(Value::Int(items.len() as i64))
        }
        other => Err(ExecError::TypeError(format!(
            "no member `{}` on {}",
            name,
            other.type_name()
        ))),
    }
}

/// `HasValue` / `Value` on a nullable value type.
pub(crate) fn nullable_member(target: Value, name: &str) -> Result<Value> {
    match name {
        "HasValue" => Ok(Value::Bool(!target.is_null())),
        "Value" if target.is_null() => Err(ExecError::NoValue),
        "Value" => Ok(target),
        other => Err(ExecError::TypeError(format!(
            "no member `{}` on a nullable value",
            other
        ))),
    }
}

pub(crate) fn unary(op: UnaryOp, value: Value, ty: &Ty) -> Result<Value> {
    match op {
        UnaryOp::Convert => convert(value, ty, false),
        UnaryOp::ConvertChecked => convert(value, ty, true),
        UnaryOp::Not => match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Int(n) => Ok(Value::Int(!n)),
            other => Err(type_mismatch("!", &other)),
        },
        UnaryOp::Negate => match value {
            Value::Null => Ok(Value::Null),
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or(ExecError::Overflow { op: "-" }),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(type_mismatch("-", &other)),
        },
        UnaryOp::UnaryPlus => match value {
            Value::Null | Value::Int(_) | Value::Float(_) => Ok(value),
            other => Err(type_mismatch("+", &other)),
        },
        UnaryOp::Increment => step(value, 1, "Increment"),
        UnaryOp::Decrement => step(value, -1, "Decrement"),
        UnaryOp::Quote => Err(ExecError::Unsupported { kind: "Quote" }),
    }
}

fn step(value: Value, by: i64, op: &'static str) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(n) => n.checked_add(by).map(Value::Int).ok_or(ExecError::Overflow { op }),
        Value::Float(x) => Ok(Value::Float(x + by as f64)),
        other => Err(type_mismatch(op, &other)),
    }
}

/// `(ty) value`. Float to int truncates; a checked conversion rejects
/// values outside the `int` range.
pub(crate) fn convert(value: Value, ty: &Ty, checked: bool) -> Result<Value> {
    if value.is_null() {
        return if ty.can_be_null() {
            Ok(Value::Null)
        } else {
            Err(ExecError::NullConversion { ty: ty.to_string() })
        };
    }
    match (ty.non_nullable(), value) {
        (Ty::Int, Value::Int(n)) => Ok(Value::Int(n)),
        (Ty::Int, Value::Float(x)) => {
            if checked && !(x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64) {
                return Err(ExecError::Overflow { op: "ConvertChecked" });
            }
            Ok(Value::Int(x as i64))
        }
        (Ty::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
        (Ty::Float, Value::Float(x)) => Ok(Value::Float(x)),
        (Ty::Int | Ty::Float, other) => Err(ExecError::TypeError(format!(
            "cannot convert {} to {}",
            other.type_name(),
            ty
        ))),
        (Ty::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (Ty::Bool, other) => Err(ExecError::TypeError(format!(
            "cannot convert {} to {}",
            other.type_name(),
            ty
        ))),
        // Reference conversions keep the value
        (_, other) => Ok(other),
    }
}

/// Evaluate a strict binary operator. `AndAlso`, `OrElse` and `Coalesce`
/// short-circuit and are handled by the compiler.
pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinOp::Equal => Ok(Value::Bool(left == right)),
        BinOp::NotEqual => Ok(Value::Bool(left != right)),
        BinOp::GreaterThan
        | BinOp::GreaterThanOrEqual
        | BinOp::LessThan
        | BinOp::LessThanOrEqual => compare(op, left, right),
        BinOp::AndAlso | BinOp::OrElse | BinOp::Coalesce => Err(ExecError::TypeError(format!(
            "`{}` must short-circuit",
            op.symbol()
        ))),
        _ => arithmetic(op, left, right),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Bool(false));
    }
    let Some(ord) = ordering(left, right)? else {
        // NaN
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinOp::GreaterThan => ord == Ordering::Greater,
        BinOp::GreaterThanOrEqual => ord != Ordering::Less,
        BinOp::LessThan => ord == Ordering::Less,
        _ => ord != Ordering::Greater,
    };
    Ok(Value::Bool(result))
}

/// Order two non-null values. `Ok(None)` for unordered floats.
fn ordering(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(ExecError::TypeError(format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

/// Total order used for sorting: `Null` first, then by value; values of
/// unrelated types group by type name.
pub(crate) fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match ordering(left, right) {
            Ok(Some(ord)) => ord,
            Ok(None) => Ordering::Equal,
            Err(_) => left.type_name().cmp(right.type_name()),
        },
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinOp::And => Ok(Value::Bool(a & b)),
            BinOp::Or => Ok(Value::Bool(a | b)),
            BinOp::Xor => Ok(Value::Bool(a ^ b)),
            _ => Err(type_mismatch(op.symbol(), left)),
        },
        (Value::String(a), Value::String(b)) if op == BinOp::Add => {
            Ok(Value::string(format!("{}{}", a, b)))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b),
            _ => Err(ExecError::TypeError(format!(
                "cannot apply `{}` to {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value> {
    let out = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Subtract => a.checked_sub(b),
        BinOp::Multiply => a.checked_mul(b),
        BinOp::Divide | BinOp::Modulo if b == 0 => return Err(ExecError::DivisionByZero),
        BinOp::Divide => a.checked_div(b),
        BinOp::Modulo => a.checked_rem(b),
        BinOp::And => Some(a & b),
        BinOp::Or => Some(a | b),
        BinOp::Xor => Some(a ^ b),
        // Shift counts wrap at the operand width
        BinOp::LeftShift => Some(a.wrapping_shl((b & 63) as u32)),
        BinOp::RightShift => Some(a.wrapping_shr((b & 63) as u32)),
        other => {
            return Err(ExecError::TypeError(format!(
                "`{}` is not an arithmetic operator",
                other.symbol()
            )))
        }
    };
    out.map(Value::Int).ok_or(ExecError::Overflow { op: op.symbol() })
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value> {
    let out = match op {
        BinOp::Add => a + b,
        BinOp::Subtract => a - b,
        BinOp::Multiply => a * b,
        BinOp::Divide => a / b,
        BinOp::Modulo => a % b,
        other => {
            return Err(ExecError::TypeError(format!(
                "cannot apply `{}` to float",
                other.symbol()
            )))
        }
    };
    Ok(Value::Float(out))
}

fn type_mismatch(op: &str, value: &Value) -> ExecError {
    ExecError::TypeError(format!("cannot apply `{}` to {}", op, value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifted_arithmetic() {
        assert_eq!(binary(BinOp::Add, &Value::Null, &Value::Int(1)), Ok(Value::Null));
        assert_eq!(binary(BinOp::Add, &Value::Int(1), &Value::Float(0.5)), Ok(Value::Float(1.5)));
        assert_eq!(binary(BinOp::Divide, &Value::Int(7), &Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(
            binary(BinOp::Modulo, &Value::Int(7), &Value::Int(0)),
            Err(ExecError::DivisionByZero)
        );
        assert_eq!(
            binary(BinOp::Multiply, &Value::Int(i64::MAX), &Value::Int(2)),
            Err(ExecError::Overflow { op: "*" })
        );
    }

    #[test]
    fn comparisons_with_null() {
        assert_eq!(binary(BinOp::Equal, &Value::Null, &Value::Null), Ok(Value::Bool(true)));
        assert_eq!(binary(BinOp::NotEqual, &Value::Null, &Value::Int(1)), Ok(Value::Bool(true)));
        assert_eq!(binary(BinOp::LessThan, &Value::Null, &Value::Int(1)), Ok(Value::Bool(false)));
        assert_eq!(
            binary(BinOp::GreaterThanOrEqual, &Value::Int(100), &Value::Float(25.0)),
            Ok(Value::Bool(true))
        );
        assert!(binary(BinOp::LessThan, &Value::string("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn shifts_and_bitwise() {
        assert_eq!(binary(BinOp::LeftShift, &Value::Int(1), &Value::Int(4)), Ok(Value::Int(16)));
        assert_eq!(binary(BinOp::RightShift, &Value::Int(100), &Value::Int(2)), Ok(Value::Int(25)));
        assert_eq!(
            binary(BinOp::Xor, &Value::Bool(true), &Value::Bool(true)),
            Ok(Value::Bool(false))
        );
        assert!(binary(BinOp::And, &Value::Float(1.0), &Value::Float(1.0)).is_err());
    }

    #[test]
    fn conversions() {
        let int_opt = Ty::nullable(Ty::Int);
        assert_eq!(convert(Value::Null, &int_opt, false), Ok(Value::Null));
        assert_eq!(
            convert(Value::Null, &Ty::Int, false),
            Err(ExecError::NullConversion { ty: "int".into() })
        );
        assert_eq!(convert(Value::Float(2.9), &Ty::Int, false), Ok(Value::Int(2)));
        assert_eq!(convert(Value::Int(2), &Ty::Float, false), Ok(Value::Float(2.0)));
        assert!(convert(Value::Float(1e300), &Ty::Int, true).is_err());
    }

    #[test]
    fn members() {
        let ty = Ty::record("Level1");
        assert!(matches!(
            member(&Value::Null, "Name", &ty),
            Err(ExecError::NullReference { .. })
        ));
        assert_eq!(member(&Value::string("abc"), "Length", &Ty::String), Ok(Value::Int(3)));
        assert_eq!(nullable_member(Value::Null, "HasValue"), Ok(Value::Bool(false)));
        assert_eq!(nullable_member(Value::Null, "Value"), Err(ExecError::NoValue));
        assert_eq!(nullable_member(Value::Int(4), "Value"), Ok(Value::Int(4)));
    }

    #[test]
    fn sort_order_puts_null_first() {
        let mut values = vec![Value::Int(3), Value::Null, Value::Float(1.5)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![Value::Null, Value::Float(1.5), Value::Int(3)]);
    }
}
