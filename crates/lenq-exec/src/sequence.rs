// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! In-memory sequence operations.
//!
//! Operations are eager: each takes the realized items of its source and
//! returns a new list or a scalar. Ordering lives in [`sort_by_keys`] so
//! that `then_by` chains can share one sort.

use std::cmp::Ordering;
use std::rc::Rc;

use lenq_ast::{Ty, Value};

use crate::compile::Func;
use crate::operators::{self, sort_order};
use crate::ExecError;

type Result<T> = std::result::Result<T, ExecError>;

/// An evaluated operation argument.
pub(crate) enum OpArg<'a> {
    Value(Value),
    Func(Func<'a>),
}

/// One invocation of a sequence operation.
pub(crate) struct OpCall<'a> {
    pub items: &'a [Value],
    /// Arguments after the source
    pub args: Vec<OpArg<'a>>,
    /// `default(T0)`
    pub element_default: &'a Value,
    pub ret: &'a Ty,
}

pub(crate) type OpFn = fn(&OpCall<'_>) -> Result<Value>;

impl OpCall<'_> {
    fn func(&self, index: usize) -> Result<Func<'_>> {
        match self.args.get(index) {
            Some(OpArg::Func(f)) => Ok(*f),
            Some(OpArg::Value(v)) => Err(ExecError::TypeError(format!(
                "expected a lambda, found {}",
                v.type_name()
            ))),
            None => Err(ExecError::ArityMismatch {
                expected: index + 2,
                got: self.args.len() + 1,
            }),
        }
    }

    fn value(&self, index: usize) -> Result<&Value> {
        match self.args.get(index) {
            Some(OpArg::Value(v)) => Ok(v),
            Some(OpArg::Func(_)) => Err(ExecError::TypeError("unexpected lambda".to_string())),
            None => Err(ExecError::ArityMismatch {
                expected: index + 2,
                got: self.args.len() + 1,
            }),
        }
    }

    fn int(&self, index: usize) -> Result<i64> {
        let v = self.value(index)?;
        v.as_i64()
            .ok_or_else(|| ExecError::TypeError(format!("expected int, found {}", v.type_name())))
    }

    /// Items matching the optional predicate.
    fn matching(&self) -> Result<Vec<&Value>> {
        if self.args.is_empty() {
            return Ok(self.items.iter().collect());
        }
        let pred = self.func(0)?;
        let mut out = Vec::new();
        for item in self.items {
            if operators::truthy(&pred.call(item)?)? {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Items, or their projections when a selector is given.
    fn selected(&self) -> Result<Vec<Value>> {
        if self.args.is_empty() {
            return Ok(self.items.to_vec());
        }
        let sel = self.func(0)?;
        self.items.iter().map(|item| sel.call(item)).collect()
    }
}

/// The realized items of an operation source.
pub(crate) fn items(source: Value, op: &str) -> Result<Rc<Vec<Value>>> {
    match source {
        Value::List(items) => Ok(items),
        Value::Null => Err(ExecError::NullReference {
            member: op.to_string(),
            ty: "null sequence".to_string(),
        }),
        other => Err(ExecError::TypeError(format!(
            "`{}` expects a sequence, found {}",
            op,
            other.type_name()
        ))),
    }
}

pub(crate) fn lookup(name: &str) -> Option<OpFn> {
    let op: OpFn = match name {
        "where" => where_,
        "select" => select,
        "reverse" => reverse,
        "skip" => skip,
        "take" => take,
        "distinct" => distinct,
        "concat" => concat,
        "first" => first,
        "first_or_default" => first_or_default,
        "last" => last,
        "last_or_default" => last_or_default,
        "single" => single,
        "single_or_default" => single_or_default,
        "element_at" => element_at,
        "count" => count,
        "any" => any,
        "all" => all,
        "contains" => contains,
        "sum" => sum,
        "min" => min,
        "max" => max,
        "average" => average,
        "to_list" => to_list,
        _ => return None,
    };
    Some(op)
}

fn list(items: Vec<Value>) -> Result<Value> {
    Ok(Value::list(items))
}

fn where_(call: &OpCall<'_>) -> Result<Value> {
    list(call.matching()?.into_iter().cloned().collect())
}

fn select(call: &OpCall<'_>) -> Result<Value> {
    list(call.selected()?)
}

fn reverse(call: &OpCall<'_>) -> Result<Value> {
    list(call.items.iter().rev().cloned().collect())
}

/// Negative counts behave as zero.
fn count_arg(call: &OpCall<'_>) -> Result<usize> {
    Ok(call.int(0)?.max(0) as usize)
}

fn skip(call: &OpCall<'_>) -> Result<Value> {
    let n = count_arg(call)?;
    list(call.items.iter().skip(n).cloned().collect())
}

fn take(call: &OpCall<'_>) -> Result<Value> {
    let n = count_arg(call)?;
    list(call.items.iter().take(n).cloned().collect())
}

fn distinct(call: &OpCall<'_>) -> Result<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in call.items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    list(out)
}

fn concat(call: &OpCall<'_>) -> Result<Value> {
    let other = items(call.value(0)?.clone(), "concat")?;
    list(call.items.iter().chain(other.iter()).cloned().collect())
}

fn first(call: &OpCall<'_>) -> Result<Value> {
    call.matching()?
        .first()
        .map(|v| (*v).clone())
        .ok_or(ExecError::EmptySequence)
}

fn first_or_default(call: &OpCall<'_>) -> Result<Value> {
    Ok(call
        .matching()?
        .first()
        .map_or_else(|| call.element_default.clone(), |v| (*v).clone()))
}

fn last(call: &OpCall<'_>) -> Result<Value> {
    call.matching()?
        .last()
        .map(|v| (*v).clone())
        .ok_or(ExecError::EmptySequence)
}

fn last_or_default(call: &OpCall<'_>) -> Result<Value> {
    Ok(call
        .matching()?
        .last()
        .map_or_else(|| call.element_default.clone(), |v| (*v).clone()))
}

fn single(call: &OpCall<'_>) -> Result<Value> {
    match call.matching()?.as_slice() {
        [] => Err(ExecError::EmptySequence),
        [only] => Ok((*only).clone()),
        _ => Err(ExecError::MoreThanOneElement),
    }
}

fn single_or_default(call: &OpCall<'_>) -> Result<Value> {
    match call.matching()?.as_slice() {
        [] => Ok(call.element_default.clone()),
        [only] => Ok((*only).clone()),
        _ => Err(ExecError::MoreThanOneElement),
    }
}

fn element_at(call: &OpCall<'_>) -> Result<Value> {
    let index = call.int(0)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| call.items.get(i))
        .cloned()
        .ok_or(ExecError::IndexOutOfRange {
            index,
            len: call.items.len(),
        })
}

fn count(call: &OpCall<'_>) -> Result<Value> {
    Ok(Value::Int(call.matching()?.len() as i64))
}

fn any(call: &OpCall<'_>) -> Result<Value> {
    if call.args.is_empty() {
        return Ok(Value::Bool(!call.items.is_empty()));
    }
    let pred = call.func(0)?;
    for item in call.items {
        if operators::truthy(&pred.call(item)?)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn all(call: &OpCall<'_>) -> Result<Value> {
    let pred = call.func(0)?;
    for item in call.items {
        if !operators::truthy(&pred.call(item)?)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn contains(call: &OpCall<'_>) -> Result<Value> {
    let needle = call.value(0)?;
    Ok(Value::Bool(call.items.contains(needle)))
}

/// Nulls are skipped. Sums of ints stay ints; an empty sum is zero.
fn sum(call: &OpCall<'_>) -> Result<Value> {
    let floats = call.ret.non_nullable() == &Ty::Float;
    let mut int_total: i64 = 0;
    let mut float_total = 0.0;
    for value in call.selected()? {
        match value {
            Value::Null => {}
            Value::Int(n) if !floats => {
                int_total = int_total
                    .checked_add(n)
                    .ok_or(ExecError::Overflow { op: "sum" })?;
            }
            other => {
                float_total += other.as_f64().ok_or_else(|| {
                    ExecError::TypeError(format!("cannot sum {}", other.type_name()))
                })?;
            }
        }
    }
    if floats {
        Ok(Value::Float(float_total))
    } else {
        Ok(Value::Int(int_total))
    }
}

fn min(call: &OpCall<'_>) -> Result<Value> {
    extreme(call, Ordering::Less)
}

fn max(call: &OpCall<'_>) -> Result<Value> {
    extreme(call, Ordering::Greater)
}

/// Nulls are skipped. With nothing left, a nullable result is `Null` and a
/// value result is an error.
fn extreme(call: &OpCall<'_>, want: Ordering) -> Result<Value> {
    let best = call
        .selected()?
        .into_iter()
        .filter(|v| !v.is_null())
        .reduce(|best, v| if sort_order(&v, &best) == want { v } else { best });
    match best {
        Some(v) => Ok(v),
        None if call.ret.can_be_null() => Ok(Value::Null),
        None => Err(ExecError::EmptySequence),
    }
}

fn average(call: &OpCall<'_>) -> Result<Value> {
    let mut total = 0.0;
    let mut n = 0usize;
    for value in call.selected()? {
        if value.is_null() {
            continue;
        }
        total += value.as_f64().ok_or_else(|| {
            ExecError::TypeError(format!("cannot average {}", value.type_name()))
        })?;
        n += 1;
    }
    match n {
        0 if call.ret.can_be_null() => Ok(Value::Null),
        0 => Err(ExecError::EmptySequence),
        _ => Ok(Value::Float(total / n as f64)),
    }
}

fn to_list(call: &OpCall<'_>) -> Result<Value> {
    list(call.items.to_vec())
}

/// Stable sort by `keys`, primary key first. `true` marks a descending key.
pub(crate) fn sort_by_keys(items: &[Value], keys: &[(Func<'_>, bool)]) -> Result<Value> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = keys
            .iter()
            .map(|(f, _)| f.call(item))
            .collect::<Result<Vec<_>>>()?;
        keyed.push((key, item));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for (i, (_, descending)) in keys.iter().enumerate() {
            let ord = sort_order(&a[i], &b[i]);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    list(keyed.into_iter().map(|(_, item)| item.clone()).collect())
}
