// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Static types carried by expression nodes.

use std::fmt;

use crate::value::Value;

/// The static type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ty {
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float, also used for decimal fields
    Float,
    String,
    /// Value type that may be absent (`int?`)
    Nullable(Box<Ty>),
    /// Named record type; reference semantics
    Record(String),
    /// Materialized list or array
    List(Box<Ty>),
    /// Directly iterable in-memory sequence
    Sequence(Box<Ty>),
    /// Provider-level sequence; operations on it are deferred
    Queryable(Box<Ty>),
    /// Delegate type
    Func { params: Vec<Ty>, ret: Box<Ty> },
    /// Quoted lambda (an expression of a delegate type)
    Quoted(Box<Ty>),
    /// Any reference
    Object,
}

impl Ty {
    pub fn nullable(inner: Ty) -> Ty {
        match inner {
            Ty::Nullable(_) => inner,
            other if other.is_value_type() => Ty::Nullable(Box::new(other)),
            other => other,
        }
    }

    pub fn record(name: impl Into<String>) -> Ty {
        Ty::Record(name.into())
    }

    pub fn list(elem: Ty) -> Ty {
        Ty::List(Box::new(elem))
    }

    pub fn sequence(elem: Ty) -> Ty {
        Ty::Sequence(Box::new(elem))
    }

    pub fn queryable(elem: Ty) -> Ty {
        Ty::Queryable(Box::new(elem))
    }

    pub fn func(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Func { params, ret: Box::new(ret) }
    }

    pub fn quoted(func: Ty) -> Ty {
        Ty::Quoted(Box::new(func))
    }

    /// Value types are copied rather than referenced. `Nullable` counts as a
    /// value type: its members never dereference.
    pub fn is_value_type(&self) -> bool {
        matches!(self, Ty::Bool | Ty::Int | Ty::Float | Ty::Nullable(_))
    }

    /// Whether a value of this type may be `Null` at runtime.
    pub fn can_be_null(&self) -> bool {
        !matches!(self, Ty::Bool | Ty::Int | Ty::Float)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    /// Strip one level of `Nullable`.
    pub fn non_nullable(&self) -> &Ty {
        match self {
            Ty::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Element type of a sequence-like type, or `None` for scalars.
    pub fn element_type(&self) -> Option<&Ty> {
        match self {
            Ty::List(elem) | Ty::Sequence(elem) | Ty::Queryable(elem) => Some(elem),
            _ => None,
        }
    }

    /// The value `default(T)` evaluates to.
    pub fn default_value(&self) -> Value {
        match self {
            Ty::Bool => Value::Bool(false),
            Ty::Int => Value::Int(0),
            Ty::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Whether a value of type `other` can be passed where `self` is expected
    /// without a conversion node.
    pub fn is_assignable_from(&self, other: &Ty) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Ty::Object, other) => other.can_be_null() && !other.is_nullable(),
            (Ty::Sequence(want), Ty::List(have) | Ty::Queryable(have) | Ty::Sequence(have)) => {
                want == have || (**want == Ty::Object && have.can_be_null())
            }
            (Ty::Quoted(want), Ty::Quoted(have)) => want.is_assignable_from(have),
            (Ty::Func { params: wp, ret: wr }, Ty::Func { params: hp, ret: hr }) => {
                wp == hp && wr.is_assignable_from(hr)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Float => write!(f, "float"),
            Ty::String => write!(f, "string"),
            Ty::Nullable(inner) => write!(f, "{}?", inner),
            Ty::Record(name) => write!(f, "{}", name),
            Ty::List(elem) => write!(f, "List<{}>", elem),
            Ty::Sequence(elem) => write!(f, "Sequence<{}>", elem),
            Ty::Queryable(elem) => write!(f, "Queryable<{}>", elem),
            Ty::Func { params, ret } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Ty::Quoted(func) => write!(f, "Quoted<{}>", func),
            Ty::Object => write!(f, "object"),
        }
    }
}
