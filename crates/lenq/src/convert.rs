// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversion of result values into Rust types.

use std::rc::Rc;

use lenq_ast::{Record, Value};

use crate::error::{Error, Result};

/// A Rust type a query result can be read as.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T> {
    Err(Error::Conversion {
        expected,
        found: value.type_name().to_string(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(n),
            other => mismatch("i64", &other),
        }
    }
}

/// Ints widen.
impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(n) => Ok(n as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => mismatch("String", &other),
        }
    }
}

impl FromValue for Rc<Record> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Record(r) => Ok(r),
            other => mismatch("record", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items.iter().cloned().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(i64::from_value(Value::Int(3)), Ok(3));
        assert_eq!(f64::from_value(Value::Int(3)), Ok(3.0));
        assert_eq!(String::from_value(Value::string("a")), Ok("a".to_string()));
        assert!(matches!(
            bool::from_value(Value::Null),
            Err(Error::Conversion { expected: "bool", .. })
        ));
    }

    #[test]
    fn null_needs_an_option() {
        assert_eq!(Option::<String>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(Value::Int(1)), Ok(Some(1)));
        assert!(String::from_value(Value::Null).is_err());
    }

    #[test]
    fn lists() {
        let list = Value::list(vec![Value::Int(1), Value::Null]);
        assert_eq!(Vec::<Option<i64>>::from_value(list.clone()), Ok(vec![Some(1), None]));
        assert!(Vec::<i64>::from_value(list).is_err());
    }
}
