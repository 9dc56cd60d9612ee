// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native methods and functions callable from expressions.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use lenq_ast::Value;

use crate::ExecError;

/// Instance method: receives the (non-null) target and the arguments.
pub type MethodFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value, ExecError>>;
/// Static function.
pub type FunctionFn = Rc<dyn Fn(&[Value]) -> Result<Value, ExecError>>;

/// Methods keyed by (owner type, name); functions keyed by (owner, name).
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<(String, String), MethodFn>,
    functions: HashMap<(String, String), FunctionFn>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self
            .methods
            .keys()
            .map(|(t, n)| format!("{}.{}", t, n))
            .collect();
        let mut functions: Vec<_> = self
            .functions
            .keys()
            .map(|(o, n)| format!("{}.{}", o, n))
            .collect();
        methods.sort();
        functions.sort();
        f.debug_struct("MethodRegistry")
            .field("methods", &methods)
            .field("functions", &functions)
            .finish()
    }
}

impl MethodRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the string and math builtins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register(&mut registry);
        registry
    }

    pub fn register_method(
        &mut self,
        owner: &str,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> Result<Value, ExecError> + 'static,
    ) {
        self.methods
            .insert((owner.to_string(), name.to_string()), Rc::new(f));
    }

    pub fn register_function(
        &mut self,
        owner: &str,
        name: &str,
        f: impl Fn(&[Value]) -> Result<Value, ExecError> + 'static,
    ) {
        self.functions
            .insert((owner.to_string(), name.to_string()), Rc::new(f));
    }

    pub fn method(&self, owner: &str, name: &str) -> Option<&MethodFn> {
        self.methods.get(&(owner.to_string(), name.to_string()))
    }

    pub fn function(&self, owner: &str, name: &str) -> Option<&FunctionFn> {
        self.functions.get(&(owner.to_string(), name.to_string()))
    }

    pub fn has_method(&self, owner: &str, name: &str) -> bool {
        self.method(owner, name).is_some()
    }

    pub fn has_function(&self, owner: &str, name: &str) -> bool {
        self.function(owner, name).is_some()
    }
}

mod builtins {
    use lenq_ast::Value;

    use super::MethodRegistry;
    use crate::method_names::{MATH_FUNCTIONS, STRING_FUNCTIONS, STRING_METHODS};
    use crate::ExecError;

    type Result<T> = std::result::Result<T, ExecError>;

    pub(super) fn register(registry: &mut MethodRegistry) {
        for &name in STRING_METHODS {
            registry.register_method("String", name, move |target, args| {
                string_method(name, target, args)
            });
        }
        for &name in STRING_FUNCTIONS {
            registry.register_function("string", name, move |args| {
                string_function(name, args)
            });
        }
        for &name in MATH_FUNCTIONS {
            registry.register_function("math", name, move |args| math_function(name, args));
        }
    }

    fn string_method(name: &str, target: &Value, args: &[Value]) -> Result<Value> {
        let s = str_arg(target)?;
        match name {
            "contains" | "starts_with" | "ends_with" => {
                let [needle] = args else {
                    return Err(ExecError::ArityMismatch { expected: 1, got: args.len() });
                };
                let needle = str_arg(needle)?;
                let found = match name {
                    "contains" => s.contains(needle),
                    "starts_with" => s.starts_with(needle),
                    _ => s.ends_with(needle),
                };
                Ok(Value::Bool(found))
            }
            "to_upper" => Ok(Value::string(s.to_uppercase())),
            "to_lower" => Ok(Value::string(s.to_lowercase())),
            "trim" => Ok(Value::string(s.trim())),
            _ => Err(ExecError::NoSuchMethod {
                ty: "String".to_string(),
                method: name.to_string(),
            }),
        }
    }

    fn string_function(name: &str, args: &[Value]) -> Result<Value> {
        match (name, args) {
            ("is_null_or_empty", [Value::Null]) => Ok(Value::Bool(true)),
            ("is_null_or_empty", [value]) => Ok(Value::Bool(str_arg(value)?.is_empty())),
            ("is_null_or_empty", _) => Err(ExecError::ArityMismatch {
                expected: 1,
                got: args.len(),
            }),
            _ => Err(ExecError::NoSuchFunction {
                owner: "string".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn math_function(name: &str, args: &[Value]) -> Result<Value> {
        match (name, args) {
            (_, [Value::Null, ..]) | (_, [_, Value::Null]) => Ok(Value::Null),
            ("abs", [Value::Int(n)]) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or(ExecError::Overflow { op: "abs" }),
            ("abs", [Value::Float(x)]) => Ok(Value::Float(x.abs())),
            // Banker's rounding, matching the usual decimal default
            ("round", [Value::Float(x)]) => Ok(Value::Float(x.round_ties_even())),
            ("round", [Value::Int(n)]) => Ok(Value::Int(*n)),
            ("min" | "max", [Value::Int(a), Value::Int(b)]) => {
                Ok(Value::Int(if name == "min" { *a.min(b) } else { *a.max(b) }))
            }
            ("min" | "max", [a, b]) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => {
                    Ok(Value::Float(if name == "min" { a.min(b) } else { a.max(b) }))
                }
                _ => Err(numeric_error(name, args)),
            },
            ("abs" | "round", [_]) => Err(numeric_error(name, args)),
            ("abs" | "round", _) => Err(ExecError::ArityMismatch { expected: 1, got: args.len() }),
            ("min" | "max", _) => Err(ExecError::ArityMismatch { expected: 2, got: args.len() }),
            _ => Err(ExecError::NoSuchFunction {
                owner: "math".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn str_arg(value: &Value) -> Result<&str> {
        value.as_str().ok_or_else(|| {
            ExecError::TypeError(format!("expected string, found {}", value.type_name()))
        })
    }

    fn numeric_error(name: &str, args: &[Value]) -> ExecError {
        let types: Vec<_> = args.iter().map(Value::type_name).collect();
        ExecError::TypeError(format!("math.{} expects numbers, got ({})", name, types.join(", ")))
    }
}
