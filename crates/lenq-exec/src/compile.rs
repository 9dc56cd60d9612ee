// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Closure compiler.
//!
//! Each node compiles to a closure taking the current [`Frame`] and
//! returning a [`Value`]. Parameters are resolved at compile time to a
//! (depth, index) slot so no name lookup happens while running.

use std::rc::Rc;

use lenq_ast::{
    BinOp, Expr, ExprKind, MethodKind, MethodRef, NewExpr, Param, Record, Ty, UnaryOp, Value,
};

use crate::operators;
use crate::registry::MethodRegistry;
use crate::sequence::{self, OpArg, OpCall};
use crate::ExecError;

type Result<T> = std::result::Result<T, ExecError>;

pub(crate) type Compiled = Rc<dyn Fn(&Frame<'_>) -> Result<Value>>;

/// Parameter values of the innermost lambda invocation, linked to the
/// frames of enclosing lambdas.
pub(crate) struct Frame<'a> {
    values: &'a [Value],
    parent: Option<&'a Frame<'a>>,
}

impl Frame<'static> {
    pub(crate) const ROOT: Frame<'static> = Frame { values: &[], parent: None };
}

impl<'a> Frame<'a> {
    fn lookup(&self, depth: usize, index: usize) -> Option<&Value> {
        let mut frame = self;
        for _ in 0..depth {
            frame = frame.parent?;
        }
        frame.values.get(index)
    }
}

/// A compiled single-parameter lambda.
pub(crate) struct CompiledLambda {
    body: Compiled,
}

/// A compiled lambda bound to the frame it was passed from.
#[derive(Clone, Copy)]
pub(crate) struct Func<'a> {
    lambda: &'a CompiledLambda,
    frame: &'a Frame<'a>,
}

impl Func<'_> {
    pub(crate) fn call(&self, arg: &Value) -> Result<Value> {
        let frame = Frame {
            values: std::slice::from_ref(arg),
            parent: Some(self.frame),
        };
        (self.lambda.body)(&frame)
    }
}

/// A compiled operation argument.
enum ArgCode {
    Value(Compiled),
    Func(Rc<CompiledLambda>),
}

impl ArgCode {
    fn eval<'a>(&'a self, frame: &'a Frame<'a>) -> Result<OpArg<'a>> {
        match self {
            ArgCode::Value(code) => Ok(OpArg::Value(code(frame)?)),
            ArgCode::Func(lambda) => Ok(OpArg::Func(Func { lambda, frame })),
        }
    }
}

pub(crate) fn is_ordering(name: &str) -> bool {
    matches!(
        name,
        "order_by" | "order_by_descending" | "then_by" | "then_by_descending"
    )
}

pub(crate) struct Compiler<'r> {
    registry: &'r MethodRegistry,
    scopes: Vec<Vec<Param>>,
}

impl<'r> Compiler<'r> {
    pub(crate) fn new(registry: &'r MethodRegistry) -> Self {
        Self {
            registry,
            scopes: Vec::new(),
        }
    }

    pub(crate) fn compile(&mut self, expr: &Expr) -> Result<Compiled> {
        match expr.kind() {
            ExprKind::Constant { value: Value::Query(_), .. } => {
                Err(ExecError::Unsupported { kind: "query placeholder" })
            }
            ExprKind::Constant { value, .. } => {
                let value = value.clone();
                Ok(code(move |_| Ok(value.clone())))
            }
            ExprKind::Default(ty) => {
                let value = ty.default_value();
                Ok(code(move |_| Ok(value.clone())))
            }
            ExprKind::Parameter(param) => {
                let (depth, index) = self.resolve(param)?;
                let name = param.name.clone();
                Ok(code(move |frame| {
                    frame
                        .lookup(depth, index)
                        .cloned()
                        .ok_or_else(|| ExecError::UnboundParameter(name.clone()))
                }))
            }
            ExprKind::Member { target, member } => {
                let target_ty = target.ty();
                let target = self.compile(target)?;
                let name = member.name.clone();
                if target_ty.is_nullable() {
                    return Ok(code(move |frame| {
                        operators::nullable_member(target(frame)?, &name)
                    }));
                }
                Ok(code(move |frame| {
                    operators::member(&target(frame)?, &name, &target_ty)
                }))
            }
            ExprKind::Call { target, method, args } => match target {
                Some(target) => self.compile_method(target, method, args),
                None => match method.kind {
                    MethodKind::Sequence if is_ordering(&method.name) => {
                        self.compile_ordering(method, args)
                    }
                    MethodKind::Sequence => self.compile_operation(method, args),
                    MethodKind::Static => self.compile_function(method, args),
                    MethodKind::Provider => Err(ExecError::Unlowered(method.name.clone())),
                    MethodKind::Instance => Err(ExecError::TypeError(format!(
                        "instance method `{}` called without a target",
                        method.name
                    ))),
                },
            },
            ExprKind::Unary { op: UnaryOp::Quote, .. } => {
                Err(ExecError::Unsupported { kind: "Quote" })
            }
            ExprKind::Unary { op, operand, ty, .. } => {
                let (op, ty) = (*op, ty.clone());
                let operand = self.compile(operand)?;
                Ok(code(move |frame| operators::unary(op, operand(frame)?, &ty)))
            }
            ExprKind::Binary { op, left, right, method } => {
                self.compile_binary(*op, left, right, method.as_ref())
            }
            ExprKind::Conditional { test, if_true, if_false, .. } => {
                let test = self.compile(test)?;
                let if_true = self.compile(if_true)?;
                let if_false = self.compile(if_false)?;
                Ok(code(move |frame| {
                    if operators::truthy(&test(frame)?)? {
                        if_true(frame)
                    } else {
                        if_false(frame)
                    }
                }))
            }
            ExprKind::New(new) => self.compile_new(new),
            ExprKind::MemberInit { new, bindings } => {
                let new = self.compile_new(new)?;
                let bindings = bindings
                    .iter()
                    .map(|b| Ok((b.member.name.clone(), self.compile(&b.value)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(code(move |frame| {
                    let Value::Record(record) = new(frame)? else {
                        return Err(ExecError::TypeError(
                            "member initializer on a non-record".to_string(),
                        ));
                    };
                    let mut record = Rc::unwrap_or_clone(record);
                    for (name, value) in &bindings {
                        record.set(name.clone(), value(frame)?);
                    }
                    Ok(Value::from(record))
                }))
            }
            ExprKind::ListInit { groups, .. } => {
                let groups = groups
                    .iter()
                    .map(|g| self.compile_all(g))
                    .collect::<Result<Vec<_>>>()?;
                Ok(code(move |frame| {
                    let mut items = Vec::with_capacity(groups.len());
                    for group in &groups {
                        // Multi-argument adds become tuples
                        let mut values = eval_all(group, frame)?;
                        if values.len() == 1 {
                            items.extend(values.pop());
                        } else {
                            items.push(Value::list(values));
                        }
                    }
                    Ok(Value::list(items))
                }))
            }
            ExprKind::ArrayInit { elements, .. } => {
                let elements = self.compile_all(elements)?;
                Ok(code(move |frame| Ok(Value::list(eval_all(&elements, frame)?))))
            }
            ExprKind::Lambda { .. } => Err(ExecError::Unsupported { kind: "Lambda" }),
        }
    }

    fn compile_all(&mut self, exprs: &[Expr]) -> Result<Vec<Compiled>> {
        exprs.iter().map(|e| self.compile(e)).collect()
    }

    fn resolve(&self, param: &Param) -> Result<(usize, usize)> {
        self.scopes
            .iter()
            .rev()
            .enumerate()
            .find_map(|(depth, scope)| {
                scope
                    .iter()
                    .position(|p| p.name == param.name)
                    .map(|index| (depth, index))
            })
            .ok_or_else(|| ExecError::UnboundParameter(param.name.clone()))
    }

    fn compile_lambda(&mut self, expr: &Expr) -> Result<Rc<CompiledLambda>> {
        let Some((params, body)) = expr.as_lambda() else {
            return Err(ExecError::TypeError(format!(
                "expected a lambda, found {}",
                expr.kind_name()
            )));
        };
        if params.len() != 1 {
            return Err(ExecError::ArityMismatch { expected: 1, got: params.len() });
        }
        self.scopes.push(params.to_vec());
        let body = self.compile(body);
        self.scopes.pop();
        Ok(Rc::new(CompiledLambda { body: body? }))
    }

    fn compile_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        method: Option<&MethodRef>,
    ) -> Result<Compiled> {
        let l = self.compile(left)?;
        let r = self.compile(right)?;
        if let Some(method) = method {
            let f = self.function(method)?;
            return Ok(code(move |frame| f(&[l(frame)?, r(frame)?])));
        }
        let compiled = match op {
            BinOp::AndAlso => code(move |frame| {
                Ok(Value::Bool(
                    operators::truthy(&l(frame)?)? && operators::truthy(&r(frame)?)?,
                ))
            }),
            BinOp::OrElse => code(move |frame| {
                Ok(Value::Bool(
                    operators::truthy(&l(frame)?)? || operators::truthy(&r(frame)?)?,
                ))
            }),
            BinOp::Coalesce => code(move |frame| match l(frame)? {
                Value::Null => r(frame),
                value => Ok(value),
            }),
            _ => code(move |frame| operators::binary(op, &l(frame)?, &r(frame)?)),
        };
        Ok(compiled)
    }

    fn compile_new(&mut self, new: &NewExpr) -> Result<Compiled> {
        let args = self.compile_all(&new.args)?;
        match &new.ty {
            Ty::Record(name) => {
                let name = name.clone();
                let members = new.members.clone();
                Ok(code(move |frame| {
                    let mut record = Record::new(name.clone());
                    for (member, arg) in members.iter().zip(&args) {
                        record.set(member.clone(), arg(frame)?);
                    }
                    Ok(Value::from(record))
                }))
            }
            Ty::List(_) | Ty::Sequence(_) => Ok(code(|_| Ok(Value::list(Vec::new())))),
            other => Err(ExecError::TypeError(format!("cannot construct `{}`", other))),
        }
    }

    fn function(&self, method: &MethodRef) -> Result<crate::FunctionFn> {
        self.registry
            .function(&method.owner, &method.name)
            .cloned()
            .ok_or_else(|| ExecError::NoSuchFunction {
                owner: method.owner.clone(),
                name: method.name.clone(),
            })
    }

    fn compile_function(&mut self, method: &MethodRef, args: &[Expr]) -> Result<Compiled> {
        let f = self.function(method)?;
        let args = self.compile_all(args)?;
        Ok(code(move |frame| f(&eval_all(&args, frame)?)))
    }

    fn compile_method(
        &mut self,
        target: &Expr,
        method: &MethodRef,
        args: &[Expr],
    ) -> Result<Compiled> {
        let f = self
            .registry
            .method(&method.owner, &method.name)
            .cloned()
            .ok_or_else(|| ExecError::NoSuchMethod {
                ty: method.owner.clone(),
                method: method.name.clone(),
            })?;
        let target = self.compile(target)?;
        let args = self.compile_all(args)?;
        let (owner, name) = (method.owner.clone(), method.name.clone());
        Ok(code(move |frame| {
            let this = target(frame)?;
            if this.is_null() {
                return Err(ExecError::NullReference {
                    member: name.clone(),
                    ty: owner.clone(),
                });
            }
            f(&this, &eval_all(&args, frame)?)
        }))
    }

    fn compile_operation(&mut self, method: &MethodRef, args: &[Expr]) -> Result<Compiled> {
        let op = sequence::lookup(&method.name)
            .ok_or_else(|| ExecError::UnknownOperation(method.name.clone()))?;
        let Some((source, rest)) = args.split_first() else {
            return Err(ExecError::ArityMismatch { expected: 1, got: 0 });
        };
        let source = self.compile(source)?;
        let rest = rest
            .iter()
            .map(|arg| {
                if arg.as_lambda().is_some() {
                    Ok(ArgCode::Func(self.compile_lambda(arg)?))
                } else {
                    Ok(ArgCode::Value(self.compile(arg)?))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let name = method.name.clone();
        let element_default = method
            .type_args
            .first()
            .map_or(Value::Null, Ty::default_value);
        let ret = method.ret.clone();
        Ok(code(move |frame| {
            let items = sequence::items(source(frame)?, &name)?;
            let args = rest
                .iter()
                .map(|arg| arg.eval(frame))
                .collect::<Result<Vec<_>>>()?;
            op(&OpCall {
                items: &items,
                args,
                element_default: &element_default,
                ret: &ret,
            })
        }))
    }

    /// `order_by(..).then_by(..)...` compiles into one stable multi-key sort.
    fn compile_ordering(&mut self, method: &MethodRef, args: &[Expr]) -> Result<Compiled> {
        let mut keys = Vec::new();
        let (mut method, mut args) = (method, args);
        let source = loop {
            let [source, key] = args else {
                return Err(ExecError::ArityMismatch { expected: 2, got: args.len() });
            };
            keys.push((key, method.name.ends_with("_descending")));
            let chained = method.name.starts_with("then_by");
            match source.kind() {
                ExprKind::Call { target: None, method: inner, args: inner_args }
                    if chained && inner.kind == MethodKind::Sequence && is_ordering(&inner.name) =>
                {
                    method = inner;
                    args = inner_args.as_slice();
                }
                _ => break source,
            }
        };
        keys.reverse();

        let source = self.compile(source)?;
        let keys = keys
            .into_iter()
            .map(|(key, descending)| Ok((self.compile_lambda(key)?, descending)))
            .collect::<Result<Vec<_>>>()?;
        Ok(code(move |frame| {
            let items = sequence::items(source(frame)?, "order_by")?;
            let keys: Vec<_> = keys
                .iter()
                .map(|(lambda, descending)| (Func { lambda, frame }, *descending))
                .collect();
            sequence::sort_by_keys(&items, &keys)
        }))
    }
}

fn code(f: impl Fn(&Frame<'_>) -> Result<Value> + 'static) -> Compiled {
    Rc::new(f)
}

fn eval_all(code: &[Compiled], frame: &Frame<'_>) -> Result<Vec<Value>> {
    code.iter().map(|c| c(frame)).collect()
}
