// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Provider-call binding and lowering.

use std::rc::Rc;

use lenq_ast::{
    Expr, ExprKind, MemberBinding, MethodKind, MethodRef, NewExpr, QuerySource, Ty, Value,
};
use lenq_guard::{NullGuardRewriter, NullNavigationPolicy};
use tracing::{debug, trace};

use crate::ops::{self, Flavor, OpDef, ParamShape};
use crate::LowerError;

type Result<T> = std::result::Result<T, LowerError>;

/// Binds composed operations and lowers finished plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanLowerer {
    rewriter: NullGuardRewriter,
}

impl PlanLowerer {
    pub fn new(policy: NullNavigationPolicy) -> Self {
        Self {
            rewriter: NullGuardRewriter::new(policy),
        }
    }

    pub fn rewriter(&self) -> &NullGuardRewriter {
        &self.rewriter
    }

    /// Build the provider call `name(source, args...)` over a source of
    /// `element_ty`. Lambda arguments are quoted; type arguments are
    /// inferred from the element type and selector bodies.
    pub fn bind_provider_call(
        &self,
        name: &str,
        source: Expr,
        element_ty: &Ty,
        args: Vec<Expr>,
    ) -> Result<Expr> {
        if !ops::has_operation(name) {
            return Err(LowerError::UnknownOperation(name.to_string()));
        }

        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(source);
        all.extend(args.into_iter().map(|arg| {
            if arg.as_lambda().is_some() {
                Expr::quote(arg)
            } else {
                arg
            }
        }));

        for op in ops::lookup(name).filter(|op| op.params.len() == all.len()) {
            let type_args = infer_type_args(op, element_ty, &all)?;
            if !params_match(op, Flavor::Provider, &type_args, &all, false) {
                continue;
            }
            let Some(ret) = op.return_ty(Flavor::Provider, &type_args) else {
                continue;
            };
            debug!(op = name, arity = all.len(), ret = %ret, "lenq.lower.bind");
            return Ok(Expr::call(None, MethodRef::provider(name, type_args, ret), all));
        }

        Err(LowerError::NoMatchingMethod {
            name: name.to_string(),
            shapes: shapes(&all),
        })
    }

    /// Guard the quoted lambda arguments of a provider call. Anything else is
    /// returned unchanged.
    pub fn rewrite_query_call(&self, call: &Expr) -> Result<Expr> {
        let ExprKind::Call { target, method, args } = call.kind() else {
            return Ok(call.clone());
        };
        if method.kind != MethodKind::Provider || !args.iter().any(|a| a.unquote().is_some()) {
            return Ok(call.clone());
        }
        let args = args
            .iter()
            .map(|arg| match arg.unquote() {
                Some(lambda) => Ok(Expr::quote(self.rewriter.rewrite_lambda(lambda)?)),
                None => Ok(arg.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::call(target.clone(), method.clone(), args))
    }

    /// Bind and guard in one step.
    pub fn compose(
        &self,
        name: &str,
        source: Expr,
        element_ty: &Ty,
        args: Vec<Expr>,
    ) -> Result<Expr> {
        let call = self.bind_provider_call(name, source, element_ty, args)?;
        self.rewrite_query_call(&call)
    }

    /// Lower a plan so that it only contains sequence operations over
    /// in-memory data.
    pub fn lower(&self, expr: &Expr) -> Result<Expr> {
        let out = self.visit(expr)?;
        trace!(plan = %out, "lenq.lower.done");
        Ok(out)
    }

    fn visit(&self, expr: &Expr) -> Result<Expr> {
        let out = match expr.kind() {
            ExprKind::Constant { value: Value::Query(query), .. } => {
                return self.lower_placeholder(query);
            }
            ExprKind::Constant { .. } | ExprKind::Parameter(_) | ExprKind::Default(_) => {
                expr.clone()
            }
            ExprKind::Member { target, member } => Expr::new(ExprKind::Member {
                target: self.visit(target)?,
                member: member.clone(),
            }),
            ExprKind::Call { target, method, args } => {
                let target = target.as_ref().map(|t| self.visit(t)).transpose()?;
                let refines = ops::is_refinement(&method.name);
                let args = if method.kind == MethodKind::Provider && refines {
                    self.visit_refined(args)?
                } else {
                    self.visit_all(args)?
                };
                if method.kind == MethodKind::Provider {
                    return self.resolve(method, args);
                }
                Expr::call(target, method.clone(), args)
            }
            ExprKind::Unary { op, operand, ty, lifted } => Expr::new(ExprKind::Unary {
                op: *op,
                operand: self.visit(operand)?,
                ty: ty.clone(),
                lifted: *lifted,
            }),
            ExprKind::Binary { op, left, right, method } => Expr::new(ExprKind::Binary {
                op: *op,
                left: self.visit(left)?,
                right: self.visit(right)?,
                method: method.clone(),
            }),
            ExprKind::Conditional { test, if_true, if_false, ty } => Expr::conditional(
                self.visit(test)?,
                self.visit(if_true)?,
                self.visit(if_false)?,
                ty.clone(),
            ),
            ExprKind::New(new) => Expr::new_object(self.visit_new(new)?),
            ExprKind::MemberInit { new, bindings } => {
                let bindings = bindings
                    .iter()
                    .map(|b| {
                        Ok(MemberBinding {
                            member: b.member.clone(),
                            value: self.visit(&b.value)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Expr::member_init(self.visit_new(new)?, bindings)
            }
            ExprKind::ListInit { new, groups } => {
                let groups = groups
                    .iter()
                    .map(|g| self.visit_all(g))
                    .collect::<Result<Vec<_>>>()?;
                Expr::list_init(self.visit_new(new)?, groups)
            }
            ExprKind::ArrayInit { elem_ty, elements } => {
                Expr::array_init(elem_ty.clone(), self.visit_all(elements)?)
            }
            ExprKind::Lambda { params, body } => Expr::lambda(params.clone(), self.visit(body)?),
        };
        Ok(out)
    }

    fn visit_all(&self, exprs: &[Expr]) -> Result<Vec<Expr>> {
        exprs.iter().map(|e| self.visit(e)).collect()
    }

    /// The source of a `then_by` keeps its ordering call, so a placeholder
    /// is replaced by its plan even when its items are already cached.
    fn visit_refined(&self, args: &[Expr]) -> Result<Vec<Expr>> {
        let mut out = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            match arg.kind() {
                ExprKind::Constant { value: Value::Query(query), .. } if i == 0 => {
                    trace!("lenq.lower.placeholder.ordered");
                    out.push(self.visit(&query.expression())?);
                }
                _ => out.push(self.visit(arg)?),
            }
        }
        Ok(out)
    }

    fn visit_new(&self, new: &NewExpr) -> Result<NewExpr> {
        Ok(NewExpr {
            ty: new.ty.clone(),
            members: new.members.clone(),
            args: self.visit_all(&new.args)?,
        })
    }

    /// Materialized data becomes a constant sequence; a pending query is
    /// replaced by its own lowered plan.
    fn lower_placeholder(&self, query: &Rc<dyn QuerySource>) -> Result<Expr> {
        match query.materialized() {
            Some(items) => {
                trace!(items = items.len(), "lenq.lower.placeholder.materialized");
                Ok(Expr::constant(
                    Value::List(items),
                    Ty::sequence(query.element_ty().clone()),
                ))
            }
            None => {
                trace!("lenq.lower.placeholder.pending");
                self.visit(&query.expression())
            }
        }
    }

    /// Re-bind a provider call to the sequence operation of the same name
    /// and shape.
    fn resolve(&self, method: &MethodRef, args: Vec<Expr>) -> Result<Expr> {
        let name = method.name.as_str();
        if !ops::has_operation(name) {
            return Err(LowerError::UnknownOperation(method.name.clone()));
        }
        let type_args = &method.type_args;
        let resolved = ops::lookup(name).find(|op| {
            op.params.len() == args.len()
                && op.generics == type_args.len()
                && params_match(op, Flavor::Sequence, type_args, &args, true)
        });
        let Some(op) = resolved else {
            return Err(LowerError::NoMatchingMethod {
                name: method.name.clone(),
                shapes: shapes(&args),
            });
        };
        let ret = op
            .return_ty(Flavor::Sequence, type_args)
            .ok_or_else(|| LowerError::TypeInference {
                name: method.name.clone(),
                reason: format!("{} type arguments given", type_args.len()),
            })?;

        let args = args
            .into_iter()
            .enumerate()
            .map(|(i, arg)| match op.param_ty(i, Flavor::Sequence, type_args) {
                Some(param) => fixup(arg, &param),
                None => arg,
            })
            .collect();
        debug!(op = name, ret = %ret, "lenq.lower.resolve");
        Ok(Expr::call(None, MethodRef::sequence(name, type_args.clone(), ret), args))
    }
}

/// `T0` is the element type; `T1` is the body type of the selector.
fn infer_type_args(op: &OpDef, element_ty: &Ty, args: &[Expr]) -> Result<Vec<Ty>> {
    let mut type_args = vec![element_ty.clone()];
    if op.generics < 2 {
        return Ok(type_args);
    }
    let selector = op
        .params
        .iter()
        .position(|p| *p == ParamShape::Selector)
        .and_then(|i| args.get(i))
        .and_then(|arg| arg.unquote().unwrap_or(arg).as_lambda());
    match selector {
        Some((params, body)) if params.len() == 1 => {
            type_args.push(body.ty());
            Ok(type_args)
        }
        Some((params, _)) => Err(LowerError::TypeInference {
            name: op.name.to_string(),
            reason: format!("selector takes {} parameters, expected 1", params.len()),
        }),
        None => Err(LowerError::TypeInference {
            name: op.name.to_string(),
            reason: "selector argument is not a lambda".to_string(),
        }),
    }
}

fn params_match(
    op: &OpDef,
    flavor: Flavor,
    type_args: &[Ty],
    args: &[Expr],
    strip_quotes: bool,
) -> bool {
    args.iter().enumerate().all(|(i, arg)| {
        let Some(param) = op.param_ty(i, flavor, type_args) else {
            return false;
        };
        if param.is_assignable_from(&arg.ty()) {
            return true;
        }
        strip_quotes && arg.unquote().is_some_and(|inner| param.is_assignable_from(&inner.ty()))
    })
}

/// Make `arg` match `param` structurally.
fn fixup(arg: Expr, param: &Ty) -> Expr {
    if arg.ty() == *param {
        return arg;
    }
    if let Some(inner) = arg.unquote() {
        return fixup(inner.clone(), param);
    }
    if let ExprKind::ArrayInit { elem_ty, elements } = arg.kind() {
        if let Some(want) = param.element_type() {
            if want != elem_ty {
                let elements = elements.iter().map(|e| fixup(e.clone(), want)).collect();
                return Expr::array_init(want.clone(), elements);
            }
        }
    }
    arg
}

fn shapes(args: &[Expr]) -> String {
    args.iter()
        .map(|a| a.ty().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use lenq_ast::{BinOp, Param, Record};

    use super::*;

    struct Source {
        ty: Ty,
        items: Option<Rc<Vec<Value>>>,
        pending: Option<Expr>,
    }

    impl QuerySource for Source {
        fn element_ty(&self) -> &Ty {
            &self.ty
        }

        fn materialized(&self) -> Option<Rc<Vec<Value>>> {
            self.items.clone()
        }

        fn expression(&self) -> Expr {
            self.pending
                .clone()
                .unwrap_or_else(|| Expr::default_of(Ty::queryable(self.ty.clone())))
        }
    }

    fn level0() -> Ty {
        Ty::record("Level0")
    }

    fn materialized() -> Expr {
        let items = vec![Value::from(Record::new("Level0").with("Name", "a"))];
        let source: Rc<dyn QuerySource> = Rc::new(Source {
            ty: level0(),
            items: Some(Rc::new(items)),
            pending: None,
        });
        Expr::constant(Value::Query(source), Ty::queryable(level0()))
    }

    fn one() -> Vec<Expr> {
        vec![Expr::constant(1i64, Ty::Int)]
    }

    fn name_of() -> Expr {
        let x = Param::new("x", level0());
        Expr::lambda(vec![x.clone()], Expr::param(&x).member("Name", Ty::String))
    }

    fn l1_decimal_above(limit: f64) -> Expr {
        let x = Param::new("x", level0());
        Expr::lambda(
            vec![x.clone()],
            Expr::binary(
                BinOp::GreaterThan,
                Expr::param(&x).member("L1", Ty::record("Level1")).member("Decimal", Ty::Float),
                Expr::constant(limit, Ty::Float),
            ),
        )
    }

    #[test]
    fn bind_where_quotes_the_predicate() {
        let lowerer = PlanLowerer::default();
        let call = lowerer
            .bind_provider_call("where", materialized(), &level0(), vec![l1_decimal_above(25.0)])
            .unwrap();
        assert_eq!(call.ty(), Ty::queryable(level0()));
        let ExprKind::Call { method, args, .. } = call.kind() else {
            panic!("expected call");
        };
        assert_eq!(method.kind, MethodKind::Provider);
        assert_eq!(method.type_args, vec![level0()]);
        assert!(args[1].unquote().is_some());
    }

    #[test]
    fn bind_select_infers_result_type() {
        let call = PlanLowerer::default()
            .bind_provider_call("select", materialized(), &level0(), vec![name_of()])
            .unwrap();
        assert_eq!(call.ty(), Ty::queryable(Ty::String));
    }

    #[test]
    fn bind_picks_overload_by_arity() {
        let lowerer = PlanLowerer::default();
        let plain = lowerer
            .bind_provider_call("count", materialized(), &level0(), vec![])
            .unwrap();
        let filtered = lowerer
            .bind_provider_call("count", materialized(), &level0(), vec![l1_decimal_above(1.0)])
            .unwrap();
        assert_eq!(plain.ty(), Ty::Int);
        assert_eq!(filtered.ty(), Ty::Int);
    }

    #[test]
    fn bind_rejects_unknown_and_mismatched() {
        let lowerer = PlanLowerer::default();
        assert_eq!(
            lowerer.bind_provider_call("group_by", materialized(), &level0(), vec![]),
            Err(LowerError::UnknownOperation("group_by".into()))
        );
        let err = lowerer
            .bind_provider_call("where", materialized(), &level0(), one())
            .unwrap_err();
        assert_eq!(
            err,
            LowerError::NoMatchingMethod {
                name: "where".into(),
                shapes: "Queryable<Level0>, int".into(),
            }
        );
        let err = lowerer
            .bind_provider_call("select", materialized(), &level0(), one())
            .unwrap_err();
        assert!(matches!(err, LowerError::TypeInference { .. }));
    }

    #[test]
    fn compose_guards_lambda_bodies() {
        let call = PlanLowerer::default()
            .compose("where", materialized(), &level0(), vec![l1_decimal_above(25.0)])
            .unwrap();
        let ExprKind::Call { args, .. } = call.kind() else {
            panic!("expected call");
        };
        assert_eq!(
            args[1].to_string(),
            "x => ((x.L1 != null) && (IIF((x.L1 == null), default(float), x.L1.Decimal) > 25.0))"
        );
    }

    #[test]
    fn rewrite_query_call_ignores_other_nodes() {
        let lowerer = PlanLowerer::default();
        let e = Expr::constant(1i64, Ty::Int);
        assert_eq!(lowerer.rewrite_query_call(&e).unwrap(), e);
    }

    #[test]
    fn lower_rebinds_to_sequence_operations() {
        let lowerer = PlanLowerer::default();
        let filtered = lowerer
            .compose("where", materialized(), &level0(), vec![l1_decimal_above(25.0)])
            .unwrap();
        let projected = lowerer
            .compose("select", filtered, &level0(), vec![name_of()])
            .unwrap();

        let lowered = lowerer.lower(&projected).unwrap();
        assert_eq!(lowered.ty(), Ty::sequence(Ty::String));
        let ExprKind::Call { method, args, .. } = lowered.kind() else {
            panic!("expected call");
        };
        assert_eq!(method.kind, MethodKind::Sequence);
        assert_eq!(method.name, "select");
        assert!(args[1].as_lambda().is_some());

        let ExprKind::Call { method: inner, args: inner_args, .. } = args[0].kind() else {
            panic!("expected inner call");
        };
        assert_eq!(inner.kind, MethodKind::Sequence);
        assert_eq!(inner.name, "where");
        assert!(matches!(
            inner_args[0].kind(),
            ExprKind::Constant { value: Value::List(items), ty } if items.len() == 1 && *ty == Ty::sequence(level0())
        ));
    }

    #[test]
    fn lower_replaces_pending_placeholder_with_its_plan() {
        let lowerer = PlanLowerer::default();
        let pending = lowerer
            .compose("take", materialized(), &level0(), vec![Expr::constant(1i64, Ty::Int)])
            .unwrap();
        let source: Rc<dyn QuerySource> = Rc::new(Source {
            ty: level0(),
            items: None,
            pending: Some(pending),
        });
        let placeholder = Expr::constant(Value::Query(source), Ty::queryable(level0()));
        let count = lowerer.compose("count", placeholder, &level0(), vec![]).unwrap();

        let lowered = lowerer.lower(&count).unwrap();
        assert_eq!(
            lowered.to_string(),
            "Sequence.count(Sequence.take([Level0 { Name: \"a\" }], 1))"
        );
    }

    #[test]
    fn then_by_keeps_the_ordering_of_an_enumerated_source() {
        let lowerer = PlanLowerer::default();
        let ordered = lowerer
            .compose("order_by", materialized(), &level0(), vec![name_of()])
            .unwrap();
        let cached = vec![Value::from(Record::new("Level0").with("Name", "a"))];
        let source: Rc<dyn QuerySource> = Rc::new(Source {
            ty: level0(),
            items: Some(Rc::new(cached)),
            pending: Some(ordered),
        });
        let placeholder = Expr::constant(Value::Query(source), Ty::queryable(level0()));
        let refined = lowerer
            .compose("then_by", placeholder.clone(), &level0(), vec![name_of()])
            .unwrap();

        let lowered = lowerer.lower(&refined).unwrap();
        let ExprKind::Call { args, .. } = lowered.kind() else {
            panic!("expected call");
        };
        assert!(matches!(
            args[0].kind(),
            ExprKind::Call { method, .. } if method.name == "order_by"
        ));

        let counted = lowerer.compose("count", placeholder, &level0(), vec![]).unwrap();
        let lowered = lowerer.lower(&counted).unwrap();
        let ExprKind::Call { args, .. } = lowered.kind() else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind(), ExprKind::Constant { value: Value::List(_), .. }));
    }

    #[test]
    fn lower_reaches_into_lambda_bodies() {
        let lowerer = PlanLowerer::default();
        let x = Param::new("x", level0());
        let nested = lowerer
            .bind_provider_call("any", materialized(), &level0(), vec![])
            .unwrap();
        let lambda = Expr::lambda(vec![x], nested);
        let lowered = lowerer.lower(&lambda).unwrap();
        let (_, body) = lowered.as_lambda().unwrap();
        assert!(matches!(
            body.kind(),
            ExprKind::Call { method, .. } if method.kind == MethodKind::Sequence
        ));
    }

    #[test]
    fn lower_reports_mismatched_type_arguments() {
        let bogus = Expr::call(
            None,
            MethodRef::provider("where", vec![level0(), Ty::Int], Ty::queryable(level0())),
            vec![materialized()],
        );
        let err = PlanLowerer::default().lower(&bogus).unwrap_err();
        assert!(matches!(err, LowerError::NoMatchingMethod { ref name, .. } if name == "where"));
    }

    #[test]
    fn fixup_rebuilds_array_elements() {
        let arr = Expr::array_init(Ty::Int, vec![Expr::constant(1i64, Ty::Int)]);
        let fixed = fixup(arr, &Ty::sequence(Ty::nullable(Ty::Int)));
        assert!(matches!(
            fixed.kind(),
            ExprKind::ArrayInit { elem_ty, .. } if *elem_ty == Ty::nullable(Ty::Int)
        ));
    }
}
