// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The rewriting pass.

use lenq_ast::{BinOp, Expr, ExprKind, MemberBinding, MethodRef, NewExpr, Ty, UnaryOp, Value};
use tracing::{debug, trace};

use crate::{NullNavigationPolicy, RewriteError};

type Result<T> = std::result::Result<T, RewriteError>;

/// Inserts null guards into lambda bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGuardRewriter {
    policy: NullNavigationPolicy,
}

/// A member chain `root.f1...fn` with its root already rewritten.
struct Chain {
    /// `prefixes[0]` is the root, `prefixes[n]` the full access.
    prefixes: Vec<Expr>,
    /// Whether the root itself may be absent.
    root_checked: bool,
}

impl Chain {
    fn full(&self) -> &Expr {
        &self.prefixes[self.prefixes.len() - 1]
    }

    fn is_checked(&self, index: usize) -> bool {
        derefs(&self.prefixes[index].ty()) && (index > 0 || self.root_checked)
    }

    /// Non-null checks for `prefixes[..end]`, root first.
    fn checks(&self, end: usize) -> Vec<Expr> {
        (0..end)
            .filter(|&i| self.is_checked(i))
            .map(|i| not_null(&self.prefixes[i]))
            .collect()
    }
}

/// A rewritten node and what its evaluation depends on.
struct Guarded {
    expr: Expr,
    /// Checks that must hold for the node to evaluate without touching an
    /// absent record.
    checks: Vec<Expr>,
    /// The check that the node's own value is present, when it may not be.
    present: Option<Expr>,
    member: bool,
}

impl Guarded {
    fn new(source: &Expr, expr: Expr, checks: Vec<Expr>) -> Self {
        let present = may_be_absent(source).then(|| not_null(&expr));
        Self {
            expr,
            checks,
            present,
            member: false,
        }
    }

    /// Ancestor checks of a member chain operand; none for anything else.
    fn member_checks(&self) -> &[Expr] {
        if self.member {
            &self.checks
        } else {
            &[]
        }
    }
}

impl NullGuardRewriter {
    pub fn new(policy: NullNavigationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NullNavigationPolicy {
        self.policy
    }

    /// Rewrite a lambda body. Parameters are left untouched.
    pub fn rewrite(&self, body: &Expr) -> Result<Expr> {
        let out = self.visit(body)?;
        trace!(before = %body, after = %out, "lenq.guard.rewrite");
        Ok(out)
    }

    /// Rebuild a lambda around its rewritten body.
    pub fn rewrite_lambda(&self, lambda: &Expr) -> Result<Expr> {
        let (params, body) = lambda
            .as_lambda()
            .ok_or(RewriteError::NotALambda { kind: lambda.kind_name() })?;
        Ok(Expr::lambda(params.to_vec(), self.rewrite(body)?))
    }

    fn visit(&self, expr: &Expr) -> Result<Expr> {
        Ok(self.guarded(expr)?.expr)
    }

    /// Rewrite `expr` and collect what its evaluation depends on, so a
    /// parent never has to revisit it.
    fn guarded(&self, expr: &Expr) -> Result<Guarded> {
        let out = match expr.kind() {
            ExprKind::Constant { .. } | ExprKind::Parameter(_) | ExprKind::Default(_) => {
                expr.clone()
            }
            ExprKind::Member { .. } => return self.visit_member(expr),
            ExprKind::Call { target, method, args } => {
                return self.visit_call(expr, target.as_ref(), method, args);
            }
            ExprKind::Unary { op, operand, ty, lifted } => {
                return self.visit_unary(expr, *op, operand, ty, *lifted);
            }
            ExprKind::Binary { op, left, right, method } => {
                let left = self.guarded(left)?;
                let right = self.guarded(right)?;
                let rebuilt = Expr::new(ExprKind::Binary {
                    op: *op,
                    left: left.expr.clone(),
                    right: right.expr.clone(),
                    method: method.clone(),
                });
                let out = if op.is_comparison() {
                    let parts = left.member_checks().iter().chain(right.member_checks());
                    match conjoin(parts.cloned().collect()) {
                        Some(guard) => Expr::and_also(guard, rebuilt),
                        None => rebuilt,
                    }
                } else {
                    rebuilt
                };
                let mut checks = left.checks;
                checks.extend(right.checks);
                return Ok(Guarded::new(expr, out, checks));
            }
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
                    .map(|group| self.visit_all(group))
                    .collect::<Result<Vec<_>>>()?;
                Expr::list_init(self.visit_new(new)?, groups)
            }
            ExprKind::ArrayInit { elem_ty, elements } => {
                Expr::array_init(elem_ty.clone(), self.visit_all(elements)?)
            }
            ExprKind::Lambda { .. } => {
                return Err(RewriteError::UnsupportedNode { kind: expr.kind_name() });
            }
        };
        Ok(Guarded::new(expr, out, Vec::new()))
    }

    fn visit_all(&self, exprs: &[Expr]) -> Result<Vec<Expr>> {
        exprs.iter().map(|e| self.visit(e)).collect()
    }

    fn visit_new(&self, new: &NewExpr) -> Result<NewExpr> {
        Ok(NewExpr {
            ty: new.ty.clone(),
            members: new.members.clone(),
            args: self.visit_all(&new.args)?,
        })
    }

    /// `x.a.b.c` becomes
    /// `IIF(x.a == null, default, IIF(x.a.b == null, default, x.a.b.c))`.
    fn visit_member(&self, expr: &Expr) -> Result<Guarded> {
        let chain = self.chain(expr)?;
        let ty = expr.ty();
        let last = chain.prefixes.len() - 1;
        let mut value = chain.full().clone();
        for i in (0..last).rev() {
            if chain.is_checked(i) {
                value = Expr::conditional(
                    is_null(&chain.prefixes[i]),
                    Expr::default_of(ty.clone()),
                    value,
                    ty.clone(),
                );
            }
        }
        Ok(Guarded {
            expr: value,
            checks: chain.checks(last),
            present: chain.is_checked(last).then(|| not_null(chain.full())),
            member: true,
        })
    }

    /// The call is guarded by its subject (its target, or the source of an
    /// operation) and every nullable ancestor of it, plus the ancestor
    /// guards of the other arguments.
    fn visit_call(
        &self,
        expr: &Expr,
        target: Option<&Expr>,
        method: &MethodRef,
        args: &[Expr],
    ) -> Result<Guarded> {
        let target = target.map(|t| self.guarded(t)).transpose()?;
        let args = args
            .iter()
            .map(|a| self.guarded_arg(a))
            .collect::<Result<Vec<_>>>()?;

        let (subject, rest) = match (&target, args.split_first()) {
            (Some(t), _) => (Some(t), &args[..]),
            (None, Some((source, rest))) if method.is_operation() => (Some(source), rest),
            (None, _) => (None, &args[..]),
        };
        let mut checks = Vec::new();
        if let Some(subject) = subject {
            checks.extend(subject.checks.iter().cloned());
            checks.extend(subject.present.clone());
        }
        for arg in rest {
            checks.extend(arg.checks.iter().cloned());
        }

        let call = Expr::call(
            target.map(|t| t.expr),
            method.clone(),
            args.into_iter().map(|a| a.expr).collect(),
        );
        let out = match conjoin(checks.clone()) {
            Some(guard) => Expr::conditional(
                guard,
                call,
                Expr::default_of(method.ret.clone()),
                method.ret.clone(),
            ),
            None => call,
        };
        Ok(Guarded::new(expr, out, checks))
    }

    /// Lambda arguments are rewritten as lambdas of their own and add no
    /// checks to the call.
    fn guarded_arg(&self, arg: &Expr) -> Result<Guarded> {
        let lambda = if arg.as_lambda().is_some() {
            self.rewrite_lambda(arg)?
        } else {
            match arg.unquote() {
                Some(inner) => Expr::quote(self.rewrite_lambda(inner)?),
                None => return self.guarded(arg),
            }
        };
        Ok(Guarded {
            expr: lambda,
            checks: Vec::new(),
            present: None,
            member: false,
        })
    }

    fn visit_unary(
        &self,
        expr: &Expr,
        op: UnaryOp,
        operand: &Expr,
        ty: &Ty,
        lifted: bool,
    ) -> Result<Guarded> {
        if op == UnaryOp::Quote {
            return Err(RewriteError::UnsupportedNode { kind: expr.kind_name() });
        }
        let operand = self.guarded(operand)?;
        let rebuilt = Expr::new(ExprKind::Unary {
            op,
            operand: operand.expr.clone(),
            ty: ty.clone(),
            lifted,
        });
        let guard = conjoin(operand.checks.clone());
        let out = match (op, guard) {
            (_, None) => rebuilt,
            (UnaryOp::Not, Some(guard)) => Expr::and_also(guard, rebuilt),
            (UnaryOp::Convert | UnaryOp::ConvertChecked, Some(guard)) => {
                if lifted || ty.can_be_null() {
                    Expr::conditional(guard, rebuilt, Expr::default_of(ty.clone()), ty.clone())
                } else {
                    match self.policy {
                        NullNavigationPolicy::Raise => {
                            return Err(RewriteError::NullNavigation {
                                expr: expr.to_string(),
                                target: ty.to_string(),
                            });
                        }
                        NullNavigationPolicy::Allow => {
                            debug!(expr = %expr, target = %ty, "lenq.guard.unguarded_conversion");
                            expr.clone()
                        }
                    }
                }
            }
            _ => rebuilt,
        };
        Ok(Guarded::new(expr, out, operand.checks))
    }

    /// Collect `expr`'s member chain and rewrite its root.
    fn chain(&self, expr: &Expr) -> Result<Chain> {
        let mut members = Vec::new();
        let mut root = expr;
        while let ExprKind::Member { target, member } = root.kind() {
            members.push(member.clone());
            root = target;
        }

        let mut current = self.visit(root)?;
        let mut prefixes = Vec::with_capacity(members.len() + 1);
        prefixes.push(current.clone());
        for member in members.into_iter().rev() {
            current = Expr::new(ExprKind::Member { target: current, member });
            prefixes.push(current.clone());
        }
        Ok(Chain {
            prefixes,
            root_checked: may_be_absent(root),
        })
    }
}

/// Member access on a value of this type dereferences it.
fn derefs(ty: &Ty) -> bool {
    ty.can_be_null() && !ty.is_value_type()
}

/// Roots that may be absent at runtime. Lambda parameters and non-null
/// constants are taken as present.
fn may_be_absent(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Parameter(_) => false,
        ExprKind::Constant { value, .. } => value.is_null(),
        _ => derefs(&expr.ty()),
    }
}

fn is_null(expr: &Expr) -> Expr {
    Expr::binary(BinOp::Equal, expr.clone(), Expr::constant(Value::Null, expr.ty()))
}

fn not_null(expr: &Expr) -> Expr {
    Expr::binary(BinOp::NotEqual, expr.clone(), Expr::constant(Value::Null, expr.ty()))
}

fn conjoin(parts: Vec<Expr>) -> Option<Expr> {
    parts.into_iter().reduce(Expr::and_also)
}

#[cfg(test)]
mod tests {
    use lenq_ast::{MemberRef, Param};

    use super::*;

    fn x() -> Expr {
        Expr::param(&Param::new("x", Ty::record("Level0")))
    }

    fn l1() -> Expr {
        x().member("L1", Ty::record("Level1"))
    }

    fn rewrite(e: &Expr) -> String {
        NullGuardRewriter::default().rewrite(e).unwrap().to_string()
    }

    #[test]
    fn parameter_member_is_untouched() {
        let e = x().member("Name", Ty::String);
        assert_eq!(rewrite(&e), "x.Name");
    }

    #[test]
    fn chain_is_wrapped_closest_parent_innermost() {
        let e = l1().member("L2", Ty::record("Level2")).member("Name", Ty::String);
        assert_eq!(
            rewrite(&e),
            "IIF((x.L1 == null), default(string), \
             IIF((x.L1.L2 == null), default(string), x.L1.L2.Name))"
        );
    }

    #[test]
    fn nullable_value_parent_is_not_checked() {
        let e = l1()
            .member("NullableInteger", Ty::nullable(Ty::Int))
            .member("HasValue", Ty::Bool);
        assert_eq!(
            rewrite(&e),
            "IIF((x.L1 == null), default(bool), x.L1.NullableInteger.HasValue)"
        );
    }

    #[test]
    fn comparison_gets_ancestor_guard() {
        let e = Expr::binary(
            BinOp::GreaterThan,
            l1().member("Decimal", Ty::Float),
            Expr::constant(25.0, Ty::Float),
        );
        assert_eq!(
            rewrite(&e),
            "((x.L1 != null) && (IIF((x.L1 == null), default(float), x.L1.Decimal) > 25.0))"
        );
    }

    #[test]
    fn arithmetic_has_no_top_level_guard() {
        let e = Expr::binary(
            BinOp::Add,
            l1().member("Integer", Ty::Int),
            Expr::constant(1i64, Ty::Int),
        );
        assert_eq!(
            rewrite(&e),
            "(IIF((x.L1 == null), default(int), x.L1.Integer) + 1)"
        );
    }

    #[test]
    fn method_call_and_negation() {
        let call = l1().call_method("Level1", "BooleanMethod", Ty::Bool, vec![]);
        assert_eq!(
            rewrite(&call),
            "IIF((x.L1 != null), x.L1.BooleanMethod(), default(bool))"
        );
        assert_eq!(
            rewrite(&Expr::not(call)),
            "((x.L1 != null) && !IIF((x.L1 != null), x.L1.BooleanMethod(), default(bool)))"
        );
    }

    fn trimmed(times: usize) -> Expr {
        (0..times).fold(x().member("Name", Ty::String), |e, _| {
            e.call_method("String", "trim", Ty::String, vec![])
        })
    }

    #[test]
    fn chained_call_is_guarded_by_its_subject() {
        let once = "IIF((x.Name != null), x.Name.trim(), default(string))";
        assert_eq!(rewrite(&trimmed(1)), once);
        assert_eq!(
            rewrite(&trimmed(2)),
            format!(
                "IIF(((x.Name != null) && ({once} != null)), {once}.trim(), default(string))"
            )
        );
    }

    #[test]
    fn deep_call_chain_rewrites_in_one_pass() {
        let mut out = NullGuardRewriter::default().rewrite(&trimmed(64)).unwrap();
        let mut depth = 0;
        while let ExprKind::Conditional { test, if_true, .. } = out.kind() {
            let ExprKind::Call { target: Some(target), .. } = if_true.kind() else {
                panic!("expected call");
            };
            assert!(matches!(
                test.kind(),
                ExprKind::Binary { op: BinOp::NotEqual | BinOp::AndAlso, .. }
            ));
            let next = target.clone();
            out = next;
            depth += 1;
        }
        assert_eq!(depth, 64);
        assert_eq!(out.to_string(), "x.Name");
    }

    #[test]
    fn call_on_parameter_is_not_guarded() {
        let call = x().call_method("Level0", "BooleanMethod", Ty::Bool, vec![]);
        assert_eq!(rewrite(&call), "x.BooleanMethod()");
    }

    #[test]
    fn static_call_guards_arguments() {
        let call = Expr::call(
            None,
            MethodRef::static_fn("math", "abs", Ty::Int),
            vec![l1().member("Integer", Ty::Int)],
        );
        assert_eq!(
            rewrite(&call),
            "IIF((x.L1 != null), math.abs(IIF((x.L1 == null), default(int), x.L1.Integer)), default(int))"
        );
    }

    #[test]
    fn convert_to_nullable_is_guarded() {
        let e = Expr::convert(l1().member("Integer", Ty::Int), Ty::nullable(Ty::Int));
        assert_eq!(
            rewrite(&e),
            "IIF((x.L1 != null), Convert(IIF((x.L1 == null), default(int), x.L1.Integer), int?), default(int?))"
        );
    }

    #[test]
    fn convert_to_value_type_follows_policy() {
        let e = Expr::convert(l1().member("Integer", Ty::Int), Ty::Float);
        let err = NullGuardRewriter::new(NullNavigationPolicy::Raise)
            .rewrite(&e)
            .unwrap_err();
        assert!(matches!(err, RewriteError::NullNavigation { .. }));

        let out = NullGuardRewriter::new(NullNavigationPolicy::Allow)
            .rewrite(&e)
            .unwrap();
        assert_eq!(out, e);
    }

    #[test]
    fn convert_without_guard_is_rebuilt() {
        let e = Expr::convert(x().member("Integer", Ty::Int), Ty::Float);
        assert_eq!(rewrite(&e), "Convert(x.Integer, float)");
    }

    #[test]
    fn member_init_rewrites_bindings() {
        let new = NewExpr::new(Ty::record("Level5"));
        let e = Expr::member_init(
            new,
            vec![MemberBinding {
                member: MemberRef::new("Name", Ty::String),
                value: l1().member("Name", Ty::String),
            }],
        );
        assert_eq!(
            rewrite(&e),
            "new Level5() { Name = IIF((x.L1 == null), default(string), x.L1.Name) }"
        );
    }

    #[test]
    fn lambda_and_quote_in_body_are_rejected() {
        let p = Param::new("y", Ty::Int);
        let lambda = Expr::lambda(vec![p.clone()], Expr::param(&p));
        assert_eq!(
            NullGuardRewriter::default().rewrite(&lambda),
            Err(RewriteError::UnsupportedNode { kind: "Lambda" })
        );
        assert_eq!(
            NullGuardRewriter::default().rewrite(&Expr::quote(lambda)),
            Err(RewriteError::UnsupportedNode { kind: "Quote" })
        );
    }

    #[test]
    fn rewrite_lambda_keeps_parameters() {
        let p = Param::new("x", Ty::record("Level0"));
        let lambda = Expr::lambda(
            vec![p.clone()],
            Expr::param(&p).member("L1", Ty::record("Level1")).member("Name", Ty::String),
        );
        let out = NullGuardRewriter::default().rewrite_lambda(&lambda).unwrap();
        let (params, _) = out.as_lambda().unwrap();
        assert_eq!(params, &[p][..]);
        assert_eq!(
            out.to_string(),
            "x => IIF((x.L1 == null), default(string), x.L1.Name)"
        );
        assert_eq!(
            NullGuardRewriter::default().rewrite_lambda(&x()),
            Err(RewriteError::NotALambda { kind: "Parameter" })
        );
    }

    #[test]
    fn nested_operation_lambda_is_rewritten() {
        let item = Param::new("i", Ty::record("Level2"));
        let pred = Expr::lambda(
            vec![item.clone()],
            Expr::binary(
                BinOp::Equal,
                Expr::param(&item).member("L3", Ty::record("Level3")).member("Name", Ty::String),
                Expr::constant("Name", Ty::String),
            ),
        );
        let items = l1().member("Items", Ty::list(Ty::record("Level2")));
        let call = Expr::call(
            None,
            MethodRef::sequence("any", vec![Ty::record("Level2")], Ty::Bool),
            vec![items, pred],
        );
        assert_eq!(
            rewrite(&call),
            "IIF(((x.L1 != null) && (x.L1.Items != null)), \
             Sequence.any(IIF((x.L1 == null), default(List<Level2>), x.L1.Items), \
             i => ((i.L3 != null) && (IIF((i.L3 == null), default(string), i.L3.Name) == \"Name\"))), \
             default(bool))"
        );
    }
}
