// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression nodes.

use std::fmt;
use std::rc::Rc;

use crate::ty::Ty;
use crate::value::Value;

/// An expression tree node. Cloning is cheap; subtrees are shared.
#[derive(Clone)]
pub struct Expr(Rc<ExprKind>);

/// The kind of expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant {
        value: Value,
        ty: Ty,
    },
    Parameter(Param),
    /// Field access (`target.member`)
    Member {
        target: Expr,
        member: MemberRef,
    },
    /// Method or operation call; `target` is `None` for static calls
    Call {
        target: Option<Expr>,
        method: MethodRef,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Expr,
        /// Result type (the target type for conversions)
        ty: Ty,
        /// Conversion of a value type into its nullable form
        lifted: bool,
    },
    Binary {
        op: BinOp,
        left: Expr,
        right: Expr,
        /// User-defined operator implementation
        method: Option<MethodRef>,
    },
    /// `test ? if_true : if_false`
    Conditional {
        test: Expr,
        if_true: Expr,
        if_false: Expr,
        ty: Ty,
    },
    New(NewExpr),
    MemberInit {
        new: NewExpr,
        bindings: Vec<MemberBinding>,
    },
    ListInit {
        new: NewExpr,
        groups: Vec<Vec<Expr>>,
    },
    ArrayInit {
        elem_ty: Ty,
        elements: Vec<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Expr,
    },
    /// `default(T)`
    Default(Ty),
}

/// A lambda parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A record field reference with its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub name: String,
    pub ty: Ty,
}

impl MemberRef {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Which vocabulary a call is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Method on the target value, dispatched by the target's type
    Instance,
    /// Free function grouped under an owner namespace
    Static,
    /// Abstract queryable operation; must be lowered before execution
    Provider,
    /// Concrete in-memory sequence operation
    Sequence,
}

/// A resolved method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub kind: MethodKind,
    pub owner: String,
    pub name: String,
    /// Generic instantiation, e.g. `[TSource, TResult]` for `select`
    pub type_args: Vec<Ty>,
    pub ret: Ty,
}

impl MethodRef {
    pub const PROVIDER_OWNER: &'static str = "Queryable";
    pub const SEQUENCE_OWNER: &'static str = "Sequence";

    pub fn instance(owner: impl Into<String>, name: impl Into<String>, ret: Ty) -> Self {
        Self {
            kind: MethodKind::Instance,
            owner: owner.into(),
            name: name.into(),
            type_args: Vec::new(),
            ret,
        }
    }

    pub fn static_fn(owner: impl Into<String>, name: impl Into<String>, ret: Ty) -> Self {
        Self {
            kind: MethodKind::Static,
            owner: owner.into(),
            name: name.into(),
            type_args: Vec::new(),
            ret,
        }
    }

    pub fn provider(name: impl Into<String>, type_args: Vec<Ty>, ret: Ty) -> Self {
        Self {
            kind: MethodKind::Provider,
            owner: Self::PROVIDER_OWNER.to_string(),
            name: name.into(),
            type_args,
            ret,
        }
    }

    pub fn sequence(name: impl Into<String>, type_args: Vec<Ty>, ret: Ty) -> Self {
        Self {
            kind: MethodKind::Sequence,
            owner: Self::SEQUENCE_OWNER.to_string(),
            name: name.into(),
            type_args,
            ret,
        }
    }

    /// Provider and sequence operations take their source as the first
    /// argument instead of a target.
    pub fn is_operation(&self) -> bool {
        matches!(self.kind, MethodKind::Provider | MethodKind::Sequence)
    }
}

/// Object construction: a record (`members` names the positional args), or
/// an empty list for `ListInit`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub ty: Ty,
    pub members: Vec<String>,
    pub args: Vec<Expr>,
}

impl NewExpr {
    pub fn new(ty: Ty) -> Self {
        Self {
            ty,
            members: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Anonymous-style construction: each member initialized positionally.
    pub fn with_members(ty: Ty, members: Vec<(String, Expr)>) -> Self {
        let (members, args) = members.into_iter().unzip();
        Self { ty, members, args }
    }
}

/// `member = value` inside a `MemberInit`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBinding {
    pub member: MemberRef,
    pub value: Expr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Convert,
    ConvertChecked,
    Negate,
    Not,
    Increment,
    Decrement,
    UnaryPlus,
    /// Wraps a lambda passed to a provider operation
    Quote,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    // Comparison
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    // Logical
    AndAlso,
    OrElse,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // Bitwise
    And,
    Or,
    Xor,
    LeftShift,
    RightShift,
    /// `a ?? b`
    Coalesce,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::GreaterThan
                | BinOp::GreaterThanOrEqual
                | BinOp::LessThan
                | BinOp::LessThanOrEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::AndAlso | BinOp::OrElse)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::GreaterThan => ">",
            BinOp::GreaterThanOrEqual => ">=",
            BinOp::LessThan => "<",
            BinOp::LessThanOrEqual => "<=",
            BinOp::AndAlso => "&&",
            BinOp::OrElse => "||",
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::LeftShift => "<<",
            BinOp::RightShift => ">>",
            BinOp::Coalesce => "??",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr(Rc::new(kind))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// Same node instance (not merely an equal tree).
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            ExprKind::Constant { .. } => "Constant",
            ExprKind::Parameter(_) => "Parameter",
            ExprKind::Member { .. } => "MemberAccess",
            ExprKind::Call { .. } => "Call",
            ExprKind::Unary { op: UnaryOp::Quote, .. } => "Quote",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Conditional { .. } => "Conditional",
            ExprKind::New(_) => "New",
            ExprKind::MemberInit { .. } => "MemberInit",
            ExprKind::ListInit { .. } => "ListInit",
            ExprKind::ArrayInit { .. } => "ArrayInit",
            ExprKind::Lambda { .. } => "Lambda",
            ExprKind::Default(_) => "Default",
        }
    }

    /// The static type of this expression.
    pub fn ty(&self) -> Ty {
        match self.kind() {
            ExprKind::Constant { ty, .. } => ty.clone(),
            ExprKind::Parameter(p) => p.ty.clone(),
            ExprKind::Member { member, .. } => member.ty.clone(),
            ExprKind::Call { method, .. } => method.ret.clone(),
            ExprKind::Unary { ty, .. } => ty.clone(),
            ExprKind::Binary { op, left, right, method } => match method {
                Some(m) => m.ret.clone(),
                None => binary_result_ty(*op, &left.ty(), &right.ty()),
            },
            ExprKind::Conditional { ty, .. } => ty.clone(),
            ExprKind::New(new) => new.ty.clone(),
            ExprKind::MemberInit { new, .. } | ExprKind::ListInit { new, .. } => new.ty.clone(),
            ExprKind::ArrayInit { elem_ty, .. } => Ty::list(elem_ty.clone()),
            ExprKind::Lambda { params, body } => {
                Ty::func(params.iter().map(|p| p.ty.clone()).collect(), body.ty())
            }
            ExprKind::Default(ty) => ty.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn constant(value: impl Into<Value>, ty: Ty) -> Expr {
        Expr::new(ExprKind::Constant { value: value.into(), ty })
    }

    /// A `null` constant of the given type.
    pub fn null(ty: Ty) -> Expr {
        Expr::constant(Value::Null, ty)
    }

    pub fn param(param: &Param) -> Expr {
        Expr::new(ExprKind::Parameter(param.clone()))
    }

    /// `self.name`, declared as `ty`.
    pub fn member(&self, name: impl Into<String>, ty: Ty) -> Expr {
        Expr::new(ExprKind::Member {
            target: self.clone(),
            member: MemberRef::new(name, ty),
        })
    }

    pub fn call(target: Option<Expr>, method: MethodRef, args: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Call { target, method, args })
    }

    /// `self.name(args)` dispatched on `owner`.
    pub fn call_method(&self, owner: &str, name: &str, ret: Ty, args: Vec<Expr>) -> Expr {
        Expr::call(Some(self.clone()), MethodRef::instance(owner, name, ret), args)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        let ty = match op {
            UnaryOp::Quote => Ty::quoted(operand.ty()),
            _ => operand.ty(),
        };
        Expr::new(ExprKind::Unary { op, operand, ty, lifted: false })
    }

    pub fn not(operand: Expr) -> Expr {
        Expr::unary(UnaryOp::Not, operand)
    }

    pub fn negate(operand: Expr) -> Expr {
        Expr::unary(UnaryOp::Negate, operand)
    }

    pub fn quote(lambda: Expr) -> Expr {
        Expr::unary(UnaryOp::Quote, lambda)
    }

    /// `(ty) operand`. Converting a value type into its nullable form is
    /// marked as lifted.
    pub fn convert(operand: Expr, ty: Ty) -> Expr {
        Expr::conversion(UnaryOp::Convert, operand, ty)
    }

    pub fn convert_checked(operand: Expr, ty: Ty) -> Expr {
        Expr::conversion(UnaryOp::ConvertChecked, operand, ty)
    }

    fn conversion(op: UnaryOp, operand: Expr, ty: Ty) -> Expr {
        let lifted = ty.is_nullable() && !operand.ty().is_nullable();
        Expr::new(ExprKind::Unary { op, operand, ty, lifted })
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::new(ExprKind::Binary { op, left, right, method: None })
    }

    pub fn binary_with(op: BinOp, left: Expr, right: Expr, method: MethodRef) -> Expr {
        Expr::new(ExprKind::Binary { op, left, right, method: Some(method) })
    }

    pub fn and_also(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinOp::AndAlso, left, right)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr, ty: Ty) -> Expr {
        Expr::new(ExprKind::Conditional { test, if_true, if_false, ty })
    }

    pub fn new_object(new: NewExpr) -> Expr {
        Expr::new(ExprKind::New(new))
    }

    pub fn member_init(new: NewExpr, bindings: Vec<MemberBinding>) -> Expr {
        Expr::new(ExprKind::MemberInit { new, bindings })
    }

    pub fn list_init(new: NewExpr, groups: Vec<Vec<Expr>>) -> Expr {
        Expr::new(ExprKind::ListInit { new, groups })
    }

    pub fn array_init(elem_ty: Ty, elements: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::ArrayInit { elem_ty, elements })
    }

    pub fn lambda(params: Vec<Param>, body: Expr) -> Expr {
        Expr::new(ExprKind::Lambda { params, body })
    }

    pub fn default_of(ty: Ty) -> Expr {
        Expr::new(ExprKind::Default(ty))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn as_lambda(&self) -> Option<(&[Param], &Expr)> {
        match self.kind() {
            ExprKind::Lambda { params, body } => Some((params, body)),
            _ => None,
        }
    }

    pub fn is_member(&self) -> bool {
        matches!(self.kind(), ExprKind::Member { .. })
    }

    /// The operand of a `Quote`, or `None` for any other node.
    pub fn unquote(&self) -> Option<&Expr> {
        match self.kind() {
            ExprKind::Unary { op: UnaryOp::Quote, operand, .. } => Some(operand),
            _ => None,
        }
    }
}

/// Result type of an operator without a user-defined implementation.
fn binary_result_ty(op: BinOp, left: &Ty, right: &Ty) -> Ty {
    if op.is_comparison() || op.is_logical() {
        return Ty::Bool;
    }
    match op {
        // `int? ?? int` is `int`; `int? ?? int?` stays nullable
        BinOp::Coalesce => right.clone(),
        BinOp::LeftShift | BinOp::RightShift => left.clone(),
        _ => {
            let lifted = left.is_nullable() || right.is_nullable();
            let base = match (left.non_nullable(), right.non_nullable()) {
                (Ty::Float, _) | (_, Ty::Float) => Ty::Float,
                (l, _) => l.clone(),
            };
            if lifted {
                Ty::nullable(base)
            } else {
                base
            }
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.kind(), f)
    }
}
