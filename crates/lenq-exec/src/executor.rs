// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Compile-once execution of a plan.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use lenq_ast::{Expr, Ty, Value};
use lenq_lower::PlanLowerer;
use tracing::{debug, trace};

use crate::compile::{Compiled, Compiler, Frame};
use crate::registry::MethodRegistry;
use crate::ExecError;

/// A compiled plan: an invocable closure and the type of what it returns.
pub struct CompiledPlan {
    func: Compiled,
    ret: Ty,
}

impl CompiledPlan {
    /// Compile an already lowered plan.
    pub fn compile(lowered: &Expr, registry: &MethodRegistry) -> Result<Self, ExecError> {
        let func = Compiler::new(registry).compile(lowered)?;
        Ok(Self {
            func,
            ret: lowered.ty(),
        })
    }

    pub fn run(&self) -> Result<Value, ExecError> {
        (self.func)(&Frame::ROOT)
    }

    pub fn return_ty(&self) -> &Ty {
        &self.ret
    }
}

impl fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPlan").field("ret", &self.ret).finish_non_exhaustive()
    }
}

/// Lowers, compiles and runs one expression.
///
/// The compiled plan is cached on first use. The cache is a plain
/// `OnceCell`: an executor belongs to a single thread.
pub struct Executor {
    expr: Expr,
    lowerer: PlanLowerer,
    registry: Rc<MethodRegistry>,
    plan: OnceCell<CompiledPlan>,
}

impl Executor {
    pub fn new(expr: Expr, lowerer: PlanLowerer, registry: Rc<MethodRegistry>) -> Self {
        Self {
            expr,
            lowerer,
            registry,
            plan: OnceCell::new(),
        }
    }

    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    pub fn is_compiled(&self) -> bool {
        self.plan.get().is_some()
    }

    /// Lower and compile, once.
    pub fn compile(&self) -> Result<&CompiledPlan, ExecError> {
        if let Some(plan) = self.plan.get() {
            return Ok(plan);
        }
        let lowered = self.lowerer.lower(&self.expr)?;
        let plan = CompiledPlan::compile(&lowered, &self.registry)?;
        debug!(ret = %plan.ret, "lenq.exec.compile");
        Ok(self.plan.get_or_init(|| plan))
    }

    pub fn execute(&self) -> Result<Value, ExecError> {
        let value = self.compile()?.run()?;
        trace!(result = ?value, "lenq.exec.execute");
        Ok(value)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("expr", &self.expr)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}
