// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The query engine: configuration plus the methods expressions may call.

use std::fmt;
use std::rc::Rc;

use lenq_ast::{Expr, Ty, Value};
use lenq_exec::{Executor, MethodRegistry};
use lenq_lower::PlanLowerer;
use tracing::debug;

use crate::config::EngineConfig;
use crate::convert::FromValue;
use crate::error::Result;
use crate::query::Query;

/// Creates queries and runs one-off expressions.
///
/// Cloning is cheap; clones share configuration and registry. An engine and
/// everything it creates stay on one thread.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    lowerer: PlanLowerer,
    registry: Rc<MethodRegistry>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = if config.builtins {
            MethodRegistry::with_builtins()
        } else {
            MethodRegistry::new()
        };
        Self::with_registry(config, registry)
    }

    /// An engine using `registry` as is. `config.builtins` is not consulted;
    /// start from [`MethodRegistry::with_builtins`] to keep them.
    pub fn with_registry(config: EngineConfig, registry: MethodRegistry) -> Self {
        debug!(policy = %config.null_navigation, registry = ?registry, "lenq.engine.new");
        Self {
            inner: Rc::new(EngineInner {
                lowerer: PlanLowerer::new(config.null_navigation),
                config,
                registry: Rc::new(registry),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.inner.registry
    }

    pub fn lowerer(&self) -> PlanLowerer {
        self.inner.lowerer
    }

    /// A materialized query over `items`, each of type `element_ty`.
    pub fn query<T, I>(&self, element_ty: Ty, items: I) -> Query<T>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = items.into_iter().map(Into::into).collect();
        Query::materialized(self.clone(), element_ty, Rc::new(items))
    }

    /// A pending query over a `Queryable(T)` expression.
    pub fn from_expression<T>(&self, expr: Expr) -> Result<Query<T>> {
        Query::from_expression(self, expr)
    }

    /// Lower, compile and run `expr` once.
    pub fn execute<R: FromValue>(&self, expr: Expr) -> Result<R> {
        let value = self.executor(expr).execute()?;
        R::from_value(value)
    }

    pub(crate) fn executor(&self, expr: Expr) -> Executor {
        Executor::new(expr, self.inner.lowerer, Rc::clone(&self.inner.registry))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish()
    }
}
