// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Deferred queries.
//!
//! A [`Query`] either owns its items or holds a pending expression.
//! Composing an operation never runs anything: it builds a provider call over
//! a placeholder for the current query and guards its lambdas. Enumerating a
//! pending query lowers, compiles and runs the expression once, then keeps the
//! items.

use std::cell::OnceCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use lenq_ast::{Expr, QuerySource, Ty, Value};
use lenq_exec::Executor;
use tracing::{debug, trace};

use crate::convert::FromValue;
use crate::engine::Engine;
use crate::error::{Error, Result};

/// A deferred query whose elements read as `T`.
///
/// Not thread-safe: the cached items live in a `OnceCell` behind an `Rc`, so
/// a query has a single writer by construction.
pub struct Query<T = Value> {
    inner: Rc<QueryInner>,
    _marker: PhantomData<T>,
}

struct QueryInner {
    engine: Engine,
    element_ty: Ty,
    state: State,
    cache: OnceCell<Rc<Vec<Value>>>,
}

enum State {
    Materialized(Rc<Vec<Value>>),
    Pending(Executor),
}

impl QuerySource for QueryInner {
    fn element_ty(&self) -> &Ty {
        &self.element_ty
    }

    fn materialized(&self) -> Option<Rc<Vec<Value>>> {
        match &self.state {
            State::Materialized(items) => Some(Rc::clone(items)),
            State::Pending(_) => self.cache.get().cloned(),
        }
    }

    fn expression(&self) -> Expr {
        match &self.state {
            State::Materialized(items) => Expr::constant(
                Value::List(Rc::clone(items)),
                Ty::sequence(self.element_ty.clone()),
            ),
            State::Pending(exec) => exec.expression().clone(),
        }
    }
}

impl<T> Query<T> {
    pub(crate) fn materialized(engine: Engine, element_ty: Ty, items: Rc<Vec<Value>>) -> Self {
        Self::with_state(engine, element_ty, State::Materialized(items))
    }

    fn pending(engine: Engine, element_ty: Ty, expr: Expr) -> Self {
        let exec = engine.executor(expr);
        Self::with_state(engine, element_ty, State::Pending(exec))
    }

    fn with_state(engine: Engine, element_ty: Ty, state: State) -> Self {
        Self {
            inner: Rc::new(QueryInner {
                engine,
                element_ty,
                state,
                cache: OnceCell::new(),
            }),
            _marker: PhantomData,
        }
    }

    /// A pending query over `expr`, which must be a `Queryable(T)`.
    pub fn from_expression(engine: &Engine, expr: Expr) -> Result<Self> {
        match expr.ty() {
            Ty::Queryable(elem) => Ok(Self::pending(engine.clone(), *elem, expr)),
            other => Err(Error::NotAQueryable {
                ty: other.to_string(),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn element_ty(&self) -> &Ty {
        &self.inner.element_ty
    }

    /// Whether the items are already held, either from construction or from
    /// an earlier enumeration.
    pub fn is_materialized(&self) -> bool {
        self.inner.materialized().is_some()
    }

    /// The expression this query stands for. A materialized query is
    /// represented by its placeholder.
    pub fn expression(&self) -> Expr {
        match &self.inner.state {
            State::Materialized(_) => self.placeholder(),
            State::Pending(exec) => exec.expression().clone(),
        }
    }

    /// A constant standing for this query inside a larger expression.
    pub fn placeholder(&self) -> Expr {
        let source: Rc<dyn QuerySource> = self.inner.clone();
        Expr::constant(
            Value::Query(source),
            Ty::queryable(self.inner.element_ty.clone()),
        )
    }

    /// Bind `op` over this query and guard its lambda arguments.
    fn bind(&self, op: &str, args: Vec<Expr>) -> Result<Expr> {
        let call = self
            .inner
            .engine
            .lowerer()
            .compose(op, self.placeholder(), &self.inner.element_ty, args)?;
        Ok(call)
    }

    /// Compose a sequence-returning operation. Nothing runs.
    pub fn compose<U>(&self, op: &str, args: Vec<Expr>) -> Result<Query<U>> {
        let call = self.bind(op, args)?;
        match call.ty() {
            Ty::Queryable(elem) => {
                debug!(op, element = %elem, "lenq.query.compose");
                Ok(Query::pending(self.inner.engine.clone(), *elem, call))
            }
            other => Err(Error::NotAQueryable {
                ty: other.to_string(),
            }),
        }
    }

    /// Run `op` over this query and read its result as `R`.
    pub fn execute_scalar<R: FromValue>(&self, op: &str, args: Vec<Expr>) -> Result<R> {
        let call = self.bind(op, args)?;
        debug!(op, ret = %call.ty(), "lenq.query.execute");
        let value = self.inner.engine.executor(call).execute()?;
        R::from_value(value)
    }

    /// The realized items, running the pending expression on first use.
    pub fn values(&self) -> Result<Rc<Vec<Value>>> {
        let exec = match &self.inner.state {
            State::Materialized(items) => return Ok(Rc::clone(items)),
            State::Pending(exec) => exec,
        };
        if let Some(items) = self.inner.cache.get() {
            trace!(items = items.len(), "lenq.query.cached");
            return Ok(Rc::clone(items));
        }
        let items = match exec.execute()? {
            Value::List(items) => items,
            other => {
                return Err(Error::Conversion {
                    expected: "sequence",
                    found: other.type_name().to_string(),
                })
            }
        };
        debug!(items = items.len(), "lenq.query.materialize");
        Ok(Rc::clone(self.inner.cache.get_or_init(|| items)))
    }
}

impl<T: FromValue> Query<T> {
    pub fn enumerate(&self) -> Result<Vec<T>> {
        self.values()?.iter().cloned().map(T::from_value).collect()
    }

    pub fn filter(&self, predicate: Expr) -> Result<Query<T>> {
        self.compose("where", vec![predicate])
    }

    pub fn select<U>(&self, selector: Expr) -> Result<Query<U>> {
        self.compose("select", vec![selector])
    }

    pub fn order_by(&self, key: Expr) -> Result<Query<T>> {
        self.compose("order_by", vec![key])
    }

    pub fn order_by_descending(&self, key: Expr) -> Result<Query<T>> {
        self.compose("order_by_descending", vec![key])
    }

    pub fn then_by(&self, key: Expr) -> Result<Query<T>> {
        self.compose("then_by", vec![key])
    }

    pub fn then_by_descending(&self, key: Expr) -> Result<Query<T>> {
        self.compose("then_by_descending", vec![key])
    }

    pub fn skip(&self, n: i64) -> Result<Query<T>> {
        self.compose("skip", vec![Expr::constant(n, Ty::Int)])
    }

    pub fn take(&self, n: i64) -> Result<Query<T>> {
        self.compose("take", vec![Expr::constant(n, Ty::Int)])
    }

    pub fn distinct(&self) -> Result<Query<T>> {
        self.compose("distinct", vec![])
    }

    pub fn first(&self) -> Result<T> {
        self.execute_scalar("first", vec![])
    }

    pub fn first_or_default(&self) -> Result<T> {
        self.execute_scalar("first_or_default", vec![])
    }

    pub fn single(&self) -> Result<T> {
        self.execute_scalar("single", vec![])
    }

    pub fn single_or_default(&self) -> Result<T> {
        self.execute_scalar("single_or_default", vec![])
    }

    pub fn last(&self) -> Result<T> {
        self.execute_scalar("last", vec![])
    }

    pub fn count(&self) -> Result<i64> {
        self.execute_scalar("count", vec![])
    }

    pub fn any(&self) -> Result<bool> {
        self.execute_scalar("any", vec![])
    }

    pub fn all(&self, predicate: Expr) -> Result<bool> {
        self.execute_scalar("all", vec![predicate])
    }

    pub fn sum<R: FromValue>(&self, selector: Expr) -> Result<R> {
        self.execute_scalar("sum", vec![selector])
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Display for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.materialized() {
            Some(items) => write!(f, "{:?}", items),
            None => write!(f, "{}", self.expression()),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("element_ty", &self.inner.element_ty)
            .field("materialized", &self.is_materialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use lenq_ast::{BinOp, Param, Record};

    use super::*;

    fn numbers(engine: &Engine) -> Query<i64> {
        engine.query(Ty::Int, [3i64, 1, 2])
    }

    fn n() -> Param {
        Param::new("n", Ty::Int)
    }

    fn gt(k: i64) -> Expr {
        let p = n();
        Expr::lambda(
            vec![p.clone()],
            Expr::binary(BinOp::GreaterThan, Expr::param(&p), Expr::constant(k, Ty::Int)),
        )
    }

    fn identity() -> Expr {
        let p = n();
        Expr::lambda(vec![p.clone()], Expr::param(&p))
    }

    #[test]
    fn composition_is_deferred() {
        let engine = Engine::default();
        let q = numbers(&engine).filter(gt(1)).unwrap();
        assert!(!q.is_materialized());
        assert_eq!(q.element_ty(), &Ty::Int);
        assert_eq!(q.enumerate(), Ok(vec![3, 2]));
        assert!(q.is_materialized());
        assert_eq!(q.to_string(), "[3, 2]");
    }

    #[test]
    fn enumeration_is_cached() {
        let engine = Engine::default();
        let q = numbers(&engine).order_by(identity()).unwrap();
        let first = q.values().unwrap();
        let second = q.values().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn derived_query_reuses_parent_items() {
        let engine = Engine::default();
        let parent = numbers(&engine).filter(gt(1)).unwrap();
        parent.enumerate().unwrap();
        let child = parent.take(1).unwrap();
        assert_eq!(child.enumerate(), Ok(vec![3]));
    }

    #[test]
    fn scalars() {
        let engine = Engine::default();
        let q = numbers(&engine);
        assert_eq!(q.count(), Ok(3));
        assert_eq!(q.first(), Ok(3));
        assert_eq!(q.last(), Ok(2));
        assert_eq!(q.any(), Ok(true));
        assert_eq!(q.all(gt(0)), Ok(true));
        assert_eq!(q.sum::<i64>(identity()), Ok(6));
        assert!(matches!(q.single(), Err(Error::Exec(_))));
        let empty = q.filter(gt(5)).unwrap();
        assert_eq!(empty.first_or_default(), Ok(0));
        assert_eq!(empty.single_or_default(), Ok(0));
    }

    #[test]
    fn scalar_operation_does_not_compose() {
        let engine = Engine::default();
        let err = numbers(&engine).compose::<i64>("count", vec![]).unwrap_err();
        assert_eq!(err, Error::NotAQueryable { ty: Ty::Int.to_string() });
    }

    #[test]
    fn from_expression_requires_a_queryable() {
        let engine = Engine::default();
        let q = numbers(&engine).skip(1).unwrap();
        let again: Query<i64> = Query::from_expression(&engine, q.expression()).unwrap();
        assert_eq!(again.enumerate(), Ok(vec![1, 2]));
        assert!(matches!(
            Query::<i64>::from_expression(&engine, Expr::constant(1i64, Ty::Int)),
            Err(Error::NotAQueryable { .. })
        ));
    }

    fn people(engine: &Engine) -> Query {
        let person =
            |name: &str, age: i64| Record::new("Person").with("Name", name).with("Age", age);
        engine.query(
            Ty::record("Person"),
            [person("b", 1), person("a", 2), person("b", 0), person("a", 1)],
        )
    }

    fn field(name: &str, ty: Ty) -> Expr {
        crate::lambda("p", Ty::record("Person"), |p| p.member(name, ty))
    }

    fn names_then_ages(by_name: &Query) -> Vec<i64> {
        by_name
            .then_by(field("Age", Ty::Int))
            .unwrap()
            .select::<i64>(field("Age", Ty::Int))
            .unwrap()
            .enumerate()
            .unwrap()
    }

    #[test]
    fn then_by_after_enumerating_the_ordered_parent() {
        let engine = Engine::default();
        let fresh = people(&engine).order_by(field("Name", Ty::String)).unwrap();
        assert_eq!(names_then_ages(&fresh), vec![1, 2, 0, 1]);

        let by_name = people(&engine).order_by(field("Name", Ty::String)).unwrap();
        assert_eq!(by_name.enumerate().unwrap().len(), 4);
        assert!(by_name.is_materialized());
        assert_eq!(names_then_ages(&by_name), vec![1, 2, 0, 1]);
    }

    #[test]
    fn chained_calls_on_an_absent_field_yield_null() {
        let engine = Engine::default();
        let rows: Query = engine.query(
            Ty::record("Person"),
            [
                Record::new("Person").with("Name", " b "),
                Record::new("Person").with("Name", Value::Null),
            ],
        );
        let trimmed = crate::lambda("p", Ty::record("Person"), |p| {
            (0..6).fold(p.member("Name", Ty::String), |e, _| {
                e.call_method("String", "trim", Ty::String, vec![])
            })
        });
        let names = rows.select::<Option<String>>(trimmed).unwrap().enumerate();
        assert_eq!(names, Ok(vec![Some("b".to_string()), None]));
    }
}
