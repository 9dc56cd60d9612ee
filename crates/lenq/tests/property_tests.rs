// SPDX-License-Identifier: (MIT OR Apache-2.0)
use lenq::{lambda, BinOp, Engine, Expr, MethodRef, Query, Record, Ty, Value};
use lenq_guard::NullGuardRewriter;
use proptest::prelude::*;

const MAX_DEPTH: usize = 5;

fn node_ty() -> Ty {
    Ty::record("Node")
}

/// A root with `present` nested `Next` links; level `i` holds `Value = base + i`.
fn chain(base: i64, present: usize) -> Record {
    let mut node = Record::new("Node").with("Value", base + present as i64);
    for level in (0..present).rev() {
        node = Record::new("Node")
            .with("Value", base + level as i64)
            .with("Next", node);
    }
    node
}

/// `x.Next.Next...Next` with `hops` links.
fn navigate(x: Expr, hops: usize) -> Expr {
    (0..hops).fold(x, |e, _| e.member("Next", node_ty()))
}

fn value_at(hops: usize) -> Expr {
    lambda("x", node_ty(), |x| navigate(x, hops).member("Value", Ty::Int))
}

fn label_at(hops: usize) -> Expr {
    lambda("x", node_ty(), |x| navigate(x, hops).member("Label", Ty::String))
}

proptest! {
    #[test]
    fn prop_absent_link_yields_default(
        base in -1000i64..1000,
        present in 0..=MAX_DEPTH,
        hops in 1..=MAX_DEPTH,
    ) {
        let engine = Engine::default();
        let roots: Query = engine.query(node_ty(), [chain(base, present)]);

        let values = roots.select::<i64>(value_at(hops)).unwrap().enumerate().unwrap();
        let expected = if present >= hops { base + hops as i64 } else { 0 };
        prop_assert_eq!(values, vec![expected]);

        let labels = roots.select::<Option<String>>(label_at(hops)).unwrap().enumerate();
        prop_assert_eq!(labels, Ok(vec![None]));
    }

    #[test]
    fn prop_rewriting_twice_evaluates_the_same(
        bases in prop::collection::vec(-100i64..100, 1..8),
        present in prop::collection::vec(0..=MAX_DEPTH, 1..8),
        hops in 1..=MAX_DEPTH,
        threshold in -100i64..100,
    ) {
        let engine = Engine::default();
        let rewriter = NullGuardRewriter::default();
        let roots: Vec<Value> = bases
            .iter()
            .zip(present.iter().cycle())
            .map(|(&base, &present)| chain(base, present).into())
            .collect();
        let source = Expr::constant(Value::list(roots), Ty::sequence(node_ty()));

        let above = lambda("x", node_ty(), |x| {
            Expr::binary(
                BinOp::GreaterThan,
                navigate(x, hops).member("Value", Ty::Int),
                Expr::constant(threshold, Ty::Int),
            )
        });
        for (body, ret) in [(value_at(hops), Ty::Int), (above, Ty::Bool)] {
            let once = rewriter.rewrite_lambda(&body).unwrap();
            let twice = rewriter.rewrite_lambda(&once).unwrap();
            let select = |f: Expr| {
                Expr::call(
                    None,
                    MethodRef::sequence("select", vec![node_ty(), ret.clone()], Ty::sequence(ret.clone())),
                    vec![source.clone(), f],
                )
            };
            let first: Value = engine.execute(select(once)).unwrap();
            let second: Value = engine.execute(select(twice)).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn prop_composed_operations_match_direct_evaluation(
        items in prop::collection::vec(-1000i64..1000, 0..40),
        ops in prop::collection::vec(arb_op(), 1..7),
    ) {
        let engine = Engine::default();
        let mut query: Query<i64> = engine.query(Ty::Int, items.iter().copied());
        let mut expected = items;
        for op in &ops {
            query = op.compose(&query);
            expected = op.apply(expected);
        }
        prop_assert_eq!(query.enumerate(), Ok(expected.clone()));
        prop_assert_eq!(query.count(), Ok(expected.len() as i64));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Above(i64),
    Plus(i64),
    Order { descending: bool },
    Skip(i64),
    Take(i64),
    Distinct,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-1000i64..1000).prop_map(Op::Above),
        (-10i64..10).prop_map(Op::Plus),
        any::<bool>().prop_map(|descending| Op::Order { descending }),
        (-2i64..20).prop_map(Op::Skip),
        (-2i64..20).prop_map(Op::Take),
        Just(Op::Distinct),
    ]
}

fn identity() -> Expr {
    lambda("n", Ty::Int, |n| n)
}

impl Op {
    fn compose(&self, query: &Query<i64>) -> Query<i64> {
        let composed = match *self {
            Op::Above(k) => query.filter(lambda("n", Ty::Int, |n| {
                Expr::binary(BinOp::GreaterThan, n, Expr::constant(k, Ty::Int))
            })),
            Op::Plus(k) => query.select(lambda("n", Ty::Int, |n| {
                Expr::binary(BinOp::Add, n, Expr::constant(k, Ty::Int))
            })),
            Op::Order { descending: false } => query.order_by(identity()),
            Op::Order { descending: true } => query.order_by_descending(identity()),
            Op::Skip(count) => query.skip(count),
            Op::Take(count) => query.take(count),
            Op::Distinct => query.distinct(),
        };
        composed.unwrap()
    }

    fn apply(&self, mut items: Vec<i64>) -> Vec<i64> {
        let clamp = |count: i64| count.max(0) as usize;
        match *self {
            Op::Above(k) => items.into_iter().filter(|&n| n > k).collect(),
            Op::Plus(k) => items.into_iter().map(|n| n + k).collect(),
            Op::Order { descending } => {
                if descending {
                    items.sort_by(|a, b| b.cmp(a));
                } else {
                    items.sort();
                }
                items
            }
            Op::Skip(count) => items.into_iter().skip(clamp(count)).collect(),
            Op::Take(count) => items.into_iter().take(clamp(count)).collect(),
            Op::Distinct => {
                let mut seen = Vec::new();
                items.retain(|n| {
                    let fresh = !seen.contains(n);
                    seen.push(*n);
                    fresh
                });
                items
            }
        }
    }
}
