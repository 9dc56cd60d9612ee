// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Query operation definitions.
//!
//! One table describes both vocabularies. The provider flavor takes a
//! `Queryable<T0>` source and quoted lambdas; the sequence flavor takes a
//! `Sequence<T0>` source and plain delegates. `T0` is always the source
//! element type, `T1` (when present) the selector's result type.

use lenq_ast::Ty;

/// Parameter shape of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// The source sequence
    Source,
    /// A second sequence of `T0`
    Other,
    /// `func(T0) -> bool`
    Predicate,
    /// `func(T0) -> T1`
    Selector,
    Int,
    /// A value of `T0`
    Element,
}

/// Return shape of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// A sequence of `T0`
    Source,
    /// A sequence of `T1`
    Projected,
    /// `List<T0>`
    List,
    /// A single `T0`
    Element,
    /// A single `T1`
    Selected,
    Int,
    Bool,
    /// `float`, or `float?` when the averaged values are nullable
    Average,
}

/// Which vocabulary an operation is instantiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Provider,
    Sequence,
}

/// Operation signature.
#[derive(Debug, Clone)]
pub struct OpDef {
    pub name: &'static str,
    pub generics: usize,
    pub params: &'static [ParamShape],
    pub returns: ReturnShape,
}

use ParamShape::*;

const SRC: &[ParamShape] = &[Source];
const SRC_PRED: &[ParamShape] = &[Source, Predicate];
const SRC_SEL: &[ParamShape] = &[Source, Selector];
const SRC_INT: &[ParamShape] = &[Source, Int];

/// Every operation the engine understands.
#[rustfmt::skip]
pub const OPERATIONS: &[OpDef] = &[
    // Filtering and projection
    OpDef { name: "where", generics: 1, params: SRC_PRED, returns: ReturnShape::Source },
    OpDef { name: "select", generics: 2, params: SRC_SEL, returns: ReturnShape::Projected },

    // Ordering
    OpDef { name: "order_by", generics: 2, params: SRC_SEL, returns: ReturnShape::Source },
    OpDef { name: "order_by_descending", generics: 2, params: SRC_SEL, returns: ReturnShape::Source },
    OpDef { name: "then_by", generics: 2, params: SRC_SEL, returns: ReturnShape::Source },
    OpDef { name: "then_by_descending", generics: 2, params: SRC_SEL, returns: ReturnShape::Source },
    OpDef { name: "reverse", generics: 1, params: SRC, returns: ReturnShape::Source },

    // Partitioning and set
    OpDef { name: "skip", generics: 1, params: SRC_INT, returns: ReturnShape::Source },
    OpDef { name: "take", generics: 1, params: SRC_INT, returns: ReturnShape::Source },
    OpDef { name: "distinct", generics: 1, params: SRC, returns: ReturnShape::Source },
    OpDef { name: "concat", generics: 1, params: &[Source, Other], returns: ReturnShape::Source },

    // Element
    OpDef { name: "first", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "first", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "first_or_default", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "first_or_default", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "last", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "last", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "last_or_default", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "last_or_default", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "single", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "single", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "single_or_default", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "single_or_default", generics: 1, params: SRC_PRED, returns: ReturnShape::Element },
    OpDef { name: "element_at", generics: 1, params: SRC_INT, returns: ReturnShape::Element },

    // Quantifiers
    OpDef { name: "count", generics: 1, params: SRC, returns: ReturnShape::Int },
    OpDef { name: "count", generics: 1, params: SRC_PRED, returns: ReturnShape::Int },
    OpDef { name: "any", generics: 1, params: SRC, returns: ReturnShape::Bool },
    OpDef { name: "any", generics: 1, params: SRC_PRED, returns: ReturnShape::Bool },
    OpDef { name: "all", generics: 1, params: SRC_PRED, returns: ReturnShape::Bool },
    OpDef { name: "contains", generics: 1, params: &[Source, Element], returns: ReturnShape::Bool },

    // Aggregates
    OpDef { name: "sum", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "sum", generics: 2, params: SRC_SEL, returns: ReturnShape::Selected },
    OpDef { name: "min", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "min", generics: 2, params: SRC_SEL, returns: ReturnShape::Selected },
    OpDef { name: "max", generics: 1, params: SRC, returns: ReturnShape::Element },
    OpDef { name: "max", generics: 2, params: SRC_SEL, returns: ReturnShape::Selected },
    OpDef { name: "average", generics: 1, params: SRC, returns: ReturnShape::Average },
    OpDef { name: "average", generics: 2, params: SRC_SEL, returns: ReturnShape::Average },

    // Conversion
    OpDef { name: "to_list", generics: 1, params: SRC, returns: ReturnShape::List },
];

/// All overloads of `name`.
pub fn lookup(name: &str) -> impl Iterator<Item = &'static OpDef> + '_ {
    OPERATIONS.iter().filter(move |op| op.name == name)
}

pub fn has_operation(name: &str) -> bool {
    lookup(name).next().is_some()
}

/// Distinct operation names, in table order.
pub fn operation_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::new();
    for op in OPERATIONS {
        if !names.contains(&op.name) {
            names.push(op.name);
        }
    }
    names
}

/// Secondary orderings, which refine the ordering of their source.
pub fn is_refinement(name: &str) -> bool {
    matches!(name, "then_by" | "then_by_descending")
}

impl OpDef {
    /// Instantiate parameter `index` with `type_args`. `None` if the type
    /// arguments don't cover it.
    pub fn param_ty(&self, index: usize, flavor: Flavor, type_args: &[Ty]) -> Option<Ty> {
        let t0 = type_args.first()?.clone();
        let ty = match self.params.get(index)? {
            Source => match flavor {
                Flavor::Provider => Ty::queryable(t0),
                Flavor::Sequence => Ty::sequence(t0),
            },
            Other => Ty::sequence(t0),
            Predicate => delegate(flavor, Ty::func(vec![t0], Ty::Bool)),
            Selector => delegate(flavor, Ty::func(vec![t0], type_args.get(1)?.clone())),
            Int => Ty::Int,
            Element => t0,
        };
        Some(ty)
    }

    pub fn return_ty(&self, flavor: Flavor, type_args: &[Ty]) -> Option<Ty> {
        let t0 = type_args.first()?.clone();
        let seq = |elem: Ty| match flavor {
            Flavor::Provider => Ty::queryable(elem),
            Flavor::Sequence => Ty::sequence(elem),
        };
        let ty = match self.returns {
            ReturnShape::Source => seq(t0),
            ReturnShape::Projected => seq(type_args.get(1)?.clone()),
            ReturnShape::List => Ty::list(t0),
            ReturnShape::Element => t0,
            ReturnShape::Selected => type_args.get(1)?.clone(),
            ReturnShape::Int => Ty::Int,
            ReturnShape::Bool => Ty::Bool,
            ReturnShape::Average => {
                let averaged = type_args.get(self.generics - 1)?;
                if averaged.is_nullable() {
                    Ty::nullable(Ty::Float)
                } else {
                    Ty::Float
                }
            }
        };
        Some(ty)
    }
}

fn delegate(flavor: Flavor, func: Ty) -> Ty {
    match flavor {
        Flavor::Provider => Ty::quoted(func),
        Flavor::Sequence => func,
    }
}
