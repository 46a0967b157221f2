//! Operators and search modifiers

use serde::{Deserialize, Serialize};

use super::{type_set, type_subset};

type_set! {
    /// Filter operator.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Op {
        Eq,
        Ne,
        Lt,
        Le,
        Gt,
        Ge,
        Glob,
        Regex,
        IsNull,
        IsNotNull,
        In,
    }
}

type_subset! {
    /// Operators that compare against a single value.
    pub enum NonNullOp: Op { Eq, Ne, Lt, Le, Gt, Ge, Glob, Regex }
}

/// Operators accepted by string filters.
pub type StringOp = NonNullOp;

type_subset! {
    pub enum NullOp: Op { IsNull, IsNotNull }
}

type_subset! {
    /// Operators with a numeric meaning.
    pub enum NonStringOp: Op { Eq, Ne, Lt, Le, Gt, Ge }
}

type_subset! {
    /// Operators that select a contiguous run of a sorted column.
    pub enum RangeOp: Op { Eq, Lt, Le, Gt, Ge }
}

type_subset! {
    pub enum InequalityOp: Op { Lt, Le, Gt, Ge }
}

impl NonNullOp {
    pub fn to_non_string(self) -> Option<NonStringOp> {
        NonStringOp::try_from(Op::from(self)).ok()
    }

    pub fn to_range(self) -> Option<RangeOp> {
        RangeOp::try_from(Op::from(self)).ok()
    }
}

impl Op {
    pub fn is_inequality(self) -> bool {
        InequalityOp::try_from(self).is_ok()
    }
}

impl NonStringOp {
    /// Applies the operator to an ordered pair.
    #[inline]
    pub fn compare<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            NonStringOp::Eq => lhs == rhs,
            NonStringOp::Ne => lhs != rhs,
            NonStringOp::Lt => lhs < rhs,
            NonStringOp::Le => lhs <= rhs,
            NonStringOp::Gt => lhs > rhs,
            NonStringOp::Ge => lhs >= rhs,
        }
    }
}

type_set! {
    /// Binary search flavour used to narrow a sorted range.
    pub enum BoundSearch {
        EqualRange,
        LowerBound,
        UpperBound,
    }
}

type_set! {
    /// Which end of a range a bound search writes.
    pub enum BoundModifier {
        BeginBound,
        EndBound,
        BothBounds,
    }
}

impl RangeOp {
    /// Bound search needed to evaluate the operator on a sorted column.
    pub fn sorted_filter_args(self) -> (BoundModifier, BoundSearch) {
        match self {
            RangeOp::Eq => (BoundModifier::BothBounds, BoundSearch::EqualRange),
            RangeOp::Lt => (BoundModifier::EndBound, BoundSearch::LowerBound),
            RangeOp::Le => (BoundModifier::EndBound, BoundSearch::UpperBound),
            RangeOp::Gt => (BoundModifier::BeginBound, BoundSearch::UpperBound),
            RangeOp::Ge => (BoundModifier::BeginBound, BoundSearch::LowerBound),
        }
    }
}

type_set! {
    pub enum MinMaxOp {
        Min,
        Max,
    }
}

type_set! {
    #[derive(Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SortDirection {
        #[default]
        Ascending,
        Descending,
    }
}
