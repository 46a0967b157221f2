//! Query specifications and filter values
//!
//! The host describes a query declaratively with filter, distinct, sort and
//! limit specs. Filter values are not part of the plan: they are pulled at
//! execution time from a `ValueFetcher`, so one plan serves every set of
//! values with the same shape.

mod spec;
mod value;

pub use spec::{DistinctSpec, FilterSpec, LimitSpec, QuerySpec, SortSpec};
pub use value::{FilterValue, FilterValueList, FilterValueType, ValueFetcher};
