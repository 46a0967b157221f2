//! Query planner
//!
//! Turns a `QuerySpec` plus column metadata into a `QueryPlan`. Planning
//! never touches column data, so a plan can be cached and re-executed for
//! any filter values of the same shape.
//!
//! # Invariants
//!
//! - Planning either fails before emitting anything or returns a complete
//!   plan; the `QuerySpec`'s `value_index` fields are only written on success.
//! - `max_row_count` is an upper bound on the rows the plan can return.
//! - Each filter that receives a `value_index` gets a distinct one, dense
//!   from zero, in the order filters are applied.

mod builder;
mod errors;

pub use builder::QueryPlanBuilder;
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
