//! Query plans
//!
//! A `QueryPlan` is the planner's output: execution parameters, the
//! bytecode program and the column to output slot map. Plans are immutable
//! and can be serialized to Base64 and explained.
//!
//! # Invariants
//!
//! - `deserialize(serialize(p)) == p`
//! - `serialize(deserialize(s)) == s` for every accepted `s`
//! - Decoding never returns a partially decoded plan

mod errors;
mod explain;
mod query_plan;

pub use errors::{PlanFormatError, PlanFormatResult};
pub use explain::{ExplainStep, PlanExplain};
pub use query_plan::{ExecutionParams, QueryPlan, EXECUTION_PARAMS_SIZE};
