//! Dataframe host
//!
//! Owns a table's columns, indexes and string pool, and wraps the planner
//! and interpreter behind a plan cache.
//!
//! # Invariants
//!
//! - Every column has the same row count
//! - A cached plan is only reused while the column generation it was built
//!   against is current
//! - A rejected `push_row` leaves every column unchanged
//! - Indexes always cover every row

mod builder;
mod cache;
mod dataframe;
mod errors;

pub use builder::DataframeBuilder;
pub use cache::{CachedPlan, PlanCache, PlanShape};
pub use dataframe::Dataframe;
pub use errors::{DataframeError, DataframeResult};
