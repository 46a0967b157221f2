//! Bytecode interpreter
//!
//! Executes a `QueryPlan` against live columns and a caller-supplied
//! `ValueFetcher`, leaving the result as an index span in the plan's output
//! register.
//!
//! # Invariants
//!
//! - Instructions run exactly once, in program order
//! - A register read as the wrong type panics; it is a planner bug
//! - Buffers are allocated on first use and reused on re-execution
//! - Filters preserve the relative order of surviving indices
//! - Sorting is stable; distinct and min/max keep the first occurrence

mod cast;
mod filters;
mod interpreter;
mod registers;
mod row_layout;
mod sorter;

pub use cast::{cast_filter_value, cast_filter_value_list};
pub use interpreter::{Interpreter, InterpreterOptions, NULL_STORAGE_INDEX};
pub use registers::{RegValue, RegisterFile, RegisterType};
pub use row_layout::{encode_f64_key, encode_i32_key, encode_i64_key, encode_u32_key};
