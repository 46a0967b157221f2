//! dfengine - a bytecode query engine for in-memory columnar tables
//!
//! Query specs are compiled into register-machine programs by the planner
//! and run by the interpreter against typed, nullable columns.

pub mod bytecode;
pub mod cli;
pub mod column;
pub mod config;
pub mod cursor;
pub mod dataframe;
pub mod interpreter;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod planner;
pub mod query;
pub mod strings;
pub mod types;
