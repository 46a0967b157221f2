//! CLI module for dfengine
//!
//! Provides command-line interface for:
//! - query: Run a query over a JSON table and print the rows
//! - explain: Print the plan a query compiles to
//! - plan: Print the serialized plan

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, QueryArgs};
pub use commands::{explain, plan, query, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{load_query, load_table, QueryFile, TableFile};
