//! CLI argument definitions using clap
//!
//! Commands:
//! - dfengine query --table <path> --query <path> [--config <path>]
//! - dfengine explain --table <path> --query <path> [--config <path>]
//! - dfengine plan --table <path> --query <path> [--config <path>]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// dfengine - plan and run queries over JSON tables
#[derive(Parser, Debug)]
#[command(name = "dfengine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query and print one JSON object per result row
    Query(QueryArgs),

    /// Print the plan for a query as JSON
    Explain(QueryArgs),

    /// Print the serialized plan for a query
    Plan(QueryArgs),
}

/// Inputs shared by every command
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Path to the table JSON file
    #[arg(long)]
    pub table: PathBuf,

    /// Path to the query JSON file
    #[arg(long)]
    pub query: PathBuf,

    /// Path to an engine configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
