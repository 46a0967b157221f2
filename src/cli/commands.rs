//! CLI command implementations
//!
//! Each command loads the config, the table and the query, plans the query
//! once and writes its result to `out`. Logs go to stderr.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::Value;

use super::args::{Command, QueryArgs};
use super::errors::CliResult;
use super::io::{load_config, load_query, load_table, row_to_json, write_json_line, QueryFile};
use crate::dataframe::Dataframe;
use crate::observability::Logger;
use crate::plan::QueryPlan;
use crate::query::FilterValueList;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_command(cli.command, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command, out: &mut dyn Write) -> CliResult<()> {
    match cmd {
        Command::Query(args) => query(&args, out),
        Command::Explain(args) => explain(&args, out),
        Command::Plan(args) => plan(&args, out),
    }
}

/// Loaded inputs with the query already planned
struct Prepared {
    df: Dataframe,
    query: QueryFile,
    plan: Arc<QueryPlan>,
}

fn prepare(args: &QueryArgs) -> CliResult<Prepared> {
    let config = load_config(args.config.as_deref())?;
    Logger::set_min_severity(config.severity()?);

    let mut df = load_table(&args.table, config)?;
    let mut query = load_query(&args.query)?;
    let plan = df.plan_query(&mut query.spec)?;
    Ok(Prepared { df, query, plan })
}

/// Run the query and print each row as a JSON object
pub fn query(args: &QueryArgs, out: &mut dyn Write) -> CliResult<()> {
    let Prepared { df, query, plan } = prepare(args)?;
    let mut fetcher = FilterValueList::for_filters(&query.spec.filters, query.values);

    let mut cursor = df.query(&plan);
    cursor.execute(&mut fetcher);
    while !cursor.eof() {
        write_json_line(out, &row_to_json(&cursor, df.column_names()))?;
        cursor.next();
    }
    Ok(())
}

/// Print the explained plan
pub fn explain(args: &QueryArgs, out: &mut dyn Write) -> CliResult<()> {
    let Prepared { df, plan, .. } = prepare(args)?;
    let explain = serde_json::to_value(df.explain(&plan))?;
    write_json_line(out, &explain)
}

/// Print the Base64 plan
pub fn plan(args: &QueryArgs, out: &mut dyn Write) -> CliResult<()> {
    let Prepared { plan, .. } = prepare(args)?;
    write_json_line(out, &Value::from(plan.serialize()))
}
