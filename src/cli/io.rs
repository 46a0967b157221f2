//! JSON file formats and output for the CLI
//!
//! - Inputs are whole JSON documents read from files
//! - Query rows are written one JSON object per line
//! - UTF-8 only

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::errors::{CliError, CliResult};
use crate::config::EngineConfig;
use crate::cursor::{CellValue, Cursor};
use crate::dataframe::Dataframe;
use crate::query::{FilterValue, QuerySpec};

/// Table file: column names plus row-major cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFile {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<FilterValue>>,
    /// Column positions of each index, in key order.
    #[serde(default)]
    pub indexes: Vec<Vec<u32>>,
    /// Columns whose nulls keep a storage slot.
    #[serde(default)]
    pub dense_null: Vec<String>,
    #[serde(default)]
    pub id_column: Option<String>,
}

/// Query file: a `QuerySpec` plus one value per filter, in filter order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFile {
    #[serde(flatten)]
    pub spec: QuerySpec,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

/// Read and parse a JSON document
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

/// Engine config from `path`, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(p) => Ok(EngineConfig::load(p)?),
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_table(path: &Path, config: EngineConfig) -> CliResult<Dataframe> {
    let table: TableFile = read_json(path)
        .map_err(|e| CliError::invalid_table(e.message().to_string()))?;

    let mut builder = Dataframe::builder(table.columns).config(config);
    for name in table.dense_null {
        builder = builder.dense_null(name);
    }
    if let Some(id) = table.id_column {
        builder = builder.id_column(id);
    }
    for cols in table.indexes {
        builder = builder.index(cols);
    }
    for row in table.rows {
        builder.add_row(row)?;
    }
    Ok(builder.build()?)
}

pub fn load_query(path: &Path) -> CliResult<QueryFile> {
    let query: QueryFile = read_json(path)
        .map_err(|e| CliError::invalid_query(e.message().to_string()))?;
    if query.values.len() > query.spec.filters.len() {
        return Err(CliError::invalid_query(format!(
            "{} values for {} filters",
            query.values.len(),
            query.spec.filters.len()
        )));
    }
    Ok(query)
}

fn cell_to_json(value: CellValue<'_>) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Int64(v) => Value::from(v),
        CellValue::Double(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        CellValue::String(v) => Value::from(v),
    }
}

/// The cursor's current row as a JSON object keyed by column name
pub fn row_to_json(cursor: &Cursor<'_>, names: &[String]) -> Value {
    let mut row = Map::new();
    for (col, name) in names.iter().enumerate() {
        row.insert(name.clone(), cell_to_json(cursor.cell_value(col as u32)));
    }
    Value::Object(row)
}

/// Write one JSON value followed by a newline
pub fn write_json_line(out: &mut dyn Write, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
