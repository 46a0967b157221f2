//! # Dataframe Errors

use thiserror::Error;

use crate::column::ColumnError;
use crate::planner::PlannerError;
use crate::types::StorageType;

/// Result type for dataframe operations
pub type DataframeResult<T> = Result<T, DataframeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataframeError {
    #[error(transparent)]
    Column(#[from] ColumnError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Row has {actual} cells, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("Column '{0}' declared twice")]
    DuplicateColumn(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Column '{column}' mixes strings with numbers")]
    MixedTypes { column: String },

    #[error("Column '{column}' holds {expected:?}, got {value}")]
    TypeMismatch {
        column: String,
        expected: StorageType,
        value: String,
    },

    #[error("Value {value} does not fit {expected:?} column '{column}'")]
    OutOfRange {
        column: String,
        expected: StorageType,
        value: i64,
    },

    #[error("Column '{column}' cell is a list; only scalars are stored")]
    ListCell { column: String },

    #[error("Column '{column}' is not the row sequence 0..{rows}")]
    NotIdColumn { column: String, rows: usize },

    #[error("Table has {names} names for {columns} columns")]
    NameCount { names: usize, columns: usize },

    #[error("Columns disagree on row count: {0:?}")]
    RowCountMismatch(Vec<usize>),
}
