//! # Column Errors

use thiserror::Error;

use crate::types::{Nullability, SortState, StorageType};

/// Result type for column construction and mutation
pub type ColumnResult<T> = Result<T, ColumnError>;

/// Column invariant violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColumnError {
    #[error("Storage length {actual} does not match expected {expected}")]
    StorageLengthMismatch { expected: usize, actual: usize },

    #[error("Id column must be NonNull, IdSorted and NoDuplicates")]
    InvalidIdColumn,

    #[error("Value {value} does not continue id column of {rows} rows")]
    IdSequenceBroken { rows: u32, value: u32 },

    #[error("Column declared {state:?} is out of order at row {row}")]
    NotSorted { state: SortState, row: usize },

    #[error("Sort state {state:?} not supported for {storage:?} storage")]
    UnsupportedSortState {
        state: SortState,
        storage: StorageType,
    },

    #[error("Column declared NoDuplicates repeats a value at row {row}")]
    DuplicateValue { row: usize },

    #[error("Type mismatch: column holds {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: StorageType,
        actual: StorageType,
    },

    #[error("Null pushed into {0:?} column")]
    NullNotAllowed(Nullability),

    #[error("Invalid specialized storage: {0}")]
    InvalidSpecializedStorage(String),

    #[error("Index references unknown column {0}")]
    UnknownColumn(u32),

    #[error("Index columns have {0} distinct row counts")]
    RowCountMismatch(usize),
}
