//! Row-oriented dataframe construction
//!
//! Rows arrive as owned cells. At build time each column's storage type,
//! null layout, sort state and duplicate state are inferred from its cells.

use std::collections::HashSet;

use super::dataframe::Dataframe;
use super::errors::{DataframeError, DataframeResult};
use crate::column::{
    Column, ColumnError, NullStorage, SmallValueEq, SpecializedStorage, Storage, StoredValue,
};
use crate::config::EngineConfig;
use crate::memory::BitVector;
use crate::query::FilterValue;
use crate::strings::StringPool;
use crate::types::{DuplicateState, Nullability, SortState, StorageType};

/// Sorted unique uint32 columns get a `SmallValueEq` bitmap when their
/// largest value is below `rows * SMALL_VALUE_EQ_DENSITY`.
const SMALL_VALUE_EQ_DENSITY: usize = 8;

pub struct DataframeBuilder {
    names: Vec<String>,
    rows: Vec<Vec<FilterValue>>,
    dense_null: Vec<String>,
    id_column: Option<String>,
    indexes: Vec<Vec<u32>>,
    config: EngineConfig,
}

impl DataframeBuilder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            dense_null: Vec::new(),
            id_column: None,
            indexes: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Stores nulls of `name` densely: every row keeps a storage slot.
    pub fn dense_null(mut self, name: impl Into<String>) -> Self {
        self.dense_null.push(name.into());
        self
    }

    /// Promotes `name` to an implicit id column. Its cells must be exactly
    /// `0, 1, .., n-1`.
    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.id_column = Some(name.into());
        self
    }

    /// Builds a permutation index over `cols` once the table exists.
    pub fn index(mut self, cols: Vec<u32>) -> Self {
        self.indexes.push(cols);
        self
    }

    pub fn add_row(&mut self, cells: Vec<FilterValue>) -> DataframeResult<()> {
        if cells.len() != self.names.len() {
            return Err(DataframeError::RowWidth {
                expected: self.names.len(),
                actual: cells.len(),
            });
        }
        self.rows.push(cells);
        Ok(())
    }

    pub fn build(self) -> DataframeResult<Dataframe> {
        let mut seen = HashSet::new();
        for name in &self.names {
            if !seen.insert(name.as_str()) {
                return Err(DataframeError::DuplicateColumn(name.clone()));
            }
        }
        for name in self.dense_null.iter().chain(&self.id_column) {
            if !seen.contains(name.as_str()) {
                return Err(DataframeError::UnknownColumn(name.clone()));
            }
        }

        let mut pool = StringPool::new();
        let mut columns = Vec::with_capacity(self.names.len());
        for (i, name) in self.names.iter().enumerate() {
            let cells: Vec<&FilterValue> = self.rows.iter().map(|row| &row[i]).collect();
            let column = if self.id_column.as_deref() == Some(name.as_str()) {
                id_column(name, &cells)?
            } else {
                let layout = if self.dense_null.contains(name) {
                    Nullability::DenseNull
                } else {
                    Nullability::SparseNull
                };
                infer_column(name, &cells, layout, &mut pool, &self.config)?
            };
            columns.push(column);
        }

        let mut df = Dataframe::new(self.names, columns, pool, self.config)?;
        for cols in self.indexes {
            df.add_index(cols)?;
        }
        Ok(df)
    }
}

/// Converts a cell to the stored form of a `ty` column. `None` is null.
pub(super) fn coerce_cell(
    column: &str,
    ty: StorageType,
    cell: &FilterValue,
    pool: &mut StringPool,
) -> DataframeResult<Option<StoredValue>> {
    let mismatch = |value: &str| DataframeError::TypeMismatch {
        column: column.to_string(),
        expected: ty,
        value: value.to_string(),
    };
    let out_of_range = |value: i64| DataframeError::OutOfRange {
        column: column.to_string(),
        expected: ty,
        value,
    };

    let value = match (ty, cell) {
        (StorageType::Id, FilterValue::Null) => {
            return Err(ColumnError::NullNotAllowed(Nullability::NonNull).into())
        }
        (_, FilterValue::Null) => return Ok(None),
        (_, FilterValue::List(_)) => {
            return Err(DataframeError::ListCell {
                column: column.to_string(),
            })
        }
        (StorageType::Id | StorageType::Uint32, FilterValue::Int64(v)) => {
            StoredValue::Uint32(u32::try_from(*v).map_err(|_| out_of_range(*v))?)
        }
        (StorageType::Int32, FilterValue::Int64(v)) => {
            StoredValue::Int32(i32::try_from(*v).map_err(|_| out_of_range(*v))?)
        }
        (StorageType::Int64, FilterValue::Int64(v)) => StoredValue::Int64(*v),
        (StorageType::Double, FilterValue::Int64(v)) => StoredValue::Double(*v as f64),
        (StorageType::Double, FilterValue::Double(v)) => StoredValue::Double(*v),
        (StorageType::String, FilterValue::String(s)) => StoredValue::String(pool.intern(s)),
        (_, FilterValue::Int64(v)) => return Err(mismatch(&v.to_string())),
        (_, FilterValue::Double(v)) => return Err(mismatch(&v.to_string())),
        (_, FilterValue::String(s)) => return Err(mismatch(&format!("{:?}", s))),
    };
    Ok(Some(value))
}

/// Narrowest storage type holding every non-null cell.
fn infer_type(column: &str, cells: &[&FilterValue]) -> DataframeResult<StorageType> {
    let mut has_double = false;
    let mut has_string = false;
    let mut int_bounds: Option<(i64, i64)> = None;
    for cell in cells {
        match cell {
            FilterValue::Null => {}
            FilterValue::Int64(v) => {
                let (lo, hi) = int_bounds.unwrap_or((*v, *v));
                int_bounds = Some((lo.min(*v), hi.max(*v)));
            }
            FilterValue::Double(_) => has_double = true,
            FilterValue::String(_) => has_string = true,
            FilterValue::List(_) => {
                return Err(DataframeError::ListCell {
                    column: column.to_string(),
                })
            }
        }
    }

    if has_string && (has_double || int_bounds.is_some()) {
        return Err(DataframeError::MixedTypes {
            column: column.to_string(),
        });
    }
    let ty = if has_string {
        StorageType::String
    } else if has_double {
        StorageType::Double
    } else {
        match int_bounds {
            None => StorageType::Uint32,
            Some((lo, hi)) if lo >= 0 && hi <= i64::from(u32::MAX) => StorageType::Uint32,
            Some((lo, hi)) if lo >= i64::from(i32::MIN) && hi <= i64::from(i32::MAX) => {
                StorageType::Int32
            }
            Some(_) => StorageType::Int64,
        }
    };
    Ok(ty)
}

fn id_column(column: &str, cells: &[&FilterValue]) -> DataframeResult<Column> {
    let is_sequence = cells
        .iter()
        .enumerate()
        .all(|(i, cell)| matches!(cell, FilterValue::Int64(v) if *v == i as i64));
    if !is_sequence {
        return Err(DataframeError::NotIdColumn {
            column: column.to_string(),
            rows: cells.len(),
        });
    }
    Ok(Column::id(cells.len() as u32))
}

fn infer_column(
    column: &str,
    cells: &[&FilterValue],
    null_layout: Nullability,
    pool: &mut StringPool,
    config: &EngineConfig,
) -> DataframeResult<Column> {
    let ty = infer_type(column, cells)?;
    let mut stored = Vec::with_capacity(cells.len());
    for cell in cells {
        stored.push(coerce_cell(column, ty, cell, pool)?);
    }

    let has_nulls = stored.iter().any(Option::is_none);
    let dense = null_layout == Nullability::DenseNull;
    let mut storage = Storage::empty(ty);
    for value in &stored {
        match value {
            Some(v) => storage.push(*v)?,
            None if dense => storage.push_default(),
            None => {}
        }
    }
    let null_storage = if dense {
        NullStorage::DenseNull {
            bit_vector: BitVector::from_bools(stored.iter().map(Option::is_some)),
        }
    } else if has_nulls {
        NullStorage::SparseNull {
            bit_vector: BitVector::from_bools(stored.iter().map(Option::is_some)),
        }
    } else {
        NullStorage::NonNull
    };

    let values: Vec<StoredValue> = stored.into_iter().flatten().collect();
    let non_null = null_storage == NullStorage::NonNull;
    let sort_state = infer_sort_state(&values, non_null, pool);
    let duplicate_state = infer_duplicate_state(&values);

    let column_def = Column::new(storage, null_storage, sort_state, duplicate_state)?;
    if !config.use_specialized_storage
        || !non_null
        || sort_state != SortState::Sorted
        || duplicate_state != DuplicateState::NoDuplicates
    {
        return Ok(column_def);
    }
    let small = match column_def.storage().as_uint32() {
        Some(data) => match data.last() {
            Some(last) if (*last as usize) < data.len() * SMALL_VALUE_EQ_DENSITY => {
                Some(SmallValueEq::build(data)?)
            }
            _ => None,
        },
        None => None,
    };
    match small {
        Some(s) => Ok(column_def.with_specialized_storage(SpecializedStorage::SmallValueEq(s))?),
        None => Ok(column_def),
    }
}

fn infer_sort_state(values: &[StoredValue], non_null: bool, pool: &StringPool) -> SortState {
    // NaN has no place in a sorted order the filters agree with.
    if values
        .iter()
        .any(|v| matches!(v, StoredValue::Double(d) if d.is_nan()))
    {
        return SortState::Unsorted;
    }
    let ascending = values
        .windows(2)
        .all(|w| w[0].compare(&w[1], pool) != std::cmp::Ordering::Greater);
    if !ascending {
        return SortState::Unsorted;
    }
    if !non_null {
        return SortState::Sorted;
    }

    let uint32: Option<Vec<u32>> = values
        .iter()
        .map(|v| match v {
            StoredValue::Uint32(x) => Some(*x),
            _ => None,
        })
        .collect();
    match uint32 {
        Some(data) if !data.is_empty() => {
            if data.iter().enumerate().all(|(i, v)| *v as usize == i) {
                SortState::IdSorted
            } else if data
                .iter()
                .enumerate()
                .all(|(i, v)| *v as usize == i || (i > 0 && data[i - 1] == *v))
            {
                SortState::SetIdSorted
            } else {
                SortState::Sorted
            }
        }
        _ => SortState::Sorted,
    }
}

fn infer_duplicate_state(values: &[StoredValue]) -> DuplicateState {
    let mut seen = HashSet::with_capacity(values.len());
    for value in values {
        let key = match value {
            StoredValue::Uint32(v) => u64::from(*v),
            StoredValue::Int32(v) => *v as u32 as u64,
            StoredValue::Int64(v) => *v as u64,
            // -0.0 and 0.0 compare equal under every filter.
            StoredValue::Double(v) if *v == 0.0 => 0,
            StoredValue::Double(v) => v.to_bits(),
            StoredValue::String(v) => u64::from(v.raw()),
        };
        if !seen.insert(key) {
            return DuplicateState::HasDuplicates;
        }
    }
    DuplicateState::NoDuplicates
}
