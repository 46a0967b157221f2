//! Secondary permutation index

use std::cmp::Ordering;

use super::errors::{ColumnError, ColumnResult};
use super::model::Column;
use crate::memory::Slab;
use crate::strings::StringPool;

/// Rows ordered by a tuple of column values.
///
/// The permutation vector lists row ids sorted lexicographically by the
/// indexed columns, nulls first, strings by content. Rows with equal tuples
/// keep ascending row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    columns: Vec<u32>,
    permutation_vector: Slab<u32>,
}

impl Index {
    pub fn build(columns: Vec<u32>, table: &[Column], pool: &StringPool) -> ColumnResult<Self> {
        let mut cols = Vec::with_capacity(columns.len());
        for c in &columns {
            cols.push(table.get(*c as usize).ok_or(ColumnError::UnknownColumn(*c))?);
        }
        let row_count = match cols.first() {
            Some(first) => first.row_count(),
            None => 0,
        };
        if cols.iter().any(|c| c.row_count() != row_count) {
            let mut counts: Vec<usize> = cols.iter().map(|c| c.row_count()).collect();
            counts.sort_unstable();
            counts.dedup();
            return Err(ColumnError::RowCountMismatch(counts.len()));
        }

        let mut rows: Vec<u32> = (0..row_count as u32).collect();
        rows.sort_by(|a, b| compare_rows(&cols, *a, *b, pool));

        Ok(Self {
            columns,
            permutation_vector: Slab::from(rows),
        })
    }

    /// Indexed column positions, in key order.
    pub fn columns(&self) -> &[u32] {
        &self.columns
    }

    pub fn permutation_vector(&self) -> &[u32] {
        self.permutation_vector.as_slice()
    }

    pub fn len(&self) -> usize {
        self.permutation_vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutation_vector.is_empty()
    }
}

fn compare_rows(cols: &[&Column], a: u32, b: u32, pool: &StringPool) -> Ordering {
    for col in cols {
        let ord = match (col.value(a), col.value(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(&y, pool),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
