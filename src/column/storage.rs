//! Typed value buffers and null representations

use std::cmp::Ordering;

use super::errors::{ColumnError, ColumnResult};
use crate::memory::{BitVector, FlexVector};
use crate::strings::{StringId, StringPool};
use crate::types::{Nullability, StorageType};

/// A single non-null value as it sits in storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoredValue {
    Uint32(u32),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(StringId),
}

impl StoredValue {
    pub fn storage_type(&self) -> StorageType {
        match self {
            StoredValue::Uint32(_) => StorageType::Uint32,
            StoredValue::Int32(_) => StorageType::Int32,
            StoredValue::Int64(_) => StorageType::Int64,
            StoredValue::Double(_) => StorageType::Double,
            StoredValue::String(_) => StorageType::String,
        }
    }

    /// Orders two values of the same type. Strings order by content,
    /// doubles by [`compare_f64`].
    pub fn compare(&self, other: &StoredValue, pool: &StringPool) -> Ordering {
        match (self, other) {
            (StoredValue::Uint32(a), StoredValue::Uint32(b)) => a.cmp(b),
            (StoredValue::Int32(a), StoredValue::Int32(b)) => a.cmp(b),
            (StoredValue::Int64(a), StoredValue::Int64(b)) => a.cmp(b),
            (StoredValue::Double(a), StoredValue::Double(b)) => compare_f64(*a, *b),
            (StoredValue::String(a), StoredValue::String(b)) => pool.get(*a).cmp(pool.get(*b)),
            (a, b) => panic!(
                "comparing {:?} with {:?}",
                a.storage_type(),
                b.storage_type()
            ),
        }
    }
}

/// Orders doubles numerically with `-0.0 == 0.0`. NaN equals NaN and
/// orders after every number.
pub fn compare_f64(x: f64, v: f64) -> Ordering {
    x.partial_cmp(&v).unwrap_or_else(|| {
        if x.is_nan() && !v.is_nan() {
            Ordering::Greater
        } else if v.is_nan() && !x.is_nan() {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    })
}

/// Column data buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// Implicit `0..size`.
    Id { size: u32 },
    Uint32(FlexVector<u32>),
    Int32(FlexVector<i32>),
    Int64(FlexVector<i64>),
    Double(FlexVector<f64>),
    String(FlexVector<StringId>),
}

impl Storage {
    /// Empty storage of the given type.
    pub fn empty(ty: StorageType) -> Self {
        match ty {
            StorageType::Id => Storage::Id { size: 0 },
            StorageType::Uint32 => Storage::Uint32(FlexVector::new()),
            StorageType::Int32 => Storage::Int32(FlexVector::new()),
            StorageType::Int64 => Storage::Int64(FlexVector::new()),
            StorageType::Double => Storage::Double(FlexVector::new()),
            StorageType::String => Storage::String(FlexVector::new()),
        }
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Storage::Id { .. } => StorageType::Id,
            Storage::Uint32(_) => StorageType::Uint32,
            Storage::Int32(_) => StorageType::Int32,
            Storage::Int64(_) => StorageType::Int64,
            Storage::Double(_) => StorageType::Double,
            Storage::String(_) => StorageType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::Id { size } => *size as usize,
            Storage::Uint32(v) => v.len(),
            Storage::Int32(v) => v.len(),
            Storage::Int64(v) => v.len(),
            Storage::Double(v) => v.len(),
            Storage::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_uint32(&self) -> Option<&[u32]> {
        match self {
            Storage::Uint32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_int32(&self) -> Option<&[i32]> {
        match self {
            Storage::Int32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<&[i64]> {
        match self {
            Storage::Int64(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<&[f64]> {
        match self {
            Storage::Double(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[StringId]> {
        match self {
            Storage::String(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Value at storage slot `i`. Id storage reports the slot itself.
    pub fn get(&self, i: usize) -> StoredValue {
        match self {
            Storage::Id { .. } => StoredValue::Uint32(i as u32),
            Storage::Uint32(v) => StoredValue::Uint32(v[i]),
            Storage::Int32(v) => StoredValue::Int32(v[i]),
            Storage::Int64(v) => StoredValue::Int64(v[i]),
            Storage::Double(v) => StoredValue::Double(v[i]),
            Storage::String(v) => StoredValue::String(v[i]),
        }
    }

    /// Appends a value of the storage's own type.
    pub fn push(&mut self, value: StoredValue) -> ColumnResult<()> {
        match (self, value) {
            (Storage::Id { size }, StoredValue::Uint32(v)) => {
                if v != *size {
                    return Err(ColumnError::IdSequenceBroken {
                        rows: *size,
                        value: v,
                    });
                }
                *size += 1;
            }
            (Storage::Uint32(s), StoredValue::Uint32(v)) => s.push_back(v),
            (Storage::Int32(s), StoredValue::Int32(v)) => s.push_back(v),
            (Storage::Int64(s), StoredValue::Int64(v)) => s.push_back(v),
            (Storage::Double(s), StoredValue::Double(v)) => s.push_back(v),
            (Storage::String(s), StoredValue::String(v)) => s.push_back(v),
            (s, v) => {
                return Err(ColumnError::TypeMismatch {
                    expected: s.storage_type(),
                    actual: v.storage_type(),
                })
            }
        }
        Ok(())
    }

    /// Appends a placeholder slot (used for dense nulls).
    pub fn push_default(&mut self) {
        match self {
            Storage::Id { size } => *size += 1,
            Storage::Uint32(s) => s.push_back(0),
            Storage::Int32(s) => s.push_back(0),
            Storage::Int64(s) => s.push_back(0),
            Storage::Double(s) => s.push_back(0.0),
            Storage::String(s) => s.push_back(StringId::default()),
        }
    }
}

/// How null rows are represented.
#[derive(Debug, Clone, PartialEq)]
pub enum NullStorage {
    NonNull,
    /// Bit set for non-null rows; storage holds only non-null values.
    SparseNull { bit_vector: BitVector },
    /// Bit set for non-null rows; storage has a slot for every row.
    DenseNull { bit_vector: BitVector },
}

impl NullStorage {
    pub fn nullability(&self) -> Nullability {
        match self {
            NullStorage::NonNull => Nullability::NonNull,
            NullStorage::SparseNull { .. } => Nullability::SparseNull,
            NullStorage::DenseNull { .. } => Nullability::DenseNull,
        }
    }

    pub fn bit_vector(&self) -> Option<&BitVector> {
        match self {
            NullStorage::NonNull => None,
            NullStorage::SparseNull { bit_vector } | NullStorage::DenseNull { bit_vector } => {
                Some(bit_vector)
            }
        }
    }

    pub(crate) fn bit_vector_mut(&mut self) -> Option<&mut BitVector> {
        match self {
            NullStorage::NonNull => None,
            NullStorage::SparseNull { bit_vector } | NullStorage::DenseNull { bit_vector } => {
                Some(bit_vector)
            }
        }
    }
}
