//! Column definition and invariant checks

use std::cmp::Ordering;

use super::errors::{ColumnError, ColumnResult};
use super::specialized::SpecializedStorage;
use super::storage::{NullStorage, Storage, StoredValue};
use crate::memory::BitVector;
use crate::strings::StringPool;
use crate::types::{DuplicateState, Nullability, SortState, StorageType};

/// One table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    storage: Storage,
    null_storage: NullStorage,
    sort_state: SortState,
    duplicate_state: DuplicateState,
    specialized_storage: SpecializedStorage,
    mutations: u32,
}

impl Column {
    /// Creates an implicit row-number column of `size` rows.
    pub fn id(size: u32) -> Self {
        Self {
            storage: Storage::Id { size },
            null_storage: NullStorage::NonNull,
            sort_state: SortState::IdSorted,
            duplicate_state: DuplicateState::NoDuplicates,
            specialized_storage: SpecializedStorage::None,
            mutations: 0,
        }
    }

    /// Creates a column, validating its structural invariants.
    ///
    /// String columns declared `Sorted` are not order-checked here since
    /// ordering needs the pool; see [`Column::verify_sorted`].
    pub fn new(
        storage: Storage,
        null_storage: NullStorage,
        sort_state: SortState,
        duplicate_state: DuplicateState,
    ) -> ColumnResult<Self> {
        let column = Self {
            storage,
            null_storage,
            sort_state,
            duplicate_state,
            specialized_storage: SpecializedStorage::None,
            mutations: 0,
        };
        column.validate()?;
        Ok(column)
    }

    /// Attaches a specialized storage after checking the column qualifies.
    pub fn with_specialized_storage(
        mut self,
        specialized_storage: SpecializedStorage,
    ) -> ColumnResult<Self> {
        if let SpecializedStorage::SmallValueEq(_) = &specialized_storage {
            let qualifies = self.storage.storage_type() == StorageType::Uint32
                && self.nullability() == Nullability::NonNull
                && self.sort_state.is_sorted()
                && self.duplicate_state == DuplicateState::NoDuplicates;
            if !qualifies {
                return Err(ColumnError::InvalidSpecializedStorage(
                    "small value equality requires a sorted, unique, non-null uint32 column"
                        .to_string(),
                ));
            }
        }
        self.specialized_storage = specialized_storage;
        Ok(self)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn null_storage(&self) -> &NullStorage {
        &self.null_storage
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage.storage_type()
    }

    pub fn nullability(&self) -> Nullability {
        self.null_storage.nullability()
    }

    pub fn sort_state(&self) -> SortState {
        self.sort_state
    }

    pub fn duplicate_state(&self) -> DuplicateState {
        self.duplicate_state
    }

    pub fn specialized_storage(&self) -> &SpecializedStorage {
        &self.specialized_storage
    }

    /// Generation counter, bumped on every mutation.
    pub fn mutations(&self) -> u32 {
        self.mutations
    }

    pub fn row_count(&self) -> usize {
        match &self.null_storage {
            NullStorage::SparseNull { bit_vector } => bit_vector.len(),
            _ => self.storage.len(),
        }
    }

    /// Storage slot of `row`, or `None` when the row is null.
    pub fn storage_index(&self, row: u32) -> Option<u32> {
        match &self.null_storage {
            NullStorage::NonNull => Some(row),
            NullStorage::DenseNull { bit_vector } => {
                bit_vector.is_set(row as usize).then_some(row)
            }
            NullStorage::SparseNull { bit_vector } => bit_vector
                .is_set(row as usize)
                .then(|| bit_vector.count_set_bits_until(row as usize) as u32),
        }
    }

    /// Value of `row`, or `None` when it is null.
    pub fn value(&self, row: u32) -> Option<StoredValue> {
        self.storage_index(row)
            .map(|i| self.storage.get(i as usize))
    }

    /// Checks that string contents follow the declared sort state.
    pub fn verify_sorted(&self, pool: &StringPool) -> ColumnResult<()> {
        if !self.sort_state.is_sorted() {
            return Ok(());
        }
        check_order(
            &self.storage,
            &self.null_storage,
            self.sort_state,
            self.duplicate_state,
            pool,
        )
    }

    /// Appends a row. Nulls upgrade a `NonNull` column to `SparseNull`.
    ///
    /// Sort and duplicate states are downgraded when the new value breaks
    /// them; specialized storage is dropped.
    pub fn push(&mut self, value: Option<StoredValue>, pool: &StringPool) -> ColumnResult<()> {
        let row = self.row_count() as u32;
        match value {
            None => {
                if self.storage.storage_type() == StorageType::Id {
                    return Err(ColumnError::NullNotAllowed(Nullability::NonNull));
                }
                if let NullStorage::NonNull = self.null_storage {
                    self.null_storage = NullStorage::SparseNull {
                        bit_vector: BitVector::with_size(row as usize, true),
                    };
                }
                if let NullStorage::DenseNull { .. } = self.null_storage {
                    self.storage.push_default();
                }
                if let Some(bv) = self.null_storage.bit_vector_mut() {
                    bv.push_back(false);
                }
            }
            Some(v) => {
                let last = self.last_value();
                self.storage.push(v)?;
                if let Some(bv) = self.null_storage.bit_vector_mut() {
                    bv.push_back(true);
                }
                self.downgrade_states(row, v, last, pool);
            }
        }
        self.specialized_storage = SpecializedStorage::None;
        self.mutations += 1;
        Ok(())
    }

    fn last_value(&self) -> Option<StoredValue> {
        let len = self.storage.len();
        if len == 0 {
            return None;
        }
        // A dense-null tail slot holds a placeholder, not a value.
        if let NullStorage::DenseNull { bit_vector } = &self.null_storage {
            let row = (0..len).rev().find(|r| bit_vector.is_set(*r))?;
            return Some(self.storage.get(row));
        }
        Some(self.storage.get(len - 1))
    }

    fn downgrade_states(
        &mut self,
        row: u32,
        value: StoredValue,
        last: Option<StoredValue>,
        pool: &StringPool,
    ) {
        if self.storage.storage_type() == StorageType::Id {
            return;
        }
        let order = last.map(|l| value.compare(&l, pool));
        let nan = matches!(value, StoredValue::Double(v) if v.is_nan());

        self.sort_state = match self.sort_state {
            SortState::Unsorted => SortState::Unsorted,
            // Built columns holding NaN are never sorted either.
            _ if nan => SortState::Unsorted,
            SortState::Sorted => match order {
                Some(Ordering::Less) => SortState::Unsorted,
                _ => SortState::Sorted,
            },
            SortState::IdSorted => match (value, order) {
                (StoredValue::Uint32(v), _) if v == row => SortState::IdSorted,
                (_, Some(Ordering::Less)) => SortState::Unsorted,
                _ => SortState::Sorted,
            },
            SortState::SetIdSorted => match (value, order) {
                (_, Some(Ordering::Equal)) => SortState::SetIdSorted,
                (StoredValue::Uint32(v), _) if v == row => SortState::SetIdSorted,
                (_, Some(Ordering::Less)) => SortState::Unsorted,
                _ => SortState::Sorted,
            },
        };

        if self.duplicate_state == DuplicateState::NoDuplicates {
            let duplicate = match order {
                Some(Ordering::Equal) => true,
                _ if self.sort_state.is_sorted() => false,
                _ => {
                    let len = self.storage.len() - 1;
                    (0..len)
                        .filter(|i| self.is_set_storage_slot(*i))
                        .any(|i| self.storage.get(i).compare(&value, pool) == Ordering::Equal)
                }
            };
            if duplicate {
                self.duplicate_state = DuplicateState::HasDuplicates;
            }
        }
    }

    fn is_set_storage_slot(&self, slot: usize) -> bool {
        match &self.null_storage {
            NullStorage::DenseNull { bit_vector } => bit_vector.is_set(slot),
            _ => true,
        }
    }

    fn validate(&self) -> ColumnResult<()> {
        let ty = self.storage.storage_type();
        if ty == StorageType::Id {
            if self.null_storage != NullStorage::NonNull
                || self.sort_state != SortState::IdSorted
                || self.duplicate_state != DuplicateState::NoDuplicates
            {
                return Err(ColumnError::InvalidIdColumn);
            }
            return Ok(());
        }

        match &self.null_storage {
            NullStorage::NonNull => {}
            NullStorage::SparseNull { bit_vector } => {
                let expected = bit_vector.count_set_bits();
                if self.storage.len() != expected {
                    return Err(ColumnError::StorageLengthMismatch {
                        expected,
                        actual: self.storage.len(),
                    });
                }
            }
            NullStorage::DenseNull { bit_vector } => {
                if self.storage.len() != bit_vector.len() {
                    return Err(ColumnError::StorageLengthMismatch {
                        expected: bit_vector.len(),
                        actual: self.storage.len(),
                    });
                }
            }
        }

        match self.sort_state {
            SortState::IdSorted | SortState::SetIdSorted => {
                if ty != StorageType::Uint32 || self.nullability() != Nullability::NonNull {
                    return Err(ColumnError::UnsupportedSortState {
                        state: self.sort_state,
                        storage: ty,
                    });
                }
            }
            SortState::Sorted | SortState::Unsorted => {}
        }

        if ty != StorageType::String && self.sort_state.is_sorted() {
            check_order(
                &self.storage,
                &self.null_storage,
                self.sort_state,
                self.duplicate_state,
                &StringPool::new(),
            )?;
        }
        if self.sort_state == SortState::Unsorted
            && self.duplicate_state == DuplicateState::NoDuplicates
        {
            check_unique(&self.storage, &self.null_storage)?;
        }
        Ok(())
    }
}

/// Storage slots holding real values; dense-null placeholders are skipped.
fn value_slots<'a>(
    storage: &'a Storage,
    null_storage: &'a NullStorage,
) -> impl Iterator<Item = (usize, StoredValue)> + 'a {
    (0..storage.len())
        .filter(move |i| match null_storage {
            NullStorage::DenseNull { bit_vector } => bit_vector.is_set(*i),
            _ => true,
        })
        .map(move |i| (i, storage.get(i)))
}

fn check_order(
    storage: &Storage,
    null_storage: &NullStorage,
    state: SortState,
    duplicates: DuplicateState,
    pool: &StringPool,
) -> ColumnResult<()> {
    let unique = duplicates == DuplicateState::NoDuplicates;
    let mut prev: Option<StoredValue> = None;
    for (i, cur) in value_slots(storage, null_storage) {
        if let Some(p) = prev {
            match p.compare(&cur, pool) {
                Ordering::Greater => return Err(ColumnError::NotSorted { state, row: i }),
                Ordering::Equal if unique => return Err(ColumnError::DuplicateValue { row: i }),
                _ => {}
            }
        }
        prev = Some(cur);
    }
    if let Some(values) = storage.as_uint32() {
        let ok = match state {
            SortState::IdSorted => values.iter().enumerate().all(|(i, v)| *v as usize == i),
            SortState::SetIdSorted => values
                .iter()
                .enumerate()
                .all(|(i, v)| *v as usize == i || (i > 0 && values[i - 1] == *v)),
            _ => true,
        };
        if !ok {
            let row = values
                .iter()
                .enumerate()
                .position(|(i, v)| *v as usize != i)
                .unwrap_or(0);
            return Err(ColumnError::NotSorted { state, row });
        }
    }
    Ok(())
}

fn check_unique(storage: &Storage, null_storage: &NullStorage) -> ColumnResult<()> {
    use std::collections::HashSet;

    let mut seen = HashSet::with_capacity(storage.len());
    for (i, value) in value_slots(storage, null_storage) {
        let key = match value {
            StoredValue::Uint32(v) => v as u64,
            StoredValue::Int32(v) => v as u32 as u64,
            StoredValue::Int64(v) => v as u64,
            StoredValue::Double(v) => v.to_bits(),
            StoredValue::String(v) => v.raw() as u64,
        };
        if !seen.insert(key) {
            return Err(ColumnError::DuplicateValue { row: i });
        }
    }
    Ok(())
}
