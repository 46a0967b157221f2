//! Column content and layout descriptors

use serde::{Deserialize, Serialize};

use super::{type_set, type_subset};

type_set! {
    /// Physical type of a column's values.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum StorageType {
        /// Implicit row number; no backing data.
        Id,
        Uint32,
        Int32,
        Int64,
        Double,
        /// Interned string id.
        String,
    }
}

impl StorageType {
    /// Bytes one value occupies in a sort/distinct row layout.
    pub fn row_layout_size(self) -> u16 {
        match self {
            StorageType::Id | StorageType::Uint32 | StorageType::Int32 | StorageType::String => 4,
            StorageType::Int64 | StorageType::Double => 8,
        }
    }
}

type_subset! {
    pub enum NonStringType: StorageType { Id, Uint32, Int32, Int64, Double }
}

type_subset! {
    pub enum NonIdStorageType: StorageType { Uint32, Int32, Int64, Double, String }
}

type_subset! {
    pub enum IntegerOrDoubleType: StorageType { Uint32, Int32, Int64, Double }
}

type_set! {
    /// How a column represents nulls.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Nullability {
        /// No nulls.
        NonNull,
        /// Null rows take no storage slot.
        SparseNull,
        /// Null rows keep an unused storage slot.
        DenseNull,
    }
}

type_set! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SortState {
        Unsorted,
        /// Non-decreasing values.
        Sorted,
        /// Value equals the row number.
        IdSorted,
        /// Sorted, and each run of equal values starts at the row equal to
        /// the value.
        SetIdSorted,
    }
}

impl SortState {
    pub fn is_sorted(self) -> bool {
        !matches!(self, SortState::Unsorted)
    }
}

type_set! {
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum DuplicateState {
        HasDuplicates,
        NoDuplicates,
    }
}
