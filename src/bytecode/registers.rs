//! Register handles and register contents
//!
//! Registers are numbered slots in the interpreter's register file. The
//! planner refers to them through handles that carry the type of the value
//! the slot holds; handing a handle to a slot of another type is an
//! invariant violation caught at execution time.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::memory::FlexVector;
use crate::strings::StringId;

/// Read-write handle to a register holding a `T`.
pub struct RwHandle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

/// Read-only handle to a register holding a `T`.
pub struct ReadHandle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RwHandle<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn read(self) -> ReadHandle<T> {
        ReadHandle::new(self.index)
    }
}

impl<T> ReadHandle<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl<T> From<RwHandle<T>> for ReadHandle<T> {
    fn from(h: RwHandle<T>) -> Self {
        h.read()
    }
}

impl<T> Clone for RwHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RwHandle<T> {}

impl<T> Clone for ReadHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReadHandle<T> {}

impl<T> PartialEq for RwHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for RwHandle<T> {}

impl<T> PartialEq for ReadHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ReadHandle<T> {}

impl<T> fmt::Debug for RwHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

impl<T> fmt::Debug for ReadHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

/// Hands out register numbers in allocation order.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    next: u32,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc<T>(&mut self) -> RwHandle<T> {
        let h = RwHandle::new(self.next);
        self.next += 1;
        h
    }

    /// Number of registers allocated so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

/// Interned string id to dense rank, used to sort string columns.
pub type StringIdToRankMap = HashMap<StringId, u32>;

/// Filter value converted to a column's storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum CastValue {
    Id(u32),
    Uint32(u32),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Every row satisfies the filter.
    AllMatch,
    /// No row satisfies the filter.
    NoneMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastFilterValueResult {
    Valid(CastValue),
    AllMatch,
    NoneMatch,
}

impl CastFilterValueResult {
    pub fn validity(&self) -> Validity {
        match self {
            CastFilterValueResult::Valid(_) => Validity::Valid,
            CastFilterValueResult::AllMatch => Validity::AllMatch,
            CastFilterValueResult::NoneMatch => Validity::NoneMatch,
        }
    }
}

/// `IN` list converted to a column's storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum CastValueList {
    Id(FlexVector<u32>),
    Uint32(FlexVector<u32>),
    Int32(FlexVector<i32>),
    Int64(FlexVector<i64>),
    Double(FlexVector<f64>),
    String(FlexVector<StringId>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastFilterValueListResult {
    Valid(CastValueList),
    AllMatch,
    NoneMatch,
}

impl CastFilterValueListResult {
    pub fn validity(&self) -> Validity {
        match self {
            CastFilterValueListResult::Valid(_) => Validity::Valid,
            CastFilterValueListResult::AllMatch => Validity::AllMatch,
            CastFilterValueListResult::NoneMatch => Validity::NoneMatch,
        }
    }
}
