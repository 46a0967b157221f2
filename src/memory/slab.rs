//! Fixed-size owned buffer
//!
//! A `Slab` is allocated once at a known size and never grows. Everything
//! that needs a growable buffer builds on top of it (see `FlexVector`).

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Owned, fixed-length buffer of plain-data elements.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Slab<T> {
    data: Box<[T]>,
}

impl<T: Copy + Default> Slab<T> {
    /// Allocates a slab of `size` default-initialized elements.
    pub fn alloc(size: usize) -> Self {
        Self {
            data: vec![T::default(); size].into_boxed_slice(),
        }
    }
}

impl<T> Slab<T> {
    /// Creates a zero-length slab without allocating.
    pub fn empty() -> Self {
        Self {
            data: Vec::new().into_boxed_slice(),
        }
    }

    /// Number of elements in the slab.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the slab holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the slab, returning its elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data.into_vec()
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for Slab<T> {
    fn from(v: Vec<T>) -> Self {
        Self {
            data: v.into_boxed_slice(),
        }
    }
}

impl<T> FromIterator<T> for Slab<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<T> Deref for Slab<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for Slab<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: fmt::Debug> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}
