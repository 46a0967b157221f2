//! Growable buffer built on `Slab`
//!
//! Capacity doubles on overflow; the live prefix `[0, len)` is the only
//! observable content.

use std::fmt;
use std::ops::{Deref, DerefMut};

use super::slab::Slab;

const MIN_CAPACITY: usize = 8;

/// Growable vector of plain-data elements backed by a `Slab`.
#[derive(Clone)]
pub struct FlexVector<T> {
    slab: Slab<T>,
    len: usize,
}

impl<T: Copy + Default> FlexVector<T> {
    pub fn new() -> Self {
        Self {
            slab: Slab::empty(),
            len: 0,
        }
    }

    /// Creates an empty vector able to hold `capacity` elements without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Slab::alloc(capacity),
            len: 0,
        }
    }

    /// Creates a vector of `size` default-initialized elements.
    pub fn alloc(size: usize) -> Self {
        Self {
            slab: Slab::alloc(size),
            len: size,
        }
    }

    pub fn push_back(&mut self, value: T) {
        if self.len == self.slab.len() {
            self.grow(self.len + 1);
        }
        self.slab[self.len] = value;
        self.len += 1;
    }

    /// Resizes to `size`, filling new slots with the default value.
    pub fn resize(&mut self, size: usize) {
        if size > self.slab.len() {
            self.grow(size);
        }
        for slot in &mut self.slab[self.len.min(size)..size] {
            *slot = T::default();
        }
        self.len = size;
    }

    /// Drops excess capacity.
    pub fn shrink_to_fit(&mut self) {
        if self.slab.len() != self.len {
            let mut slab = Slab::alloc(self.len);
            slab.copy_from_slice(&self.slab[..self.len]);
            self.slab = slab;
        }
    }

    fn grow(&mut self, required: usize) {
        let capacity = required.max(self.slab.len() * 2).max(MIN_CAPACITY);
        let mut slab = Slab::alloc(capacity);
        slab[..self.len].copy_from_slice(&self.slab[..self.len]);
        self.slab = slab;
    }
}

impl<T> FlexVector<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slab.len()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slab[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.slab[..self.len]
    }
}

impl<T: Copy + Default> Default for FlexVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> FromIterator<T> for FlexVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut out = Self::new();
        for v in iter {
            out.push_back(v);
        }
        out
    }
}

impl<T: Copy + Default> From<Vec<T>> for FlexVector<T> {
    fn from(v: Vec<T>) -> Self {
        let len = v.len();
        Self {
            slab: Slab::from(v),
            len,
        }
    }
}

impl<T> Deref for FlexVector<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for FlexVector<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: PartialEq> PartialEq for FlexVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for FlexVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}
