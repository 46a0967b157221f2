//! Index views
//!
//! `Range` is a contiguous row interval. `Span` is a window over an index
//! buffer owned elsewhere: either a slab living in an interpreter register or
//! an index's permutation vector. Spans hold no references, only the backing
//! identity and bounds, so they can never outlive the buffer they describe.

/// Contiguous `[b, e)` interval of row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Range {
    pub b: u32,
    pub e: u32,
}

impl Range {
    pub fn new(b: u32, e: u32) -> Self {
        debug_assert!(b <= e);
        Self { b, e }
    }

    pub fn size(&self) -> u32 {
        self.e - self.b
    }

    pub fn is_empty(&self) -> bool {
        self.b == self.e
    }

    pub fn contains(&self, v: u32) -> bool {
        v >= self.b && v < self.e
    }
}

/// The buffer a `Span` is a window into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanBacking {
    /// Register number of a `Slab<u32>`.
    Slab(u32),
    /// Position of an index in the bound index list.
    Index(u32),
}

/// Window `[b, e)` over an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub backing: SpanBacking,
    pub b: u32,
    pub e: u32,
}

impl Span {
    pub fn new(backing: SpanBacking, b: u32, e: u32) -> Self {
        debug_assert!(b <= e);
        Self { backing, b, e }
    }

    pub fn size(&self) -> u32 {
        self.e - self.b
    }

    pub fn is_empty(&self) -> bool {
        self.b == self.e
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.b as usize..self.e as usize
    }

    /// Register of the backing slab.
    ///
    /// Panics if the span views an index permutation vector, which is
    /// read-only.
    pub fn slab_register(&self) -> u32 {
        match self.backing {
            SpanBacking::Slab(reg) => reg,
            SpanBacking::Index(idx) => {
                panic!("span over index {} permutation vector is not writable", idx)
            }
        }
    }
}
