//! Filter kernels shared by the interpreter handlers
//!
//! Index lists are filtered by compaction: the kept entries are moved to
//! the front of the update buffer in their original order and the caller
//! shrinks the span to the returned length.

use std::cmp::Ordering;

use crate::bytecode::CastValue;
use crate::column::{compare_f64, Storage};
use crate::memory::{BitVector, Range};
use crate::strings::StringPool;
use crate::types::{BoundModifier, BoundSearch};

/// Keeps the entries of `buf` accepted by `keep`.
pub fn compact_in_place(buf: &mut [u32], mut keep: impl FnMut(u32) -> bool) -> usize {
    let mut write = 0;
    for read in 0..buf.len() {
        let v = buf[read];
        if keep(v) {
            buf[write] = v;
            write += 1;
        }
    }
    write
}

/// Keeps `update[i]` whenever `keep(source[i])` holds. The two slices are
/// parallel views of the same rows.
pub fn compact_into(
    source: &[u32],
    update: &mut [u32],
    mut keep: impl FnMut(u32) -> bool,
) -> usize {
    let mut write = 0;
    for (read, &s) in source.iter().enumerate() {
        if keep(s) {
            update[write] = update[read];
            write += 1;
        }
    }
    write
}

/// Writes the rows of `data` (starting at row `first_row`) accepted by
/// `keep` into `out`.
pub fn collect_matching<T>(
    data: &[T],
    first_row: u32,
    out: &mut [u32],
    keep: impl Fn(&T) -> bool,
) -> usize {
    let mut write = 0;
    for (row, v) in (first_row..).zip(data) {
        if keep(v) {
            out[write] = row;
            write += 1;
        }
    }
    write
}

fn partition_point(mut lo: u32, mut hi: u32, pred: impl Fn(u32) -> bool) -> u32 {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Binary searches positions `[range.b, range.e)`, where `cmp(pos)`
/// orders the element at `pos` against the searched value.
///
/// Returns `(lower, upper)`; single-bound searches return the same
/// position twice.
pub fn search_bounds(range: Range, search: BoundSearch, cmp: impl Fn(u32) -> Ordering) -> (u32, u32) {
    match search {
        BoundSearch::EqualRange => {
            let lo = partition_point(range.b, range.e, |i| cmp(i).is_lt());
            let hi = partition_point(lo, range.e, |i| cmp(i).is_le());
            (lo, hi)
        }
        BoundSearch::LowerBound => {
            let p = partition_point(range.b, range.e, |i| cmp(i).is_lt());
            (p, p)
        }
        BoundSearch::UpperBound => {
            let p = partition_point(range.b, range.e, |i| cmp(i).is_le());
            (p, p)
        }
    }
}

pub fn apply_bounds(range: &mut Range, modifier: BoundModifier, (lo, hi): (u32, u32)) {
    match modifier {
        BoundModifier::BeginBound => range.b = lo,
        BoundModifier::EndBound => range.e = hi,
        BoundModifier::BothBounds => {
            range.b = lo;
            range.e = hi;
        }
    }
    range.e = range.e.max(range.b);
}

/// Orders storage slot `slot` against a cast filter value of the same type.
pub fn compare_to_value(storage: &Storage, slot: u32, value: &CastValue, pool: &StringPool) -> Ordering {
    let i = slot as usize;
    match (storage, value) {
        (Storage::Id { .. }, CastValue::Id(v)) => slot.cmp(v),
        (Storage::Uint32(d), CastValue::Uint32(v)) => d[i].cmp(v),
        (Storage::Int32(d), CastValue::Int32(v)) => d[i].cmp(v),
        (Storage::Int64(d), CastValue::Int64(v)) => d[i].cmp(v),
        (Storage::Double(d), CastValue::Double(v)) => compare_f64(d[i], *v),
        (Storage::String(d), CastValue::String(v)) => pool.get(d[i]).cmp(v.as_str()),
        (storage, value) => panic!(
            "{:?} column compared with {:?}",
            storage.storage_type(),
            value
        ),
    }
}

/// Membership test for `IN` lists of unsigned values.
pub enum U32Membership<'a> {
    Bits(BitVector),
    List(&'a [u32]),
}

impl<'a> U32Membership<'a> {
    /// Uses a bit vector when the largest value is at most
    /// `values.len() * ratio`.
    pub fn new(values: &'a [u32], ratio: u32) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        let dense_limit = values.len() as u64 * u64::from(ratio);
        if u64::from(max) <= dense_limit {
            let mut bits = BitVector::with_size(max as usize + 1, false);
            for v in values {
                bits.set(*v as usize);
            }
            U32Membership::Bits(bits)
        } else {
            U32Membership::List(values)
        }
    }

    pub fn contains(&self, v: u32) -> bool {
        match self {
            U32Membership::Bits(bits) => (v as usize) < bits.len() && bits.is_set(v as usize),
            U32Membership::List(values) => values.contains(&v),
        }
    }
}
