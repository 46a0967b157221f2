//! Specialized storage fast paths

use super::errors::{ColumnError, ColumnResult};
use crate::memory::{BitVector, Range, Slab};

/// Optional acceleration structure attached to a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SpecializedStorage {
    #[default]
    None,
    SmallValueEq(SmallValueEq),
}

/// Equality lookup for a sorted, duplicate-free, non-null `Uint32` column
/// with small values.
///
/// Bit `v` is set iff `v` occurs in the column. Because values are sorted
/// and unique, the row holding `v` is the number of set bits below `v`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallValueEq {
    bit_vector: BitVector,
    prefix_popcount: Slab<u32>,
}

impl SmallValueEq {
    /// Builds the lookup from strictly increasing values.
    pub fn build(values: &[u32]) -> ColumnResult<Self> {
        if let Some(pos) = values.windows(2).position(|w| w[0] >= w[1]) {
            return Err(ColumnError::InvalidSpecializedStorage(format!(
                "values not strictly increasing at row {}",
                pos + 1
            )));
        }
        let len = values.last().map(|v| *v as usize + 1).unwrap_or(0);
        let mut bit_vector = BitVector::with_size(len, false);
        for v in values {
            bit_vector.set(*v as usize);
        }
        let prefix_popcount = bit_vector.prefix_popcount();
        Ok(Self {
            bit_vector,
            prefix_popcount,
        })
    }

    pub fn bit_vector(&self) -> &BitVector {
        &self.bit_vector
    }

    /// Narrows `range` to the row equal to `value`, or to an empty range.
    pub fn equal_range(&self, value: u32, range: Range) -> Range {
        let v = value as usize;
        let k = if v < self.bit_vector.len() && self.bit_vector.is_set(v) {
            self.prefix_popcount[v / 64] + self.bit_vector.count_set_bits_until_in_word(v)
        } else {
            range.e
        };
        if k >= range.b && k < range.e {
            Range::new(k, k + 1)
        } else {
            Range::new(range.b, range.b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_range_finds_row() {
        let s = SmallValueEq::build(&[1, 3, 64, 70]).unwrap();
        assert_eq!(s.equal_range(3, Range::new(0, 4)), Range::new(1, 2));
        assert_eq!(s.equal_range(70, Range::new(0, 4)), Range::new(3, 4));
        assert_eq!(s.equal_range(64, Range::new(0, 4)), Range::new(2, 3));
    }

    #[test]
    fn test_missing_value_is_empty() {
        let s = SmallValueEq::build(&[1, 3]).unwrap();
        assert!(s.equal_range(2, Range::new(0, 2)).is_empty());
        assert!(s.equal_range(500, Range::new(0, 2)).is_empty());
    }

    #[test]
    fn test_respects_input_range() {
        let s = SmallValueEq::build(&[0, 1, 2]).unwrap();
        assert!(s.equal_range(0, Range::new(1, 3)).is_empty());
    }

    #[test]
    fn test_rejects_unsorted() {
        assert!(SmallValueEq::build(&[2, 1]).is_err());
        assert!(SmallValueEq::build(&[1, 1]).is_err());
    }
}
