//! Packed boolean array
//!
//! Bits are stored little-endian within 64-bit words: bit `i` lives in word
//! `i / 64` at position `i % 64`. Bits past `len` in the last word are always
//! zero so that word popcounts can be summed directly.

use super::flex_vector::FlexVector;
use super::slab::Slab;

const WORD_BITS: usize = 64;

#[derive(Clone, Default, PartialEq)]
pub struct BitVector {
    words: FlexVector<u64>,
    len: usize,
}

impl BitVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bit vector of `len` bits, all set to `value`.
    pub fn with_size(len: usize, value: bool) -> Self {
        let word_count = len.div_ceil(WORD_BITS);
        let mut words = FlexVector::alloc(word_count);
        if value {
            for w in words.iter_mut() {
                *w = u64::MAX;
            }
            let tail = len % WORD_BITS;
            if tail != 0 {
                words[word_count - 1] = (1u64 << tail) - 1;
            }
        }
        Self { words, len }
    }

    pub fn from_bools<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut bv = Self::new();
        for b in bits {
            bv.push_back(b);
        }
        bv
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        self.words.as_slice()
    }

    #[inline]
    pub fn is_set(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
    }

    pub fn push_back(&mut self, value: bool) {
        if self.len % WORD_BITS == 0 {
            self.words.push_back(0);
        }
        let i = self.len;
        self.len += 1;
        if value {
            self.set(i);
        }
    }

    pub fn count_set_bits(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of set bits in `i`'s word strictly below position `i`.
    #[inline]
    pub fn count_set_bits_until_in_word(&self, i: usize) -> u32 {
        let mask = (1u64 << (i % WORD_BITS)) - 1;
        (self.words[i / WORD_BITS] & mask).count_ones()
    }

    /// Number of set bits in `[0, i)`. Linear in the number of words.
    pub fn count_set_bits_until(&self, i: usize) -> usize {
        let full: usize = self.words[..i / WORD_BITS]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();
        if i % WORD_BITS == 0 {
            full
        } else {
            full + self.count_set_bits_until_in_word(i) as usize
        }
    }

    /// Running count of set bits before each word.
    ///
    /// `out[w]` is the number of set bits in words `[0, w)`, so the rank of a
    /// set bit `i` is `out[i / 64] + count_set_bits_until_in_word(i)`.
    pub fn prefix_popcount(&self) -> Slab<u32> {
        let mut out = Slab::alloc(self.words.len());
        let mut running = 0u32;
        for (slot, w) in out.iter_mut().zip(self.words.iter()) {
            *slot = running;
            running += w.count_ones();
        }
        out
    }

    /// Compacts `indices` in place, keeping those whose bit is set (or unset
    /// when `invert` is true). Returns the number of indices kept.
    pub fn pack_left(&self, indices: &mut [u32], invert: bool) -> usize {
        let mut write = 0;
        for read in 0..indices.len() {
            let idx = indices[read];
            if self.is_set(idx as usize) != invert {
                indices[write] = idx;
                write += 1;
            }
        }
        write
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.is_set(i))
    }
}

impl std::fmt::Debug for BitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits: String = self.iter().map(|b| if b { '1' } else { '0' }).collect();
        write!(f, "BitVector({})", bits)
    }
}
