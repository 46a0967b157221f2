//! Stable sort and distinct over row layout buffers
//!
//! Row `i` of the buffer holds the key bytes of `indices[i]`. Sorting
//! reorders `indices` by comparing rows bytewise; ties keep their input
//! order.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
struct Token {
    index: u32,
    offset: usize,
}

/// Sorts `indices` by their row keys. Small inputs use a comparison merge
/// sort, larger ones an LSD byte radix sort.
pub fn sort_row_layout(indices: &mut [u32], buffer: &[u8], stride: usize, radix_threshold: usize) {
    if indices.len() < 2 || stride == 0 {
        return;
    }
    let mut tokens: Vec<Token> = indices
        .iter()
        .enumerate()
        .map(|(i, &index)| Token {
            index,
            offset: i * stride,
        })
        .collect();

    if tokens.len() < radix_threshold {
        tokens.sort_by(|a, b| {
            buffer[a.offset..a.offset + stride].cmp(&buffer[b.offset..b.offset + stride])
        });
    } else {
        radix_sort(&mut tokens, buffer, stride);
    }

    for (dst, token) in indices.iter_mut().zip(&tokens) {
        *dst = token.index;
    }
}

fn radix_sort(tokens: &mut Vec<Token>, buffer: &[u8], stride: usize) {
    let mut scratch = vec![Token::default(); tokens.len()];
    for byte in (0..stride).rev() {
        let mut counts = [0usize; 256];
        for t in tokens.iter() {
            counts[buffer[t.offset + byte] as usize] += 1;
        }
        // Every key shares this byte.
        if counts.iter().any(|&c| c == tokens.len()) {
            continue;
        }
        let mut starts = [0usize; 256];
        let mut running = 0;
        for (start, count) in starts.iter_mut().zip(counts) {
            *start = running;
            running += count;
        }
        for t in tokens.iter() {
            let bucket = buffer[t.offset + byte] as usize;
            scratch[starts[bucket]] = *t;
            starts[bucket] += 1;
        }
        std::mem::swap(tokens, &mut scratch);
    }
}

/// Keeps the first index of each distinct row, preserving order.
/// Returns the number of indices kept at the front of `indices`.
pub fn distinct_row_layout(indices: &mut [u32], buffer: &[u8], stride: usize) -> usize {
    let mut seen: HashSet<&[u8]> = HashSet::with_capacity(indices.len());
    let mut write = 0;
    for read in 0..indices.len() {
        let row = &buffer[read * stride..(read + 1) * stride];
        if seen.insert(row) {
            indices[write] = indices[read];
            write += 1;
        }
    }
    write
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn buffer_of(keys: &[[u8; 2]]) -> Vec<u8> {
        keys.iter().flat_map(|k| k.iter().copied()).collect()
    }

    #[test]
    fn test_merge_sort_is_stable() {
        let keys = [[1, 0], [0, 5], [1, 0], [0, 5]];
        let buf = buffer_of(&keys);
        let mut indices = vec![10, 11, 12, 13];
        sort_row_layout(&mut indices, &buf, 2, 4096);
        assert_eq!(indices, vec![11, 13, 10, 12]);
    }

    #[test]
    fn test_radix_matches_merge() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<[u8; 2]> = (0..500).map(|_| [rng.gen_range(0..4), rng.gen()]).collect();
        let buf = buffer_of(&keys);
        let mut merge: Vec<u32> = (0..500).collect();
        let mut radix = merge.clone();
        sort_row_layout(&mut merge, &buf, 2, usize::MAX);
        sort_row_layout(&mut radix, &buf, 2, 0);
        assert_eq!(merge, radix);
    }

    #[test]
    fn test_distinct_keeps_first() {
        let keys = [[0, 1], [0, 2], [0, 1], [0, 3], [0, 2]];
        let buf = buffer_of(&keys);
        let mut indices = vec![4, 5, 6, 7, 8];
        let kept = distinct_row_layout(&mut indices, &buf, 2);
        assert_eq!(&indices[..kept], &[4, 5, 7]);
    }
}
