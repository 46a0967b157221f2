//! Comparable row layout keys
//!
//! Sort and distinct copy the key columns of every row into one flat byte
//! buffer, `stride` bytes per row. Each value is encoded big-endian with
//! its sign handled so that comparing two rows with `memcmp` orders them
//! the same way as comparing the values.
//!
//! Nullable columns get a leading byte, `0xFF` for a value and `0x00` for
//! null, so nulls order first. Descending keys are bitwise inverted,
//! null byte included.

pub const NON_NULL_BYTE: u8 = 0xFF;
pub const NULL_BYTE: u8 = 0x00;

pub fn encode_u32_key(x: u32) -> [u8; 4] {
    x.to_be_bytes()
}

pub fn encode_i32_key(x: i32) -> [u8; 4] {
    ((x as u32) ^ 0x8000_0000).to_be_bytes()
}

pub fn encode_i64_key(x: i64) -> [u8; 8] {
    ((x as u64) ^ (1u64 << 63)).to_be_bytes()
}

/// Negative doubles have their magnitude bits flipped so larger magnitudes
/// order first; the sign is then handled as for `i64`.
///
/// `-0.0` encodes as `0.0` and every NaN as one positive NaN, which orders
/// after `+inf`.
pub fn encode_f64_key(x: f64) -> [u8; 8] {
    let x = if x.is_nan() {
        f64::NAN.copysign(1.0)
    } else if x == 0.0 {
        0.0
    } else {
        x
    };
    let bits = x.to_bits() as i64;
    let flipped = bits ^ ((((bits >> 63) as u64) >> 1) as i64);
    encode_i64_key(flipped)
}

/// Copies `key` into `dest`, inverting every byte when `invert` is set.
pub fn write_key(dest: &mut [u8], key: &[u8], invert: bool) {
    for (d, k) in dest.iter_mut().zip(key) {
        *d = if invert { !*k } else { *k };
    }
}

/// Writes a null marker followed by zeroed value bytes.
pub fn write_null(dest: &mut [u8], invert: bool) {
    if let Some((first, rest)) = dest.split_first_mut() {
        *first = if invert { !NULL_BYTE } else { NULL_BYTE };
        rest.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_key() {
        assert_eq!(encode_u32_key(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn test_i32_key_orders_sign() {
        assert_eq!(encode_i32_key(0), [0x80, 0, 0, 0]);
        assert_eq!(encode_i32_key(-1), [0x7F, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encode_i32_key(i32::MIN), [0, 0, 0, 0]);
        assert!(encode_i32_key(-5) < encode_i32_key(3));
    }

    #[test]
    fn test_i64_key() {
        assert_eq!(encode_i64_key(1), [0x80, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(encode_i64_key(i64::MAX), [0xFF; 8]);
        assert!(encode_i64_key(-2) < encode_i64_key(-1));
    }

    #[test]
    fn test_f64_key_orders_like_values() {
        let values = [
            f64::NEG_INFINITY,
            -1e10,
            -1.5,
            -0.0,
            0.0,
            1e-300,
            2.0,
            f64::INFINITY,
        ];
        for w in values.windows(2) {
            assert!(
                encode_f64_key(w[0]) <= encode_f64_key(w[1]),
                "{} vs {}",
                w[0],
                w[1]
            );
        }
        assert_eq!(encode_f64_key(0.0), [0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode_f64_key(-0.0), encode_f64_key(0.0));
        assert_eq!(encode_f64_key(-f64::NAN), encode_f64_key(f64::NAN));
        assert!(encode_f64_key(f64::INFINITY) < encode_f64_key(-f64::NAN));
    }

    #[test]
    fn test_write_key_invert() {
        let mut buf = [0u8; 4];
        write_key(&mut buf, &encode_u32_key(1), true);
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_write_null() {
        let mut buf = [9u8; 5];
        write_null(&mut buf, false);
        assert_eq!(buf, [0, 0, 0, 0, 0]);
        write_null(&mut buf, true);
        assert_eq!(buf, [0xFF, 0, 0, 0, 0]);
    }
}
