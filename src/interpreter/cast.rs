//! Filter value casting
//!
//! Filter values arrive as int64, double, string or null and must be
//! converted to the storage type of the filtered column before comparing.
//! When no exact conversion exists the cast either adjusts the value so the
//! comparison stays correct, or decides the outcome for every row up front
//! (`AllMatch` / `NoneMatch`).

use crate::bytecode::{CastFilterValueListResult, CastFilterValueResult, CastValue, CastValueList};
use crate::query::{FilterValueType, ValueFetcher};
use crate::strings::StringPool;
use crate::types::{NonNullOp, NonStringOp, StorageType};

/// Casts the value in fetcher slot `handle` to `ty` for comparison with `op`.
pub fn cast_filter_value(
    fetcher: &dyn ValueFetcher,
    handle: u32,
    ty: StorageType,
    op: NonNullOp,
) -> CastFilterValueResult {
    let op = match (ty, op.to_non_string()) {
        (StorageType::String, _) => return cast_to_string(fetcher, handle, op),
        // Glob and regex never match numbers.
        (_, None) => return CastFilterValueResult::NoneMatch,
        (_, Some(op)) => op,
    };
    let cast = match ty {
        StorageType::Id => cast_to_integer(fetcher, handle, op, 0, u32::MAX as i64)
            .map(|v| CastValue::Id(v as u32)),
        StorageType::Uint32 => cast_to_integer(fetcher, handle, op, 0, u32::MAX as i64)
            .map(|v| CastValue::Uint32(v as u32)),
        StorageType::Int32 => {
            cast_to_integer(fetcher, handle, op, i32::MIN as i64, i32::MAX as i64)
                .map(|v| CastValue::Int32(v as i32))
        }
        StorageType::Int64 => cast_to_integer(fetcher, handle, op, i64::MIN, i64::MAX)
            .map(CastValue::Int64),
        StorageType::Double | StorageType::String => {
            cast_to_double(fetcher, handle, op).map(CastValue::Double)
        }
    };
    match cast {
        Ok(v) => CastFilterValueResult::Valid(v),
        Err(outcome) => outcome,
    }
}

/// Casts every item of an `IN` list slot to `ty`.
///
/// Items that can never match are dropped; a list left empty matches
/// nothing. String items absent from the pool are dropped too, since they
/// cannot equal any stored string.
pub fn cast_filter_value_list(
    fetcher: &mut dyn ValueFetcher,
    handle: u32,
    ty: StorageType,
    op: NonNullOp,
    pool: &StringPool,
) -> CastFilterValueListResult {
    let mut values = Vec::new();
    let mut has_more = fetcher.iterator_init(handle);
    while has_more {
        match cast_filter_value(fetcher, handle, ty, op) {
            CastFilterValueResult::Valid(v) => values.push(v),
            CastFilterValueResult::AllMatch => return CastFilterValueListResult::AllMatch,
            CastFilterValueResult::NoneMatch => {}
        }
        has_more = fetcher.iterator_next(handle);
    }

    let list = match ty {
        StorageType::Id => CastValueList::Id(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::Id(x) => Some(*x),
                    _ => None,
                })
                .collect(),
        ),
        StorageType::Uint32 => CastValueList::Uint32(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::Uint32(x) => Some(*x),
                    _ => None,
                })
                .collect(),
        ),
        StorageType::Int32 => CastValueList::Int32(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::Int32(x) => Some(*x),
                    _ => None,
                })
                .collect(),
        ),
        StorageType::Int64 => CastValueList::Int64(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::Int64(x) => Some(*x),
                    _ => None,
                })
                .collect(),
        ),
        StorageType::Double => CastValueList::Double(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::Double(x) => Some(*x),
                    _ => None,
                })
                .collect(),
        ),
        StorageType::String => CastValueList::String(
            values
                .iter()
                .filter_map(|v| match v {
                    CastValue::String(s) => pool.get_id(s),
                    _ => None,
                })
                .collect(),
        ),
    };
    let empty = match &list {
        CastValueList::Id(v) | CastValueList::Uint32(v) => v.is_empty(),
        CastValueList::Int32(v) => v.is_empty(),
        CastValueList::Int64(v) => v.is_empty(),
        CastValueList::Double(v) => v.is_empty(),
        CastValueList::String(v) => v.is_empty(),
    };
    if empty {
        CastFilterValueListResult::NoneMatch
    } else {
        CastFilterValueListResult::Valid(list)
    }
}

fn cast_to_integer(
    fetcher: &dyn ValueFetcher,
    handle: u32,
    op: NonStringOp,
    min: i64,
    max: i64,
) -> Result<i64, CastFilterValueResult> {
    match fetcher.value_type(handle) {
        FilterValueType::Int64 => {
            let v = fetcher.int64_value(handle);
            if v >= min && v <= max {
                return Ok(v);
            }
            Err(out_of_range(op, v < min, v > max))
        }
        FilterValueType::Double => {
            let d = fetcher.double_value(handle);
            if d.is_nan() {
                return Err(CastFilterValueResult::NoneMatch);
            }
            // `max as f64` rounds up to 2^63 for i64, which is itself out of
            // range.
            let is_big = d > max as f64 || d >= i64::MAX as f64 && max == i64::MAX;
            let is_small = d < min as f64;
            if d == d.trunc() && !is_small && !is_big {
                return Ok(d as i64);
            }
            match op {
                NonStringOp::Lt => round_or_decide(is_small, is_big, d.ceil()),
                NonStringOp::Le => round_or_decide(is_small, is_big, d.floor()),
                NonStringOp::Gt => round_or_decide(is_big, is_small, d.floor()),
                NonStringOp::Ge => round_or_decide(is_big, is_small, d.ceil()),
                NonStringOp::Eq => Err(CastFilterValueResult::NoneMatch),
                NonStringOp::Ne => Err(CastFilterValueResult::AllMatch),
            }
        }
        FilterValueType::String => Err(string_against_number(op)),
        FilterValueType::Null => Err(CastFilterValueResult::NoneMatch),
    }
}

/// Outcome for an integer value outside the target type's range.
fn out_of_range(op: NonStringOp, is_small: bool, is_big: bool) -> CastFilterValueResult {
    match op {
        NonStringOp::Eq => CastFilterValueResult::NoneMatch,
        NonStringOp::Lt | NonStringOp::Le if is_small => CastFilterValueResult::NoneMatch,
        NonStringOp::Gt | NonStringOp::Ge if is_big => CastFilterValueResult::NoneMatch,
        _ => CastFilterValueResult::AllMatch,
    }
}

fn round_or_decide(no_rows: bool, all_rows: bool, rounded: f64) -> Result<i64, CastFilterValueResult> {
    if no_rows {
        return Err(CastFilterValueResult::NoneMatch);
    }
    if all_rows {
        return Err(CastFilterValueResult::AllMatch);
    }
    Ok(rounded as i64)
}

fn cast_to_double(
    fetcher: &dyn ValueFetcher,
    handle: u32,
    op: NonStringOp,
) -> Result<f64, CastFilterValueResult> {
    match fetcher.value_type(handle) {
        FilterValueType::Double => match fetcher.double_value(handle) {
            // Same as for integer columns: a NaN value matches no row.
            d if d.is_nan() => Err(CastFilterValueResult::NoneMatch),
            d => Ok(d),
        },
        FilterValueType::Int64 => {
            let i = fetcher.int64_value(handle);
            let d = i as f64;
            // Exact in i128 for every double in i64's range, including 2^63.
            let rounded = d as i128;
            let exact = i as i128;
            if rounded == exact {
                return Ok(d);
            }
            let rounded_up = rounded > exact;
            match op {
                NonStringOp::Lt => Ok(if rounded_up { d } else { next_up(d) }),
                NonStringOp::Le => Ok(if rounded_up { next_down(d) } else { d }),
                NonStringOp::Gt => Ok(if rounded_up { next_down(d) } else { d }),
                NonStringOp::Ge => Ok(if rounded_up { d } else { next_up(d) }),
                NonStringOp::Eq => Err(CastFilterValueResult::NoneMatch),
                NonStringOp::Ne => Err(CastFilterValueResult::AllMatch),
            }
        }
        FilterValueType::String => Err(string_against_number(op)),
        FilterValueType::Null => Err(CastFilterValueResult::NoneMatch),
    }
}

/// Strings sort after every number.
fn string_against_number(op: NonStringOp) -> CastFilterValueResult {
    match op {
        NonStringOp::Eq | NonStringOp::Gt | NonStringOp::Ge => CastFilterValueResult::NoneMatch,
        NonStringOp::Ne | NonStringOp::Lt | NonStringOp::Le => CastFilterValueResult::AllMatch,
    }
}

fn cast_to_string(fetcher: &dyn ValueFetcher, handle: u32, op: NonNullOp) -> CastFilterValueResult {
    match fetcher.value_type(handle) {
        FilterValueType::String => {
            CastFilterValueResult::Valid(CastValue::String(fetcher.string_value(handle).to_string()))
        }
        FilterValueType::Null => CastFilterValueResult::NoneMatch,
        // Numbers sort before every string.
        FilterValueType::Int64 | FilterValueType::Double => match op {
            NonNullOp::Gt | NonNullOp::Ge | NonNullOp::Ne => CastFilterValueResult::AllMatch,
            NonNullOp::Eq
            | NonNullOp::Lt
            | NonNullOp::Le
            | NonNullOp::Glob
            | NonNullOp::Regex => CastFilterValueResult::NoneMatch,
        },
    }
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

fn next_down(x: f64) -> f64 {
    -next_up(-x)
}
