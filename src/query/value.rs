//! Filter values and the pull-based value source

use serde::{Deserialize, Serialize};

use super::spec::FilterSpec;

/// Type of the value currently exposed by a fetcher slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterValueType {
    Null,
    Int64,
    Double,
    String,
}

/// Supplies filter values to the interpreter by `value_index`.
///
/// `IN` filters iterate their slot: `iterator_init` positions at the first
/// item and `iterator_next` advances; both return false once exhausted.
/// While iterating, the typed getters report the current item.
pub trait ValueFetcher {
    fn value_type(&self, index: u32) -> FilterValueType;
    fn int64_value(&self, index: u32) -> i64;
    fn double_value(&self, index: u32) -> f64;
    fn string_value(&self, index: u32) -> &str;
    fn iterator_init(&mut self, index: u32) -> bool;
    fn iterator_next(&mut self, index: u32) -> bool;
}

/// Owned filter value as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Int64(i64),
    Double(f64),
    String(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn value_type(&self) -> FilterValueType {
        match self {
            FilterValue::Int64(_) => FilterValueType::Int64,
            FilterValue::Double(_) => FilterValueType::Double,
            FilterValue::String(_) => FilterValueType::String,
            FilterValue::Null | FilterValue::List(_) => FilterValueType::Null,
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int64(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Double(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::String(v.to_string())
    }
}

static NULL_VALUE: FilterValue = FilterValue::Null;

/// `ValueFetcher` over owned values, one slot per `value_index`.
///
/// A scalar slot iterates as a single-item list.
#[derive(Debug, Clone, Default)]
pub struct FilterValueList {
    values: Vec<FilterValue>,
    positions: Vec<usize>,
}

impl FilterValueList {
    pub fn new(values: Vec<FilterValue>) -> Self {
        let positions = vec![0; values.len()];
        Self { values, positions }
    }

    /// Arranges `values` (one per filter, in filter order) into
    /// `value_index` order. Filters the planner did not assign a slot keep
    /// no value.
    pub fn for_filters(filters: &[FilterSpec], values: Vec<FilterValue>) -> Self {
        let slots = filters
            .iter()
            .filter_map(|f| f.value_index)
            .map(|v| v as usize + 1)
            .max()
            .unwrap_or(0);
        let mut ordered = vec![FilterValue::Null; slots];
        for (filter, value) in filters.iter().zip(values) {
            if let Some(idx) = filter.value_index {
                ordered[idx as usize] = value;
            }
        }
        Self::new(ordered)
    }

    fn current(&self, index: u32) -> &FilterValue {
        let i = index as usize;
        match self.values.get(i) {
            Some(FilterValue::List(items)) => items.get(self.positions[i]).unwrap_or(&NULL_VALUE),
            Some(v) => v,
            None => &NULL_VALUE,
        }
    }
}

impl ValueFetcher for FilterValueList {
    fn value_type(&self, index: u32) -> FilterValueType {
        self.current(index).value_type()
    }

    fn int64_value(&self, index: u32) -> i64 {
        match self.current(index) {
            FilterValue::Int64(v) => *v,
            other => panic!("filter value {} is {:?}, not int64", index, other),
        }
    }

    fn double_value(&self, index: u32) -> f64 {
        match self.current(index) {
            FilterValue::Double(v) => *v,
            other => panic!("filter value {} is {:?}, not double", index, other),
        }
    }

    fn string_value(&self, index: u32) -> &str {
        match self.current(index) {
            FilterValue::String(v) => v,
            other => panic!("filter value {} is {:?}, not string", index, other),
        }
    }

    fn iterator_init(&mut self, index: u32) -> bool {
        let i = index as usize;
        match self.values.get(i) {
            Some(FilterValue::List(items)) => {
                self.positions[i] = 0;
                !items.is_empty()
            }
            Some(_) => {
                self.positions[i] = 0;
                true
            }
            None => false,
        }
    }

    fn iterator_next(&mut self, index: u32) -> bool {
        let i = index as usize;
        match self.values.get(i) {
            Some(FilterValue::List(items)) => {
                self.positions[i] += 1;
                self.positions[i] < items.len()
            }
            _ => false,
        }
    }
}
