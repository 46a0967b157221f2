//! Declarative query specifications

use serde::{Deserialize, Serialize};

use crate::types::{Op, SortDirection};

/// Filter on one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
    pub col: u32,
    pub op: Op,
    /// Position of this filter's value in the value fetcher. Written by the
    /// planner; any caller-supplied value is overwritten.
    #[serde(default)]
    pub value_index: Option<u32>,
}

impl FilterSpec {
    pub fn new(col: u32, op: Op) -> Self {
        Self {
            col,
            op,
            value_index: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub col: u32,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(col: u32) -> Self {
        Self {
            col,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(col: u32) -> Self {
        Self {
            col,
            direction: SortDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistinctSpec {
    pub col: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LimitSpec {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Every input the planner needs besides column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub distinct: Vec<DistinctSpec>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub limit: LimitSpec,
    /// Bit `min(i, 63)` marks column `i` as read through the cursor.
    #[serde(default = "all_columns")]
    pub cols_used: u64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            distinct: Vec::new(),
            sort: Vec::new(),
            limit: LimitSpec::default(),
            cols_used: all_columns(),
        }
    }
}

fn all_columns() -> u64 {
    u64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_spec_from_json() {
        let json = r#"{
            "filters": [{"col": 1, "op": "ge"}],
            "sort": [{"col": 0, "direction": "descending"}, {"col": 2}],
            "limit": {"limit": 10}
        }"#;
        let spec: QuerySpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.filters, vec![FilterSpec::new(1, Op::Ge)]);
        assert_eq!(spec.sort, vec![SortSpec::desc(0), SortSpec::asc(2)]);
        assert_eq!(spec.limit.limit, Some(10));
        assert_eq!(spec.limit.offset, None);
        assert_eq!(spec.cols_used, u64::MAX);
        assert!(spec.distinct.is_empty());
    }
}
