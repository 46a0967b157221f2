//! Plan cache keyed by query shape
//!
//! Filter values never reach the planner, so two specs that differ only in
//! their values share a plan. Entries remember the column generation they
//! were built against and are dropped when it moves.

use std::collections::HashMap;
use std::sync::Arc;

use crate::plan::QueryPlan;
use crate::query::{DistinctSpec, LimitSpec, QuerySpec, SortSpec};
use crate::types::Op;

/// Everything in a `QuerySpec` the planner looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanShape {
    filters: Vec<(u32, Op)>,
    distinct: Vec<DistinctSpec>,
    sort: Vec<SortSpec>,
    limit: LimitSpec,
    cols_used: u64,
}

impl PlanShape {
    pub fn of(spec: &QuerySpec) -> Self {
        Self {
            filters: spec.filters.iter().map(|f| (f.col, f.op)).collect(),
            distinct: spec.distinct.clone(),
            sort: spec.sort.clone(),
            limit: spec.limit,
            cols_used: spec.cols_used,
        }
    }
}

/// A cached plan and the `value_index` it assigned to each filter.
#[derive(Debug, Clone)]
pub struct CachedPlan {
    pub plan: Arc<QueryPlan>,
    pub value_indexes: Vec<Option<u32>>,
}

#[derive(Debug)]
struct Entry {
    cached: CachedPlan,
    generation: u64,
    last_used: u64,
}

/// Bounded least-recently-used cache.
#[derive(Debug)]
pub struct PlanCache {
    capacity: usize,
    entries: HashMap<PlanShape, Entry>,
    tick: u64,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the plan for `shape` if it was built at `generation`.
    /// A stale entry is evicted.
    pub fn get(&mut self, shape: &PlanShape, generation: u64) -> Option<CachedPlan> {
        self.tick += 1;
        let entry = self.entries.get_mut(shape)?;
        if entry.generation != generation {
            self.entries.remove(shape);
            return None;
        }
        entry.last_used = self.tick;
        Some(entry.cached.clone())
    }

    pub fn insert(&mut self, shape: PlanShape, generation: u64, cached: CachedPlan) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&shape) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(
            shape,
            Entry {
                cached,
                generation,
                last_used: self.tick,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterSpec;

    fn cached() -> CachedPlan {
        CachedPlan {
            plan: Arc::new(QueryPlan::default()),
            value_indexes: vec![Some(0)],
        }
    }

    fn shape(col: u32) -> PlanShape {
        PlanShape::of(&QuerySpec {
            filters: vec![FilterSpec::new(col, Op::Eq)],
            ..Default::default()
        })
    }

    #[test]
    fn test_shape_ignores_value_index() {
        let mut a = QuerySpec {
            filters: vec![FilterSpec::new(1, Op::Lt)],
            ..Default::default()
        };
        let b = a.clone();
        a.filters[0].value_index = Some(3);
        assert_eq!(PlanShape::of(&a), PlanShape::of(&b));
    }

    #[test]
    fn test_stale_generation_evicts() {
        let mut cache = PlanCache::new(4);
        cache.insert(shape(0), 7, cached());
        assert!(cache.get(&shape(0), 7).is_some());
        assert!(cache.get(&shape(0), 8).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = PlanCache::new(2);
        cache.insert(shape(0), 0, cached());
        cache.insert(shape(1), 0, cached());
        assert!(cache.get(&shape(0), 0).is_some());
        cache.insert(shape(2), 0, cached());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&shape(1), 0).is_none());
        assert!(cache.get(&shape(0), 0).is_some());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut cache = PlanCache::new(0);
        cache.insert(shape(0), 0, cached());
        assert!(cache.get(&shape(0), 0).is_none());
    }
}
