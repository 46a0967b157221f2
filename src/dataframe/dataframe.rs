//! Dataframe: named columns plus everything needed to plan and run queries

use std::sync::Arc;

use super::builder::{coerce_cell, DataframeBuilder};
use super::cache::{CachedPlan, PlanCache, PlanShape};
use super::errors::{DataframeError, DataframeResult};
use crate::column::{Column, ColumnError, Index, StoredValue};
use crate::config::EngineConfig;
use crate::cursor::Cursor;
use crate::interpreter::InterpreterOptions;
use crate::observability::{log_event, log_event_with_fields, EngineMetrics, Event};
use crate::plan::{PlanExplain, QueryPlan};
use crate::planner::QueryPlanBuilder;
use crate::query::{FilterValue, QuerySpec};
use crate::strings::StringPool;
use crate::types::StorageType;

#[derive(Debug)]
pub struct Dataframe {
    names: Vec<String>,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    pool: StringPool,
    config: EngineConfig,
    cache: PlanCache,
    metrics: EngineMetrics,
    row_count: u32,
}

impl Dataframe {
    pub fn builder<I, S>(names: I) -> DataframeBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DataframeBuilder::new(names)
    }

    /// Wraps already-built columns. String columns must have been interned
    /// into `pool`.
    pub fn new(
        names: Vec<String>,
        columns: Vec<Column>,
        pool: StringPool,
        config: EngineConfig,
    ) -> DataframeResult<Self> {
        if names.len() != columns.len() {
            return Err(DataframeError::NameCount {
                names: names.len(),
                columns: columns.len(),
            });
        }
        let mut counts: Vec<usize> = columns.iter().map(Column::row_count).collect();
        counts.dedup();
        if counts.len() > 1 {
            return Err(DataframeError::RowCountMismatch(counts));
        }
        for column in &columns {
            column.verify_sorted(&pool)?;
        }
        let row_count = counts.first().copied().unwrap_or(0) as u32;

        Ok(Self {
            names,
            columns,
            indexes: Vec::new(),
            pool,
            cache: PlanCache::new(config.plan_cache_capacity),
            config,
            metrics: EngineMetrics::new(),
            row_count,
        })
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_index(&self, name: &str) -> Option<u32> {
        self.names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Number of cached plans.
    pub fn cached_plans(&self) -> usize {
        self.cache.len()
    }

    /// Sum of every column's mutation counter.
    pub fn generation(&self) -> u64 {
        self.columns.iter().map(|c| u64::from(c.mutations())).sum()
    }

    /// Builds a permutation index over `cols`, in key order.
    pub fn add_index(&mut self, cols: Vec<u32>) -> DataframeResult<()> {
        let index = Index::build(cols, &self.columns, &self.pool)?;
        let described = index
            .columns()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        log_event_with_fields(
            Event::IndexBuilt,
            &[("columns", &described), ("rows", &index.len().to_string())],
        );
        self.indexes.push(index);
        self.cache.clear();
        Ok(())
    }

    /// Plans `spec`, reusing a cached plan of the same shape when the
    /// columns have not changed since it was built.
    ///
    /// Each filter's `value_index` is written back on success, whether or
    /// not the plan came from the cache.
    pub fn plan_query(&mut self, spec: &mut QuerySpec) -> DataframeResult<Arc<QueryPlan>> {
        let shape = PlanShape::of(spec);
        let generation = self.generation();

        if let Some(cached) = self.cache.get(&shape, generation) {
            for (filter, value_index) in spec.filters.iter_mut().zip(&cached.value_indexes) {
                filter.value_index = *value_index;
            }
            self.metrics.increment_cache_hits();
            log_event(Event::PlanCacheHit);
            return Ok(cached.plan);
        }
        self.metrics.increment_cache_misses();
        log_event(Event::PlanCacheMiss);

        let builder = QueryPlanBuilder::new(self.row_count, &self.columns, &self.indexes, &self.config);
        let plan = match builder.build(spec) {
            Ok(plan) => Arc::new(plan),
            Err(err) => {
                self.metrics.increment_plans_rejected();
                log_event_with_fields(
                    Event::PlanRejected,
                    &[("code", err.code().code()), ("message", err.message())],
                );
                return Err(err.into());
            }
        };

        self.metrics.increment_plans_built();
        log_event_with_fields(
            Event::PlanBuilt,
            &[
                ("cost", &plan.params.estimated_cost.to_string()),
                ("instructions", &plan.bytecode.len().to_string()),
            ],
        );
        self.cache.insert(
            shape,
            generation,
            CachedPlan {
                plan: Arc::clone(&plan),
                value_indexes: spec.filters.iter().map(|f| f.value_index).collect(),
            },
        );
        Ok(plan)
    }

    /// Binds `plan` to this dataframe's columns. Call `execute` on the
    /// cursor to run it.
    pub fn query<'a>(&'a self, plan: &'a QueryPlan) -> Cursor<'a> {
        Cursor::with_options(
            plan,
            &self.columns,
            &self.indexes,
            &self.pool,
            InterpreterOptions::from(&self.config),
        )
        .with_metrics(&self.metrics)
    }

    pub fn explain(&self, plan: &QueryPlan) -> PlanExplain {
        PlanExplain::from_plan(plan)
    }

    /// Appends one row.
    ///
    /// Every cell is checked before any column changes, so a rejected row
    /// leaves the dataframe untouched.
    pub fn push_row(&mut self, cells: Vec<FilterValue>) -> DataframeResult<()> {
        if cells.len() != self.columns.len() {
            return Err(DataframeError::RowWidth {
                expected: self.columns.len(),
                actual: cells.len(),
            });
        }

        let mut values: Vec<Option<StoredValue>> = Vec::with_capacity(cells.len());
        for ((name, column), cell) in self.names.iter().zip(&self.columns).zip(&cells) {
            let ty = column.storage_type();
            let value = coerce_cell(name, ty, cell, &mut self.pool)?;
            if ty == StorageType::Id && value != Some(StoredValue::Uint32(self.row_count)) {
                let value = match value {
                    Some(StoredValue::Uint32(v)) => v,
                    _ => u32::MAX,
                };
                return Err(ColumnError::IdSequenceBroken {
                    rows: self.row_count,
                    value,
                }
                .into());
            }
            values.push(value);
        }

        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value, &self.pool)?;
        }
        self.row_count += 1;

        let rebuilt = self
            .indexes
            .iter()
            .map(|index| Index::build(index.columns().to_vec(), &self.columns, &self.pool))
            .collect::<Result<Vec<_>, _>>()?;
        self.indexes = rebuilt;
        self.cache.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CellValue;
    use crate::query::{FilterSpec, FilterValueList, LimitSpec, SortSpec};
    use crate::types::{DuplicateState, Op, SortState};

    fn frame(values: &[i64]) -> Dataframe {
        let mut builder = Dataframe::builder(["v"]);
        for v in values {
            builder.add_row(vec![FilterValue::Int64(*v)]).unwrap();
        }
        builder.build().unwrap()
    }

    fn rows(df: &mut Dataframe, spec: &mut QuerySpec, values: Vec<FilterValue>) -> Vec<u32> {
        let plan = df.plan_query(spec).unwrap();
        let mut fetcher = FilterValueList::for_filters(&spec.filters, values);
        let mut cursor = df.query(&plan);
        cursor.execute(&mut fetcher);
        let mut out = Vec::new();
        while !cursor.eof() {
            out.push(cursor.table_index());
            cursor.next();
        }
        out
    }

    fn eq_spec() -> QuerySpec {
        QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_cache_hit_reuses_plan() {
        let mut df = frame(&[10, 10, 20, 30]);
        let mut spec = eq_spec();
        assert_eq!(rows(&mut df, &mut spec, vec![10i64.into()]), vec![0, 1]);

        let mut again = eq_spec();
        assert_eq!(rows(&mut df, &mut again, vec![20i64.into()]), vec![2]);
        assert_eq!(again.filters[0].value_index, Some(0));

        let snapshot = df.metrics().snapshot();
        assert_eq!(snapshot.plans_built, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.executions, 2);
        assert_eq!(snapshot.rows_returned, 3);
    }

    #[test]
    fn test_disabled_cache_always_plans() {
        let mut builder = Dataframe::builder(["v"]).config(EngineConfig {
            plan_cache_capacity: 0,
            ..Default::default()
        });
        builder.add_row(vec![FilterValue::Int64(1)]).unwrap();
        let mut df = builder.build().unwrap();
        df.plan_query(&mut eq_spec()).unwrap();
        df.plan_query(&mut eq_spec()).unwrap();
        assert_eq!(df.metrics().snapshot().plans_built, 2);
        assert_eq!(df.cached_plans(), 0);
    }

    #[test]
    fn test_rejected_plan_is_counted() {
        let mut df = frame(&[1]);
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(5, Op::Eq)],
            ..Default::default()
        };
        let err = df.plan_query(&mut spec).unwrap_err();
        assert!(matches!(err, DataframeError::Planner(_)));
        assert!(err.to_string().contains("DF_PLAN_INVALID_COLUMN"));
        assert_eq!(df.metrics().snapshot().plans_rejected, 1);
    }

    #[test]
    fn test_push_row_invalidates_and_downgrades() {
        let mut df = frame(&[10, 20, 30]);
        let mut spec = eq_spec();
        assert_eq!(rows(&mut df, &mut spec, vec![20i64.into()]), vec![1]);
        assert_eq!(df.cached_plans(), 1);

        df.push_row(vec![FilterValue::Int64(20)]).unwrap();
        assert_eq!(df.cached_plans(), 0);
        assert_eq!(df.row_count(), 4);
        assert_eq!(df.columns()[0].sort_state(), SortState::Unsorted);
        assert_eq!(df.columns()[0].duplicate_state(), DuplicateState::HasDuplicates);

        let mut spec = eq_spec();
        assert_eq!(rows(&mut df, &mut spec, vec![20i64.into()]), vec![1, 3]);
        assert_eq!(df.metrics().snapshot().plans_built, 2);
    }

    fn doubles(values: &[f64]) -> Dataframe {
        let mut builder = Dataframe::builder(["v"]);
        for v in values {
            builder.add_row(vec![FilterValue::Double(*v)]).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_push_row_signed_zero_marks_duplicate() {
        let mut df = doubles(&[-0.0]);
        assert_eq!(df.columns()[0].duplicate_state(), DuplicateState::NoDuplicates);

        df.push_row(vec![FilterValue::Double(0.0)]).unwrap();
        assert_eq!(df.columns()[0].duplicate_state(), DuplicateState::HasDuplicates);
        assert_eq!(rows(&mut df, &mut eq_spec(), vec![FilterValue::Double(0.0)]), vec![0, 1]);
        assert_eq!(rows(&mut df, &mut eq_spec(), vec![FilterValue::Double(-0.0)]), vec![0, 1]);
    }

    #[test]
    fn test_push_row_nan_then_query() {
        let mut df = doubles(&[1.0, 2.0]);
        df.push_row(vec![FilterValue::Double(f64::NAN)]).unwrap();
        df.push_row(vec![FilterValue::Double(0.5)]).unwrap();
        assert_eq!(df.columns()[0].sort_state(), SortState::Unsorted);

        let mut gt = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Gt)],
            ..Default::default()
        };
        assert_eq!(rows(&mut df, &mut gt, vec![FilterValue::Double(0.75)]), vec![0, 1]);
        assert!(rows(&mut df, &mut eq_spec(), vec![FilterValue::Double(f64::NAN)]).is_empty());

        let mut max = QuerySpec {
            sort: vec![SortSpec::desc(0)],
            limit: LimitSpec {
                limit: Some(1),
                offset: None,
            },
            ..Default::default()
        };
        assert_eq!(rows(&mut df, &mut max, vec![]), vec![2]);
    }

    #[test]
    fn test_push_row_rejects_without_mutating() {
        let mut builder = Dataframe::builder(["id", "v"]).id_column("id");
        builder
            .add_row(vec![FilterValue::Int64(0), FilterValue::Int64(7)])
            .unwrap();
        let mut df = builder.build().unwrap();

        let err = df
            .push_row(vec![FilterValue::Int64(1), FilterValue::from("x")])
            .unwrap_err();
        assert!(matches!(err, DataframeError::TypeMismatch { .. }));
        let err = df
            .push_row(vec![FilterValue::Int64(5), FilterValue::Int64(8)])
            .unwrap_err();
        assert!(matches!(
            err,
            DataframeError::Column(ColumnError::IdSequenceBroken { rows: 1, value: 5 })
        ));
        assert_eq!(df.row_count(), 1);
        assert_eq!(df.generation(), 0);

        df.push_row(vec![FilterValue::Int64(1), FilterValue::Null])
            .unwrap();
        assert_eq!(df.row_count(), 2);
        assert_eq!(df.columns()[1].value(1), None);
    }

    #[test]
    fn test_index_rebuilt_on_push() {
        let mut df = frame(&[3, 1, 2]);
        df.add_index(vec![0]).unwrap();
        assert_eq!(df.indexes()[0].permutation_vector(), &[1, 2, 0]);

        df.push_row(vec![FilterValue::Int64(0)]).unwrap();
        assert_eq!(df.indexes()[0].permutation_vector(), &[3, 1, 2, 0]);

        let mut spec = eq_spec();
        assert_eq!(rows(&mut df, &mut spec, vec![2i64.into()]), vec![2]);
    }

    #[test]
    fn test_query_reads_cells_by_name() {
        let mut builder = Dataframe::builder(["name", "score"]);
        builder
            .add_row(vec![FilterValue::from("b"), FilterValue::Double(1.5)])
            .unwrap();
        builder
            .add_row(vec![FilterValue::from("a"), FilterValue::Double(0.5)])
            .unwrap();
        let mut df = builder.build().unwrap();
        let score = df.column_index("score").unwrap();

        let mut spec = QuerySpec {
            sort: vec![SortSpec::asc(score)],
            ..Default::default()
        };
        let plan = df.plan_query(&mut spec).unwrap();
        let mut cursor = df.query(&plan);
        cursor.execute(&mut FilterValueList::default());
        assert_eq!(cursor.cell_value(0), CellValue::String("a"));
        assert_eq!(cursor.cell_value(score), CellValue::Double(0.5));
    }

    #[test]
    fn test_explain_lists_plan() {
        let mut df = frame(&[1, 2]);
        let plan = df.plan_query(&mut eq_spec()).unwrap();
        let explain = df.explain(&plan);
        assert_eq!(explain.steps.len(), plan.bytecode.len());
        assert_eq!(explain.steps[0].name, "InitRange");
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Dataframe::new(
            vec!["a".into(), "b".into()],
            vec![Column::id(2), Column::id(3)],
            StringPool::new(),
            EngineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, DataframeError::RowCountMismatch(vec![2, 3]));
    }
}
