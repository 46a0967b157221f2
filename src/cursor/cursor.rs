//! Forward row iterator over an executed plan

use crate::column::{Column, Index, Storage};
use crate::interpreter::{Interpreter, InterpreterOptions, NULL_STORAGE_INDEX};
use crate::observability::{log_event_with_fields, EngineMetrics, Event};
use crate::plan::QueryPlan;
use crate::query::ValueFetcher;
use crate::strings::StringPool;

/// Receives one cell value.
pub trait CellCallback {
    fn on_int64(&mut self, value: i64);
    fn on_double(&mut self, value: f64);
    fn on_string(&mut self, value: &str);
    fn on_null(&mut self);
}

/// Owned-or-borrowed form of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Null,
    Int64(i64),
    Double(f64),
    String(&'a str),
}

impl<'a> CellValue<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// Iterates the rows a plan produces.
///
/// The cursor owns the interpreter, so executing it again with new filter
/// values reuses every buffer allocated by the previous run.
pub struct Cursor<'a> {
    plan: &'a QueryPlan,
    columns: &'a [Column],
    pool: &'a StringPool,
    interpreter: Interpreter<'a>,
    metrics: Option<&'a EngineMetrics>,
    stride: usize,
    pos: usize,
    len: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(
        plan: &'a QueryPlan,
        columns: &'a [Column],
        indexes: &'a [Index],
        pool: &'a StringPool,
    ) -> Self {
        Self::with_options(plan, columns, indexes, pool, InterpreterOptions::default())
    }

    pub fn with_options(
        plan: &'a QueryPlan,
        columns: &'a [Column],
        indexes: &'a [Index],
        pool: &'a StringPool,
        options: InterpreterOptions,
    ) -> Self {
        Self {
            plan,
            columns,
            pool,
            interpreter: Interpreter::new(plan, columns, indexes, pool, options),
            metrics: None,
            stride: plan.params.output_per_row.max(1) as usize,
            pos: 0,
            len: 0,
        }
    }

    /// Counts executions and returned rows in `metrics`.
    pub fn with_metrics(mut self, metrics: &'a EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs the plan and positions at the first row.
    pub fn execute(&mut self, fetcher: &mut dyn ValueFetcher) {
        self.interpreter.execute(fetcher);
        self.len = self.output().len();
        self.pos = 0;

        let rows = self.row_count();
        if let Some(metrics) = self.metrics {
            metrics.record_execution(rows as u64);
        }
        log_event_with_fields(
            Event::QueryExecuted,
            &[
                ("instructions", &self.plan.bytecode.len().to_string()),
                ("rows", &rows.to_string()),
            ],
        );
    }

    /// Rows produced by the last execution.
    pub fn row_count(&self) -> usize {
        self.len / self.stride
    }

    pub fn next(&mut self) {
        self.pos += self.stride;
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.len
    }

    /// Table row of the current output row.
    pub fn table_index(&self) -> u32 {
        self.output()[self.pos]
    }

    /// Delivers the current row's value of `col` to `callback`.
    pub fn cell(&self, col: u32, callback: &mut impl CellCallback) {
        match self.cell_value(col) {
            CellValue::Null => callback.on_null(),
            CellValue::Int64(v) => callback.on_int64(v),
            CellValue::Double(v) => callback.on_double(v),
            CellValue::String(v) => callback.on_string(v),
        }
    }

    pub fn cell_value(&self, col: u32) -> CellValue<'a> {
        let column = &self.columns[col as usize];
        let Some(slot) = self.storage_slot(col, column) else {
            return CellValue::Null;
        };
        let s = slot as usize;
        match column.storage() {
            Storage::Id { .. } => CellValue::Int64(i64::from(slot)),
            Storage::Uint32(d) => CellValue::Int64(i64::from(d[s])),
            Storage::Int32(d) => CellValue::Int64(i64::from(d[s])),
            Storage::Int64(d) => CellValue::Int64(d[s]),
            Storage::Double(d) => CellValue::Double(d[s]),
            Storage::String(d) => CellValue::String(self.pool.get(d[s])),
        }
    }

    fn storage_slot(&self, col: u32, column: &Column) -> Option<u32> {
        let row = self.table_index();
        if column.null_storage().bit_vector().is_none() {
            return Some(row);
        }
        match self.plan.col_to_output_offset.get(col as usize) {
            Some(&offset) if offset != 0 => {
                let slot = self.output()[self.pos + offset as usize];
                (slot != NULL_STORAGE_INDEX).then_some(slot)
            }
            // Not in the used-columns bitmap: rank the null bitmap directly.
            _ => column.storage_index(row),
        }
    }

    fn output(&self) -> &[u32] {
        self.interpreter.span(self.plan.params.output_register)
    }
}
