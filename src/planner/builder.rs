//! Lowers query specs into a bytecode program
//!
//! The builder keeps track of the register currently holding the working
//! set of row indices. It starts as the full row `Range` and stays a range
//! for as long as only sorted-column narrowing is applied; the first
//! instruction that needs an explicit index list materializes it into a
//! slab-backed `Span`.
//!
//! Alongside the program it maintains row-count estimates (`max` is an
//! upper bound, `estimated` a guess) and the accumulated cost.

use std::collections::HashMap;

use super::errors::{PlannerError, PlannerResult};
use crate::bytecode::{
    Bytecode, CastFilterValueListResult, CastFilterValueResult, ReadHandle, RegisterAllocator,
    RwHandle, StringIdToRankMap,
};
use crate::column::{Column, Index, SpecializedStorage};
use crate::config::EngineConfig;
use crate::memory::{Range, Slab, Span};
use crate::plan::{ExecutionParams, QueryPlan};
use crate::query::{DistinctSpec, FilterSpec, LimitSpec, QuerySpec, SortSpec};
use crate::types::{
    DuplicateState, IntegerOrDoubleType, MinMaxOp, NonIdStorageType, NonNullOp, NonStringOp,
    NonStringType, NullOp, Nullability, Op, SortDirection, SortState, StorageType,
};

/// Effect of an instruction on the row-count estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowCountModifier {
    Unchanged,
    NonEquality,
    Equality(DuplicateState),
    One,
    Zero,
    LimitOffset { limit: u32, offset: u32 },
}

/// Order in which filters are applied, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FilterPreference {
    IdEq,
    SetIdSortedEq,
    IdInequality,
    NumericSortedEq,
    NumericSortedInequality,
    StringSortedEq,
    StringSortedInequality,
    Least,
}

#[derive(Debug, Clone, Copy)]
enum IndicesReg {
    Range(RwHandle<Range>),
    Span(RwHandle<Span>),
}

/// Reusable slab for intermediate index lists.
#[derive(Debug, Clone, Copy)]
struct Scratch {
    slab: RwHandle<Slab<u32>>,
    span: RwHandle<Span>,
    in_use: bool,
}

pub struct QueryPlanBuilder<'a> {
    columns: &'a [Column],
    indexes: &'a [Index],
    config: &'a EngineConfig,
    registers: RegisterAllocator,
    params: ExecutionParams,
    bytecode: Vec<Bytecode>,
    indices_reg: IndicesReg,
    scratch: Option<Scratch>,
    popcount_regs: HashMap<u32, RwHandle<Slab<u32>>>,
    guaranteed_empty: bool,
}

impl<'a> QueryPlanBuilder<'a> {
    pub fn new(
        row_count: u32,
        columns: &'a [Column],
        indexes: &'a [Index],
        config: &'a EngineConfig,
    ) -> Self {
        let mut registers = RegisterAllocator::new();
        let range = registers.alloc::<Range>();
        let mut builder = Self {
            columns,
            indexes,
            config,
            registers,
            params: ExecutionParams {
                max_row_count: row_count,
                estimated_row_count: row_count,
                ..Default::default()
            },
            bytecode: Vec::new(),
            indices_reg: IndicesReg::Range(range),
            scratch: None,
            popcount_regs: HashMap::new(),
            guaranteed_empty: false,
        };
        builder.add_opcode(
            Bytecode::InitRange {
                size: row_count,
                dest_register: range,
            },
            RowCountModifier::Unchanged,
        );
        builder
    }

    /// Builds the plan for `spec`, writing each filter's `value_index`.
    ///
    /// On error `spec` is left untouched.
    pub fn build(mut self, spec: &mut QuerySpec) -> PlannerResult<QueryPlan> {
        self.validate(spec)?;

        self.filter(&mut spec.filters);
        self.distinct(&spec.distinct);
        if self.can_use_min_max(&spec.sort, spec.limit) {
            self.min_max(spec.sort[0]);
            self.output(LimitSpec::default(), spec.cols_used)
        } else {
            self.sort(&spec.sort);
            self.output(spec.limit, spec.cols_used)
        }
    }

    fn validate(&self, spec: &QuerySpec) -> PlannerResult<()> {
        let count = self.columns.len();
        for (i, index) in self.indexes.iter().enumerate() {
            if index.columns().is_empty() {
                return Err(PlannerError::empty_index(i));
            }
            if let Some(col) = index.columns().iter().find(|c| **c as usize >= count) {
                return Err(PlannerError::invalid_index(i, *col));
            }
        }

        let cols = spec
            .filters
            .iter()
            .map(|f| f.col)
            .chain(spec.distinct.iter().map(|d| d.col))
            .chain(spec.sort.iter().map(|s| s.col));
        for col in cols {
            if col as usize >= count {
                return Err(PlannerError::invalid_column(col, count));
            }
        }

        for (i, s) in spec.sort.iter().enumerate() {
            if spec.sort[..i].iter().any(|p| p.col == s.col) {
                return Err(PlannerError::invalid_spec(format!(
                    "column {} appears more than once in sort",
                    s.col
                )));
            }
        }

        if !self.config.regex_enabled {
            let regex_on_string = spec.filters.iter().find(|f| {
                f.op == Op::Regex
                    && self.columns[f.col as usize].storage_type() == StorageType::String
            });
            if let Some(f) = regex_on_string {
                return Err(PlannerError::regex_disabled(f.col));
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Filters
    // ---------------------------------------------------------------------

    fn filter(&mut self, specs: &mut [FilterSpec]) {
        let mut order: Vec<usize> = (0..specs.len()).collect();
        order.sort_by_key(|i| self.filter_preference(&specs[*i]));

        let mut handled = vec![false; specs.len()];
        for &i in &order {
            handled[i] = self.try_sorted_constraint(&mut specs[i]);
        }

        if self.config.use_indexes && self.params.max_row_count > 1 {
            self.try_index_constraints(specs, &order, &mut handled);
        }

        for &i in &order {
            if !handled[i] {
                self.residual_constraint(&mut specs[i]);
            }
        }
    }

    fn filter_preference(&self, spec: &FilterSpec) -> FilterPreference {
        let col = &self.columns[spec.col as usize];
        if col.nullability() != Nullability::NonNull {
            return FilterPreference::Least;
        }
        let ty = col.storage_type();
        let eq = spec.op == Op::Eq;
        let ineq = spec.op.is_inequality();
        let sorted = col.sort_state() == SortState::Sorted;
        let numeric = IntegerOrDoubleType::try_from(ty).is_ok();
        let string = ty == StorageType::String;

        if ty == StorageType::Id && eq {
            FilterPreference::IdEq
        } else if ty == StorageType::Uint32 && col.sort_state() == SortState::SetIdSorted && eq
        {
            FilterPreference::SetIdSortedEq
        } else if ty == StorageType::Id && ineq {
            FilterPreference::IdInequality
        } else if sorted && numeric && eq {
            FilterPreference::NumericSortedEq
        } else if sorted && numeric && ineq {
            FilterPreference::NumericSortedInequality
        } else if sorted && string && eq {
            FilterPreference::StringSortedEq
        } else if sorted && string && ineq {
            FilterPreference::StringSortedInequality
        } else {
            FilterPreference::Least
        }
    }

    /// Narrows the row range by binary search when the column allows it.
    fn try_sorted_constraint(&mut self, spec: &mut FilterSpec) -> bool {
        let IndicesReg::Range(range) = self.indices_reg else {
            return false;
        };
        let columns = self.columns;
        let col = &columns[spec.col as usize];
        if col.nullability() != Nullability::NonNull || col.sort_state() == SortState::Unsorted {
            return false;
        }
        let Ok(non_null_op) = NonNullOp::try_from(spec.op) else {
            return false;
        };
        let Some(op) = non_null_op.to_range() else {
            return false;
        };

        let ty = col.storage_type();
        let val_register = self.cast_filter_value(spec, ty, non_null_op);
        let eq = non_null_op == NonNullOp::Eq;
        let modifier = if eq {
            RowCountModifier::Equality(col.duplicate_state())
        } else {
            RowCountModifier::NonEquality
        };

        let small_value_eq = self.config.use_specialized_storage
            && matches!(col.specialized_storage(), SpecializedStorage::SmallValueEq(_));
        let bytecode = if eq
            && ty == StorageType::Uint32
            && col.sort_state() == SortState::SetIdSorted
        {
            Bytecode::Uint32SetIdSortedEq {
                col: spec.col,
                val_register,
                update_register: range,
            }
        } else if eq && small_value_eq {
            Bytecode::SpecializedStorageSmallValueEq {
                col: spec.col,
                val_register,
                update_register: range,
            }
        } else {
            let (write_result_to, search) = op.sorted_filter_args();
            Bytecode::SortedFilter {
                ty,
                search,
                col: spec.col,
                val_register,
                update_register: range,
                write_result_to,
            }
        };
        self.add_opcode(bytecode, modifier);
        true
    }

    /// Uses the index whose leading columns match the longest run of
    /// pending equality filters.
    fn try_index_constraints(
        &mut self,
        specs: &mut [FilterSpec],
        order: &[usize],
        handled: &mut [bool],
    ) {
        let IndicesReg::Range(range) = self.indices_reg else {
            return;
        };
        let columns = self.columns;

        let mut best: Option<(usize, Vec<usize>)> = None;
        for (pos, index) in self.indexes.iter().enumerate() {
            let mut matched: Vec<usize> = Vec::new();
            for &col in index.columns() {
                if columns[col as usize].storage_type() == StorageType::Id {
                    break;
                }
                let found = order.iter().copied().find(|&i| {
                    !handled[i] && specs[i].col == col && specs[i].op == Op::Eq
                        && !matched.contains(&i)
                });
                match found {
                    Some(i) => matched.push(i),
                    None => break,
                }
            }
            let longer = best.as_ref().map_or(true, |(_, b)| matched.len() > b.len());
            if !matched.is_empty() && longer {
                best = Some((pos, matched));
            }
        }
        let Some((pos, matched)) = best else {
            return;
        };

        let index_span = self.registers.alloc::<Span>();
        self.add_opcode(
            Bytecode::IndexPermutationVectorToSpan {
                index: pos as u32,
                write_register: index_span,
            },
            RowCountModifier::Unchanged,
        );
        for i in matched {
            let spec = &mut specs[i];
            let col = &columns[spec.col as usize];
            let Ok(ty) = NonIdStorageType::try_from(col.storage_type()) else {
                continue;
            };
            let filter_value_reg = self.cast_filter_value(spec, col.storage_type(), NonNullOp::Eq);
            let popcount_register = match col.nullability() {
                Nullability::SparseNull => Some(self.prefix_popcount_for(spec.col).read()),
                _ => None,
            };
            self.add_opcode(
                Bytecode::IndexedFilterEq {
                    ty,
                    nullability: col.nullability(),
                    col: spec.col,
                    filter_value_reg,
                    popcount_register,
                    update_register: index_span,
                },
                RowCountModifier::Equality(col.duplicate_state()),
            );
            handled[i] = true;
        }

        let (_, dest) = self.allocate_indices(self.params.max_row_count);
        self.add_opcode(
            Bytecode::CopySpanIntersectingRange {
                source_register: index_span.read(),
                source_range_register: range.read(),
                update_register: dest,
            },
            RowCountModifier::Unchanged,
        );
        self.indices_reg = IndicesReg::Span(dest);
    }

    fn residual_constraint(&mut self, spec: &mut FilterSpec) {
        if self.guaranteed_empty {
            self.next_value_index(spec);
            return;
        }
        let columns = self.columns;
        let col = &columns[spec.col as usize];

        if spec.op == Op::In {
            self.in_constraint(spec, col);
            return;
        }
        if let Ok(op) = NullOp::try_from(spec.op) {
            self.null_constraint(spec, col, op);
            return;
        }
        let Ok(op) = NonNullOp::try_from(spec.op) else {
            return;
        };
        if col.storage_type() == StorageType::String {
            self.string_constraint(spec, col, op);
        } else if let Some(non_string_op) = op.to_non_string() {
            self.non_string_constraint(spec, col, op, non_string_op);
        } else {
            // Glob and regex never match numbers.
            self.next_value_index(spec);
            self.set_guaranteed_to_be_empty();
        }
    }

    fn in_constraint(&mut self, spec: &mut FilterSpec, col: &Column) {
        let ty = col.storage_type();
        let list_register = self.registers.alloc::<CastFilterValueListResult>();
        let fval_handle = self.next_value_index(spec);
        self.add_opcode(
            Bytecode::CastFilterValueList {
                ty,
                fval_handle,
                write_register: list_register,
                op: NonNullOp::Eq,
            },
            RowCountModifier::Unchanged,
        );

        let update = self.ensure_indices_are_in_slab();
        self.prune_null_indices(spec.col, col, update);
        let source = self.translate_non_null_indices(spec.col, col, update, false);
        self.add_opcode(
            Bytecode::In {
                ty,
                col: spec.col,
                value_list_register: list_register.read(),
                source_register: source.read(),
                update_register: update,
            },
            RowCountModifier::NonEquality,
        );
        self.release_scratch();
    }

    fn null_constraint(&mut self, spec: &mut FilterSpec, col: &Column, op: NullOp) {
        self.next_value_index(spec);
        if col.nullability() == Nullability::NonNull {
            if op == NullOp::IsNull {
                self.set_guaranteed_to_be_empty();
            }
            return;
        }
        let update = self.ensure_indices_are_in_slab();
        self.add_opcode(
            Bytecode::NullFilter {
                op,
                col: spec.col,
                update_register: update,
            },
            RowCountModifier::NonEquality,
        );
    }

    fn non_string_constraint(
        &mut self,
        spec: &mut FilterSpec,
        col: &Column,
        op: NonNullOp,
        non_string_op: NonStringOp,
    ) {
        let storage_type = col.storage_type();
        let Ok(ty) = NonStringType::try_from(storage_type) else {
            return;
        };
        let val_register = self.cast_filter_value(spec, storage_type, op);
        let eq = non_string_op == NonStringOp::Eq;

        if let (IndicesReg::Range(range), true) = (self.indices_reg, eq) {
            if let (Nullability::NonNull, Ok(ty)) =
                (col.nullability(), NonIdStorageType::try_from(storage_type))
            {
                self.add_linear_filter_eq(spec.col, col, ty, val_register, range);
                return;
            }
        }

        let update = self.ensure_indices_are_in_slab();
        self.prune_null_indices(spec.col, col, update);
        let source = self.translate_non_null_indices(spec.col, col, update, false);
        let modifier = if eq {
            RowCountModifier::Equality(col.duplicate_state())
        } else {
            RowCountModifier::NonEquality
        };
        self.add_opcode(
            Bytecode::NonStringFilter {
                ty,
                op: non_string_op,
                col: spec.col,
                val_register,
                source_register: source.read(),
                update_register: update,
            },
            modifier,
        );
        self.release_scratch();
    }

    fn string_constraint(&mut self, spec: &mut FilterSpec, col: &Column, op: NonNullOp) {
        let val_register = self.cast_filter_value(spec, StorageType::String, op);
        let eq = op == NonNullOp::Eq;

        if let (IndicesReg::Range(range), true, Nullability::NonNull) =
            (self.indices_reg, eq, col.nullability())
        {
            self.add_linear_filter_eq(spec.col, col, NonIdStorageType::String, val_register, range);
            return;
        }

        let update = self.ensure_indices_are_in_slab();
        self.prune_null_indices(spec.col, col, update);
        let source = self.translate_non_null_indices(spec.col, col, update, false);
        let modifier = if eq {
            RowCountModifier::Equality(col.duplicate_state())
        } else {
            RowCountModifier::NonEquality
        };
        self.add_opcode(
            Bytecode::StringFilter {
                op,
                col: spec.col,
                val_register,
                source_register: source.read(),
                update_register: update,
            },
            modifier,
        );
        self.release_scratch();
    }

    fn add_linear_filter_eq(
        &mut self,
        col_idx: u32,
        col: &Column,
        ty: NonIdStorageType,
        filter_value_reg: ReadHandle<CastFilterValueResult>,
        range: RwHandle<Range>,
    ) {
        let (_, span) = self.allocate_indices(self.params.max_row_count);
        self.add_opcode(
            Bytecode::LinearFilterEq {
                ty,
                col: col_idx,
                filter_value_reg,
                source_register: range.read(),
                update_register: span,
            },
            RowCountModifier::Equality(col.duplicate_state()),
        );
        self.indices_reg = IndicesReg::Span(span);
    }

    // ---------------------------------------------------------------------
    // Distinct, sort, min/max
    // ---------------------------------------------------------------------

    fn distinct(&mut self, specs: &[DistinctSpec]) {
        if specs.is_empty() || self.guaranteed_empty {
            return;
        }
        let keys: Vec<(u32, bool)> = specs.iter().map(|d| (d.col, false)).collect();
        let stride = self.row_layout_stride(&keys);
        let indices = self.ensure_indices_are_in_slab();
        let buffer = self.copy_to_row_layout(stride, indices, None, &keys);
        self.add_opcode(
            Bytecode::Distinct {
                buffer_register: buffer.read(),
                total_row_stride: stride,
                indices_register: indices,
            },
            RowCountModifier::NonEquality,
        );
    }

    fn can_use_min_max(&self, sort: &[SortSpec], limit: LimitSpec) -> bool {
        sort.len() == 1
            && self.columns[sort[0].col as usize].nullability() == Nullability::NonNull
            && limit.limit == Some(1)
            && limit.offset.unwrap_or(0) == 0
    }

    fn min_max(&mut self, spec: SortSpec) {
        if self.guaranteed_empty {
            return;
        }
        let ty = self.columns[spec.col as usize].storage_type();
        let op = match spec.direction {
            SortDirection::Ascending => MinMaxOp::Min,
            SortDirection::Descending => MinMaxOp::Max,
        };
        let indices = self.ensure_indices_are_in_slab();
        self.add_opcode(
            Bytecode::FindMinMaxIndex {
                ty,
                op,
                col: spec.col,
                update_register: indices,
            },
            RowCountModifier::One,
        );
    }

    fn sort(&mut self, specs: &[SortSpec]) {
        if specs.is_empty() || self.guaranteed_empty {
            return;
        }
        let columns = self.columns;

        if let [only] = specs {
            let col = &columns[only.col as usize];
            if col.nullability() == Nullability::NonNull && col.sort_state().is_sorted() {
                match only.direction {
                    SortDirection::Ascending => return,
                    SortDirection::Descending
                        if col.duplicate_state() == DuplicateState::NoDuplicates =>
                    {
                        let indices = self.ensure_indices_are_in_slab();
                        self.add_opcode(
                            Bytecode::Reverse {
                                update_register: indices,
                            },
                            RowCountModifier::Unchanged,
                        );
                        return;
                    }
                    SortDirection::Descending => {}
                }
            }
        }

        let indices = self.ensure_indices_are_in_slab();

        let string_cols: Vec<u32> = specs
            .iter()
            .map(|s| s.col)
            .filter(|c| columns[*c as usize].storage_type() == StorageType::String)
            .collect();
        let rank_map = if string_cols.is_empty() {
            None
        } else {
            Some(self.build_rank_map(&string_cols, indices))
        };

        let keys: Vec<(u32, bool)> = specs
            .iter()
            .map(|s| (s.col, s.direction == SortDirection::Descending))
            .collect();
        let stride = self.row_layout_stride(&keys);
        let buffer = self.copy_to_row_layout(stride, indices, rank_map, &keys);
        self.add_opcode(
            Bytecode::SortRowLayout {
                buffer_register: buffer.read(),
                total_row_stride: stride,
                indices_register: indices,
            },
            RowCountModifier::Unchanged,
        );
    }

    /// Ranks every string id reachable from `indices` in the given columns.
    fn build_rank_map(
        &mut self,
        string_cols: &[u32],
        indices: RwHandle<Span>,
    ) -> ReadHandle<StringIdToRankMap> {
        let columns = self.columns;
        let map = self.registers.alloc::<StringIdToRankMap>();
        self.add_opcode(
            Bytecode::InitRankMap { dest_register: map },
            RowCountModifier::Unchanged,
        );
        for &col_idx in string_cols {
            let col = &columns[col_idx as usize];
            let source = if col.nullability() == Nullability::NonNull {
                indices
            } else {
                let scratch = self.scratch_indices(self.params.max_row_count);
                self.add_opcode(
                    Bytecode::StrideCopy {
                        source_register: indices.read(),
                        update_register: scratch,
                        stride: 1,
                    },
                    RowCountModifier::Unchanged,
                );
                self.prune_null_indices(col_idx, col, scratch);
                self.translate_non_null_indices(col_idx, col, scratch, true)
            };
            self.add_opcode(
                Bytecode::CollectIdIntoRankMap {
                    col: col_idx,
                    source_register: source.read(),
                    rank_map_register: map,
                },
                RowCountModifier::Unchanged,
            );
            self.release_scratch();
        }
        self.add_opcode(
            Bytecode::FinalizeRanksInMap {
                update_register: map,
            },
            RowCountModifier::Unchanged,
        );
        map.read()
    }

    fn row_layout_stride(&self, keys: &[(u32, bool)]) -> u16 {
        keys.iter()
            .map(|(c, _)| {
                let col = &self.columns[*c as usize];
                let null_byte = u16::from(col.nullability() != Nullability::NonNull);
                null_byte + col.storage_type().row_layout_size()
            })
            .sum()
    }

    fn copy_to_row_layout(
        &mut self,
        stride: u16,
        indices: RwHandle<Span>,
        rank_map: Option<ReadHandle<StringIdToRankMap>>,
        keys: &[(u32, bool)],
    ) -> RwHandle<Slab<u8>> {
        let columns = self.columns;
        let buffer = self.registers.alloc::<Slab<u8>>();
        self.add_opcode(
            Bytecode::AllocateRowLayoutBuffer {
                buffer_size: self.params.max_row_count.saturating_mul(u32::from(stride)),
                dest_buffer_register: buffer,
            },
            RowCountModifier::Unchanged,
        );

        let mut offset = 0u16;
        for &(col_idx, invert) in keys {
            let col = &columns[col_idx as usize];
            let nullability = col.nullability();
            let ty = col.storage_type();
            let popcount_register = match nullability {
                Nullability::SparseNull => Some(self.prefix_popcount_for(col_idx).read()),
                _ => None,
            };
            self.add_opcode(
                Bytecode::CopyToRowLayout {
                    ty,
                    nullability,
                    col: col_idx,
                    source_indices_register: indices.read(),
                    dest_buffer_register: buffer,
                    row_layout_offset: offset,
                    row_layout_stride: stride,
                    invert_copied_bits: invert,
                    popcount_register,
                    rank_map_register: if ty == StorageType::String { rank_map } else { None },
                },
                RowCountModifier::Unchanged,
            );
            offset += u16::from(nullability != Nullability::NonNull) + ty.row_layout_size();
        }
        buffer
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    fn output(mut self, limit: LimitSpec, cols_used: u64) -> PlannerResult<QueryPlan> {
        let columns = self.columns;
        let mut col_to_output_offset = vec![0u32; columns.len()];
        let mut output_per_row = 1u32;
        let mut null_cols = Vec::new();
        for (i, col) in columns.iter().enumerate() {
            let used = cols_used & (1u64 << i.min(63)) != 0;
            if used && col.nullability() != Nullability::NonNull {
                col_to_output_offset[i] = output_per_row;
                output_per_row += 1;
                null_cols.push(i as u32);
            }
        }

        let in_memory = self.ensure_indices_are_in_slab();
        if limit.limit.is_some() || limit.offset.is_some() {
            let offset = limit.offset.unwrap_or(0);
            let limit = limit.limit.unwrap_or(u32::MAX);
            self.add_opcode(
                Bytecode::LimitOffsetIndices {
                    offset_value: offset,
                    limit_value: limit,
                    update_register: in_memory,
                },
                RowCountModifier::LimitOffset { limit, offset },
            );
        }

        let output = if output_per_row > 1 {
            let size = self.params.max_row_count.saturating_mul(output_per_row);
            let (_, span) = self.allocate_indices(size);
            self.add_opcode(
                Bytecode::StrideCopy {
                    source_register: in_memory.read(),
                    update_register: span,
                    stride: output_per_row,
                },
                RowCountModifier::Unchanged,
            );
            for col_idx in null_cols {
                let offset = col_to_output_offset[col_idx as usize];
                let bytecode = match columns[col_idx as usize].nullability() {
                    Nullability::SparseNull => Bytecode::StrideTranslateAndCopySparseNullIndices {
                        col: col_idx,
                        popcount_register: self.prefix_popcount_for(col_idx).read(),
                        update_register: span,
                        offset,
                        stride: output_per_row,
                    },
                    _ => Bytecode::StrideCopyDenseNullIndices {
                        col: col_idx,
                        update_register: span,
                        offset,
                        stride: output_per_row,
                    },
                };
                self.add_opcode(bytecode, RowCountModifier::Unchanged);
            }
            span
        } else {
            in_memory
        };

        self.params.output_register = output.index();
        self.params.output_per_row = output_per_row;
        self.params.register_count = self.registers.count();
        Ok(QueryPlan {
            params: self.params,
            bytecode: self.bytecode,
            col_to_output_offset,
        })
    }

    // ---------------------------------------------------------------------
    // Register helpers
    // ---------------------------------------------------------------------

    fn next_value_index(&mut self, spec: &mut FilterSpec) -> u32 {
        let index = self.params.filter_value_count;
        self.params.filter_value_count += 1;
        spec.value_index = Some(index);
        index
    }

    fn cast_filter_value(
        &mut self,
        spec: &mut FilterSpec,
        ty: StorageType,
        op: NonNullOp,
    ) -> ReadHandle<CastFilterValueResult> {
        let register = self.registers.alloc::<CastFilterValueResult>();
        let fval_handle = self.next_value_index(spec);
        self.add_opcode(
            Bytecode::CastFilterValue {
                ty,
                fval_handle,
                write_register: register,
                op,
            },
            RowCountModifier::Unchanged,
        );
        register.read()
    }

    fn allocate_indices(&mut self, size: u32) -> (RwHandle<Slab<u32>>, RwHandle<Span>) {
        let slab = self.registers.alloc::<Slab<u32>>();
        let span = self.registers.alloc::<Span>();
        self.add_opcode(
            Bytecode::AllocateIndices {
                size,
                dest_slab_register: slab,
                dest_span_register: span,
            },
            RowCountModifier::Unchanged,
        );
        (slab, span)
    }

    fn ensure_indices_are_in_slab(&mut self) -> RwHandle<Span> {
        match self.indices_reg {
            IndicesReg::Span(span) => span,
            IndicesReg::Range(range) => {
                let (_, span) = self.allocate_indices(self.params.max_row_count);
                self.add_opcode(
                    Bytecode::Iota {
                        source_register: range.read(),
                        update_register: span,
                    },
                    RowCountModifier::Unchanged,
                );
                self.indices_reg = IndicesReg::Span(span);
                span
            }
        }
    }

    /// Drops null rows of a nullable column from `update`.
    fn prune_null_indices(&mut self, col_idx: u32, col: &Column, update: RwHandle<Span>) {
        if col.nullability() == Nullability::NonNull {
            return;
        }
        self.add_opcode(
            Bytecode::NullFilter {
                op: NullOp::IsNotNull,
                col: col_idx,
                update_register: update,
            },
            RowCountModifier::NonEquality,
        );
    }

    /// Returns a span of storage indices parallel to the row ids in `src`.
    ///
    /// Only sparse columns need translating; the rest index storage by row.
    fn translate_non_null_indices(
        &mut self,
        col_idx: u32,
        col: &Column,
        src: RwHandle<Span>,
        in_place: bool,
    ) -> RwHandle<Span> {
        if col.nullability() != Nullability::SparseNull {
            return src;
        }
        let update = if in_place {
            src
        } else {
            self.scratch_indices(self.params.max_row_count)
        };
        let popcount = self.prefix_popcount_for(col_idx);
        self.add_opcode(
            Bytecode::TranslateSparseNullIndices {
                col: col_idx,
                popcount_register: popcount.read(),
                source_register: src.read(),
                update_register: update,
            },
            RowCountModifier::Unchanged,
        );
        update
    }

    fn scratch_indices(&mut self, size: u32) -> RwHandle<Span> {
        let scratch = match self.scratch {
            Some(s) => {
                debug_assert!(!s.in_use, "scratch indices already in use");
                s
            }
            None => Scratch {
                slab: self.registers.alloc(),
                span: self.registers.alloc(),
                in_use: false,
            },
        };
        self.add_opcode(
            Bytecode::AllocateIndices {
                size,
                dest_slab_register: scratch.slab,
                dest_span_register: scratch.span,
            },
            RowCountModifier::Unchanged,
        );
        self.scratch = Some(Scratch {
            in_use: true,
            ..scratch
        });
        scratch.span
    }

    fn release_scratch(&mut self) {
        if let Some(s) = &mut self.scratch {
            s.in_use = false;
        }
    }

    fn prefix_popcount_for(&mut self, col_idx: u32) -> RwHandle<Slab<u32>> {
        if let Some(reg) = self.popcount_regs.get(&col_idx) {
            return *reg;
        }
        let reg = self.registers.alloc::<Slab<u32>>();
        self.add_opcode(
            Bytecode::PrefixPopcount {
                col: col_idx,
                dest_register: reg,
            },
            RowCountModifier::Unchanged,
        );
        self.popcount_regs.insert(col_idx, reg);
        reg
    }

    fn set_guaranteed_to_be_empty(&mut self) {
        let slab = self.registers.alloc::<Slab<u32>>();
        let span = self.registers.alloc::<Span>();
        self.add_opcode(
            Bytecode::AllocateIndices {
                size: 0,
                dest_slab_register: slab,
                dest_span_register: span,
            },
            RowCountModifier::Zero,
        );
        self.indices_reg = IndicesReg::Span(span);
        self.guaranteed_empty = true;
    }

    // ---------------------------------------------------------------------
    // Cost and row estimates
    // ---------------------------------------------------------------------

    fn add_opcode(&mut self, bytecode: Bytecode, modifier: RowCountModifier) {
        let cost = bytecode.cost();
        self.params.estimated_cost += cost.pre_operation(self.params.estimated_row_count);
        self.apply_modifier(modifier);
        self.params.estimated_cost += cost.post_operation(self.params.estimated_row_count);
        self.bytecode.push(bytecode);
    }

    fn apply_modifier(&mut self, modifier: RowCountModifier) {
        let p = &mut self.params;
        match modifier {
            RowCountModifier::Unchanged => {}
            RowCountModifier::NonEquality => {
                if p.estimated_row_count > 1 {
                    p.estimated_row_count /= 2;
                }
            }
            RowCountModifier::Equality(DuplicateState::HasDuplicates) => {
                if p.estimated_row_count > 1 {
                    let est = p.estimated_row_count as f64;
                    let reduced = (est / (2.0 * est.log2())) as u32;
                    p.estimated_row_count = reduced.max(1);
                }
            }
            RowCountModifier::Equality(DuplicateState::NoDuplicates) | RowCountModifier::One => {
                p.estimated_row_count = p.estimated_row_count.min(1);
                p.max_row_count = p.max_row_count.min(1);
            }
            RowCountModifier::Zero => {
                p.estimated_row_count = 0;
                p.max_row_count = 0;
            }
            RowCountModifier::LimitOffset { limit, offset } => {
                p.max_row_count -= p.max_row_count.min(offset);
                p.max_row_count = p.max_row_count.min(limit);
                p.estimated_row_count = p.max_row_count;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{NullStorage, SmallValueEq, Storage};
    use crate::memory::BitVector;
    use crate::planner::PlannerErrorCode;
    use crate::strings::StringPool;

    fn int64(values: &[i64], sort: SortState, dup: DuplicateState) -> Column {
        Column::new(
            Storage::Int64(values.to_vec().into()),
            NullStorage::NonNull,
            sort,
            dup,
        )
        .unwrap()
    }

    fn sparse_strings(pool: &mut StringPool, values: &[Option<&str>]) -> Column {
        let ids: Vec<_> = values.iter().flatten().map(|s| pool.intern(s)).collect();
        Column::new(
            Storage::String(ids.into()),
            NullStorage::SparseNull {
                bit_vector: BitVector::from_bools(values.iter().map(|v| v.is_some())),
            },
            SortState::Unsorted,
            DuplicateState::HasDuplicates,
        )
        .unwrap()
    }

    fn names(plan: &QueryPlan) -> Vec<&'static str> {
        plan.bytecode.iter().map(|b| b.name()).collect()
    }

    fn plan(columns: &[Column], indexes: &[Index], spec: &mut QuerySpec) -> QueryPlan {
        let config = EngineConfig::default();
        let rows = columns.first().map(|c| c.row_count() as u32).unwrap_or(0);
        QueryPlanBuilder::new(rows, columns, indexes, &config)
            .build(spec)
            .unwrap()
    }

    #[test]
    fn test_sorted_eq_uses_binary_search() {
        let cols = [int64(&[10, 10, 20, 30], SortState::Sorted, DuplicateState::HasDuplicates)];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(
            names(&plan),
            ["InitRange", "CastFilterValue", "SortedFilter", "AllocateIndices", "Iota"]
        );
        assert_eq!(spec.filters[0].value_index, Some(0));
        assert_eq!(plan.params.filter_value_count, 1);
        assert_eq!(plan.params.output_per_row, 1);
    }

    #[test]
    fn test_unsorted_eq_uses_linear_scan() {
        let cols = [int64(&[3, 1, 2], SortState::Unsorted, DuplicateState::NoDuplicates)];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(
            names(&plan),
            ["InitRange", "CastFilterValue", "AllocateIndices", "LinearFilterEq"]
        );
        // Unique column: at most one row survives.
        assert_eq!(plan.params.max_row_count, 1);
        assert_eq!(plan.params.estimated_row_count, 1);
    }

    #[test]
    fn test_filters_applied_in_preference_order() {
        let cols = [
            int64(&[1, 2, 3], SortState::Unsorted, DuplicateState::HasDuplicates),
            Column::id(3),
            int64(&[1, 2, 3], SortState::Sorted, DuplicateState::HasDuplicates),
        ];
        let mut spec = QuerySpec {
            filters: vec![
                FilterSpec::new(0, Op::Gt),
                FilterSpec::new(2, Op::Lt),
                FilterSpec::new(1, Op::Eq),
            ],
            ..Default::default()
        };
        plan(&cols, &[], &mut spec);
        // Slice order is preserved; only the value slots follow preference.
        assert_eq!(spec.filters[0].col, 0);
        assert_eq!(spec.filters[2].value_index, Some(0));
        assert_eq!(spec.filters[1].value_index, Some(1));
        assert_eq!(spec.filters[0].value_index, Some(2));
    }

    #[test]
    fn test_is_null_on_non_null_is_empty() {
        let cols = [
            int64(&[1, 2], SortState::Unsorted, DuplicateState::HasDuplicates),
            int64(&[1, 2], SortState::Unsorted, DuplicateState::HasDuplicates),
        ];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::IsNull), FilterSpec::new(1, Op::Gt)],
            sort: vec![SortSpec::desc(1)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(names(&plan), ["InitRange", "AllocateIndices"]);
        assert_eq!(plan.params.max_row_count, 0);
        assert_eq!(spec.filters[1].value_index, Some(1));
        assert_eq!(plan.params.filter_value_count, 2);
    }

    #[test]
    fn test_is_not_null_on_non_null_is_noop() {
        let cols = [int64(&[1, 2], SortState::Unsorted, DuplicateState::HasDuplicates)];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::IsNotNull)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(names(&plan), ["InitRange", "AllocateIndices", "Iota"]);
    }

    #[test]
    fn test_glob_on_numeric_is_empty() {
        let cols = [int64(&[1, 2], SortState::Unsorted, DuplicateState::HasDuplicates)];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Glob)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(plan.params.max_row_count, 0);
        assert_eq!(spec.filters[0].value_index, Some(0));
    }

    #[test]
    fn test_sparse_string_filter_translates_indices() {
        let mut pool = StringPool::new();
        let cols = [sparse_strings(&mut pool, &[Some("b"), None, Some("a")])];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Glob)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(
            names(&plan),
            [
                "InitRange",
                "CastFilterValue",
                "AllocateIndices",
                "Iota",
                "NullFilter",
                "AllocateIndices",
                "PrefixPopcount",
                "TranslateSparseNullIndices",
                "StringFilter",
                "AllocateIndices",
                "StrideCopy",
                "StrideTranslateAndCopySparseNullIndices",
            ]
        );
        assert_eq!(plan.params.output_per_row, 2);
        assert_eq!(plan.col_to_output_offset, vec![1]);
        // The popcount is computed once and shared.
        let popcounts = plan
            .bytecode
            .iter()
            .filter(|b| matches!(b, Bytecode::PrefixPopcount { .. }))
            .count();
        assert_eq!(popcounts, 1);
    }

    #[test]
    fn test_unused_nullable_column_has_no_slot() {
        let mut pool = StringPool::new();
        let cols = [sparse_strings(&mut pool, &[Some("b"), None])];
        let mut spec = QuerySpec {
            cols_used: 0,
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(plan.params.output_per_row, 1);
        assert_eq!(plan.col_to_output_offset, vec![0]);
    }

    #[test]
    fn test_regex_disabled_is_rejected() {
        let mut pool = StringPool::new();
        let cols = [sparse_strings(&mut pool, &[Some("a")])];
        let config = EngineConfig {
            regex_enabled: false,
            ..Default::default()
        };
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Regex)],
            ..Default::default()
        };
        let err = QueryPlanBuilder::new(1, &cols, &[], &config)
            .build(&mut spec)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::DfPlanUnsupportedOperator);
        assert_eq!(spec.filters[0].value_index, None);
    }

    #[test]
    fn test_invalid_column_and_index() {
        let cols = [Column::id(2)];
        let config = EngineConfig::default();
        let mut spec = QuerySpec {
            sort: vec![SortSpec::asc(4)],
            ..Default::default()
        };
        let err = QueryPlanBuilder::new(2, &cols, &[], &config)
            .build(&mut spec)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::DfPlanInvalidColumn);

        let pool = StringPool::new();
        let wide = [Column::id(2), Column::id(2)];
        let index = Index::build(vec![1], &wide, &pool).unwrap();
        let err = QueryPlanBuilder::new(2, &cols, &[index], &config)
            .build(&mut QuerySpec::default())
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::DfPlanInvalidIndex);
    }

    #[test]
    fn test_repeated_sort_column_is_rejected() {
        let cols = [Column::id(2)];
        let config = EngineConfig::default();
        let mut spec = QuerySpec {
            sort: vec![SortSpec::asc(0), SortSpec::desc(0)],
            ..Default::default()
        };
        let err = QueryPlanBuilder::new(2, &cols, &[], &config)
            .build(&mut spec)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::DfPlanInvalidSpec);
    }

    #[test]
    fn test_sort_elision_and_reverse() {
        let cols = [
            Column::id(4),
            int64(&[1, 1, 2, 3], SortState::Sorted, DuplicateState::HasDuplicates),
        ];
        let mut asc = QuerySpec {
            sort: vec![SortSpec::asc(1)],
            ..Default::default()
        };
        assert!(!names(&plan(&cols, &[], &mut asc)).contains(&"SortRowLayout"));

        let mut desc_unique = QuerySpec {
            sort: vec![SortSpec::desc(0)],
            ..Default::default()
        };
        assert!(names(&plan(&cols, &[], &mut desc_unique)).contains(&"Reverse"));

        // Reversing would flip the order of equal rows.
        let mut desc_dups = QuerySpec {
            sort: vec![SortSpec::desc(1)],
            ..Default::default()
        };
        assert!(names(&plan(&cols, &[], &mut desc_dups)).contains(&"SortRowLayout"));
    }

    #[test]
    fn test_string_sort_builds_rank_map() {
        let mut pool = StringPool::new();
        let cols = [sparse_strings(&mut pool, &[Some("b"), None, Some("a")])];
        let mut spec = QuerySpec {
            sort: vec![SortSpec::asc(0)],
            cols_used: 0,
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        let n = names(&plan);
        let pos = |name: &str| n.iter().position(|x| *x == name).unwrap();
        assert!(pos("InitRankMap") < pos("CollectIdIntoRankMap"));
        assert!(pos("CollectIdIntoRankMap") < pos("FinalizeRanksInMap"));
        assert!(pos("FinalizeRanksInMap") < pos("CopyToRowLayout"));
        assert!(pos("CopyToRowLayout") < pos("SortRowLayout"));
        let stride = plan.bytecode.iter().find_map(|b| match b {
            Bytecode::SortRowLayout { total_row_stride, .. } => Some(*total_row_stride),
            _ => None,
        });
        assert_eq!(stride, Some(5));
    }

    #[test]
    fn test_min_max_shortcut() {
        let cols = [int64(&[10, 10, 20, 30], SortState::Unsorted, DuplicateState::HasDuplicates)];
        let mut spec = QuerySpec {
            sort: vec![SortSpec::desc(0)],
            limit: LimitSpec {
                limit: Some(1),
                offset: None,
            },
            ..Default::default()
        };
        let shortcut = plan(&cols, &[], &mut spec);
        let n = names(&shortcut);
        assert!(n.contains(&"FindMinMaxIndex"));
        assert!(!n.contains(&"SortRowLayout"));
        assert!(!n.contains(&"LimitOffsetIndices"));
        assert_eq!(shortcut.params.max_row_count, 1);

        spec.limit.offset = Some(1);
        let with_offset = plan(&cols, &[], &mut spec);
        assert!(names(&with_offset).contains(&"SortRowLayout"));
        assert!(names(&with_offset).contains(&"LimitOffsetIndices"));
    }

    #[test]
    fn test_limit_offset_bounds_rows() {
        let cols = [Column::id(100)];
        let mut spec = QuerySpec {
            limit: LimitSpec {
                limit: Some(10),
                offset: Some(95),
            },
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert_eq!(plan.params.max_row_count, 5);
        assert_eq!(plan.params.estimated_row_count, 5);
    }

    #[test]
    fn test_index_path() {
        let pool = StringPool::new();
        let cols = [
            int64(&[3, 1, 3, 2], SortState::Unsorted, DuplicateState::HasDuplicates),
            int64(&[7, 7, 8, 7], SortState::Unsorted, DuplicateState::HasDuplicates),
        ];
        let short = Index::build(vec![0], &cols, &pool).unwrap();
        let long = Index::build(vec![0, 1], &cols, &pool).unwrap();
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(1, Op::Eq), FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        };
        let plan = plan(&cols, &[short, long], &mut spec);
        let n = names(&plan);
        assert_eq!(
            &n[1..],
            [
                "IndexPermutationVectorToSpan",
                "CastFilterValue",
                "IndexedFilterEq",
                "CastFilterValue",
                "IndexedFilterEq",
                "AllocateIndices",
                "CopySpanIntersectingRange",
            ]
        );
        assert!(matches!(
            plan.bytecode[1],
            Bytecode::IndexPermutationVectorToSpan { index: 1, .. }
        ));
        // Index columns are matched in key order.
        assert_eq!(spec.filters[1].value_index, Some(0));
        assert_eq!(spec.filters[0].value_index, Some(1));
    }

    #[test]
    fn test_indexes_disabled() {
        let pool = StringPool::new();
        let cols = [int64(&[3, 1, 3], SortState::Unsorted, DuplicateState::HasDuplicates)];
        let index = Index::build(vec![0], &cols, &pool).unwrap();
        let config = EngineConfig {
            use_indexes: false,
            ..Default::default()
        };
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        };
        let plan = QueryPlanBuilder::new(3, &cols, &[index], &config)
            .build(&mut spec)
            .unwrap();
        assert!(names(&plan).contains(&"LinearFilterEq"));
    }

    #[test]
    fn test_specialized_storage_eq() {
        let values = [1u32, 4, 9];
        let col = Column::new(
            Storage::Uint32(values.to_vec().into()),
            NullStorage::NonNull,
            SortState::Sorted,
            DuplicateState::NoDuplicates,
        )
        .unwrap()
        .with_specialized_storage(SpecializedStorage::SmallValueEq(
            SmallValueEq::build(&values).unwrap(),
        ))
        .unwrap();
        let cols = [col];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Eq)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        assert!(names(&plan).contains(&"SpecializedStorageSmallValueEq"));
    }

    #[test]
    fn test_cost_accumulates() {
        let cols = [int64(&[1; 1024], SortState::Unsorted, DuplicateState::HasDuplicates)];
        let mut spec = QuerySpec {
            filters: vec![FilterSpec::new(0, Op::Lt)],
            ..Default::default()
        };
        let plan = plan(&cols, &[], &mut spec);
        // InitRange + Cast + AllocateIndices + Iota(1024) + NonStringFilter(5 * 1024)
        assert_eq!(plan.params.estimated_cost, 5.0 + 5.0 + 30.0 + 1024.0 + 5.0 * 1024.0);
        assert_eq!(plan.params.estimated_row_count, 512);
        assert_eq!(plan.params.max_row_count, 1024);
        assert_eq!(plan.params.register_count, 4);
    }
}
