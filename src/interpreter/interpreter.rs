//! Bytecode interpreter
//!
//! Runs a plan's instructions in order against borrowed columns, indexes
//! and string pool. All intermediate state lives in the register file,
//! which survives between executions so buffers are allocated once per
//! cursor.

use std::cmp::Ordering;

use super::cast;
use super::filters::{
    apply_bounds, collect_matching, compact_in_place, compact_into, compare_to_value,
    search_bounds, U32Membership,
};
use super::registers::RegisterFile;
use super::row_layout::{
    encode_f64_key, encode_i32_key, encode_i64_key, encode_u32_key, write_key, write_null,
    NON_NULL_BYTE,
};
use super::sorter::{distinct_row_layout, sort_row_layout};
use crate::bytecode::{
    Bytecode, CastFilterValueListResult, CastFilterValueResult, CastValue, CastValueList,
    ReadHandle, RwHandle, StringIdToRankMap, Validity,
};
use crate::column::{compare_f64, Column, Index, NullStorage, SpecializedStorage, Storage};
use crate::config::EngineConfig;
use crate::memory::{BitVector, Range, Slab, Span, SpanBacking};
use crate::observability::{log_event_with_fields, Event};
use crate::plan::QueryPlan;
use crate::query::ValueFetcher;
use crate::strings::{GlobMatcher, StringId, StringPool};
use crate::types::{
    BoundModifier, BoundSearch, MinMaxOp, NonNullOp, NonStringOp, NullOp, Nullability,
};

/// Storage slot stored in output rows for a null cell.
pub const NULL_STORAGE_INDEX: u32 = u32::MAX;

/// Tunables the interpreter reads from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    pub radix_sort_threshold: usize,
    pub in_list_bitvector_ratio: u32,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for InterpreterOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            radix_sort_threshold: config.radix_sort_threshold as usize,
            in_list_bitvector_ratio: config.in_list_bitvector_ratio,
        }
    }
}

pub struct Interpreter<'a> {
    bytecode: &'a [Bytecode],
    columns: &'a [Column],
    indexes: &'a [Index],
    pool: &'a StringPool,
    options: InterpreterOptions,
    registers: RegisterFile,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        plan: &'a QueryPlan,
        columns: &'a [Column],
        indexes: &'a [Index],
        pool: &'a StringPool,
        options: InterpreterOptions,
    ) -> Self {
        Self {
            bytecode: &plan.bytecode,
            columns,
            indexes,
            pool,
            options,
            registers: RegisterFile::new(plan.params.register_count),
        }
    }

    /// Runs every instruction once.
    pub fn execute(&mut self, fetcher: &mut dyn ValueFetcher) {
        let bytecode = self.bytecode;
        for bc in bytecode {
            self.dispatch(bc, fetcher);
        }
    }

    /// Entries of the span held in `register`.
    pub fn span(&self, register: u32) -> &[u32] {
        let span = *self.registers.get::<Span>(register);
        self.span_slice(span)
    }

    fn dispatch(&mut self, bc: &Bytecode, fetcher: &mut dyn ValueFetcher) {
        match *bc {
            Bytecode::InitRange {
                size,
                dest_register,
            } => self
                .registers
                .set(dest_register.index(), Range::new(0, size)),
            Bytecode::AllocateIndices {
                size,
                dest_slab_register,
                dest_span_register,
            } => self.allocate_indices(size, dest_slab_register, dest_span_register),
            Bytecode::Iota {
                source_register,
                update_register,
            } => self.iota(source_register, update_register),
            Bytecode::CastFilterValue {
                ty,
                fval_handle,
                write_register,
                op,
            } => {
                let result = cast::cast_filter_value(fetcher, fval_handle, ty, op);
                self.registers.set(write_register.index(), result);
            }
            Bytecode::CastFilterValueList {
                ty,
                fval_handle,
                write_register,
                op,
            } => {
                let result = cast::cast_filter_value_list(fetcher, fval_handle, ty, op, self.pool);
                self.registers.set(write_register.index(), result);
            }
            Bytecode::SortedFilter {
                ty: _,
                search,
                col,
                val_register,
                update_register,
                write_result_to,
            } => self.sorted_filter(search, col, val_register, update_register, write_result_to),
            Bytecode::Uint32SetIdSortedEq {
                col,
                val_register,
                update_register,
            } => self.uint32_set_id_sorted_eq(col, val_register, update_register),
            Bytecode::SpecializedStorageSmallValueEq {
                col,
                val_register,
                update_register,
            } => self.small_value_eq(col, val_register, update_register),
            Bytecode::LinearFilterEq {
                ty: _,
                col,
                filter_value_reg,
                source_register,
                update_register,
            } => self.linear_filter_eq(col, filter_value_reg, source_register, update_register),
            Bytecode::NonStringFilter {
                ty: _,
                op,
                col,
                val_register,
                source_register,
                update_register,
            } => self.non_string_filter(op, col, val_register, source_register, update_register),
            Bytecode::StringFilter {
                op,
                col,
                val_register,
                source_register,
                update_register,
            } => self.string_filter(op, col, val_register, source_register, update_register),
            Bytecode::In {
                ty: _,
                col,
                value_list_register,
                source_register,
                update_register,
            } => self.in_filter(col, value_list_register, source_register, update_register),
            Bytecode::NullFilter {
                op,
                col,
                update_register,
            } => self.null_filter(op, col, update_register),
            Bytecode::PrefixPopcount { col, dest_register } => {
                if self
                    .registers
                    .try_get::<Slab<u32>>(dest_register.index())
                    .is_none()
                {
                    let popcount = self.null_bits(col).prefix_popcount();
                    self.registers.set(dest_register.index(), popcount);
                }
            }
            Bytecode::TranslateSparseNullIndices {
                col,
                popcount_register,
                source_register,
                update_register,
            } => self.translate_sparse_null_indices(
                col,
                popcount_register,
                source_register,
                update_register,
            ),
            Bytecode::StrideCopy {
                source_register,
                update_register,
                stride,
            } => self.stride_copy(source_register, update_register, stride),
            Bytecode::StrideTranslateAndCopySparseNullIndices {
                col,
                popcount_register,
                update_register,
                offset,
                stride,
            } => {
                let popcount: Slab<u32> = self.registers.take(popcount_register.index());
                let bits = self.null_bits(col);
                self.stride_fill(update_register, offset, stride, |row| {
                    sparse_storage_index(bits, &popcount, row)
                });
                self.registers.set(popcount_register.index(), popcount);
            }
            Bytecode::StrideCopyDenseNullIndices {
                col,
                update_register,
                offset,
                stride,
            } => {
                let bits = self.null_bits(col);
                self.stride_fill(update_register, offset, stride, |row| {
                    bits.is_set(row as usize).then_some(row)
                });
            }
            Bytecode::AllocateRowLayoutBuffer {
                buffer_size,
                dest_buffer_register,
            } => {
                let reg = dest_buffer_register.index();
                let big_enough = self
                    .registers
                    .try_get::<Slab<u8>>(reg)
                    .is_some_and(|b| b.len() >= buffer_size as usize);
                if !big_enough {
                    self.registers.set(reg, Slab::<u8>::alloc(buffer_size as usize));
                }
            }
            Bytecode::CopyToRowLayout {
                ty: _,
                nullability,
                col,
                source_indices_register,
                dest_buffer_register,
                row_layout_offset,
                row_layout_stride,
                invert_copied_bits,
                popcount_register,
                rank_map_register,
            } => self.copy_to_row_layout(RowLayoutCopy {
                nullability,
                col,
                source: source_indices_register,
                buffer: dest_buffer_register,
                offset: row_layout_offset as usize,
                stride: row_layout_stride as usize,
                invert: invert_copied_bits,
                popcount: popcount_register,
                rank_map: rank_map_register,
            }),
            Bytecode::Distinct {
                buffer_register,
                total_row_stride,
                indices_register,
            } => self.with_row_layout(buffer_register, indices_register, |indices, buffer| {
                distinct_row_layout(indices, buffer, total_row_stride as usize)
            }),
            Bytecode::SortRowLayout {
                buffer_register,
                total_row_stride,
                indices_register,
            } => {
                let threshold = self.options.radix_sort_threshold;
                self.with_row_layout(buffer_register, indices_register, |indices, buffer| {
                    sort_row_layout(indices, buffer, total_row_stride as usize, threshold);
                    indices.len()
                })
            }
            Bytecode::LimitOffsetIndices {
                offset_value,
                limit_value,
                update_register,
            } => {
                let span = self.registers.get_mut::<Span>(update_register.index());
                span.b += offset_value.min(span.size());
                span.e = span.b + limit_value.min(span.size());
            }
            Bytecode::FindMinMaxIndex {
                ty: _,
                op,
                col,
                update_register,
            } => self.find_min_max(op, col, update_register),
            Bytecode::IndexPermutationVectorToSpan {
                index,
                write_register,
            } => {
                let len = self.indexes[index as usize].len() as u32;
                self.registers.set(
                    write_register.index(),
                    Span::new(SpanBacking::Index(index), 0, len),
                );
            }
            Bytecode::IndexedFilterEq {
                ty: _,
                nullability,
                col,
                filter_value_reg,
                popcount_register,
                update_register,
            } => self.indexed_filter_eq(
                nullability,
                col,
                filter_value_reg,
                popcount_register,
                update_register,
            ),
            Bytecode::CopySpanIntersectingRange {
                source_register,
                source_range_register,
                update_register,
            } => {
                let range = *self.registers.get::<Range>(source_range_register.index());
                self.map_into(source_register, update_register, |source, update| {
                    let n = compact_into_rows(source, update, |row| range.contains(row));
                    update[..n].sort_unstable();
                    n
                });
            }
            Bytecode::InitRankMap { dest_register } => {
                let reg = dest_register.index();
                match self.registers.try_get_mut::<StringIdToRankMap>(reg) {
                    Some(map) => map.clear(),
                    None => self.registers.set(reg, StringIdToRankMap::new()),
                }
            }
            Bytecode::CollectIdIntoRankMap {
                col,
                source_register,
                rank_map_register,
            } => {
                let data = string_data(self.column(col));
                let mut map: StringIdToRankMap = self.registers.take(rank_map_register.index());
                let source = *self.registers.get::<Span>(source_register.index());
                for &slot in self.span_slice(source) {
                    map.insert(data[slot as usize], 0);
                }
                self.registers.set(rank_map_register.index(), map);
            }
            Bytecode::FinalizeRanksInMap { update_register } => {
                let pool = self.pool;
                let map = self
                    .registers
                    .get_mut::<StringIdToRankMap>(update_register.index());
                let mut ids: Vec<StringId> = map.keys().copied().collect();
                ids.sort_by(|a, b| pool.get(*a).cmp(pool.get(*b)));
                for (rank, id) in ids.into_iter().enumerate() {
                    map.insert(id, rank as u32);
                }
            }
            Bytecode::Reverse { update_register } => {
                let span = *self.registers.get::<Span>(update_register.index());
                self.slab_mut(span)[span.as_range()].reverse();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Index buffers
    // ---------------------------------------------------------------------

    fn allocate_indices(
        &mut self,
        size: u32,
        slab_register: RwHandle<Slab<u32>>,
        span_register: RwHandle<Span>,
    ) {
        let reg = slab_register.index();
        let big_enough = self
            .registers
            .try_get::<Slab<u32>>(reg)
            .is_some_and(|s| s.len() >= size as usize);
        if !big_enough {
            self.registers.set(reg, Slab::<u32>::alloc(size as usize));
        }
        self.registers.set(
            span_register.index(),
            Span::new(SpanBacking::Slab(reg), 0, size),
        );
    }

    fn iota(&mut self, source: ReadHandle<Range>, update: RwHandle<Span>) {
        let range = *self.registers.get::<Range>(source.index());
        let mut span = *self.registers.get::<Span>(update.index());
        let out = &mut self.slab_mut(span)[span.b as usize..];
        let mut written = 0;
        for (slot, row) in out.iter_mut().zip(range.b..range.e) {
            *slot = row;
            written += 1;
        }
        // The slab was sized from the plan's row bound.
        debug_assert_eq!(written, range.size(), "iota overflows its index buffer");
        span.e = span.b + written;
        self.registers.set(update.index(), span);
    }

    fn stride_copy(&mut self, source: ReadHandle<Span>, update: RwHandle<Span>, stride: u32) {
        let n = self.map_into(source, update, |source, update| {
            for (i, &v) in source.iter().enumerate() {
                update[i * stride as usize] = v;
            }
            source.len()
        });
        // `map_into` sized the span for one slot per entry.
        let span = self.registers.get_mut::<Span>(update.index());
        span.e = span.b + n as u32 * stride;
    }

    /// Fills slot `offset` of every `stride`-wide output row with the
    /// storage index of the row id in slot 0.
    fn stride_fill(
        &mut self,
        update: RwHandle<Span>,
        offset: u32,
        stride: u32,
        storage_index: impl Fn(u32) -> Option<u32>,
    ) {
        let span = *self.registers.get::<Span>(update.index());
        let buf = &mut self.slab_mut(span)[span.as_range()];
        for chunk in buf.chunks_exact_mut(stride as usize) {
            chunk[offset as usize] = storage_index(chunk[0]).unwrap_or(NULL_STORAGE_INDEX);
        }
    }

    fn translate_sparse_null_indices(
        &mut self,
        col: u32,
        popcount_register: ReadHandle<Slab<u32>>,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let popcount: Slab<u32> = self.registers.take(popcount_register.index());
        let bits = self.null_bits(col);
        let rank = |row: u32| {
            popcount[row as usize / 64] + bits.count_set_bits_until_in_word(row as usize)
        };
        let src = *self.registers.get::<Span>(source.index());
        let upd = *self.registers.get::<Span>(update.index());
        if aliased(src, upd) {
            for slot in &mut self.slab_mut(upd)[upd.as_range()] {
                *slot = rank(*slot);
            }
        } else {
            self.map_into(source, update, |source, update| {
                for (out, &row) in update.iter_mut().zip(source) {
                    *out = rank(row);
                }
                source.len()
            });
        }
        self.registers.set(popcount_register.index(), popcount);
    }

    // ---------------------------------------------------------------------
    // Range filters
    // ---------------------------------------------------------------------

    fn sorted_filter(
        &mut self,
        search: BoundSearch,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        update: RwHandle<Range>,
        modifier: BoundModifier,
    ) {
        let Some(value) = self.range_filter_value(val, update) else {
            return;
        };
        let storage = self.column(col).storage();
        let pool = self.pool;
        let range = self.registers.get_mut::<Range>(update.index());
        let bounds = search_bounds(*range, search, |pos| {
            compare_to_value(storage, pos, &value, pool)
        });
        apply_bounds(range, modifier, bounds);
    }

    fn uint32_set_id_sorted_eq(
        &mut self,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        update: RwHandle<Range>,
    ) {
        let Some(value) = self.range_filter_value(val, update) else {
            return;
        };
        let CastValue::Uint32(v) = value else {
            panic!("set id sorted filter with {:?}", value);
        };
        let data = match self.column(col).storage() {
            Storage::Uint32(d) => d.as_slice(),
            other => panic!("set id sorted filter on {:?} column", other.storage_type()),
        };
        let range = self.registers.get_mut::<Range>(update.index());
        let start = v.clamp(range.b, range.e);
        let mut end = start;
        while end < range.e && data[end as usize] == v {
            end += 1;
        }
        *range = Range::new(start, end);
    }

    fn small_value_eq(
        &mut self,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        update: RwHandle<Range>,
    ) {
        let Some(value) = self.range_filter_value(val, update) else {
            return;
        };
        let CastValue::Uint32(v) = value else {
            panic!("small value filter with {:?}", value);
        };
        let SpecializedStorage::SmallValueEq(storage) = self.column(col).specialized_storage()
        else {
            panic!("column {} has no small value storage", col);
        };
        let range = self.registers.get_mut::<Range>(update.index());
        *range = storage.equal_range(v, *range);
    }

    // ---------------------------------------------------------------------
    // Span filters
    // ---------------------------------------------------------------------

    fn linear_filter_eq(
        &mut self,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        source: ReadHandle<Range>,
        update: RwHandle<Span>,
    ) {
        let storage = self.column(col).storage();
        let pool = self.pool;
        let range = *self.registers.get::<Range>(source.index());
        let value = self.registers.get::<CastFilterValueResult>(val.index()).clone();
        let mut span = *self.registers.get::<Span>(update.index());
        let out = &mut self.slab_mut(span)[span.b as usize..];
        let rows = range.b as usize..range.e as usize;

        let written = match value {
            CastFilterValueResult::NoneMatch => 0,
            CastFilterValueResult::AllMatch => {
                for (slot, row) in out.iter_mut().zip(range.b..range.e) {
                    *slot = row;
                }
                range.size() as usize
            }
            CastFilterValueResult::Valid(value) => match (storage, value) {
                (Storage::Uint32(d), CastValue::Uint32(v)) => {
                    collect_matching(&d[rows], range.b, out, |x| *x == v)
                }
                (Storage::Int32(d), CastValue::Int32(v)) => {
                    collect_matching(&d[rows], range.b, out, |x| *x == v)
                }
                (Storage::Int64(d), CastValue::Int64(v)) => {
                    collect_matching(&d[rows], range.b, out, |x| *x == v)
                }
                (Storage::Double(d), CastValue::Double(v)) => {
                    collect_matching(&d[rows], range.b, out, |x| *x == v)
                }
                (Storage::String(d), CastValue::String(s)) => match pool.get_id(&s) {
                    Some(id) => collect_matching(&d[rows], range.b, out, |x| *x == id),
                    None => 0,
                },
                (storage, value) => panic!(
                    "linear filter of {:?} column with {:?}",
                    storage.storage_type(),
                    value
                ),
            },
        };
        span.e = span.b + written as u32;
        self.registers.set(update.index(), span);
    }

    fn non_string_filter(
        &mut self,
        op: NonStringOp,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let Some(value) = self.span_filter_value(val, update) else {
            return;
        };
        match (self.column(col).storage(), value) {
            (Storage::Id { .. }, CastValue::Id(v)) => {
                self.compact(source, update, |i| op.compare(i, v))
            }
            (Storage::Uint32(d), CastValue::Uint32(v)) => {
                self.compact(source, update, |i| op.compare(d[i as usize], v))
            }
            (Storage::Int32(d), CastValue::Int32(v)) => {
                self.compact(source, update, |i| op.compare(d[i as usize], v))
            }
            (Storage::Int64(d), CastValue::Int64(v)) => {
                self.compact(source, update, |i| op.compare(d[i as usize], v))
            }
            (Storage::Double(d), CastValue::Double(v)) => {
                self.compact(source, update, |i| op.compare(d[i as usize], v))
            }
            (storage, value) => panic!(
                "numeric filter of {:?} column with {:?}",
                storage.storage_type(),
                value
            ),
        }
    }

    fn string_filter(
        &mut self,
        op: NonNullOp,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let Some(value) = self.span_filter_value(val, update) else {
            return;
        };
        let CastValue::String(needle) = value else {
            panic!("string filter with {:?}", value);
        };
        let data = string_data(self.column(col));
        let pool = self.pool;

        let ordering: fn(Ordering) -> bool = match op {
            NonNullOp::Eq => return self.string_eq(&needle, data, source, update),
            NonNullOp::Ne => {
                if let Some(id) = pool.get_id(&needle) {
                    self.compact(source, update, |i| data[i as usize] != id);
                }
                return;
            }
            NonNullOp::Glob => return self.string_glob(&needle, data, source, update),
            NonNullOp::Regex => return self.string_regex(&needle, data, source, update),
            NonNullOp::Lt => Ordering::is_lt,
            NonNullOp::Le => Ordering::is_le,
            NonNullOp::Gt => Ordering::is_gt,
            NonNullOp::Ge => Ordering::is_ge,
        };
        self.compact(source, update, |i| {
            ordering(pool.get(data[i as usize]).cmp(needle.as_str()))
        });
    }

    fn string_eq(
        &mut self,
        needle: &str,
        data: &[StringId],
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        match self.pool.get_id(needle) {
            Some(id) => self.compact(source, update, |i| data[i as usize] == id),
            None => self.clear_span(update),
        }
    }

    fn string_glob(
        &mut self,
        pattern: &str,
        data: &[StringId],
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let matcher = match GlobMatcher::from_pattern(pattern) {
            Ok(m) => m,
            Err(e) => {
                log_event_with_fields(
                    Event::RegexCompileFailed,
                    &[("pattern", pattern), ("error", &e.to_string())],
                );
                return self.clear_span(update);
            }
        };
        if matcher.is_equality() {
            return self.string_eq(matcher.pattern(), data, source, update);
        }

        let pool = self.pool;
        let rows = self.registers.get::<Span>(update.index()).size() as usize;
        if rows >= pool.len() {
            // Matching every pool entry once is cheaper than matching rows.
            let matches = BitVector::from_bools(pool.iter().map(|(_, s)| matcher.matches(s)));
            self.compact(source, update, |i| {
                matches.is_set(data[i as usize].raw() as usize)
            });
        } else {
            self.compact(source, update, |i| matcher.matches(pool.get(data[i as usize])));
        }
    }

    fn string_regex(
        &mut self,
        pattern: &str,
        data: &[StringId],
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let re = match regex::Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                log_event_with_fields(
                    Event::RegexCompileFailed,
                    &[("pattern", pattern), ("error", &e.to_string())],
                );
                return self.clear_span(update);
            }
        };
        let pool = self.pool;
        self.compact(source, update, |i| re.is_match(pool.get(data[i as usize])));
    }

    fn in_filter(
        &mut self,
        col: u32,
        list_register: ReadHandle<CastFilterValueListResult>,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let list: CastFilterValueListResult = self.registers.take(list_register.index());
        match &list {
            CastFilterValueListResult::AllMatch => {}
            CastFilterValueListResult::NoneMatch => self.clear_span(update),
            CastFilterValueListResult::Valid(values) => self.in_list(col, values, source, update),
        }
        self.registers.set(list_register.index(), list);
    }

    fn in_list(
        &mut self,
        col: u32,
        values: &CastValueList,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
    ) {
        let ratio = self.options.in_list_bitvector_ratio;
        match (self.column(col).storage(), values) {
            (Storage::Id { .. }, CastValueList::Id(list)) => {
                let members = U32Membership::new(list, ratio);
                self.compact(source, update, |i| members.contains(i));
            }
            (Storage::Uint32(d), CastValueList::Uint32(list)) => {
                let members = U32Membership::new(list, ratio);
                self.compact(source, update, |i| members.contains(d[i as usize]));
            }
            (Storage::Int32(d), CastValueList::Int32(list)) => {
                self.compact(source, update, |i| list.contains(&d[i as usize]))
            }
            (Storage::Int64(d), CastValueList::Int64(list)) => {
                self.compact(source, update, |i| list.contains(&d[i as usize]))
            }
            (Storage::Double(d), CastValueList::Double(list)) => {
                self.compact(source, update, |i| list.contains(&d[i as usize]))
            }
            (Storage::String(d), CastValueList::String(list)) => {
                self.compact(source, update, |i| list.contains(&d[i as usize]))
            }
            (storage, list) => panic!(
                "in filter of {:?} column with {:?}",
                storage.storage_type(),
                list
            ),
        }
    }

    fn null_filter(&mut self, op: NullOp, col: u32, update: RwHandle<Span>) {
        let Some(bits) = self.column(col).null_storage().bit_vector() else {
            if op == NullOp::IsNull {
                self.clear_span(update);
            }
            return;
        };
        let mut span = *self.registers.get::<Span>(update.index());
        let kept = bits.pack_left(&mut self.slab_mut(span)[span.as_range()], op == NullOp::IsNull);
        span.e = span.b + kept as u32;
        self.registers.set(update.index(), span);
    }

    fn indexed_filter_eq(
        &mut self,
        nullability: Nullability,
        col: u32,
        val: ReadHandle<CastFilterValueResult>,
        popcount: Option<ReadHandle<Slab<u32>>>,
        update: RwHandle<Span>,
    ) {
        let Some(value) = self.span_filter_value(val, update) else {
            return;
        };
        let column = self.column(col);
        let pool = self.pool;
        let span = *self.registers.get::<Span>(update.index());
        let rows = self.span_slice(span);
        let popcount = popcount.map(|p| self.registers.get::<Slab<u32>>(p.index()).as_slice());

        let slot = |row: u32| match (nullability, column.null_storage(), popcount) {
            (Nullability::SparseNull, NullStorage::SparseNull { bit_vector }, Some(pc)) => {
                sparse_storage_index(bit_vector, pc, row)
            }
            _ => column.storage_index(row),
        };
        let all = Range::new(0, rows.len() as u32);
        let (lo, hi) = search_bounds(all, BoundSearch::EqualRange, |pos| {
            match slot(rows[pos as usize]) {
                None => Ordering::Less,
                Some(s) => compare_to_value(column.storage(), s, &value, pool),
            }
        });
        let narrowed = Span::new(span.backing, span.b + lo, span.b + hi);
        self.registers.set(update.index(), narrowed);
    }

    // ---------------------------------------------------------------------
    // Sort, distinct, min/max
    // ---------------------------------------------------------------------

    fn copy_to_row_layout(&mut self, copy: RowLayoutCopy) {
        let column = self.column(copy.col);
        let pool = self.pool;
        let mut buffer: Slab<u8> = self.registers.take(copy.buffer.index());
        let source = *self.registers.get::<Span>(copy.source.index());
        let rows = self.span_slice(source);
        let popcount = copy
            .popcount
            .map(|p| self.registers.get::<Slab<u32>>(p.index()).as_slice());
        let rank_map = copy
            .rank_map
            .map(|r| self.registers.get::<StringIdToRankMap>(r.index()));
        let nullable = copy.nullability != Nullability::NonNull;
        let width = usize::from(nullable) + column.storage_type().row_layout_size() as usize;

        for (i, &row) in rows.iter().enumerate() {
            let start = i * copy.stride + copy.offset;
            let dest = &mut buffer[start..start + width];
            let slot = match (column.null_storage(), popcount) {
                (NullStorage::NonNull, _) => Some(row),
                (NullStorage::SparseNull { bit_vector }, Some(pc)) => {
                    sparse_storage_index(bit_vector, pc, row)
                }
                _ => column.storage_index(row),
            };
            let Some(slot) = slot else {
                write_null(dest, copy.invert);
                continue;
            };
            let value_dest = if nullable {
                dest[0] = if copy.invert { !NON_NULL_BYTE } else { NON_NULL_BYTE };
                &mut dest[1..]
            } else {
                dest
            };
            let s = slot as usize;
            match column.storage() {
                Storage::Id { .. } => write_key(value_dest, &encode_u32_key(slot), copy.invert),
                Storage::Uint32(d) => write_key(value_dest, &encode_u32_key(d[s]), copy.invert),
                Storage::Int32(d) => write_key(value_dest, &encode_i32_key(d[s]), copy.invert),
                Storage::Int64(d) => write_key(value_dest, &encode_i64_key(d[s]), copy.invert),
                Storage::Double(d) => write_key(value_dest, &encode_f64_key(d[s]), copy.invert),
                Storage::String(d) => {
                    let id = d[s];
                    let key = match rank_map {
                        Some(map) => match map.get(&id) {
                            Some(rank) => *rank,
                            None => panic!("string {:?} missing from rank map", pool.get(id)),
                        },
                        None => id.raw(),
                    };
                    write_key(value_dest, &encode_u32_key(key), copy.invert);
                }
            }
        }
        self.registers.set(copy.buffer.index(), buffer);
    }

    /// Runs `f` over the index span and its row layout buffer, then shrinks
    /// the span to the returned length.
    fn with_row_layout(
        &mut self,
        buffer: ReadHandle<Slab<u8>>,
        indices: RwHandle<Span>,
        f: impl FnOnce(&mut [u32], &[u8]) -> usize,
    ) {
        let bytes: Slab<u8> = self.registers.take(buffer.index());
        let mut span = *self.registers.get::<Span>(indices.index());
        let kept = f(&mut self.slab_mut(span)[span.as_range()], &bytes);
        span.e = span.b + kept as u32;
        self.registers.set(indices.index(), span);
        self.registers.set(buffer.index(), bytes);
    }

    fn find_min_max(&mut self, op: MinMaxOp, col: u32, update: RwHandle<Span>) {
        let storage = self.column(col).storage();
        let pool = self.pool;
        let mut span = *self.registers.get::<Span>(update.index());
        let rows = &mut self.slab_mut(span)[span.as_range()];
        if rows.is_empty() {
            return;
        }
        let better = |candidate: Ordering| match op {
            MinMaxOp::Min => candidate.is_lt(),
            MinMaxOp::Max => candidate.is_gt(),
        };
        let best = match storage {
            Storage::Id { .. } => position_of_extreme(rows, |a, b| better(a.cmp(&b))),
            Storage::Uint32(d) => {
                position_of_extreme(rows, |a, b| better(d[a as usize].cmp(&d[b as usize])))
            }
            Storage::Int32(d) => {
                position_of_extreme(rows, |a, b| better(d[a as usize].cmp(&d[b as usize])))
            }
            Storage::Int64(d) => {
                position_of_extreme(rows, |a, b| better(d[a as usize].cmp(&d[b as usize])))
            }
            Storage::Double(d) => position_of_extreme(rows, |a, b| {
                better(compare_f64(d[a as usize], d[b as usize]))
            }),
            Storage::String(d) => position_of_extreme(rows, |a, b| {
                better(pool.get(d[a as usize]).cmp(pool.get(d[b as usize])))
            }),
        };
        rows[0] = rows[best];
        span.e = span.b + 1;
        self.registers.set(update.index(), span);
    }

    // ---------------------------------------------------------------------
    // Register helpers
    // ---------------------------------------------------------------------

    fn column(&self, col: u32) -> &'a Column {
        let columns: &'a [Column] = self.columns;
        &columns[col as usize]
    }

    fn null_bits(&self, col: u32) -> &'a BitVector {
        match self.column(col).null_storage().bit_vector() {
            Some(bits) => bits,
            None => panic!("column {} has no null bit vector", col),
        }
    }

    fn span_slice(&self, span: Span) -> &[u32] {
        match span.backing {
            SpanBacking::Slab(reg) => &self.registers.get::<Slab<u32>>(reg)[span.as_range()],
            SpanBacking::Index(idx) => {
                &self.indexes[idx as usize].permutation_vector()[span.as_range()]
            }
        }
    }

    fn slab_mut(&mut self, span: Span) -> &mut [u32] {
        self.registers
            .get_mut::<Slab<u32>>(span.slab_register())
            .as_mut_slice()
    }

    fn clear_span(&mut self, update: RwHandle<Span>) {
        let span = self.registers.get_mut::<Span>(update.index());
        span.e = span.b;
    }

    /// Valid cast value for a span filter. Settled outcomes are applied to
    /// `update` and yield `None`.
    fn span_filter_value(
        &mut self,
        val: ReadHandle<CastFilterValueResult>,
        update: RwHandle<Span>,
    ) -> Option<CastValue> {
        let validity = match self.registers.get::<CastFilterValueResult>(val.index()) {
            CastFilterValueResult::Valid(v) => return Some(v.clone()),
            other => other.validity(),
        };
        if validity == Validity::NoneMatch {
            self.clear_span(update);
        }
        None
    }

    fn range_filter_value(
        &mut self,
        val: ReadHandle<CastFilterValueResult>,
        update: RwHandle<Range>,
    ) -> Option<CastValue> {
        let validity = match self.registers.get::<CastFilterValueResult>(val.index()) {
            CastFilterValueResult::Valid(v) => return Some(v.clone()),
            other => other.validity(),
        };
        if validity == Validity::NoneMatch {
            let range = self.registers.get_mut::<Range>(update.index());
            range.e = range.b;
        }
        None
    }

    /// Keeps the `update` entries whose parallel `source` entry passes
    /// `keep`.
    fn compact(
        &mut self,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
        keep: impl FnMut(u32) -> bool,
    ) {
        let src = *self.registers.get::<Span>(source.index());
        let upd = *self.registers.get::<Span>(update.index());
        if aliased(src, upd) {
            let kept = compact_in_place(&mut self.slab_mut(upd)[upd.as_range()], keep);
            let span = self.registers.get_mut::<Span>(update.index());
            span.e = span.b + kept as u32;
        } else {
            self.map_into(source, update, |source, update| {
                compact_into(source, &mut update[..source.len()], keep)
            });
        }
    }

    /// Runs `f` with the source entries and the update slab from the span's
    /// start, then sets the update span's length to the returned count.
    fn map_into(
        &mut self,
        source: ReadHandle<Span>,
        update: RwHandle<Span>,
        f: impl FnOnce(&[u32], &mut [u32]) -> usize,
    ) -> usize {
        let src = *self.registers.get::<Span>(source.index());
        let mut upd = *self.registers.get::<Span>(update.index());
        let reg = upd.slab_register();
        let mut slab: Slab<u32> = self.registers.take(reg);
        let written = if src.backing == upd.backing {
            let copied = slab[src.as_range()].to_vec();
            f(&copied, &mut slab[upd.b as usize..])
        } else {
            f(self.span_slice(src), &mut slab[upd.b as usize..])
        };
        self.registers.set(reg, slab);
        upd.e = upd.b + written as u32;
        self.registers.set(update.index(), upd);
        written
    }
}

/// Arguments of one `CopyToRowLayout` instruction.
struct RowLayoutCopy {
    nullability: Nullability,
    col: u32,
    source: ReadHandle<Span>,
    buffer: RwHandle<Slab<u8>>,
    offset: usize,
    stride: usize,
    invert: bool,
    popcount: Option<ReadHandle<Slab<u32>>>,
    rank_map: Option<ReadHandle<StringIdToRankMap>>,
}

fn aliased(source: Span, update: Span) -> bool {
    source.backing == update.backing && source.b == update.b
}

fn string_data(column: &Column) -> &[StringId] {
    match column.storage() {
        Storage::String(d) => d.as_slice(),
        other => panic!("string operation on {:?} column", other.storage_type()),
    }
}

fn sparse_storage_index(bits: &BitVector, popcount: &[u32], row: u32) -> Option<u32> {
    let r = row as usize;
    bits.is_set(r)
        .then(|| popcount[r / 64] + bits.count_set_bits_until_in_word(r))
}

/// Writes `update[i]` for each `source[i]` accepted by `keep`, where both
/// hold row ids.
fn compact_into_rows(source: &[u32], update: &mut [u32], keep: impl Fn(u32) -> bool) -> usize {
    let mut write = 0;
    for &row in source {
        if keep(row) {
            update[write] = row;
            write += 1;
        }
    }
    write
}

/// Position of the first entry no other entry beats.
fn position_of_extreme(rows: &[u32], better: impl Fn(u32, u32) -> bool) -> usize {
    let mut best = 0;
    for (i, &row) in rows.iter().enumerate().skip(1) {
        if better(row, rows[best]) {
            best = i;
        }
    }
    best
}
