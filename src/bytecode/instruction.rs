//! The instruction set
//!
//! One variant per instruction family. Type and operator choices that the
//! interpreter specializes on are carried as typed fields rather than being
//! folded into the opcode.

use super::cost::Cost;
use super::registers::{
    CastFilterValueListResult, CastFilterValueResult, ReadHandle, RwHandle, StringIdToRankMap,
};
use super::wire::{ArgReader, ArgWriter, WireField, ARGS_SIZE};
use crate::memory::{Range, Slab, Span};
use crate::plan::PlanFormatError;
use crate::types::{
    BoundModifier, BoundSearch, MinMaxOp, NonIdStorageType, NonNullOp, NonStringOp,
    NonStringType, NullOp, Nullability, StorageType,
};

type CastReg = ReadHandle<CastFilterValueResult>;
type SpanRw = RwHandle<Span>;
type SpanRead = ReadHandle<Span>;
type PopcountReg = ReadHandle<Slab<u32>>;

macro_rules! bytecodes {
    (
        $(
            $(#[$meta:meta])*
            $tag:literal => $name:ident { $($field:ident : $fty:ty),* $(,)? }
        )*
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Bytecode {
            $(
                $(#[$meta])*
                $name { $($field: $fty),* },
            )*
        }

        impl Bytecode {
            /// Wire opcode of the instruction family.
            pub fn opcode(&self) -> u32 {
                match self {
                    $(Bytecode::$name { .. } => $tag,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Bytecode::$name { .. } => stringify!($name),)*
                }
            }

            pub fn encode_args(&self) -> [u8; ARGS_SIZE] {
                let mut w = ArgWriter::new();
                match self {
                    $(
                        Bytecode::$name { $($field),* } => {
                            $( $field.write(&mut w); )*
                        }
                    )*
                }
                w.finish()
            }

            pub fn decode(opcode: u32, args: &[u8; ARGS_SIZE]) -> Result<Self, PlanFormatError> {
                let mut r = ArgReader::new(args);
                let bytecode = match opcode {
                    $(
                        $tag => Bytecode::$name {
                            $($field: <$fty as WireField>::read(&mut r)?),*
                        },
                    )*
                    other => return Err(PlanFormatError::UnknownOpcode(other)),
                };
                r.expect_padding()?;
                Ok(bytecode)
            }
        }
    };
}

bytecodes! {
    /// Writes the full row range `[0, size)`.
    0 => InitRange { size: u32, dest_register: RwHandle<Range> }
    /// Points a span at a slab of at least `size` indices, allocating the
    /// slab on first use.
    1 => AllocateIndices {
        size: u32,
        dest_slab_register: RwHandle<Slab<u32>>,
        dest_span_register: SpanRw,
    }
    /// Fills a span with the consecutive ids of a range.
    2 => Iota { source_register: ReadHandle<Range>, update_register: SpanRw }
    3 => CastFilterValue {
        ty: StorageType,
        fval_handle: u32,
        write_register: RwHandle<CastFilterValueResult>,
        op: NonNullOp,
    }
    4 => CastFilterValueList {
        ty: StorageType,
        fval_handle: u32,
        write_register: RwHandle<CastFilterValueListResult>,
        op: NonNullOp,
    }
    /// Narrows a range by binary search on a sorted column.
    5 => SortedFilter {
        ty: StorageType,
        search: BoundSearch,
        col: u32,
        val_register: CastReg,
        update_register: RwHandle<Range>,
        write_result_to: BoundModifier,
    }
    6 => Uint32SetIdSortedEq {
        col: u32,
        val_register: CastReg,
        update_register: RwHandle<Range>,
    }
    7 => SpecializedStorageSmallValueEq {
        col: u32,
        val_register: CastReg,
        update_register: RwHandle<Range>,
    }
    /// Equality scan over a range of a non-null column, writing matching
    /// row ids into a span.
    8 => LinearFilterEq {
        ty: NonIdStorageType,
        col: u32,
        filter_value_reg: CastReg,
        source_register: ReadHandle<Range>,
        update_register: SpanRw,
    }
    /// Keeps the entries of `update_register` whose value (looked up through
    /// the parallel `source_register`) satisfies the operator.
    9 => NonStringFilter {
        ty: NonStringType,
        op: NonStringOp,
        col: u32,
        val_register: CastReg,
        source_register: SpanRead,
        update_register: SpanRw,
    }
    10 => StringFilter {
        op: NonNullOp,
        col: u32,
        val_register: CastReg,
        source_register: SpanRead,
        update_register: SpanRw,
    }
    11 => In {
        ty: StorageType,
        col: u32,
        value_list_register: ReadHandle<CastFilterValueListResult>,
        source_register: SpanRead,
        update_register: SpanRw,
    }
    12 => NullFilter { op: NullOp, col: u32, update_register: SpanRw }
    13 => PrefixPopcount { col: u32, dest_register: RwHandle<Slab<u32>> }
    /// Maps row ids of non-null rows to sparse storage slots.
    14 => TranslateSparseNullIndices {
        col: u32,
        popcount_register: PopcountReg,
        source_register: SpanRead,
        update_register: SpanRw,
    }
    15 => StrideCopy { source_register: SpanRead, update_register: SpanRw, stride: u32 }
    16 => StrideTranslateAndCopySparseNullIndices {
        col: u32,
        popcount_register: PopcountReg,
        update_register: SpanRw,
        offset: u32,
        stride: u32,
    }
    17 => StrideCopyDenseNullIndices {
        col: u32,
        update_register: SpanRw,
        offset: u32,
        stride: u32,
    }
    18 => AllocateRowLayoutBuffer { buffer_size: u32, dest_buffer_register: RwHandle<Slab<u8>> }
    /// Writes one column's comparable key bytes into a row layout buffer.
    19 => CopyToRowLayout {
        ty: StorageType,
        nullability: Nullability,
        col: u32,
        source_indices_register: SpanRead,
        dest_buffer_register: RwHandle<Slab<u8>>,
        row_layout_offset: u16,
        row_layout_stride: u16,
        invert_copied_bits: bool,
        popcount_register: Option<PopcountReg>,
        rank_map_register: Option<ReadHandle<StringIdToRankMap>>,
    }
    20 => Distinct {
        buffer_register: ReadHandle<Slab<u8>>,
        total_row_stride: u16,
        indices_register: SpanRw,
    }
    21 => SortRowLayout {
        buffer_register: ReadHandle<Slab<u8>>,
        total_row_stride: u16,
        indices_register: SpanRw,
    }
    22 => LimitOffsetIndices { offset_value: u32, limit_value: u32, update_register: SpanRw }
    23 => FindMinMaxIndex { ty: StorageType, op: MinMaxOp, col: u32, update_register: SpanRw }
    24 => IndexPermutationVectorToSpan { index: u32, write_register: SpanRw }
    /// Narrows an index permutation span to the rows equal to a value.
    25 => IndexedFilterEq {
        ty: NonIdStorageType,
        nullability: Nullability,
        col: u32,
        filter_value_reg: CastReg,
        popcount_register: Option<PopcountReg>,
        update_register: SpanRw,
    }
    /// Copies the permutation entries inside a range, in ascending row order.
    26 => CopySpanIntersectingRange {
        source_register: SpanRead,
        source_range_register: ReadHandle<Range>,
        update_register: SpanRw,
    }
    27 => InitRankMap { dest_register: RwHandle<StringIdToRankMap> }
    28 => CollectIdIntoRankMap {
        col: u32,
        source_register: SpanRead,
        rank_map_register: RwHandle<StringIdToRankMap>,
    }
    29 => FinalizeRanksInMap { update_register: RwHandle<StringIdToRankMap> }
    30 => Reverse { update_register: SpanRw }
}

impl Bytecode {
    /// Cost model charged by the planner when the instruction is emitted.
    pub fn cost(&self) -> Cost {
        match self {
            Bytecode::InitRange { .. } => Cost::Fixed(5.0),
            Bytecode::AllocateIndices { .. } => Cost::Fixed(30.0),
            Bytecode::Iota { .. } => Cost::LinearPerRow(1.0),
            Bytecode::CastFilterValue { .. } => Cost::Fixed(5.0),
            Bytecode::CastFilterValueList { .. } => Cost::Fixed(20.0),
            Bytecode::SortedFilter { ty, .. } => match ty {
                StorageType::Id => Cost::Fixed(2.0),
                _ => Cost::LogPerRow(10.0),
            },
            Bytecode::Uint32SetIdSortedEq { .. } => Cost::Fixed(10.0),
            Bytecode::SpecializedStorageSmallValueEq { .. } => Cost::Fixed(10.0),
            Bytecode::LinearFilterEq { .. } => Cost::LinearPerRow(7.0),
            Bytecode::NonStringFilter { .. } => Cost::LinearPerRow(5.0),
            Bytecode::StringFilter { .. } => Cost::LinearPerRow(15.0),
            Bytecode::In { .. } => Cost::LinearPerRow(10.0),
            Bytecode::NullFilter { .. } => Cost::LinearPerRow(3.0),
            Bytecode::PrefixPopcount { .. } => Cost::Fixed(20.0),
            Bytecode::TranslateSparseNullIndices { .. } => Cost::LinearPerRow(5.0),
            Bytecode::StrideCopy { .. } => Cost::LinearPerRow(2.0),
            Bytecode::StrideTranslateAndCopySparseNullIndices { .. } => {
                Cost::LinearPerRow(5.0)
            }
            Bytecode::StrideCopyDenseNullIndices { .. } => Cost::LinearPerRow(2.0),
            Bytecode::AllocateRowLayoutBuffer { .. } => Cost::Fixed(10.0),
            Bytecode::CopyToRowLayout { .. } => Cost::LinearPerRow(5.0),
            Bytecode::Distinct { .. } => Cost::LinearPerRow(10.0),
            Bytecode::SortRowLayout { .. } => Cost::LogLinearPerRow(10.0),
            Bytecode::LimitOffsetIndices { .. } => Cost::Fixed(2.0),
            Bytecode::FindMinMaxIndex { .. } => Cost::LinearPerRow(2.0),
            Bytecode::IndexPermutationVectorToSpan { .. } => Cost::Fixed(5.0),
            Bytecode::IndexedFilterEq { .. } => Cost::LogPerRow(10.0),
            Bytecode::CopySpanIntersectingRange { .. } => Cost::PostOperationLinearPerRow(5.0),
            Bytecode::InitRankMap { .. } => Cost::Fixed(10.0),
            Bytecode::CollectIdIntoRankMap { .. } => Cost::LinearPerRow(5.0),
            Bytecode::FinalizeRanksInMap { .. } => Cost::LogLinearPerRow(5.0),
            Bytecode::Reverse { .. } => Cost::LinearPerRow(1.0),
        }
    }

    /// Debug rendering of the arguments without the instruction name.
    pub fn describe_args(&self) -> String {
        let rendered = format!("{:?}", self);
        rendered
            .strip_prefix(self.name())
            .unwrap_or(&rendered)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Bytecode> {
        vec![
            Bytecode::InitRange {
                size: 10,
                dest_register: RwHandle::new(0),
            },
            Bytecode::SortedFilter {
                ty: StorageType::Int64,
                search: BoundSearch::UpperBound,
                col: 3,
                val_register: ReadHandle::new(1),
                update_register: RwHandle::new(0),
                write_result_to: BoundModifier::EndBound,
            },
            Bytecode::CopyToRowLayout {
                ty: StorageType::String,
                nullability: Nullability::SparseNull,
                col: 2,
                source_indices_register: ReadHandle::new(4),
                dest_buffer_register: RwHandle::new(5),
                row_layout_offset: 8,
                row_layout_stride: 13,
                invert_copied_bits: true,
                popcount_register: Some(ReadHandle::new(6)),
                rank_map_register: None,
            },
            Bytecode::Reverse {
                update_register: RwHandle::new(4),
            },
        ]
    }

    #[test]
    fn test_encode_decode() {
        for bc in sample() {
            let args = bc.encode_args();
            assert_eq!(Bytecode::decode(bc.opcode(), &args).unwrap(), bc);
        }
    }

    #[test]
    fn test_unknown_opcode() {
        let err = Bytecode::decode(999, &[0; ARGS_SIZE]).unwrap_err();
        assert_eq!(err, PlanFormatError::UnknownOpcode(999));
    }

    #[test]
    fn test_decode_rejects_bad_enum_tag() {
        let mut args = [0u8; ARGS_SIZE];
        // NullFilter's first argument is the operator.
        args[0] = 200;
        let err = Bytecode::decode(12, &args).unwrap_err();
        assert!(matches!(err, PlanFormatError::InvalidDiscriminant { field: "NullOp", .. }));
    }

    #[test]
    fn test_names_and_args() {
        let bc = Bytecode::Reverse {
            update_register: RwHandle::new(4),
        };
        assert_eq!(bc.name(), "Reverse");
        assert_eq!(bc.describe_args(), "{ update_register: r4 }");
    }

    #[test]
    fn test_sorted_filter_cost_depends_on_type() {
        let mut bc = sample().remove(1);
        assert_eq!(bc.cost(), Cost::LogPerRow(10.0));
        if let Bytecode::SortedFilter { ty, .. } = &mut bc {
            *ty = StorageType::Id;
        }
        assert_eq!(bc.cost(), Cost::Fixed(2.0));
    }
}
