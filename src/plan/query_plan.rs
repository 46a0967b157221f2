//! Compiled query plans and their serialized form

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use super::errors::{PlanFormatError, PlanFormatResult};
use crate::bytecode::{Bytecode, ARGS_SIZE};

/// Size of the encoded `ExecutionParams` header.
pub const EXECUTION_PARAMS_SIZE: usize = 32;

/// Execution-wide parameters computed by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ExecutionParams {
    pub estimated_cost: f64,
    /// Upper bound on rows the plan can produce.
    pub max_row_count: u32,
    pub estimated_row_count: u32,
    /// Number of filter value slots the fetcher must supply.
    pub filter_value_count: u32,
    pub register_count: u32,
    /// Span register holding the result.
    pub output_register: u32,
    /// Slots per output row: the row index plus one per nullable used
    /// column.
    pub output_per_row: u32,
}

/// A compiled, immutable query program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub params: ExecutionParams,
    pub bytecode: Vec<Bytecode>,
    /// Slot offset of each column's storage index within an output row.
    /// Zero for columns without a dedicated slot.
    pub col_to_output_offset: Vec<u32>,
}

impl QueryPlan {
    /// Encodes the plan as standard padded Base64.
    pub fn serialize(&self) -> String {
        let mut buf = Vec::with_capacity(
            EXECUTION_PARAMS_SIZE
                + 16
                + self.bytecode.len() * crate::bytecode::RECORD_SIZE
                + self.col_to_output_offset.len() * 4,
        );
        let p = &self.params;
        buf.extend_from_slice(&p.estimated_cost.to_le_bytes());
        for v in [
            p.max_row_count,
            p.estimated_row_count,
            p.filter_value_count,
            p.register_count,
            p.output_register,
            p.output_per_row,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        buf.extend_from_slice(&(self.bytecode.len() as u64).to_le_bytes());
        for bc in &self.bytecode {
            buf.extend_from_slice(&bc.opcode().to_le_bytes());
            buf.extend_from_slice(&bc.encode_args());
        }

        buf.extend_from_slice(&(self.col_to_output_offset.len() as u64).to_le_bytes());
        for offset in &self.col_to_output_offset {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        STANDARD.encode(buf)
    }

    /// Decodes a plan produced by [`QueryPlan::serialize`].
    pub fn deserialize(encoded: &str) -> PlanFormatResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| PlanFormatError::InvalidBase64(e.to_string()))?;
        let mut r = BlobReader::new(&bytes);

        let estimated_cost = f64::from_le_bytes(r.take::<8>()?);
        let params = ExecutionParams {
            estimated_cost,
            max_row_count: r.u32()?,
            estimated_row_count: r.u32()?,
            filter_value_count: r.u32()?,
            register_count: r.u32()?,
            output_register: r.u32()?,
            output_per_row: r.u32()?,
        };

        let count = r.count(crate::bytecode::RECORD_SIZE)?;
        let mut bytecode = Vec::with_capacity(count);
        for _ in 0..count {
            let opcode = r.u32()?;
            let args = r.take::<ARGS_SIZE>()?;
            bytecode.push(Bytecode::decode(opcode, &args)?);
        }

        let cols = r.count(4)?;
        let mut col_to_output_offset = Vec::with_capacity(cols);
        for _ in 0..cols {
            col_to_output_offset.push(r.u32()?);
        }

        if r.remaining() != 0 {
            return Err(PlanFormatError::TrailingBytes(r.remaining()));
        }
        Ok(Self {
            params,
            bytecode,
            col_to_output_offset,
        })
    }
}

struct BlobReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> PlanFormatResult<[u8; N]> {
        if self.remaining() < N {
            return Err(PlanFormatError::Truncated {
                needed: N,
                available: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    fn u32(&mut self) -> PlanFormatResult<u32> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    /// Reads an element count and checks the elements can fit in what is
    /// left of the buffer.
    fn count(&mut self, element_size: usize) -> PlanFormatResult<usize> {
        let raw = u64::from_le_bytes(self.take::<8>()?);
        let count = usize::try_from(raw).map_err(|_| PlanFormatError::CountTooLarge(raw))?;
        let needed = count
            .checked_mul(element_size)
            .ok_or(PlanFormatError::CountTooLarge(raw))?;
        if needed > self.remaining() {
            return Err(PlanFormatError::Truncated {
                needed,
                available: self.remaining(),
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ReadHandle, RwHandle};
    use crate::types::{NullOp, StorageType};

    fn plan() -> QueryPlan {
        QueryPlan {
            params: ExecutionParams {
                estimated_cost: 42.5,
                max_row_count: 10,
                estimated_row_count: 5,
                filter_value_count: 1,
                register_count: 4,
                output_register: 2,
                output_per_row: 2,
            },
            bytecode: vec![
                Bytecode::InitRange {
                    size: 10,
                    dest_register: RwHandle::new(0),
                },
                Bytecode::NullFilter {
                    op: NullOp::IsNotNull,
                    col: 1,
                    update_register: RwHandle::new(2),
                },
                Bytecode::FindMinMaxIndex {
                    ty: StorageType::Int64,
                    op: crate::types::MinMaxOp::Max,
                    col: 0,
                    update_register: RwHandle::new(2),
                },
                Bytecode::Iota {
                    source_register: ReadHandle::new(0),
                    update_register: RwHandle::new(2),
                },
            ],
            col_to_output_offset: vec![0, 1],
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let p = plan();
        let encoded = p.serialize();
        let decoded = QueryPlan::deserialize(&encoded).unwrap();
        assert_eq!(decoded, p);
        assert_eq!(decoded.serialize(), encoded);
    }

    #[test]
    fn test_blob_layout() {
        let bytes = STANDARD.decode(plan().serialize()).unwrap();
        assert_eq!(bytes.len(), EXECUTION_PARAMS_SIZE + 8 + 4 * 40 + 8 + 2 * 4);
        assert_eq!(&bytes[0..8], &42.5f64.to_le_bytes());
        assert_eq!(&bytes[32..40], &4u64.to_le_bytes());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            QueryPlan::deserialize("not base64!"),
            Err(PlanFormatError::InvalidBase64(_))
        ));
        let short = STANDARD.encode([0u8; 10]);
        assert!(matches!(
            QueryPlan::deserialize(&short),
            Err(PlanFormatError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = STANDARD.decode(plan().serialize()).unwrap();
        bytes.push(0);
        let err = QueryPlan::deserialize(&STANDARD.encode(bytes)).unwrap_err();
        assert_eq!(err, PlanFormatError::TrailingBytes(1));
    }

    #[test]
    fn test_rejects_unknown_opcode() {
        let mut bytes = STANDARD.decode(plan().serialize()).unwrap();
        bytes[40..44].copy_from_slice(&77u32.to_le_bytes());
        let err = QueryPlan::deserialize(&STANDARD.encode(bytes)).unwrap_err();
        assert_eq!(err, PlanFormatError::UnknownOpcode(77));
    }

    #[test]
    fn test_rejects_huge_count() {
        let mut bytes = STANDARD.decode(plan().serialize()).unwrap();
        bytes[32..40].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(QueryPlan::deserialize(&STANDARD.encode(bytes)).is_err());
    }
}
