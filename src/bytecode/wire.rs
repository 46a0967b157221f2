//! Fixed-size instruction encoding
//!
//! Each instruction is a 4-byte little-endian opcode followed by a 36-byte
//! argument buffer. Arguments are packed in field declaration order with
//! no alignment; unused trailing bytes are zero. Absent optional register
//! handles encode as `u32::MAX`.

use super::registers::{ReadHandle, RwHandle};
use crate::plan::PlanFormatError;
use crate::types::{
    BoundModifier, BoundSearch, MinMaxOp, NonIdStorageType, NonNullOp, NonStringOp,
    NonStringType, NullOp, Nullability, StorageType, TypeSet,
};

pub const OPCODE_SIZE: usize = 4;
pub const ARGS_SIZE: usize = 36;
pub const RECORD_SIZE: usize = OPCODE_SIZE + ARGS_SIZE;

const ABSENT_HANDLE: u32 = u32::MAX;

pub struct ArgWriter {
    buf: [u8; ARGS_SIZE],
    pos: usize,
}

impl ArgWriter {
    pub fn new() -> Self {
        Self {
            buf: [0; ARGS_SIZE],
            pos: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        assert!(end <= ARGS_SIZE, "instruction arguments exceed {} bytes", ARGS_SIZE);
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn finish(self) -> [u8; ARGS_SIZE] {
        self.buf
    }
}

impl Default for ArgWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ArgReader<'a> {
    buf: &'a [u8; ARGS_SIZE],
    pos: usize,
}

impl<'a> ArgReader<'a> {
    pub fn new(buf: &'a [u8; ARGS_SIZE]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], PlanFormatError> {
        let end = self.pos + N;
        if end > ARGS_SIZE {
            return Err(PlanFormatError::ArgumentOverflow);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    /// Fails when any byte after the consumed arguments is non-zero.
    pub fn expect_padding(&self) -> Result<(), PlanFormatError> {
        if self.buf[self.pos..].iter().any(|b| *b != 0) {
            return Err(PlanFormatError::NonZeroPadding);
        }
        Ok(())
    }
}

/// A value that can be packed into an argument buffer.
pub trait WireField: Sized {
    fn write(&self, w: &mut ArgWriter);
    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError>;
}

impl WireField for u32 {
    fn write(&self, w: &mut ArgWriter) {
        w.put(&self.to_le_bytes());
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        Ok(u32::from_le_bytes(r.take::<4>()?))
    }
}

impl WireField for u16 {
    fn write(&self, w: &mut ArgWriter) {
        w.put(&self.to_le_bytes());
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        Ok(u16::from_le_bytes(r.take::<2>()?))
    }
}

impl WireField for bool {
    fn write(&self, w: &mut ArgWriter) {
        w.put(&[*self as u8]);
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        match r.take::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PlanFormatError::InvalidBool(other)),
        }
    }
}

impl<T> WireField for RwHandle<T> {
    fn write(&self, w: &mut ArgWriter) {
        self.index().write(w);
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        Ok(RwHandle::new(u32::read(r)?))
    }
}

impl<T> WireField for ReadHandle<T> {
    fn write(&self, w: &mut ArgWriter) {
        self.index().write(w);
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        Ok(ReadHandle::new(u32::read(r)?))
    }
}

impl<T> WireField for Option<ReadHandle<T>> {
    fn write(&self, w: &mut ArgWriter) {
        match self {
            Some(h) => h.write(w),
            None => ABSENT_HANDLE.write(w),
        }
    }

    fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
        let index = u32::read(r)?;
        Ok((index != ABSENT_HANDLE).then(|| ReadHandle::new(index)))
    }
}

macro_rules! impl_wire_type_set {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl WireField for $ty {
                fn write(&self, w: &mut ArgWriter) {
                    w.put(&[self.tag()]);
                }

                fn read(r: &mut ArgReader<'_>) -> Result<Self, PlanFormatError> {
                    let tag = r.take::<1>()?[0];
                    $ty::from_tag(tag).ok_or(PlanFormatError::InvalidDiscriminant {
                        field: stringify!($ty),
                        value: tag,
                    })
                }
            }
        )+
    };
}

impl_wire_type_set!(
    StorageType,
    NonIdStorageType,
    NonStringType,
    Nullability,
    NonNullOp,
    NonStringOp,
    NullOp,
    BoundSearch,
    BoundModifier,
    MinMaxOp,
);
