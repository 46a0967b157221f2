//! Interpreter register file
//!
//! A register is an untyped slot; typed access goes through
//! [`RegisterType`]. Reading a slot as the wrong type is a planner bug and
//! panics.

use crate::bytecode::{CastFilterValueListResult, CastFilterValueResult, StringIdToRankMap};
use crate::memory::{Range, Slab, Span};

#[derive(Debug, Default)]
pub enum RegValue {
    #[default]
    Empty,
    Range(Range),
    Indices(Slab<u32>),
    Span(Span),
    CastResult(CastFilterValueResult),
    CastListResult(CastFilterValueListResult),
    Bytes(Slab<u8>),
    RankMap(StringIdToRankMap),
}

impl RegValue {
    fn kind(&self) -> &'static str {
        match self {
            RegValue::Empty => "Empty",
            RegValue::Range(_) => "Range",
            RegValue::Indices(_) => "Slab<u32>",
            RegValue::Span(_) => "Span",
            RegValue::CastResult(_) => "CastFilterValueResult",
            RegValue::CastListResult(_) => "CastFilterValueListResult",
            RegValue::Bytes(_) => "Slab<u8>",
            RegValue::RankMap(_) => "StringIdToRankMap",
        }
    }
}

/// A type that can live in a register.
pub trait RegisterType: Sized {
    const NAME: &'static str;

    fn peek(value: &RegValue) -> Option<&Self>;
    fn peek_mut(value: &mut RegValue) -> Option<&mut Self>;
    fn into_value(self) -> RegValue;
    fn from_value(value: RegValue) -> Result<Self, RegValue>;
}

macro_rules! register_type {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl RegisterType for $ty {
            const NAME: &'static str = $name;

            fn peek(value: &RegValue) -> Option<&Self> {
                match value {
                    RegValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn peek_mut(value: &mut RegValue) -> Option<&mut Self> {
                match value {
                    RegValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> RegValue {
                RegValue::$variant(self)
            }

            fn from_value(value: RegValue) -> Result<Self, RegValue> {
                match value {
                    RegValue::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

register_type!(Range, Range, "Range");
register_type!(Slab<u32>, Indices, "Slab<u32>");
register_type!(Span, Span, "Span");
register_type!(CastFilterValueResult, CastResult, "CastFilterValueResult");
register_type!(CastFilterValueListResult, CastListResult, "CastFilterValueListResult");
register_type!(Slab<u8>, Bytes, "Slab<u8>");
register_type!(StringIdToRankMap, RankMap, "StringIdToRankMap");

#[derive(Debug, Default)]
pub struct RegisterFile {
    slots: Vec<RegValue>,
}

impl RegisterFile {
    pub fn new(count: u32) -> Self {
        let mut slots = Vec::with_capacity(count as usize);
        slots.resize_with(count as usize, RegValue::default);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, reg: u32) -> &RegValue {
        self.slots.get(reg as usize).unwrap_or_else(|| {
            panic!("register r{} out of range ({} registers)", reg, self.slots.len())
        })
    }

    fn slot_mut(&mut self, reg: u32) -> &mut RegValue {
        let len = self.slots.len();
        self.slots
            .get_mut(reg as usize)
            .unwrap_or_else(|| panic!("register r{} out of range ({} registers)", reg, len))
    }

    /// Contents of `reg` when it currently holds a `T`.
    pub fn try_get<T: RegisterType>(&self, reg: u32) -> Option<&T> {
        T::peek(self.slot(reg))
    }

    pub fn try_get_mut<T: RegisterType>(&mut self, reg: u32) -> Option<&mut T> {
        T::peek_mut(self.slot_mut(reg))
    }

    pub fn get<T: RegisterType>(&self, reg: u32) -> &T {
        let slot = self.slot(reg);
        T::peek(slot).unwrap_or_else(|| type_mismatch::<T>(reg, slot.kind()))
    }

    pub fn get_mut<T: RegisterType>(&mut self, reg: u32) -> &mut T {
        let slot = self.slot_mut(reg);
        let kind = slot.kind();
        T::peek_mut(slot).unwrap_or_else(|| type_mismatch::<T>(reg, kind))
    }

    pub fn set<T: RegisterType>(&mut self, reg: u32, value: T) {
        *self.slot_mut(reg) = value.into_value();
    }

    /// Moves the value out, leaving the slot empty until it is put back.
    pub fn take<T: RegisterType>(&mut self, reg: u32) -> T {
        let slot = std::mem::take(self.slot_mut(reg));
        match T::from_value(slot) {
            Ok(v) => v,
            Err(other) => type_mismatch::<T>(reg, other.kind()),
        }
    }
}

fn type_mismatch<T: RegisterType>(reg: u32, found: &str) -> ! {
    panic!("register r{} holds {}, expected {}", reg, found, T::NAME)
}
