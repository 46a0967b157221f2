//! Bytecode instruction set
//!
//! A query plan is a straight-line list of `Bytecode` instructions operating
//! on a register file. Each instruction names its input and output
//! registers through typed handles allocated by the planner.
//!
//! # Invariants
//!
//! - Instructions only reference registers allocated for the same plan
//! - Every instruction fits one fixed-size wire record
//! - Opcodes are stable: new instruction families are appended

mod cost;
mod instruction;
mod registers;
mod wire;

pub use cost::{Cost, EMPTY_INPUT_COST};
pub use instruction::Bytecode;
pub use registers::{
    CastFilterValueListResult, CastFilterValueResult, CastValue, CastValueList, ReadHandle,
    RegisterAllocator, RwHandle, StringIdToRankMap, Validity,
};
pub use wire::{ARGS_SIZE, OPCODE_SIZE, RECORD_SIZE};
