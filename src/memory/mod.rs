//! Memory primitives
//!
//! Buffers used by columns and by the interpreter's register file:
//! - `Slab`: fixed-size owned buffer
//! - `FlexVector`: growable buffer on top of `Slab`
//! - `BitVector`: packed bits with prefix popcount support
//! - `Range` / `Span`: non-owning index views
//!
//! # Invariants
//!
//! - Every buffer is exclusively owned by the structure that allocated it
//! - Views never hold references; they are resolved against their owner
//!   for the duration of a single operation

mod bit_vector;
mod flex_vector;
mod slab;
mod span;

pub use bit_vector::BitVector;
pub use flex_vector::FlexVector;
pub use slab::Slab;
pub use span::{Range, Span, SpanBacking};
