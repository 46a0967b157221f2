//! Result cursor
//!
//! A `Cursor` binds a plan to the columns it was built for, runs it on
//! demand and walks the output rows. Cells are read through the output
//! row's storage slots when the plan recorded them, otherwise through the
//! column's null bitmap.
//!
//! # Invariants
//!
//! - `eof()` is true until the first `execute`
//! - Rows are visited in the order the plan produced them
//! - Re-executing restarts at the first row

mod cursor;

pub use cursor::{CellCallback, CellValue, Cursor};
