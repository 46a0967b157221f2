//! Column model
//!
//! A column is a typed storage buffer plus the metadata the planner relies
//! on: null representation, sort state, duplicate state and an optional
//! specialized lookup structure.
//!
//! # Invariants
//!
//! - NonNull/DenseNull: storage length equals row count
//! - SparseNull: storage length equals the popcount of the null bitmap and
//!   the bitmap length equals row count
//! - Id columns are NonNull, IdSorted and NoDuplicates; row `i` holds `i`
//! - Every mutation bumps the column's generation counter

mod errors;
mod index;
mod model;
mod specialized;
mod storage;

pub use errors::{ColumnError, ColumnResult};
pub use index::Index;
pub use model::Column;
pub use specialized::{SmallValueEq, SpecializedStorage};
pub use storage::{compare_f64, NullStorage, Storage, StoredValue};
