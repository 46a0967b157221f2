//! Closed type sets for dispatch
//!
//! Column content types, nullability kinds and operators are small closed
//! enums. Families of related enums (e.g. all operators vs. the operators
//! that make sense on non-string columns) are separate enums linked by
//! `From` (widening) and `TryFrom` (narrowing) conversions, so handler code
//! can only be reached with values it knows how to process.
//!
//! Every set has a stable one-byte tag used by the plan wire format.

/// Common interface of every closed type set.
pub trait TypeSet: Copy + Eq + std::fmt::Debug + 'static {
    /// All members in declaration order; a member's tag is its position.
    const ALL: &'static [Self];

    fn tag(self) -> u8;

    fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    fn name(self) -> &'static str;
}

macro_rules! type_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::types::TypeSet for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn tag(self) -> u8 {
                self as u8
            }

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

macro_rules! type_subset {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $parent:ident {
            $($variant:ident),+ $(,)?
        }
    ) => {
        $crate::types::type_set! {
            $(#[$meta])*
            $vis enum $name { $($variant),+ }
        }

        impl From<$name> for $parent {
            fn from(v: $name) -> Self {
                match v {
                    $($name::$variant => $parent::$variant),+
                }
            }
        }

        impl TryFrom<$parent> for $name {
            type Error = $parent;

            fn try_from(v: $parent) -> Result<Self, $parent> {
                #[allow(unreachable_patterns)]
                match v {
                    $($parent::$variant => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

pub(crate) use type_set;
pub(crate) use type_subset;

mod ops;
mod storage;

pub use ops::{
    BoundModifier, BoundSearch, InequalityOp, MinMaxOp, NonNullOp, NonStringOp, NullOp, Op,
    RangeOp, SortDirection, StringOp,
};
pub use storage::{
    DuplicateState, IntegerOrDoubleType, NonIdStorageType, NonStringType, Nullability, SortState,
    StorageType,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_declaration_order() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(op.tag() as usize, i);
            assert_eq!(Op::from_tag(i as u8), Some(*op));
        }
        assert_eq!(Op::from_tag(Op::ALL.len() as u8), None);
    }

    #[test]
    fn test_subset_round_trip() {
        for op in NonStringOp::ALL {
            let wide: Op = (*op).into();
            assert_eq!(NonStringOp::try_from(wide), Ok(*op));
        }
        assert_eq!(NonStringOp::try_from(Op::Glob), Err(Op::Glob));
        assert_eq!(NullOp::try_from(Op::IsNull), Ok(NullOp::IsNull));
    }

    #[test]
    fn test_subset_tags_are_independent() {
        // Subsets number their own members from zero.
        assert_eq!(NonIdStorageType::Uint32.tag(), 0);
        assert_eq!(StorageType::Uint32.tag(), 1);
    }

    #[test]
    fn test_names() {
        assert_eq!(StorageType::Int64.name(), "Int64");
        assert_eq!(MinMaxOp::Max.name(), "Max");
    }
}
