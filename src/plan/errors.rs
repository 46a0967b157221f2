//! # Plan Format Errors

use thiserror::Error;

/// Result type for plan decoding
pub type PlanFormatResult<T> = Result<T, PlanFormatError>;

/// Malformed serialized plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanFormatError {
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Truncated plan: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Trailing bytes after plan: {0}")]
    TrailingBytes(usize),

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u32),

    #[error("Invalid {field} discriminant: {value}")]
    InvalidDiscriminant { field: &'static str, value: u8 },

    #[error("Invalid bool byte: {0}")]
    InvalidBool(u8),

    // Argument buffer errors
    #[error("Instruction arguments overflow the record")]
    ArgumentOverflow,

    #[error("Non-zero padding after instruction arguments")]
    NonZeroPadding,

    #[error("Count too large: {0}")]
    CountTooLarge(u64),
}
