//! Error types for decoding operations.

use std::fmt;

/// Errors that can occur while decoding vertex payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload length is not a whole number of records.
    PartialRecord { len: usize, record_size: usize },
    /// Record index out of bounds.
    IndexOutOfBounds { index: usize, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialRecord { len, record_size } => {
                write!(
                    f,
                    "payload of {len} bytes is not a multiple of the {record_size}-byte record size"
                )
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
