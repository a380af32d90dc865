//! Error types for the popbuffer crate.

use std::fmt;

/// Result type for popbuffer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, fetching or assembling a mesh.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// The descriptor document could not be parsed.
    Parse {
        /// Context for where the error occurred.
        context: &'static str,
        /// The error message.
        message: String,
    },
    /// The descriptor parsed but violates a structural invariant.
    InvalidDescriptor {
        /// Description of what was invalid.
        detail: String,
    },
    /// A level index outside `1..=level_count`.
    InvalidLevel {
        /// The requested level.
        level: u32,
        /// Number of levels in the mesh.
        level_count: u32,
    },
    /// A level was committed before its predecessor.
    OutOfOrder {
        /// The next level the assembler accepts.
        expected: u32,
        /// The level that was offered.
        got: u32,
    },
    /// Payload decoding failed.
    Decode(popbuffer_decode::DecodeError),
    /// The load sequence was cancelled.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Parse { context, message } => {
                write!(f, "failed to parse {context}: {message}")
            }
            Error::InvalidDescriptor { detail } => {
                write!(f, "invalid mesh descriptor: {detail}")
            }
            Error::InvalidLevel { level, level_count } => {
                write!(f, "level {level} is outside 1..={level_count}")
            }
            Error::OutOfOrder { expected, got } => {
                write!(f, "level {got} committed out of order, expected level {expected}")
            }
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::Cancelled => write!(f, "load cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Whether the error came from the transport (network or HTTP status).
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Http { .. } | Error::HttpStatus { .. })
    }

    /// Whether the error came from a malformed descriptor.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. } | Error::InvalidDescriptor { .. })
    }
}

impl From<popbuffer_decode::DecodeError> for Error {
    fn from(e: popbuffer_decode::DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse {
            context: "mesh descriptor",
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use popbuffer_decode::{DecodeError, unpack_records};

    use super::*;

    fn decode(bytes: &[u8]) -> Result<usize> {
        Ok(unpack_records(bytes)?.len())
    }

    #[test]
    fn test_decode_error_converts() {
        assert_eq!(decode(&[0; 16]).unwrap(), 2);

        let err = decode(&[0; 12]).unwrap_err();

        assert!(matches!(err, Error::Decode(DecodeError::PartialRecord { len: 12, .. })));
        assert!(err.source().is_some());
        assert!(!err.is_fetch() && !err.is_parse());
    }
}
