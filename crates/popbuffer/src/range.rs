//! Vertex-range to byte-range conversion for chunk requests.

use std::fmt;

use crate::error::{Error, Result};

/// The part of the payload a chunk request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteRange {
    /// The whole resource, no `Range` header.
    Full,
    /// Everything from `begin` to the end of the resource (`bytes=<begin>-`).
    From {
        /// First byte offset.
        begin: u64,
    },
    /// An inclusive span (`bytes=<begin>-<end>`).
    Span {
        /// First byte offset.
        begin: u64,
        /// Last byte offset, inclusive.
        end: u64,
    },
}

impl ByteRange {
    /// Convert a vertex range into a byte range.
    ///
    /// `begin_byte = begin_vertex * bytes_per_vertex` and, when an end is
    /// given, `end_byte = end_vertex * bytes_per_vertex - 1`. A request
    /// starting at vertex 0 with no end is a full-resource retrieval.
    ///
    /// # Errors
    ///
    /// Returns an error if the vertex range is empty or reversed.
    pub fn for_vertices(
        begin_vertex: u32,
        end_vertex: Option<u32>,
        bytes_per_vertex: usize,
    ) -> Result<Self> {
        let bpv = bytes_per_vertex as u64;
        let begin = u64::from(begin_vertex) * bpv;
        match end_vertex {
            None if begin_vertex == 0 => Ok(Self::Full),
            None => Ok(Self::From { begin }),
            Some(end_vertex) if end_vertex > begin_vertex && bpv > 0 => Ok(Self::Span {
                begin,
                end: u64::from(end_vertex) * bpv - 1,
            }),
            Some(end_vertex) => Err(Error::InvalidDescriptor {
                detail: format!(
                    "empty vertex range {begin_vertex}..{end_vertex} ({bytes_per_vertex} bytes per vertex)"
                ),
            }),
        }
    }

    /// Value for the HTTP `Range` header, or `None` for a full retrieval.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Full => None,
            Self::From { begin } => Some(format!("bytes={begin}-")),
            Self::Span { begin, end } => Some(format!("bytes={begin}-{end}")),
        }
    }

    /// Number of bytes a server honoring the range must return, if known.
    #[must_use]
    pub fn expected_len(&self) -> Option<u64> {
        match self {
            Self::Span { begin, end } => Some(end - begin + 1),
            Self::Full | Self::From { .. } => None,
        }
    }

    /// First byte offset covered by the range.
    #[must_use]
    pub fn begin(&self) -> u64 {
        match self {
            Self::Full => 0,
            Self::From { begin } | Self::Span { begin, .. } => *begin,
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::From { begin } => write!(f, "{begin}-"),
            Self::Span { begin, end } => write!(f, "{begin}-{end}"),
        }
    }
}
