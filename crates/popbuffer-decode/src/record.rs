//! Interleaved vertex record unpacking.

use crate::error::{DecodeError, DecodeResult};

/// Size of one interleaved vertex record in bytes.
pub const BYTES_PER_VERTEX: usize = 8;

/// One packed vertex as stored in the payload and uploaded to the GPU.
///
/// # Format
///
/// - Bytes 0-5: Position (3 × u16, little-endian), quantized against the
///   mesh bounding box
/// - Bytes 6-7: Normal (2 × u8), octahedral projection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexRecord {
    pub position: [u16; 3],
    pub normal: [u8; 2],
}

impl VertexRecord {
    /// Parse a record from its 8-byte wire form.
    #[must_use]
    pub fn from_bytes(b: [u8; BYTES_PER_VERTEX]) -> Self {
        Self {
            position: [
                u16::from_le_bytes([b[0], b[1]]),
                u16::from_le_bytes([b[2], b[3]]),
                u16::from_le_bytes([b[4], b[5]]),
            ],
            normal: [b[6], b[7]],
        }
    }

    /// Serialize the record to its 8-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; BYTES_PER_VERTEX] {
        let [x, y, z] = self.position.map(u16::to_le_bytes);
        [
            x[0],
            x[1],
            y[0],
            y[1],
            z[0],
            z[1],
            self.normal[0],
            self.normal[1],
        ]
    }
}

/// Unpack a buffer of interleaved records.
///
/// # Errors
///
/// Returns an error if the buffer length is not a multiple of
/// [`BYTES_PER_VERTEX`].
pub fn unpack_records(packed: &[u8]) -> DecodeResult<Vec<VertexRecord>> {
    if !packed.len().is_multiple_of(BYTES_PER_VERTEX) {
        return Err(DecodeError::PartialRecord {
            len: packed.len(),
            record_size: BYTES_PER_VERTEX,
        });
    }

    Ok(packed
        .chunks_exact(BYTES_PER_VERTEX)
        .map(|chunk| {
            let mut b = [0u8; BYTES_PER_VERTEX];
            b.copy_from_slice(chunk);
            VertexRecord::from_bytes(b)
        })
        .collect())
}

/// Read the record at `index` without unpacking the whole buffer.
///
/// # Errors
///
/// Returns an error if `index` lies beyond the last complete record.
pub fn record_at(packed: &[u8], index: usize) -> DecodeResult<VertexRecord> {
    let len = packed.len() / BYTES_PER_VERTEX;
    if index >= len {
        return Err(DecodeError::IndexOutOfBounds { index, len });
    }
    let start = index * BYTES_PER_VERTEX;
    let mut b = [0u8; BYTES_PER_VERTEX];
    b.copy_from_slice(&packed[start..start + BYTES_PER_VERTEX]);
    Ok(VertexRecord::from_bytes(b))
}

/// Serialize records back into a contiguous payload.
#[must_use]
pub fn pack_records(records: &[VertexRecord]) -> Vec<u8> {
    records.iter().flat_map(|r| r.to_bytes()).collect()
}
