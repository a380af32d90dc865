//! Decode quantized interleaved vertex records from progressive mesh payloads.
//!
//! This crate provides pure synchronous decoding functions for the 8-byte
//! vertex records that make up a progressive mesh payload. All functions are
//! designed to be called from any threading context - the library user
//! controls parallelism.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **Lossy by construction**: Decoding follows the exporter's `q / max`
//!   rule so results are bit-exact with existing assets
//! - **Web-compatible**: Compiles to WASM
//!
//! # Key functions
//!
//! - [`unpack_records`]: Split a payload into [`VertexRecord`]s
//! - [`dequantize_axis`] / [`Bounds::decode`]: Recover positions
//! - [`unpack_normal`]: Unfold octahedral normals
//! - [`decode_vertex`]: Both of the above for a single record

mod error;

pub mod normals;
pub mod quantize;
pub mod record;

pub use error::{DecodeError, DecodeResult};
pub use normals::{
    NORMAL_SCALE_U8, NORMAL_SCALE_U16, dequantize_normal_component, octahedral_decode,
    octahedral_encode, pack_normal, unpack_normal,
};
pub use quantize::{Bounds, POSITION_SCALE, dequantize_axis, quantize_axis};
pub use record::{BYTES_PER_VERTEX, VertexRecord, pack_records, record_at, unpack_records};

use glam::{DVec3, Vec3};

/// A fully decoded vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedVertex {
    /// Position in model space.
    pub position: DVec3,
    /// Unit normal.
    pub normal: Vec3,
}

/// Decode one record against the mesh bounds.
#[must_use]
pub fn decode_vertex(record: VertexRecord, bounds: &Bounds) -> DecodedVertex {
    DecodedVertex {
        position: bounds.decode(record.position),
        normal: unpack_normal(record.normal[0], record.normal[1]),
    }
}

/// Encode a position and normal into a record, the inverse of
/// [`decode_vertex`] up to quantization error.
#[must_use]
pub fn encode_vertex(position: DVec3, normal: Vec3, bounds: &Bounds) -> VertexRecord {
    let (u, v) = pack_normal(normal);
    VertexRecord {
        position: bounds.encode(position),
        normal: [u, v],
    }
}

/// Decode every complete record of a payload.
///
/// # Errors
///
/// Returns an error if the payload is not a whole number of records.
pub fn decode_vertices(packed: &[u8], bounds: &Bounds) -> DecodeResult<Vec<DecodedVertex>> {
    Ok(unpack_records(packed)?
        .into_iter()
        .map(|r| decode_vertex(r, bounds))
        .collect())
}
