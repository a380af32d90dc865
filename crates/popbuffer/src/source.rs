//! The transport seam of the loading pipeline.

use std::future::Future;

use crate::descriptor::MeshDescriptor;
use crate::error::Result;
use crate::range::ByteRange;

/// Something that can return the bytes of a resource, optionally restricted
/// to a byte range.
///
/// [`crate::Client`] implements this over HTTP. A source that ignores the
/// range and returns the whole resource is legal; the assembler detects the
/// length mismatch and falls back to a single-shot load.
pub trait ChunkSource {
    /// Fetch `range` of the resource at `url`.
    fn fetch(&self, url: &str, range: ByteRange) -> impl Future<Output = Result<Vec<u8>>>;
}

/// Fetch and validate the descriptor at `url`.
///
/// # Errors
///
/// Returns a fetch error if the request fails, or a parse error if the
/// document is malformed or violates the level invariants.
pub async fn resolve<S: ChunkSource>(source: &S, url: &str) -> Result<MeshDescriptor> {
    let bytes = source.fetch(url, ByteRange::Full).await?;
    let descriptor = MeshDescriptor::from_json(&bytes)?;
    tracing::debug!(
        url,
        name = descriptor.name(),
        vertices = descriptor.num_vertices(),
        levels = descriptor.level_count(),
        "resolved mesh descriptor"
    );
    Ok(descriptor)
}
