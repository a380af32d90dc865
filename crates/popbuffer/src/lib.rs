//! Async progressive mesh loading with incremental buffer assembly.
//!
//! This crate fetches a mesh descriptor, then pulls the binary payload one
//! level of detail at a time with HTTP range requests, committing each level
//! into a single interleaved vertex buffer. After every level the draw count
//! grows, so rendering can start long before the whole mesh has arrived.
//!
//! # Design principles
//!
//! - **Web-compatible**: Works on desktop and WASM via reqwest
//! - **Runtime-agnostic**: Returns `impl Future`, works with any executor
//! - **Strictly ordered**: Level `i + 1` is never requested before level `i`
//!   is committed
//!
//! # Example
//!
//! ```ignore
//! use popbuffer::{CancelToken, Client, SessionConfig, ViewerSession};
//!
//! let client = Client::new();
//! let mut session =
//!     ViewerSession::open(&client, "http://localhost/bunny.json", SessionConfig::default())
//!         .await?;
//!
//! let (events, receiver) = async_channel::unbounded();
//! session.run(&client, &events, &CancelToken::new()).await?;
//! upload(session.drawable_bytes());
//! ```

mod assembler;
pub mod cache;
mod client;
mod descriptor;
mod error;
pub mod progress;
mod range;
mod session;
mod source;

pub use assembler::{
    CommitOutcome, InterleavedVertexBuffer, LevelAssembler, LoadPhase, LoadState,
    MAX_BUFFER_BYTES,
};
pub use cache::{Cache, CacheStats, MemoryCache, NoCache};
pub use client::Client;
pub use descriptor::MeshDescriptor;
pub use error::{Error, Result};
pub use progress::{ProgressTable, ProgressTracker, RequestId};
pub use range::ByteRange;
pub use session::{
    CancelToken, LoadEvent, LoadEventKind, SessionConfig, SessionId, ViewerSession,
};
pub use source::{ChunkSource, resolve};

// Re-export decode types for convenience.
pub use popbuffer_decode::{BYTES_PER_VERTEX, Bounds, DecodedVertex, VertexRecord};
pub use reqwest::Url;
