//! Level-by-level assembly of the interleaved vertex buffer.
//!
//! The [`LevelAssembler`] exclusively owns the buffer and the load counters.
//! Each committed level is validated against the byte length its vertex range
//! implies and copied into place; nothing outside that range is touched. A
//! chunk of the wrong length (typically a server that ignored the `Range`
//! header) ends the sequence on the degraded path instead.

use std::sync::Arc;

use popbuffer_decode::{BYTES_PER_VERTEX, DecodeResult, VertexRecord, record_at};

use crate::descriptor::MeshDescriptor;
use crate::error::{Error, Result};

/// Largest vertex buffer a descriptor may ask for, in bytes.
pub const MAX_BUFFER_BYTES: usize = 1 << 31;

/// One byte buffer holding `num_vertices` interleaved 8-byte records.
///
/// Allocated zeroed at full size up front; bytes of vertex `i` are meaningful
/// only while `i` is below the assembler's current vertex count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedVertexBuffer {
    bytes: Vec<u8>,
}

impl InterleavedVertexBuffer {
    /// Allocate a zeroed buffer for `num_vertices` records.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer would exceed [`MAX_BUFFER_BYTES`] or
    /// the allocation fails.
    pub fn new(num_vertices: u32) -> Result<Self> {
        let len = usize::try_from(num_vertices)
            .ok()
            .and_then(|n| n.checked_mul(BYTES_PER_VERTEX))
            .filter(|&len| len <= MAX_BUFFER_BYTES)
            .ok_or_else(|| Error::InvalidDescriptor {
                detail: format!(
                    "{num_vertices} vertices exceed the {MAX_BUFFER_BYTES}-byte buffer limit"
                ),
            })?;

        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(|e| Error::InvalidDescriptor {
            detail: format!("cannot allocate {len}-byte vertex buffer: {e}"),
        })?;
        bytes.resize(len, 0);
        Ok(Self { bytes })
    }

    /// Raw bytes of the whole buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of records the buffer has room for.
    #[must_use]
    pub fn vertex_capacity(&self) -> usize {
        self.bytes.len() / BYTES_PER_VERTEX
    }

    /// Read back record `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the end of the buffer.
    pub fn record(&self, index: usize) -> DecodeResult<VertexRecord> {
        record_at(&self.bytes, index)
    }

    /// Copy `data` to `offset`, truncated at the end of the buffer. Returns
    /// the number of bytes written.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> usize {
        let Some(dest) = self.bytes.get_mut(offset..) else {
            return 0;
        };
        let len = data.len().min(dest.len());
        dest[..len].copy_from_slice(&data[..len]);
        len
    }
}

/// Load counters of a sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadState {
    /// Number of levels committed.
    pub currently_loaded: u32,
    /// Number of leading vertices whose bytes are valid.
    pub vertex_count_current: u32,
}

/// Where the load sequence stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing requested yet.
    Idle,
    /// A level has been requested and not yet committed.
    LevelPending(u32),
    /// A level was committed and more remain.
    LevelCommitted(u32),
    /// No further levels will be requested.
    Complete {
        /// Whether the sequence ended on the degraded path.
        degraded: bool,
    },
    /// A fetch failed; the last committed level stays renderable.
    Stalled {
        /// The level whose fetch failed.
        level: u32,
    },
    /// The sequence was cancelled before finishing.
    Cancelled,
}

impl LoadPhase {
    /// Whether the phase accepts no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Stalled { .. } | Self::Cancelled
        )
    }
}

/// Result of offering a chunk to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The chunk was written at its level's offset.
    Committed {
        /// The committed level.
        level: u32,
        /// Vertex count after the commit.
        vertex_count: u32,
    },
    /// The chunk had an unexpected length and was written at offset 0; the
    /// sequence is complete.
    Degraded {
        /// Vertex count derived from the received length.
        vertex_count: u32,
    },
    /// The sequence had already ended; nothing was written.
    Ignored,
}

/// Owns the vertex buffer and commits levels into it in order.
#[derive(Debug)]
pub struct LevelAssembler {
    descriptor: Arc<MeshDescriptor>,
    buffer: InterleavedVertexBuffer,
    state: LoadState,
    phase: LoadPhase,
}

impl LevelAssembler {
    /// Allocate the buffer for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor's buffer cannot be allocated.
    pub fn new(descriptor: Arc<MeshDescriptor>) -> Result<Self> {
        let buffer = InterleavedVertexBuffer::new(descriptor.num_vertices())?;
        Ok(Self {
            descriptor,
            buffer,
            state: LoadState::default(),
            phase: LoadPhase::Idle,
        })
    }

    /// The level that should be requested next, if any.
    #[must_use]
    pub fn next_level(&self) -> Option<u32> {
        if self.phase.is_terminal() || self.state.currently_loaded >= self.descriptor.level_count()
        {
            return None;
        }
        Some(self.state.currently_loaded + 1)
    }

    /// Record that `level` has been requested.
    ///
    /// # Errors
    ///
    /// Returns an error if `level` is not the next level to load.
    pub fn mark_pending(&mut self, level: u32) -> Result<()> {
        self.check_level(level)?;
        let expected = self.state.currently_loaded + 1;
        if level != expected {
            return Err(Error::OutOfOrder {
                expected,
                got: level,
            });
        }
        if !self.phase.is_terminal() {
            self.phase = LoadPhase::LevelPending(level);
        }
        Ok(())
    }

    /// Validate and write the chunk for `level`.
    ///
    /// A chunk whose length differs from the level's expected length takes
    /// the degraded path: it is written at offset 0, the vertex count becomes
    /// `len / 8` and the sequence completes. Re-committing an already
    /// committed level rewrites the same range without moving the counters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLevel`] for an index outside the mesh and
    /// [`Error::OutOfOrder`] when a predecessor has not been committed.
    pub fn commit_level(&mut self, level: u32, data: &[u8]) -> Result<CommitOutcome> {
        if self.phase.is_terminal() {
            tracing::debug!(level, phase = ?self.phase, "commit after end of sequence ignored");
            return Ok(CommitOutcome::Ignored);
        }

        let range = self.check_level(level)?;
        let expected = self.state.currently_loaded + 1;
        if level > expected {
            return Err(Error::OutOfOrder {
                expected,
                got: level,
            });
        }

        let expected_len = (range.end - range.start) as usize * BYTES_PER_VERTEX;
        if data.len() != expected_len {
            tracing::warn!(
                level,
                expected_len,
                received = data.len(),
                "chunk length mismatch, falling back to whole-buffer load"
            );
            return Ok(self.degrade(data));
        }

        self.buffer.write_at(range.start as usize * BYTES_PER_VERTEX, data);

        if level == expected {
            self.state.currently_loaded = level;
            self.state.vertex_count_current = self.state.vertex_count_current.max(range.end);
            self.phase = if level == self.descriptor.level_count() {
                LoadPhase::Complete { degraded: false }
            } else {
                LoadPhase::LevelCommitted(level)
            };
            tracing::info!(
                level,
                vertex_count = self.state.vertex_count_current,
                "level committed"
            );
        } else {
            tracing::debug!(level, "level re-committed");
        }

        Ok(CommitOutcome::Committed {
            level,
            vertex_count: self.state.vertex_count_current,
        })
    }

    /// Commit a whole-payload retrieval in one step.
    pub fn commit_full(&mut self, data: &[u8]) -> CommitOutcome {
        if self.phase.is_terminal() {
            return CommitOutcome::Ignored;
        }
        if data.len() as u64 != self.descriptor.payload_len() {
            tracing::warn!(
                expected_len = self.descriptor.payload_len(),
                received = data.len(),
                "payload length mismatch"
            );
            return self.degrade(data);
        }

        self.buffer.write_at(0, data);
        let level = self.descriptor.level_count();
        self.state = LoadState {
            currently_loaded: level,
            vertex_count_current: self.descriptor.num_vertices(),
        };
        self.phase = LoadPhase::Complete { degraded: false };
        tracing::info!(
            vertex_count = self.state.vertex_count_current,
            "payload committed"
        );
        CommitOutcome::Committed {
            level,
            vertex_count: self.state.vertex_count_current,
        }
    }

    /// Record that the fetch for `level` failed.
    pub fn mark_stalled(&mut self, level: u32) {
        if !self.phase.is_terminal() {
            self.phase = LoadPhase::Stalled { level };
        }
    }

    /// Record that the sequence was cancelled.
    pub fn mark_cancelled(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = LoadPhase::Cancelled;
        }
    }

    /// The descriptor this buffer is assembled for.
    #[must_use]
    pub fn descriptor(&self) -> &MeshDescriptor {
        &self.descriptor
    }

    /// The whole buffer, including not-yet-valid tail bytes.
    #[must_use]
    pub fn buffer(&self) -> &InterleavedVertexBuffer {
        &self.buffer
    }

    /// Current counters.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Whether no further levels will be requested because loading finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.phase, LoadPhase::Complete { .. })
    }

    /// The valid prefix of the buffer.
    #[must_use]
    pub fn drawable_bytes(&self) -> &[u8] {
        &self.buffer.as_bytes()[..self.state.vertex_count_current as usize * BYTES_PER_VERTEX]
    }

    fn check_level(&self, level: u32) -> Result<std::ops::Range<u32>> {
        self.descriptor.level_range(level)
    }

    fn degrade(&mut self, data: &[u8]) -> CommitOutcome {
        let written = self.buffer.write_at(0, data);
        let vertex_count = u32::try_from(written / BYTES_PER_VERTEX)
            .unwrap_or(u32::MAX)
            .min(self.descriptor.num_vertices());
        self.state.vertex_count_current = vertex_count;
        self.phase = LoadPhase::Complete { degraded: true };
        CommitOutcome::Degraded { vertex_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popbuffer_decode::{Bounds, pack_records};

    use glam::DVec3;

    fn descriptor() -> Arc<MeshDescriptor> {
        Arc::new(
            MeshDescriptor::new(
                "bunny",
                Bounds::new(DVec3::splat(-1.0), DVec3::splat(1.0)),
                vec![30, 70, 100],
                "bunny.pop",
            )
            .unwrap(),
        )
    }

    /// Payload whose record `i` carries `i` in every position component.
    fn payload() -> Vec<u8> {
        let records: Vec<_> = (0..100u16)
            .map(|i| VertexRecord {
                position: [i; 3],
                normal: [128, 128],
            })
            .collect();
        pack_records(&records)
    }

    #[test]
    fn test_first_level_writes_at_zero() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        assert_eq!(assembler.buffer().len(), 800);

        let outcome = assembler.commit_level(1, &payload[..240]).unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                level: 1,
                vertex_count: 30
            }
        );
        assert_eq!(assembler.state().vertex_count_current, 30);
        assert_eq!(&assembler.buffer().as_bytes()[..240], &payload[..240]);
        assert!(assembler.buffer().as_bytes()[240..].iter().all(|&b| b == 0));
        assert_eq!(assembler.drawable_bytes().len(), 240);
        assert_eq!(assembler.phase(), LoadPhase::LevelCommitted(1));
        assert_eq!(assembler.next_level(), Some(2));
    }

    #[test]
    fn test_all_levels_in_order() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();

        assembler.commit_level(1, &payload[..240]).unwrap();
        assembler.mark_pending(2).unwrap();
        assert_eq!(assembler.phase(), LoadPhase::LevelPending(2));
        assembler.commit_level(2, &payload[240..560]).unwrap();
        let outcome = assembler.commit_level(3, &payload[560..]).unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                level: 3,
                vertex_count: 100
            }
        );
        assert_eq!(assembler.buffer().as_bytes(), payload.as_slice());
        assert_eq!(assembler.phase(), LoadPhase::Complete { degraded: false });
        assert_eq!(assembler.next_level(), None);
        assert_eq!(assembler.buffer().record(42).unwrap().position, [42; 3]);
    }

    #[test]
    fn test_short_chunk_degrades() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        assembler.commit_level(1, &payload[..240]).unwrap();

        let chunk = &payload[240..340];
        let outcome = assembler.commit_level(2, chunk).unwrap();

        assert_eq!(outcome, CommitOutcome::Degraded { vertex_count: 12 });
        assert_eq!(assembler.state().vertex_count_current, 12);
        assert_eq!(assembler.state().currently_loaded, 1);
        assert_eq!(&assembler.buffer().as_bytes()[..100], chunk);
        assert_eq!(assembler.phase(), LoadPhase::Complete { degraded: true });
        assert_eq!(assembler.next_level(), None);
        assert!(assembler.is_complete());

        let late = assembler.commit_level(3, &payload[560..]).unwrap();
        assert_eq!(late, CommitOutcome::Ignored);
        assert_eq!(assembler.state().vertex_count_current, 12);
    }

    #[test]
    fn test_whole_payload_in_place_of_level_degrades() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();

        let outcome = assembler.commit_level(1, &payload).unwrap();

        assert_eq!(outcome, CommitOutcome::Degraded { vertex_count: 100 });
        assert_eq!(assembler.buffer().as_bytes(), payload.as_slice());
    }

    #[test]
    fn test_oversized_chunk_is_clamped() {
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        let outcome = assembler.commit_level(1, &[0xAB; 1000]).unwrap();
        assert_eq!(outcome, CommitOutcome::Degraded { vertex_count: 100 });
        assert_eq!(assembler.buffer().len(), 800);
    }

    #[test]
    fn test_recommit_is_idempotent() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        assembler.commit_level(1, &payload[..240]).unwrap();
        assembler.commit_level(2, &payload[240..560]).unwrap();
        let before = assembler.buffer().clone();
        let state = assembler.state();

        let outcome = assembler.commit_level(1, &payload[..240]).unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                level: 1,
                vertex_count: 70
            }
        );
        assert_eq!(assembler.buffer(), &before);
        assert_eq!(assembler.state(), state);
        assert_eq!(assembler.phase(), LoadPhase::LevelCommitted(2));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        let err = assembler.commit_level(2, &payload[240..560]).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfOrder {
                expected: 1,
                got: 2
            }
        ));
        assert!(assembler.mark_pending(3).is_err());
        assert_eq!(assembler.state(), LoadState::default());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        assert!(matches!(
            assembler.commit_level(0, &[]),
            Err(Error::InvalidLevel { level: 0, .. })
        ));
        assert!(matches!(
            assembler.commit_level(4, &[]),
            Err(Error::InvalidLevel { level: 4, .. })
        ));
    }

    #[test]
    fn test_terminal_phases_ignore_commits() {
        let payload = payload();

        let mut stalled = LevelAssembler::new(descriptor()).unwrap();
        stalled.mark_stalled(1);
        assert_eq!(
            stalled.commit_level(1, &payload[..240]).unwrap(),
            CommitOutcome::Ignored
        );
        assert_eq!(stalled.next_level(), None);

        let mut cancelled = LevelAssembler::new(descriptor()).unwrap();
        cancelled.mark_cancelled();
        assert_eq!(cancelled.commit_full(&payload), CommitOutcome::Ignored);
        assert_eq!(cancelled.phase(), LoadPhase::Cancelled);

        // Cancelling a finished sequence keeps it finished.
        let mut done = LevelAssembler::new(descriptor()).unwrap();
        done.commit_full(&payload);
        done.mark_cancelled();
        assert!(done.is_complete());
    }

    #[test]
    fn test_commit_full() {
        let payload = payload();
        let mut assembler = LevelAssembler::new(descriptor()).unwrap();
        let outcome = assembler.commit_full(&payload);
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                level: 3,
                vertex_count: 100
            }
        );
        assert_eq!(assembler.state().currently_loaded, 3);
        assert_eq!(assembler.drawable_bytes(), payload.as_slice());
    }

    #[test]
    fn test_oversized_descriptor_is_rejected() {
        let descriptor = MeshDescriptor::new(
            "huge",
            Bounds::new(DVec3::splat(-1.0), DVec3::splat(1.0)),
            vec![u32::MAX],
            "huge.pop",
        )
        .unwrap();

        let err = LevelAssembler::new(Arc::new(descriptor)).unwrap_err();

        assert!(matches!(err, Error::InvalidDescriptor { .. }), "{err}");
        assert!(InterleavedVertexBuffer::new(0).unwrap().is_empty());
    }
}
