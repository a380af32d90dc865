//! A single progressive load sequence and the renderer-facing view of it.
//!
//! A [`ViewerSession`] owns the descriptor, the [`LevelAssembler`] and the
//! current draw count. [`ViewerSession::run`] drives the strict in-order level
//! loop: request level `i`, wait for its bytes, commit, notify, then request
//! level `i + 1`. Every notification is a [`LoadEvent`] tagged with the
//! session's [`SessionId`], so a consumer that starts a new sequence can
//! discard events from the old one.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_channel::Sender;

use crate::assembler::{
    CommitOutcome, InterleavedVertexBuffer, LevelAssembler, LoadPhase, LoadState,
};
use crate::descriptor::MeshDescriptor;
use crate::error::{Error, Result};
use crate::range::ByteRange;
use crate::source::{ChunkSource, resolve};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one load sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Cooperative cancellation flag shared between a session and its owner.
///
/// The flag is checked before every level request. A request already in
/// flight runs to completion and is committed; no further level follows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Options for a load sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Fetch the whole payload in one request instead of level by level.
    pub single_shot: bool,
}

/// A notification emitted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadEvent {
    /// The session that emitted the event.
    pub session: SessionId,
    /// What happened.
    pub kind: LoadEventKind,
}

/// What a [`LoadEvent`] reports.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEventKind {
    /// A level was committed and may be drawn.
    LevelReady { level: u32, vertex_count: u32 },
    /// Share of the payload committed so far, in `[0, 1]`.
    Progress { fraction: f32 },
    /// A chunk had an unexpected length; the buffer holds what arrived.
    Degraded { vertex_count: u32 },
    /// No further levels will be requested.
    Complete,
    /// The fetch for `level` failed.
    Stalled { level: u32, error: String },
    /// The sequence was cancelled.
    Cancelled,
}

/// One progressive load of one mesh.
#[derive(Debug)]
pub struct ViewerSession {
    id: SessionId,
    descriptor: Arc<MeshDescriptor>,
    payload_url: String,
    config: SessionConfig,
    assembler: LevelAssembler,
    display_level: u32,
    draw_vertex_count: u32,
}

impl ViewerSession {
    /// Resolve the descriptor at `descriptor_url` and prepare a session for
    /// its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be fetched or is invalid.
    pub async fn open<S: ChunkSource>(
        source: &S,
        descriptor_url: &str,
        config: SessionConfig,
    ) -> Result<Self> {
        let descriptor = resolve(source, descriptor_url).await?;
        let payload_url = descriptor.payload_url(descriptor_url)?;
        Self::new(descriptor, payload_url, config)
    }

    /// Prepare a session for an already resolved descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor's vertex buffer cannot be
    /// allocated.
    pub fn new(
        descriptor: MeshDescriptor,
        payload_url: String,
        config: SessionConfig,
    ) -> Result<Self> {
        let descriptor = Arc::new(descriptor);
        let assembler = LevelAssembler::new(descriptor.clone())?;
        let id = SessionId::next();
        tracing::debug!(
            session = id.get(),
            name = descriptor.name(),
            payload_url = %payload_url,
            "session created"
        );
        Ok(Self {
            id,
            assembler,
            descriptor,
            payload_url,
            config,
            display_level: 0,
            draw_vertex_count: 0,
        })
    }

    /// Run the load sequence to its end.
    ///
    /// Returns the final phase: `Complete`, possibly degraded.
    ///
    /// # Errors
    ///
    /// Returns the fetch error that stalled the sequence, or
    /// [`Error::Cancelled`] if `cancel` fired before the last level was
    /// requested. Levels committed before either remain drawable.
    pub async fn run<S: ChunkSource>(
        &mut self,
        source: &S,
        events: &Sender<LoadEvent>,
        cancel: &CancelToken,
    ) -> Result<LoadPhase> {
        if self.config.single_shot {
            return self.load_single_shot(source, events, cancel).await;
        }

        while let Some(level) = self.assembler.next_level() {
            self.check_cancelled(events, cancel).await?;
            self.assembler.mark_pending(level)?;

            let range = self.descriptor.level_byte_range(level)?;
            let data = self.fetch(source, level, range, events).await?;
            let outcome = self.assembler.commit_level(level, &data)?;
            self.apply(outcome, events).await;
        }

        self.finish(events).await
    }

    /// Fetch the whole payload in one request.
    ///
    /// # Errors
    ///
    /// As for [`ViewerSession::run`].
    pub async fn load_single_shot<S: ChunkSource>(
        &mut self,
        source: &S,
        events: &Sender<LoadEvent>,
        cancel: &CancelToken,
    ) -> Result<LoadPhase> {
        if self.assembler.phase().is_terminal() {
            return Ok(self.assembler.phase());
        }
        self.check_cancelled(events, cancel).await?;

        let level = self.descriptor.level_count();
        let data = self.fetch(source, level, ByteRange::Full, events).await?;
        let outcome = self.assembler.commit_full(&data);
        self.apply(outcome, events).await;

        self.finish(events).await
    }

    /// Draw a coarser level than the newest one.
    ///
    /// `level` is clamped to `[1, currently_loaded]` and the draw count set
    /// to that level's cumulative vertex count. Returns the level now shown,
    /// or 0 while nothing is loaded. A degraded buffer has no level
    /// boundaries, so its draw count is left alone.
    pub fn set_display_level(&mut self, level: u32) -> u32 {
        let loaded = self.assembler.state().currently_loaded;
        if loaded == 0 || self.is_degraded() {
            return self.display_level;
        }
        self.display_level = level.clamp(1, loaded);
        self.draw_vertex_count = self.descriptor.vertices_through(self.display_level);
        self.display_level
    }

    /// Level currently shown. After a degraded load this is the number of
    /// levels the received prefix covers completely, possibly 0.
    #[must_use]
    pub fn display_level(&self) -> u32 {
        self.display_level
    }

    /// Number of vertices the renderer should draw.
    #[must_use]
    pub fn draw_vertex_count(&self) -> u32 {
        self.draw_vertex_count
    }

    /// The whole vertex buffer, ready for upload.
    #[must_use]
    pub fn buffer(&self) -> &InterleavedVertexBuffer {
        self.assembler.buffer()
    }

    /// The prefix of the buffer covered by the draw count.
    #[must_use]
    pub fn drawable_bytes(&self) -> &[u8] {
        let len = self.draw_vertex_count as usize * popbuffer_decode::BYTES_PER_VERTEX;
        &self.buffer().as_bytes()[..len]
    }

    /// Load counters.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.assembler.state()
    }

    /// Load phase.
    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.assembler.phase()
    }

    /// The mesh descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &MeshDescriptor {
        &self.descriptor
    }

    /// URL the payload is fetched from.
    #[must_use]
    pub fn payload_url(&self) -> &str {
        &self.payload_url
    }

    /// This session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn is_degraded(&self) -> bool {
        self.assembler.phase() == LoadPhase::Complete { degraded: true }
    }

    async fn fetch<S: ChunkSource>(
        &mut self,
        source: &S,
        level: u32,
        range: ByteRange,
        events: &Sender<LoadEvent>,
    ) -> Result<Vec<u8>> {
        let result = source.fetch(&self.payload_url, range).await;
        match result {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!(level, %range, error = %e, "level fetch failed, loading stalled");
                self.assembler.mark_stalled(level);
                self.emit(
                    events,
                    LoadEventKind::Stalled {
                        level,
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn check_cancelled(
        &mut self,
        events: &Sender<LoadEvent>,
        cancel: &CancelToken,
    ) -> Result<()> {
        if !cancel.is_cancelled() {
            return Ok(());
        }
        tracing::info!(
            session = self.id.get(),
            loaded = self.assembler.state().currently_loaded,
            "load cancelled"
        );
        self.assembler.mark_cancelled();
        self.emit(events, LoadEventKind::Cancelled).await;
        Err(Error::Cancelled)
    }

    async fn apply(&mut self, outcome: CommitOutcome, events: &Sender<LoadEvent>) {
        match outcome {
            CommitOutcome::Committed {
                level,
                vertex_count,
            } => {
                // New levels always move the view to the finest data.
                self.display_level = level;
                self.draw_vertex_count = vertex_count;
                self.emit(
                    events,
                    LoadEventKind::LevelReady {
                        level,
                        vertex_count,
                    },
                )
                .await;
                self.emit(
                    events,
                    LoadEventKind::Progress {
                        fraction: self.fraction(),
                    },
                )
                .await;
            }
            CommitOutcome::Degraded { vertex_count } => {
                // Shown level is the last one the degraded prefix fully covers.
                let covered = self
                    .descriptor
                    .levels()
                    .iter()
                    .take_while(|&&end| end <= vertex_count)
                    .count();
                self.display_level = u32::try_from(covered).unwrap_or(u32::MAX);
                self.draw_vertex_count = vertex_count;
                self.emit(events, LoadEventKind::Degraded { vertex_count }).await;
            }
            CommitOutcome::Ignored => {}
        }
    }

    async fn finish(&mut self, events: &Sender<LoadEvent>) -> Result<LoadPhase> {
        let phase = self.assembler.phase();
        if matches!(phase, LoadPhase::Complete { .. }) {
            tracing::info!(
                session = self.id.get(),
                vertex_count = self.draw_vertex_count,
                degraded = self.is_degraded(),
                "load complete"
            );
            self.emit(events, LoadEventKind::Complete).await;
        }
        Ok(phase)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn fraction(&self) -> f32 {
        let total = self.descriptor.num_vertices();
        if total == 0 {
            return 1.0;
        }
        (f64::from(self.assembler.state().vertex_count_current) / f64::from(total)) as f32
    }

    async fn emit(&self, events: &Sender<LoadEvent>, kind: LoadEventKind) {
        let event = LoadEvent {
            session: self.id,
            kind,
        };
        if events.send(event).await.is_err() {
            tracing::trace!(session = self.id.get(), "event receiver dropped");
        }
    }
}
