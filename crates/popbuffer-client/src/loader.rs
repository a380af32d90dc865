//! Drives one progressive load from descriptor to finished buffer.
//!
//! The session runs on the current task, joined with the event consumer, so
//! levels are committed and reported in the order they arrive. Byte-level
//! progress is sampled from the client's progress table by a separate ticker
//! task, and Ctrl-C trips the session's cancel token.

use std::time::Duration;

use glam::DVec3;
use popbuffer::{
    CancelToken, Client, LoadPhase, MemoryCache, ProgressTracker, SessionConfig, ViewerSession,
};
use popbuffer_decode::decode_vertices;
use web_time::Instant;

use crate::launch_params::LaunchParams;
use crate::ui::{self, LoadIndicator, Status};

/// What a finished load looked like.
#[derive(Debug)]
pub struct LoadReport {
    pub session: ViewerSession,
    /// `Ok` phase, or the error that ended the sequence early.
    pub outcome: popbuffer::Result<LoadPhase>,
    pub status: Status,
    pub elapsed: Duration,
    pub received_bytes: u64,
}

/// Resolve the descriptor at `params.url` and load its payload.
///
/// # Errors
///
/// Returns an error if the descriptor cannot be resolved. Failures after
/// that end up in [`LoadReport::outcome`]; whatever was committed stays in
/// the session's buffer.
pub async fn load(params: &LaunchParams) -> popbuffer::Result<LoadReport> {
    // A zero budget stores nothing.
    let cache = MemoryCache::with_max_bytes(params.cache_bytes);
    let client = Client::with_cache(cache).with_progress_capacity(params.max_in_flight);

    let start = Instant::now();
    let config = SessionConfig {
        single_shot: params.single_shot,
    };
    let mut session = ViewerSession::open(&client, &params.url, config).await?;
    let descriptor = session.descriptor();
    tracing::info!(
        name = descriptor.name(),
        vertices = descriptor.num_vertices(),
        levels = descriptor.level_count(),
        payload = session.payload_url(),
        "mesh resolved"
    );

    client
        .progress()
        .lock()
        .reset(Some(descriptor.payload_len()));
    let ticker = tokio::spawn(report_progress(
        client.progress().clone(),
        Duration::from_millis(params.progress_interval_ms),
    ));

    let cancel = CancelToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after the current level");
                cancel.cancel();
            }
        }
    });

    let (events, receiver) = async_channel::unbounded();
    let indicator = LoadIndicator::new(session.id(), descriptor.level_count());
    let (outcome, indicator) = tokio::join!(
        async {
            let outcome = session.run(&client, &events, &cancel).await;
            events.close();
            outcome
        },
        ui::consume(receiver, indicator),
    );

    ticker.abort();
    interrupt.abort();

    if !indicator.is_finished() {
        tracing::debug!(
            vertices = indicator.vertex_count(),
            "event stream closed before the sequence ended"
        );
    }
    if let Some(level) = params.display_level {
        let shown = session.set_display_level(level);
        tracing::info!(requested = level, shown, "display level set");
    }

    let stats = client.cache().stats();
    tracing::debug!(
        entries = stats.entries,
        bytes = stats.bytes,
        hits = stats.hits,
        misses = stats.misses,
        "cache stats"
    );

    Ok(LoadReport {
        received_bytes: client.progress().lock().received_bytes(),
        session,
        outcome,
        status: indicator.status().clone(),
        elapsed: start.elapsed(),
    })
}

/// Periodically log byte-level progress until aborted.
async fn report_progress(progress: ProgressTracker, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last = None;
    loop {
        ticker.tick().await;
        let (overall, in_flight) = {
            let table = progress.lock();
            (table.overall(), table.in_flight())
        };
        if overall != last {
            if let Some(fraction) = overall {
                tracing::debug!(
                    percent = fraction * 100.0,
                    in_flight,
                    "download progress"
                );
            }
            last = overall;
        }
    }
}

/// Statistics of the drawable vertices after decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedSummary {
    pub vertex_count: usize,
    pub min: DVec3,
    pub max: DVec3,
    /// Mean length of the decoded normals, close to 1 for healthy data.
    pub mean_normal_length: f32,
}

/// Decode the drawable prefix of the session's buffer and summarize it.
///
/// # Errors
///
/// Returns an error if the drawable prefix is not a whole number of records.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(session: &ViewerSession) -> popbuffer::Result<Option<DecodedSummary>> {
    let vertices = decode_vertices(session.drawable_bytes(), &session.descriptor().bounds())?;
    if vertices.is_empty() {
        return Ok(None);
    }

    let (min, max) = vertices.iter().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(min, max), v| (min.min(v.position), max.max(v.position)),
    );
    let normal_sum: f32 = vertices.iter().map(|v| v.normal.length()).sum();

    Ok(Some(DecodedSummary {
        vertex_count: vertices.len(),
        min,
        max,
        mean_normal_length: normal_sum / vertices.len() as f32,
    }))
}
