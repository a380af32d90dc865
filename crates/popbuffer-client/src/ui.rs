//! Level/progress indicator fed by load events.
//!
//! Shows the newest level, the drawable vertex count and a progress bar.

use popbuffer::{LoadEvent, LoadEventKind, SessionId};

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 24;

/// Overall status shown next to the bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Loading,
    Complete,
    Degraded,
    Stalled(String),
    Cancelled,
}

/// Display state of the current load.
#[derive(Debug, Clone)]
pub struct LoadIndicator {
    session: SessionId,
    level_count: u32,
    level: u32,
    vertex_count: u32,
    fraction: f32,
    status: Status,
}

impl LoadIndicator {
    /// Create an indicator listening to `session`.
    pub fn new(session: SessionId, level_count: u32) -> Self {
        Self {
            session,
            level_count,
            level: 0,
            vertex_count: 0,
            fraction: 0.0,
            status: Status::Loading,
        }
    }

    /// Apply an event. Returns `false` for events from another session.
    pub fn apply(&mut self, event: &LoadEvent) -> bool {
        if event.session != self.session {
            tracing::debug!(
                stale = event.session.get(),
                current = self.session.get(),
                "discarding stale load event"
            );
            return false;
        }

        match &event.kind {
            LoadEventKind::LevelReady {
                level,
                vertex_count,
            } => {
                self.level = *level;
                self.vertex_count = *vertex_count;
            }
            LoadEventKind::Progress { fraction } => self.fraction = fraction.clamp(0.0, 1.0),
            LoadEventKind::Degraded { vertex_count } => {
                self.vertex_count = *vertex_count;
                self.status = Status::Degraded;
            }
            LoadEventKind::Complete => {
                self.fraction = 1.0;
                if self.status == Status::Loading {
                    self.status = Status::Complete;
                }
            }
            LoadEventKind::Stalled { error, .. } => self.status = Status::Stalled(error.clone()),
            LoadEventKind::Cancelled => self.status = Status::Cancelled,
        }
        true
    }

    /// Whether no more events will follow.
    pub fn is_finished(&self) -> bool {
        self.status != Status::Loading
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// One-line rendering, e.g. `level 2/3 [#########...] 70% 70 vertices`.
    pub fn render(&self) -> String {
        let status = match &self.status {
            Status::Loading => String::new(),
            Status::Complete => " complete".to_string(),
            Status::Degraded => " degraded (range requests not honored)".to_string(),
            Status::Stalled(error) => format!(" stalled: {error}"),
            Status::Cancelled => " cancelled".to_string(),
        };
        format!(
            "level {}/{} [{}] {:>3.0}% {} vertices{status}",
            self.level,
            self.level_count,
            progress_bar(self.fraction, BAR_WIDTH),
            self.fraction * 100.0,
            self.vertex_count,
        )
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn progress_bar(fraction: f32, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

/// Apply events from `receiver` until the sequence ends or the channel
/// closes, logging each change.
pub async fn consume(
    receiver: async_channel::Receiver<LoadEvent>,
    mut indicator: LoadIndicator,
) -> LoadIndicator {
    while let Ok(event) = receiver.recv().await {
        if !indicator.apply(&event) {
            continue;
        }
        match event.kind {
            LoadEventKind::Progress { .. } => tracing::debug!("{}", indicator.render()),
            LoadEventKind::Stalled { .. } | LoadEventKind::Degraded { .. } => {
                tracing::warn!("{}", indicator.render());
            }
            _ => tracing::info!("{}", indicator.render()),
        }
        if matches!(
            event.kind,
            LoadEventKind::Complete | LoadEventKind::Stalled { .. } | LoadEventKind::Cancelled
        ) {
            break;
        }
    }
    indicator
}

#[cfg(test)]
mod tests {
    use popbuffer::{Bounds, MeshDescriptor, SessionConfig, ViewerSession};

    use super::*;

    fn session_id() -> SessionId {
        let descriptor = MeshDescriptor::new(
            "bunny",
            Bounds::new(glam::DVec3::ZERO, glam::DVec3::ONE),
            vec![30, 70, 100],
            "bunny.pop",
        )
        .unwrap();
        ViewerSession::new(
            descriptor,
            "http://localhost/bunny.pop".to_string(),
            SessionConfig::default(),
        )
        .unwrap()
        .id()
    }

    fn event(session: SessionId, kind: LoadEventKind) -> LoadEvent {
        LoadEvent { session, kind }
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "....");
        assert_eq!(progress_bar(0.5, 4), "##..");
        assert_eq!(progress_bar(1.5, 4), "####");
    }

    #[test]
    fn test_levels_and_progress() {
        let id = session_id();
        let mut indicator = LoadIndicator::new(id, 3);
        indicator.apply(&event(
            id,
            LoadEventKind::LevelReady {
                level: 2,
                vertex_count: 70,
            },
        ));
        indicator.apply(&event(id, LoadEventKind::Progress { fraction: 0.7 }));

        assert_eq!(indicator.vertex_count(), 70);
        assert!(!indicator.is_finished());
        assert_eq!(
            indicator.render(),
            "level 2/3 [#################.......]  70% 70 vertices"
        );
    }

    #[test]
    fn test_stale_events_are_discarded() {
        let old = session_id();
        let current = session_id();
        let mut indicator = LoadIndicator::new(current, 3);

        assert!(!indicator.apply(&event(old, LoadEventKind::Cancelled)));
        assert_eq!(indicator.status(), &Status::Loading);
    }

    #[test]
    fn test_degraded_stays_degraded_on_complete() {
        let id = session_id();
        let mut indicator = LoadIndicator::new(id, 3);
        indicator.apply(&event(id, LoadEventKind::Degraded { vertex_count: 12 }));
        indicator.apply(&event(id, LoadEventKind::Complete));
        assert_eq!(indicator.status(), &Status::Degraded);
        assert_eq!(indicator.vertex_count(), 12);
    }

    #[tokio::test]
    async fn test_consume_stops_at_end_of_sequence() {
        let id = session_id();
        let (tx, rx) = async_channel::unbounded();
        let stalled = LoadEventKind::Stalled {
            level: 2,
            error: "503".into(),
        };
        tx.send(event(id, stalled)).await.unwrap();

        let indicator = consume(rx, LoadIndicator::new(id, 3)).await;

        assert_eq!(indicator.status(), &Status::Stalled("503".to_string()));
        drop(tx);
    }
}
