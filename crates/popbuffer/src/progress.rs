//! Download progress bookkeeping.
//!
//! Each in-flight request owns one slot of a fixed-capacity table, keyed by
//! a sequential [`RequestId`]. Progress is purely observational; nothing in
//! the pipeline waits on it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of concurrently tracked requests.
pub const DEFAULT_CAPACITY: usize = 4;

/// Sequentially assigned identifier of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw sequence number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: RequestId,
    received: u64,
    total: Option<u64>,
}

impl Slot {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn fraction(&self) -> f32 {
        match self.total {
            Some(0) => 1.0,
            Some(total) => (self.received as f64 / total as f64).min(1.0) as f32,
            None => 0.0,
        }
    }
}

/// Fixed-capacity map from request id to bytes received.
#[derive(Debug)]
pub struct ProgressTable {
    slots: Vec<Option<Slot>>,
    next_id: u64,
    completed_bytes: u64,
    expected_total: Option<u64>,
}

impl ProgressTable {
    /// Create a table tracking at most `capacity` concurrent requests.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next_id: 0,
            completed_bytes: 0,
            expected_total: None,
        }
    }

    /// Maximum number of concurrently tracked requests.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of requests currently tracked.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Start tracking a request. Returns `None` when every slot is taken.
    pub fn register(&mut self, total: Option<u64>) -> Option<RequestId> {
        let slot = self.slots.iter_mut().find(|s| s.is_none())?;
        let id = RequestId(self.next_id);
        self.next_id += 1;
        *slot = Some(Slot {
            id,
            received: 0,
            total,
        });
        Some(id)
    }

    /// Record bytes received so far. Returns `false` for unknown ids.
    pub fn update(&mut self, id: RequestId, received: u64, total: Option<u64>) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.received = received;
                if total.is_some() {
                    slot.total = total;
                }
                true
            }
            None => false,
        }
    }

    /// Stop tracking a request, crediting its bytes to the completed total.
    pub fn finish(&mut self, id: RequestId) -> Option<u64> {
        let entry = self.slots.iter_mut().find(|s| s.is_some_and(|s| s.id == id))?;
        let slot = entry.take()?;
        self.completed_bytes += slot.received;
        Some(slot.received)
    }

    /// Stop tracking a request without crediting its bytes.
    pub fn abandon(&mut self, id: RequestId) {
        if let Some(entry) = self.slots.iter_mut().find(|s| s.is_some_and(|s| s.id == id)) {
            *entry = None;
        }
    }

    /// Progress of one request as `received / total`.
    #[must_use]
    pub fn fraction(&self, id: RequestId) -> Option<f32> {
        self.slots
            .iter()
            .flatten()
            .find(|s| s.id == id)
            .map(Slot::fraction)
    }

    /// Snapshot of every tracked request.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(RequestId, f32)> {
        self.slots
            .iter()
            .flatten()
            .map(|s| (s.id, s.fraction()))
            .collect()
    }

    /// Set the total byte count used by [`ProgressTable::overall`].
    pub fn set_expected_total(&mut self, total: u64) {
        self.expected_total = Some(total);
    }

    /// Reset completed bytes for a new load sequence.
    pub fn reset(&mut self, expected_total: Option<u64>) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.completed_bytes = 0;
        self.expected_total = expected_total;
    }

    /// Bytes received by finished and in-flight requests together.
    #[must_use]
    pub fn received_bytes(&self) -> u64 {
        self.completed_bytes + self.slots.iter().flatten().map(|s| s.received).sum::<u64>()
    }

    /// Global progress against the expected total, if one is set.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn overall(&self) -> Option<f32> {
        let total = self.expected_total?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.received_bytes() as f64 / total as f64).min(1.0) as f32)
    }

    fn slot_mut(&mut self, id: RequestId) -> Option<&mut Slot> {
        self.slots.iter_mut().flatten().find(|s| s.id == id)
    }
}

impl Default for ProgressTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// Shared handle to a [`ProgressTable`], cheap to clone across tasks.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    table: Arc<Mutex<ProgressTable>>,
}

impl ProgressTracker {
    /// Create a tracker with the given slot capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(ProgressTable::with_capacity(capacity))),
        }
    }

    /// Lock the underlying table.
    pub fn lock(&self) -> MutexGuard<'_, ProgressTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Global progress, see [`ProgressTable::overall`].
    #[must_use]
    pub fn overall(&self) -> Option<f32> {
        self.lock().overall()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let mut table = ProgressTable::with_capacity(2);
        let a = table.register(Some(10)).unwrap();
        let b = table.register(Some(10)).unwrap();
        assert_eq!(a.get() + 1, b.get());
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut table = ProgressTable::with_capacity(2);
        let a = table.register(None).unwrap();
        table.register(None).unwrap();
        assert!(table.register(None).is_none());
        assert_eq!(table.in_flight(), 2);

        table.finish(a);
        let c = table.register(None).unwrap();
        assert_eq!(c.get(), 2);
        assert_eq!(table.capacity(), 2);
    }

    #[test]
    fn test_fraction() {
        let mut table = ProgressTable::default();
        let id = table.register(Some(200)).unwrap();
        assert_eq!(table.fraction(id), Some(0.0));
        assert!(table.update(id, 50, None));
        assert_eq!(table.fraction(id), Some(0.25));

        // Unknown totals report zero until a length is known.
        let open = table.register(None).unwrap();
        table.update(open, 10, None);
        assert_eq!(table.fraction(open), Some(0.0));
        table.update(open, 10, Some(20));
        assert_eq!(table.fraction(open), Some(0.5));
    }

    #[test]
    fn test_overall_counts_completed_and_in_flight() {
        let mut table = ProgressTable::default();
        table.set_expected_total(800);
        let first = table.register(Some(240)).unwrap();
        table.update(first, 240, None);
        assert_eq!(table.finish(first), Some(240));

        let second = table.register(Some(320)).unwrap();
        table.update(second, 160, None);
        assert_eq!(table.received_bytes(), 400);
        assert_eq!(table.overall(), Some(0.5));
    }

    #[test]
    fn test_abandon_does_not_credit() {
        let mut table = ProgressTable::default();
        table.set_expected_total(100);
        let id = table.register(Some(100)).unwrap();
        table.update(id, 60, None);
        table.abandon(id);
        assert_eq!(table.overall(), Some(0.0));
        assert!(!table.update(id, 70, None));
    }

    #[test]
    fn test_reset() {
        let mut table = ProgressTable::default();
        let id = table.register(Some(10)).unwrap();
        table.update(id, 10, None);
        table.finish(id);
        table.reset(Some(50));
        assert_eq!(table.received_bytes(), 0);
        assert_eq!(table.overall(), Some(0.0));
    }

    #[test]
    fn test_tracker_is_shared() {
        let tracker = ProgressTracker::with_capacity(1);
        let other = tracker.clone();
        tracker.lock().set_expected_total(10);
        let id = other.lock().register(Some(10)).unwrap();
        other.lock().update(id, 5, None);
        assert_eq!(tracker.overall(), Some(0.5));
    }
}
