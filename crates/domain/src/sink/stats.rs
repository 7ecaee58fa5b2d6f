use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::flow::entity::EventKind;

/// Delivery counters of one sink.
///
/// Updated atomically from push paths and workers; snapshot reads are
/// plain loads and can be mutually inconsistent.
#[derive(Debug, Default)]
pub struct SinkStats {
    events_pushed_update: AtomicU64,
    events_pushed_destroy: AtomicU64,
    events_dropped: AtomicU64,
    events_failed: AtomicU64,
    batch_length: AtomicU64,
    batches_queued: AtomicU64,
    batch_queue_length: AtomicU64,
    batches_sent: AtomicU64,
    batches_dropped: AtomicU64,
}

impl SinkStats {
    pub fn incr_pushed(&self, kind: EventKind) {
        match kind {
            EventKind::Update => self.events_pushed_update.fetch_add(1, Ordering::Relaxed),
            EventKind::Destroy => self.events_pushed_destroy.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn incr_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// One record the downstream store accepted the batch for but failed
    /// to apply (e.g. a bulk item error).
    pub fn incr_event_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_batch_length(&self, len: u64) {
        self.batch_length.store(len, Ordering::Relaxed);
    }

    pub fn incr_batches_queued(&self) {
        self.batches_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_batch_queue_length(&self, len: u64) {
        self.batch_queue_length.store(len, Ordering::Relaxed);
    }

    pub fn incr_batches_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_batches_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            events_pushed_update: self.events_pushed_update.load(Ordering::Relaxed),
            events_pushed_destroy: self.events_pushed_destroy.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            batch_length: self.batch_length.load(Ordering::Relaxed),
            batches_queued: self.batches_queued.load(Ordering::Relaxed),
            batch_queue_length: self.batch_queue_length.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkStatsSnapshot {
    pub events_pushed_update: u64,
    pub events_pushed_destroy: u64,
    pub events_dropped: u64,
    pub events_failed: u64,
    pub batch_length: u64,
    pub batches_queued: u64,
    pub batch_queue_length: u64,
    pub batches_sent: u64,
    pub batches_dropped: u64,
}

impl SinkStatsSnapshot {
    pub fn events_pushed(&self) -> u64 {
        self.events_pushed_update + self.events_pushed_destroy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_split_by_kind() {
        let s = SinkStats::default();
        s.incr_pushed(EventKind::Update);
        s.incr_pushed(EventKind::Update);
        s.incr_pushed(EventKind::Destroy);

        let snap = s.snapshot();
        assert_eq!(snap.events_pushed_update, 2);
        assert_eq!(snap.events_pushed_destroy, 1);
        assert_eq!(snap.events_pushed(), 3);
    }

    #[test]
    fn batch_counters() {
        let s = SinkStats::default();
        s.set_batch_length(10);
        s.incr_batches_queued();
        s.set_batch_queue_length(2);
        s.incr_batches_sent();
        s.incr_batches_dropped();
        s.incr_event_failed();
        s.incr_dropped();

        let snap = s.snapshot();
        assert_eq!(snap.batch_length, 10);
        assert_eq!(snap.batches_queued, 1);
        assert_eq!(snap.batch_queue_length, 2);
        assert_eq!(snap.batches_sent, 1);
        assert_eq!(snap.batches_dropped, 1);
        assert_eq!(snap.events_failed, 1);
        assert_eq!(snap.events_dropped, 1);
    }
}
