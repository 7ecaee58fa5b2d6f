//! Probe, consumer and pipeline counters.
//!
//! All counters are lock-free atomics. Snapshots read each value with a
//! relaxed load, so a snapshot can be mutually inconsistent between
//! fields; consumers of the stats surface accept that.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use ebpf_common::acct::EVENT_LENGTH;

/// Counters of one BPF probe instance.
#[derive(Debug, Default)]
pub struct ProbeStats {
    perf_events_total: AtomicU64,
    perf_bytes_total: AtomicU64,
    perf_events_update: AtomicU64,
    perf_events_update_lost: AtomicU64,
    perf_events_destroy: AtomicU64,
    perf_events_destroy_lost: AtomicU64,
}

impl ProbeStats {
    pub fn incr_update(&self) {
        self.perf_events_update.fetch_add(1, Ordering::Relaxed);
        self.incr_total();
    }

    pub fn incr_destroy(&self) {
        self.perf_events_destroy.fetch_add(1, Ordering::Relaxed);
        self.incr_total();
    }

    pub fn incr_update_lost(&self, n: u64) {
        self.perf_events_update_lost.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_destroy_lost(&self, n: u64) {
        self.perf_events_destroy_lost
            .fetch_add(n, Ordering::Relaxed);
    }

    fn incr_total(&self) {
        self.perf_events_total.fetch_add(1, Ordering::Relaxed);
        self.perf_bytes_total
            .fetch_add(EVENT_LENGTH as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProbeStatsSnapshot {
        ProbeStatsSnapshot {
            perf_events_total: self.perf_events_total.load(Ordering::Relaxed),
            perf_bytes_total: self.perf_bytes_total.load(Ordering::Relaxed),
            perf_events_update: self.perf_events_update.load(Ordering::Relaxed),
            perf_events_update_lost: self.perf_events_update_lost.load(Ordering::Relaxed),
            perf_events_destroy: self.perf_events_destroy.load(Ordering::Relaxed),
            perf_events_destroy_lost: self.perf_events_destroy_lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeStatsSnapshot {
    pub perf_events_total: u64,
    pub perf_bytes_total: u64,
    pub perf_events_update: u64,
    pub perf_events_update_lost: u64,
    pub perf_events_destroy: u64,
    pub perf_events_destroy_lost: u64,
}

/// Counters of one registered consumer.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    events_received: AtomicU64,
    events_lost: AtomicU64,
    queue_length: AtomicU64,
}

impl ConsumerStats {
    pub fn incr_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_lost(&self) {
        self.events_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_length(&self, len: u64) {
        self.queue_length.store(len, Ordering::Relaxed);
    }

    pub fn queue_length(&self) -> u64 {
        self.queue_length.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
            event_queue_length: self.queue_length.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub events_received: u64,
    pub events_lost: u64,
    pub event_queue_length: u64,
}

/// Counters of the event pipeline (probe sources fanning out to sinks).
#[derive(Debug, Default)]
pub struct PipelineStats {
    events_total: AtomicU64,
    events_update: AtomicU64,
    events_destroy: AtomicU64,
}

impl PipelineStats {
    pub fn incr_update(&self) {
        self.events_update.fetch_add(1, Ordering::Relaxed);
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_destroy(&self) {
        self.events_destroy.fetch_add(1, Ordering::Relaxed);
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue lengths come from the pipeline's source consumers and are
    /// sampled by the caller at snapshot time.
    pub fn snapshot(&self, update_queue: u64, destroy_queue: u64) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_update: self.events_update.load(Ordering::Relaxed),
            events_destroy: self.events_destroy.load(Ordering::Relaxed),
            update_queue_length: update_queue,
            destroy_queue_length: destroy_queue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub events_total: u64,
    pub events_update: u64,
    pub events_destroy: u64,
    pub update_queue_length: u64,
    pub destroy_queue_length: u64,
}
