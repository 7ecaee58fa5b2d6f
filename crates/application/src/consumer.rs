use std::sync::Arc;

use tokio::sync::mpsc;

use domain::flow::entity::{Event, EventKind};
use domain::probe::stats::ConsumerStats;

/// Interest mask of a consumer: which event kinds it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerMode(u8);

impl ConsumerMode {
    pub const UPDATE: Self = Self(0b01);
    pub const DESTROY: Self = Self(0b10);
    pub const BOTH: Self = Self(0b11);

    pub fn wants(self, kind: EventKind) -> bool {
        match kind {
            EventKind::Update => self.0 & Self::UPDATE.0 != 0,
            EventKind::Destroy => self.0 & Self::DESTROY.0 != 0,
        }
    }
}

/// A named, bounded receiver of probe events.
///
/// Owned by the probe's registry; the registering caller keeps the
/// receiving half of the channel. Dropping the consumer (on removal)
/// drops the sender, which closes the channel exactly once.
pub struct Consumer {
    name: String,
    mode: ConsumerMode,
    events: mpsc::Sender<(EventKind, Event)>,
    stats: Arc<ConsumerStats>,
}

impl Consumer {
    pub fn new(
        name: impl Into<String>,
        mode: ConsumerMode,
        events: mpsc::Sender<(EventKind, Event)>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            events,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Non-blocking delivery attempt. A full channel counts the event as
    /// lost; the caller is never blocked by a slow consumer.
    pub fn offer(&self, kind: EventKind, event: Event) {
        if !self.mode.wants(kind) {
            return;
        }
        match self.events.try_send((kind, event)) {
            Ok(()) => {
                self.stats.incr_received();
                let queued = self.events.max_capacity() - self.events.capacity();
                self.stats.set_queue_length(queued as u64);
            }
            Err(_) => self.stats.incr_lost(),
        }
    }
}
