use async_trait::async_trait;

use domain::flow::entity::{Event, EventKind};
use domain::sink::entity::SinkConfig;
use domain::sink::error::SinkError;
use domain::sink::stats::{SinkStats, SinkStatsSnapshot};
use ports::secondary::event_sink::AcctSink;

/// Sink that accepts and discards everything. Useful for benchmarking
/// the pipeline without a store behind it.
pub struct NullSink {
    name: String,
    ready: bool,
    stats: SinkStats,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            ready: false,
            stats: SinkStats::default(),
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcctSink for NullSink {
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError> {
        if self.ready {
            return Err(SinkError::AlreadyInitialized);
        }
        config.validate()?;
        self.name = config.name.clone();
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn wants_update(&self) -> bool {
        true
    }

    fn wants_destroy(&self) -> bool {
        true
    }

    fn push_update(&self, _event: Event) {
        self.stats.incr_pushed(EventKind::Update);
    }

    fn push_destroy(&self, _event: Event) {
        self.stats.incr_pushed(EventKind::Destroy);
    }

    fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::sink::entity::SinkType;

    fn event() -> Event {
        Event::decode(&vec![0u8; ebpf_common::acct::EVENT_LENGTH]).unwrap()
    }

    #[tokio::test]
    async fn counts_pushes() {
        let mut sink = NullSink::new();
        sink.init(&SinkConfig::new("drop", SinkType::Null)).await.unwrap();
        assert!(sink.is_ready());
        assert_eq!(sink.name(), "drop");

        sink.push_update(event());
        sink.push_update(event());
        sink.push_destroy(event());

        let snap = sink.stats();
        assert_eq!(snap.events_pushed_update, 2);
        assert_eq!(snap.events_pushed_destroy, 1);
        assert_eq!(snap.events_dropped, 0);
    }

    #[tokio::test]
    async fn double_init_rejected() {
        let mut sink = NullSink::new();
        let cfg = SinkConfig::new("drop", SinkType::Null);
        sink.init(&cfg).await.unwrap();
        assert!(matches!(
            sink.init(&cfg).await,
            Err(SinkError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let mut sink = NullSink::new();
        let cfg = SinkConfig::new("", SinkType::Null);
        assert!(matches!(sink.init(&cfg).await, Err(SinkError::EmptyName)));
        assert!(!sink.is_ready());
    }
}
