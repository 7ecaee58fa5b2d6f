//! Standard output/error sink.
//!
//! Non-batching: one bounded event channel, one writer worker printing
//! one line per event, flushed after every line so output interleaves
//! sanely with other writers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::error;

use domain::flow::entity::{Event, EventKind};
use domain::sink::entity::{SinkConfig, SinkType};
use domain::sink::error::SinkError;
use domain::sink::stats::{SinkStats, SinkStatsSnapshot};
use ports::secondary::event_sink::AcctSink;

/// Default event buffer length when `batch_size` is unset.
const DEFAULT_BUFFER: u32 = 2048;

pub struct StdoutSink {
    name: String,
    ready: bool,
    wants_update: bool,
    wants_destroy: bool,
    stats: Arc<SinkStats>,
    events: Option<mpsc::Sender<(EventKind, Event)>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            ready: false,
            wants_update: true,
            wants_destroy: true,
            stats: Arc::new(SinkStats::default()),
            events: None,
        }
    }

    fn push(&self, kind: EventKind, event: Event) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send((kind, event)) {
            Ok(()) => {
                self.stats.incr_pushed(kind);
                let queued = events.max_capacity() - events.capacity();
                self.stats.set_batch_length(queued as u64);
            }
            Err(_) => self.stats.incr_dropped(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcctSink for StdoutSink {
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError> {
        if self.ready {
            return Err(SinkError::AlreadyInitialized);
        }
        config.validate()?;

        let buffer = if config.batch_size == 0 {
            DEFAULT_BUFFER
        } else {
            config.batch_size
        };

        let writer = match config.kind {
            SinkType::Stdout => Writer::Stdout(tokio::io::stdout()),
            SinkType::Stderr => Writer::Stderr(tokio::io::stderr()),
            other => {
                return Err(SinkError::InitFailed(format!(
                    "stdout sink cannot handle type '{other}'"
                )));
            }
        };

        let (tx, rx) = mpsc::channel(buffer as usize);
        tokio::spawn(write_worker(rx, writer, Arc::clone(&self.stats), config.name.clone()));

        self.name = config.name.clone();
        self.wants_update = config.wants_update;
        self.wants_destroy = config.wants_destroy;
        self.events = Some(tx);
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
        self.wants_update
    }

    fn wants_destroy(&self) -> bool {
        self.wants_destroy
    }

    fn push_update(&self, event: Event) {
        self.push(EventKind::Update, event);
    }

    fn push_destroy(&self, event: Event) {
        self.push(EventKind::Destroy, event);
    }

    fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

enum Writer {
    Stdout(tokio::io::Stdout),
    Stderr(tokio::io::Stderr),
}

impl Writer {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => {
                w.write_all(line.as_bytes()).await?;
                w.flush().await
            }
            Self::Stderr(w) => {
                w.write_all(line.as_bytes()).await?;
                w.flush().await
            }
        }
    }
}

async fn write_worker(
    mut rx: mpsc::Receiver<(EventKind, Event)>,
    mut writer: Writer,
    stats: Arc<SinkStats>,
    name: String,
) {
    while let Some((kind, event)) = rx.recv().await {
        let line = format_line(kind, &event);
        match writer.write_line(&line).await {
            Ok(()) => stats.incr_batches_sent(),
            Err(e) => {
                stats.incr_batches_dropped();
                error!(sink = %name, "error writing event: {e}");
            }
        }
    }
}

fn format_line(kind: EventKind, event: &Event) -> String {
    let prefix = match kind {
        EventKind::Update => "Update",
        EventKind::Destroy => "Destroy",
    };
    format!("{prefix}: {event:?}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(proto: u8) -> Event {
        let mut b = vec![0u8; ebpf_common::acct::EVENT_LENGTH];
        b[96] = proto;
        Event::decode(&b).unwrap()
    }

    #[test]
    fn line_format_is_prefixed_and_complete() {
        let line = format_line(EventKind::Update, &event(6));
        assert!(line.starts_with("Update: Event {"));
        assert!(line.ends_with("}\n"));
        assert!(line.contains("proto: 6"));

        let line = format_line(EventKind::Destroy, &event(17));
        assert!(line.starts_with("Destroy: "));
    }

    #[tokio::test]
    async fn init_and_push_counts() {
        let mut sink = StdoutSink::new();
        sink.init(&SinkConfig::new("console", SinkType::Stdout))
            .await
            .unwrap();
        assert!(sink.is_ready());

        sink.push_update(event(6));
        sink.push_destroy(event(17));
        let snap = sink.stats();
        assert_eq!(snap.events_pushed_update, 1);
        assert_eq!(snap.events_pushed_destroy, 1);
    }

    #[tokio::test]
    async fn overflow_counts_drops() {
        let mut sink = StdoutSink::new();
        let mut cfg = SinkConfig::new("console", SinkType::Stderr);
        cfg.batch_size = 1;
        sink.init(&cfg).await.unwrap();

        // The worker may drain some entries; pushing many guarantees at
        // least one overflow on a single-slot buffer.
        for _ in 0..500 {
            sink.push_update(event(6));
        }
        let snap = sink.stats();
        assert!(snap.events_dropped > 0);
    }

    #[tokio::test]
    async fn rejects_non_stdio_types() {
        let mut sink = StdoutSink::new();
        let cfg = SinkConfig::new("x", SinkType::Null);
        assert!(matches!(
            sink.init(&cfg).await,
            Err(SinkError::InitFailed(_))
        ));
    }
}
