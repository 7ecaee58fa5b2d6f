//! Shared test doubles for port traits.

use std::sync::Mutex;

use async_trait::async_trait;

use domain::flow::entity::{Event, EventKind};
use domain::sink::entity::SinkConfig;
use domain::sink::error::SinkError;
use domain::sink::stats::{SinkStats, SinkStatsSnapshot};

use crate::secondary::event_sink::AcctSink;
use crate::secondary::symbol_table::SymbolTable;

/// In-memory sink capturing every pushed event.
pub struct MemorySink {
    name: String,
    ready: bool,
    wants_update: bool,
    wants_destroy: bool,
    stats: SinkStats,
    pub events: Mutex<Vec<(EventKind, Event)>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            wants_update: true,
            wants_destroy: true,
            stats: SinkStats::default(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn updates_only(mut self) -> Self {
        self.wants_destroy = false;
        self
    }

    pub fn destroys_only(mut self) -> Self {
        self.wants_update = false;
        self
    }

    fn record(&self, kind: EventKind, event: Event) {
        self.stats.incr_pushed(kind);
        self.events
            .lock()
            .expect("memory sink lock poisoned")
            .push((kind, event));
    }
}

#[async_trait]
impl AcctSink for MemorySink {
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError> {
        config.validate()?;
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
        self.record(EventKind::Update, event);
    }

    fn push_destroy(&self, event: Event) {
        self.record(EventKind::Destroy, event);
    }

    fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Symbol table backed by a fixed list.
pub struct StaticSymbolTable {
    symbols: Vec<String>,
}

impl StaticSymbolTable {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }
}

impl SymbolTable for StaticSymbolTable {
    fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}
