//! Elasticsearch sink for flow archival.
//!
//! Documents are staged in a shared batcher and indexed with one bulk
//! request per batch into a daily index `<database>-YYYY.MM.DD`. Init
//! verifies the cluster is reachable and installs the index templates.

pub mod document;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use domain::flow::entity::{Event, EventKind};
use domain::sink::entity::{SinkConfig, SinkType};
use domain::sink::error::SinkError;
use domain::sink::stats::{SinkStats, SinkStatsSnapshot};
use ports::secondary::event_sink::AcctSink;

use crate::clock::BootClock;
use crate::sinks::batch::{Batcher, SEND_QUEUE_DEPTH, spawn_ticker};

use document::FlowDocument;

const DEFAULT_ADDRESS: &str = "http://localhost:9200";
const DEFAULT_DATABASE: &str = "conntracct";
const DEFAULT_BATCH_SIZE: u32 = 2048;
const DEFAULT_SHARDS: u16 = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Archive batches are large; a longer flush period than the metrics
/// sinks keeps bulk requests reasonably sized.
const FLUSH_PERIOD: Duration = Duration::from_secs(5);

pub struct ElasticSink {
    name: String,
    ready: bool,
    wants_update: bool,
    wants_destroy: bool,
    hostname: String,
    stats: Arc<SinkStats>,
    batcher: Option<Arc<Batcher<FlowDocument>>>,
    clock: Arc<BootClock>,
    cancel: CancellationToken,
}

impl ElasticSink {
    pub fn new(clock: Arc<BootClock>) -> Self {
        Self {
            name: String::new(),
            ready: false,
            wants_update: true,
            wants_destroy: true,
            hostname: String::new(),
            stats: Arc::new(SinkStats::default()),
            batcher: None,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    fn push(&self, kind: EventKind, event: &Event) {
        let Some(batcher) = &self.batcher else {
            return;
        };
        let doc = FlowDocument::new(kind, event, &self.hostname, &self.clock);
        self.stats.incr_pushed(kind);
        batcher.push(doc);
    }
}

impl Drop for ElasticSink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl AcctSink for ElasticSink {
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError> {
        if self.ready {
            return Err(SinkError::AlreadyInitialized);
        }
        config.validate()?;
        if config.kind != SinkType::Elasticsearch {
            return Err(SinkError::InitFailed(format!(
                "elasticsearch sink cannot handle type '{}'",
                config.kind
            )));
        }

        let address = if config.address.is_empty() {
            DEFAULT_ADDRESS.to_string()
        } else {
            config.address.trim_end_matches('/').to_string()
        };
        let database = if config.database.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            config.database.clone()
        };
        let batch_size = if config.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            config.batch_size
        };
        let shards = if config.shards == 0 {
            DEFAULT_SHARDS
        } else {
            config.shards
        };
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::InitFailed(format!("building HTTP client: {e}")))?;

        let es = EsEndpoint {
            client,
            address,
            database,
            username: config.username.clone(),
            password: config.password.clone(),
        };

        es.ping().await?;
        es.install_template(
            &templates::mappings_template_name(&es.database),
            &templates::mappings_template(&es.database),
        )
        .await?;
        es.install_template(
            &templates::settings_template_name(&es.database),
            &templates::settings_template(&es.database, shards, config.replicas),
        )
        .await?;

        self.hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (batcher, rx) =
            Batcher::new(batch_size as usize, SEND_QUEUE_DEPTH, Arc::clone(&self.stats));
        spawn_ticker(Arc::clone(&batcher), FLUSH_PERIOD, self.cancel.clone());
        tokio::spawn(send_worker(
            rx,
            es,
            Arc::clone(&self.stats),
            config.name.clone(),
        ));

        self.name = config.name.clone();
        self.wants_update = config.wants_update;
        self.wants_destroy = config.wants_destroy;
        self.batcher = Some(batcher);
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
        self.push(EventKind::Update, &event);
    }

    fn push_destroy(&self, event: Event) {
        self.push(EventKind::Destroy, &event);
    }

    fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

struct EsEndpoint {
    client: reqwest::Client,
    address: String,
    database: String,
    username: String,
    password: String,
}

impl EsEndpoint {
    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn ping(&self) -> Result<(), SinkError> {
        let resp = self
            .request(self.client.get(&self.address))
            .send()
            .await
            .map_err(|e| SinkError::InitFailed(format!("pinging {}: {e}", self.address)))?;
        if !resp.status().is_success() {
            return Err(SinkError::InitFailed(format!(
                "ping to {} returned {}",
                self.address,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn install_template(&self, name: &str, body: &Value) -> Result<(), SinkError> {
        let url = format!("{}/_template/{name}", self.address);
        let resp = self
            .request(self.client.put(&url).json(body))
            .send()
            .await
            .map_err(|e| SinkError::InitFailed(format!("installing template '{name}': {e}")))?;
        if !resp.status().is_success() {
            return Err(SinkError::InitFailed(format!(
                "installing template '{name}' returned {}",
                resp.status()
            )));
        }
        debug!(template = name, "index template installed");
        Ok(())
    }

    /// Bulk-index one batch into the daily index, returning the number
    /// of documents the cluster rejected.
    async fn bulk_index(&self, batch: &[FlowDocument]) -> Result<u64, String> {
        let index = daily_index(&self.database);
        let url = format!("{}/{index}/_bulk", self.address);
        let body = bulk_body(batch);

        let resp = self
            .request(
                self.client
                    .post(&url)
                    .header("content-type", "application/x-ndjson")
                    .body(body),
            )
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("server returned {}", resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| e.to_string())?;
        Ok(count_bulk_failures(&body))
    }
}

/// Index name for a batch sent now: `<database>-YYYY.MM.DD` (UTC).
fn daily_index(database: &str) -> String {
    format!("{database}-{}", Utc::now().format("%Y.%m.%d"))
}

/// NDJSON bulk request body: an index action line per document.
fn bulk_body(batch: &[FlowDocument]) -> String {
    let mut body = String::with_capacity(batch.len() * 256);
    for doc in batch {
        body.push_str("{\"index\":{}}\n");
        // FlowDocument contains nothing unserializable.
        if let Ok(json) = serde_json::to_string(doc) {
            body.push_str(&json);
        }
        body.push('\n');
    }
    body
}

/// Count failed items in a bulk response.
fn count_bulk_failures(resp: &Value) -> u64 {
    if resp["errors"] != Value::Bool(true) {
        return 0;
    }
    resp["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["index"]["error"].is_object())
                .count() as u64
        })
        .unwrap_or(0)
}

async fn send_worker(
    mut rx: mpsc::Receiver<Vec<FlowDocument>>,
    es: EsEndpoint,
    stats: Arc<SinkStats>,
    name: String,
) {
    while let Some(batch) = rx.recv().await {
        stats.set_batch_queue_length(rx.len() as u64);

        match es.bulk_index(&batch).await {
            Ok(failed) => {
                stats.incr_batches_sent();
                for _ in 0..failed {
                    stats.incr_event_failed();
                }
                if failed > 0 {
                    error!(sink = %name, failed, "bulk response reported failed documents");
                }
            }
            Err(e) => {
                stats.incr_batches_dropped();
                error!(sink = %name, "error sending bulk request: {e}; batch dropped");
            }
        }
    }
}
