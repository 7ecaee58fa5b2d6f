//! InfluxDB sink, UDP and HTTP line-protocol variants.
//!
//! Points are staged in a shared batcher and shipped by one send worker.
//! The HTTP variant verifies connectivity and ensures the target
//! database exists at init; the UDP variant is fire-and-forget and honors
//! the configured maximum datagram payload.

pub mod line_protocol;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
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

use line_protocol::{encode_point, pack_payloads};

/// Flush the batch when it holds this many points, unless configured.
const DEFAULT_BATCH_SIZE: u32 = 128;

/// Default maximum UDP datagram payload.
const DEFAULT_UDP_PAYLOAD: u16 = 512;

/// Default HTTP endpoint and database.
const DEFAULT_HTTP_ADDRESS: &str = "http://localhost:8086";
const DEFAULT_DATABASE: &str = "conntracct";

/// Default transport timeout and batch flush period.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_PERIOD: Duration = Duration::from_secs(1);

pub struct InfluxSink {
    name: String,
    ready: bool,
    wants_update: bool,
    wants_destroy: bool,
    emit_source_port: bool,
    stats: Arc<SinkStats>,
    batcher: Option<Arc<Batcher<String>>>,
    clock: Arc<BootClock>,
    cancel: CancellationToken,
}

impl InfluxSink {
    pub fn new(clock: Arc<BootClock>) -> Self {
        Self {
            name: String::new(),
            ready: false,
            wants_update: true,
            wants_destroy: true,
            emit_source_port: false,
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
        let line = encode_point(
            event,
            self.clock.absolute_ns(event.timestamp),
            self.emit_source_port,
        );
        self.stats.incr_pushed(kind);
        batcher.push(line);
    }
}

impl Drop for InfluxSink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl AcctSink for InfluxSink {
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError> {
        if self.ready {
            return Err(SinkError::AlreadyInitialized);
        }
        config.validate()?;

        let transport = match config.kind {
            SinkType::InfluxUdp => udp_transport(config).await?,
            SinkType::InfluxHttp => http_transport(config).await?,
            other => {
                return Err(SinkError::InitFailed(format!(
                    "influx sink cannot handle type '{other}'"
                )));
            }
        };

        let batch_size = if config.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            config.batch_size
        };

        let (batcher, rx) =
            Batcher::new(batch_size as usize, SEND_QUEUE_DEPTH, Arc::clone(&self.stats));
        spawn_ticker(Arc::clone(&batcher), FLUSH_PERIOD, self.cancel.clone());
        tokio::spawn(send_worker(
            rx,
            transport,
            Arc::clone(&self.stats),
            config.name.clone(),
        ));

        self.name = config.name.clone();
        self.wants_update = config.wants_update;
        self.wants_destroy = config.wants_destroy;
        self.emit_source_port = config.emit_source_port;
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

enum Transport {
    Udp {
        socket: UdpSocket,
        payload_size: usize,
    },
    Http {
        client: reqwest::Client,
        write_url: String,
        username: String,
        password: String,
    },
}

async fn udp_transport(config: &SinkConfig) -> Result<Transport, SinkError> {
    if config.address.is_empty() {
        return Err(SinkError::InitFailed(
            "influxdb-udp requires an address".to_string(),
        ));
    }

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| SinkError::InitFailed(format!("binding UDP socket: {e}")))?;
    socket
        .connect(&config.address)
        .await
        .map_err(|e| SinkError::InitFailed(format!("connecting to {}: {e}", config.address)))?;

    let payload_size = if config.udp_payload_size == 0 {
        DEFAULT_UDP_PAYLOAD
    } else {
        config.udp_payload_size
    };

    Ok(Transport::Udp {
        socket,
        payload_size: payload_size as usize,
    })
}

async fn http_transport(config: &SinkConfig) -> Result<Transport, SinkError> {
    let address = if config.address.is_empty() {
        DEFAULT_HTTP_ADDRESS.to_string()
    } else {
        config.address.trim_end_matches('/').to_string()
    };
    let database = if config.database.is_empty() {
        DEFAULT_DATABASE.to_string()
    } else {
        config.database.clone()
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

    // Verify the server is reachable before accepting events.
    let ping = client
        .get(format!("{address}/ping"))
        .send()
        .await
        .map_err(|e| SinkError::InitFailed(format!("pinging {address}: {e}")))?;
    if !ping.status().is_success() {
        return Err(SinkError::InitFailed(format!(
            "ping to {address} returned {}",
            ping.status()
        )));
    }

    // Idempotent in InfluxQL; no-op when the database exists.
    let mut create = client
        .post(format!("{address}/query"))
        .form(&[("q", format!("CREATE DATABASE \"{database}\""))]);
    if !config.username.is_empty() {
        create = create.basic_auth(&config.username, Some(&config.password));
    }
    let resp = create
        .send()
        .await
        .map_err(|e| SinkError::InitFailed(format!("creating database '{database}': {e}")))?;
    if !resp.status().is_success() {
        return Err(SinkError::InitFailed(format!(
            "creating database '{database}' returned {}",
            resp.status()
        )));
    }
    debug!(database = %database, "influxdb database ensured");

    Ok(Transport::Http {
        client,
        write_url: format!("{address}/write?db={database}&precision=ns"),
        username: config.username.clone(),
        password: config.password.clone(),
    })
}

async fn send_worker(
    mut rx: mpsc::Receiver<Vec<String>>,
    transport: Transport,
    stats: Arc<SinkStats>,
    name: String,
) {
    while let Some(batch) = rx.recv().await {
        stats.set_batch_queue_length(rx.len() as u64);

        match send_batch(&transport, &batch).await {
            Ok(()) => stats.incr_batches_sent(),
            Err(e) => {
                stats.incr_batches_dropped();
                error!(sink = %name, "error writing batch: {e}; batch dropped");
            }
        }
    }
}

async fn send_batch(transport: &Transport, batch: &[String]) -> Result<(), String> {
    match transport {
        Transport::Udp {
            socket,
            payload_size,
        } => {
            for payload in pack_payloads(batch, *payload_size) {
                socket
                    .send(payload.as_bytes())
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        Transport::Http {
            client,
            write_url,
            username,
            password,
        } => {
            let mut req = client.post(write_url).body(batch.join("\n"));
            if !username.is_empty() {
                req = req.basic_auth(username, Some(password));
            }
            let resp = req.send().await.map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("server returned {}", resp.status()));
            }
            Ok(())
        }
    }
}
