use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SinkError;

/// Kind of egress endpoint a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkType {
    Stdout,
    Stderr,
    InfluxUdp,
    InfluxHttp,
    Elasticsearch,
    Null,
}

impl SinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::InfluxUdp => "influxdb-udp",
            Self::InfluxHttp => "influxdb-http",
            Self::Elasticsearch => "elasticsearch",
            Self::Null => "null",
        }
    }
}

impl FromStr for SinkType {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            "influxdb-udp" => Ok(Self::InfluxUdp),
            "influxdb-http" => Ok(Self::InfluxHttp),
            "elastic" | "elasticsearch" => Ok(Self::Elasticsearch),
            "null" | "dummy" => Ok(Self::Null),
            other => Err(SinkError::UnknownSinkType(other.to_string())),
        }
    }
}

impl std::fmt::Display for SinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed configuration of one sink instance.
///
/// Zero values mean "use the sink's default". Options a given sink does
/// not recognize are simply not inspected by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub name: String,
    pub kind: SinkType,

    /// Flush the batch when it holds this many points (0 = sink default).
    pub batch_size: u32,
    /// Maximum datagram payload, UDP sinks only (0 = transport default).
    pub udp_payload_size: u16,
    /// Target address of the backing store.
    pub address: String,
    pub username: String,
    pub password: String,
    /// Database or index prefix of the backing store.
    pub database: String,
    /// Index shards, document stores only.
    pub shards: u16,
    /// Index replicas, document stores only.
    pub replicas: u16,
    /// Transport timeout (zero = transport default).
    pub timeout: Duration,
    /// Whether points carry the flow's source port. Off by default,
    /// source ports are ephemeral and explode series cardinality.
    pub emit_source_port: bool,

    pub wants_update: bool,
    pub wants_destroy: bool,
}

impl SinkConfig {
    pub fn new(name: impl Into<String>, kind: SinkType) -> Self {
        Self {
            name: name.into(),
            kind,
            batch_size: 0,
            udp_payload_size: 0,
            address: String::new(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            shards: 0,
            replicas: 0,
            timeout: Duration::ZERO,
            emit_source_port: false,
            wants_update: true,
            wants_destroy: true,
        }
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.name.is_empty() {
            return Err(SinkError::EmptyName);
        }
        Ok(())
    }
}
