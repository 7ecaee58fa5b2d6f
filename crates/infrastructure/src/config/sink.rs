//! Sink section of the config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use domain::sink::entity::{SinkConfig, SinkType};
use domain::sink::error::SinkError;

use super::common::duration_string;

/// One entry under `sinks:`, keyed by sink name.
///
/// Keys a sink type does not use are decoded and ignored; unknown keys
/// are ignored outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSection {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub batch_size: u32,
    #[serde(default)]
    pub udp_payload_size: u16,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub shards: u16,
    #[serde(default)]
    pub replicas: u16,
    #[serde(default, with = "duration_string")]
    pub timeout: Duration,
    #[serde(default)]
    pub emit_source_port: bool,
    #[serde(default = "default_true")]
    pub wants_update: bool,
    #[serde(default = "default_true")]
    pub wants_destroy: bool,
}

fn default_true() -> bool {
    true
}

impl SinkSection {
    /// Convert into the typed domain config, resolving the type string.
    pub fn to_sink_config(&self, name: &str) -> Result<SinkConfig, SinkError> {
        let kind: SinkType = self.kind.parse()?;
        let mut cfg = SinkConfig::new(name, kind);
        cfg.batch_size = self.batch_size;
        cfg.udp_payload_size = self.udp_payload_size;
        cfg.address = self.address.clone();
        cfg.username = self.username.clone();
        cfg.password = self.password.clone();
        cfg.database = self.database.clone();
        cfg.shards = self.shards;
        cfg.replicas = self.replicas;
        cfg.timeout = self.timeout;
        cfg.emit_source_port = self.emit_source_port;
        cfg.wants_update = self.wants_update;
        cfg.wants_destroy = self.wants_destroy;
        cfg.validate()?;
        Ok(cfg)
    }
}
