//! Agent configuration: structs, parsing, and validation.
//!
//! Split across sub-modules:
//! - `common`: shared helpers, log settings and `ConfigError`
//! - `probe`: rate curve section
//! - `sink`: per-sink option sections

mod common;
mod probe;
mod sink;

pub use common::{ConfigError, LogFormat, LogLevel, parse_duration};
pub use probe::{CurvePointSection, CurveSection, ProbeSection};
pub use sink::SinkSection;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use domain::sink::entity::SinkConfig;

use crate::constants::{
    DEFAULT_API_ENDPOINT, DEFAULT_PPROF_ENDPOINT, DEFAULT_PROBE_OBJECT_DIR, DEFAULT_TRACEFS_PATH,
};

/// Top-level agent configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Serve the statistics API.
    #[serde(default)]
    pub api_enabled: bool,

    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Apply the conntrack accounting sysctls before starting.
    #[serde(default = "default_true")]
    pub sysctl_manage: bool,

    #[serde(default)]
    pub pprof_enabled: bool,

    #[serde(default = "default_pprof_endpoint")]
    pub pprof_endpoint: String,

    /// Directory holding the compiled probe object files.
    #[serde(default = "default_probe_object_dir")]
    pub probe_object_dir: String,

    /// Tracing filesystem mount point.
    #[serde(default = "default_tracefs_path")]
    pub tracefs_path: String,

    #[serde(default)]
    pub probe: ProbeSection,

    #[serde(default)]
    pub sinks: BTreeMap<String, SinkSection>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_pprof_endpoint() -> String {
    DEFAULT_PPROF_ENDPOINT.to_string()
}

fn default_probe_object_dir() -> String {
    DEFAULT_PROBE_OBJECT_DIR.to_string()
}

fn default_tracefs_path() -> String {
    DEFAULT_TRACEFS_PATH.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        // An absent config file behaves like an empty one.
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            api_enabled: false,
            api_endpoint: default_api_endpoint(),
            sysctl_manage: true,
            pprof_enabled: false,
            pprof_endpoint: default_pprof_endpoint(),
            probe_object_dir: default_probe_object_dir(),
            tracefs_path: default_tracefs_path(),
            probe: ProbeSection::default(),
            sinks: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        Ok(config)
    }

    /// Resolve the typed configuration of every configured sink.
    pub fn sink_configs(&self) -> Result<Vec<SinkConfig>, ConfigError> {
        self.sinks
            .iter()
            .map(|(name, section)| {
                section
                    .to_sink_config(name)
                    .map_err(|e| ConfigError::Validation {
                        field: format!("sinks.{name}"),
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
