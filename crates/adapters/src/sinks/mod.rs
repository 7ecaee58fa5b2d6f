//! Sink adapters and their construction.

pub mod batch;
pub mod elastic;
pub mod influxdb;
pub mod null;
pub mod stdout;

use std::sync::Arc;

use domain::sink::entity::{SinkConfig, SinkType};
use domain::sink::error::SinkError;
use ports::secondary::event_sink::AcctSink;

use crate::clock::BootClock;

pub use elastic::ElasticSink;
pub use influxdb::InfluxSink;
pub use null::NullSink;
pub use stdout::StdoutSink;

/// Build and initialize the sink described by `config`.
pub async fn new_sink(
    config: &SinkConfig,
    clock: Arc<BootClock>,
) -> Result<Arc<dyn AcctSink>, SinkError> {
    match config.kind {
        SinkType::Stdout | SinkType::Stderr => {
            let mut sink = StdoutSink::new();
            sink.init(config).await?;
            Ok(Arc::new(sink))
        }
        SinkType::InfluxUdp | SinkType::InfluxHttp => {
            let mut sink = InfluxSink::new(clock);
            sink.init(config).await?;
            Ok(Arc::new(sink))
        }
        SinkType::Elasticsearch => {
            let mut sink = ElasticSink::new(clock);
            sink.init(config).await?;
            Ok(Arc::new(sink))
        }
        SinkType::Null => {
            let mut sink = NullSink::new();
            sink.init(config).await?;
            Ok(Arc::new(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_builds_ready_sinks() {
        let clock = BootClock::start();
        for kind in [SinkType::Stdout, SinkType::Stderr, SinkType::Null] {
            let cfg = SinkConfig::new("s", kind);
            let sink = new_sink(&cfg, Arc::clone(&clock)).await.unwrap();
            assert!(sink.is_ready());
            assert_eq!(sink.name(), "s");
        }
    }

    #[tokio::test]
    async fn factory_propagates_init_failures() {
        let clock = BootClock::start();
        // UDP influx without an address cannot initialize.
        let cfg = SinkConfig::new("metrics", SinkType::InfluxUdp);
        assert!(new_sink(&cfg, clock).await.is_err());
    }
}
