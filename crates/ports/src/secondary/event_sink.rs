use async_trait::async_trait;

use domain::flow::entity::Event;
use domain::sink::entity::SinkConfig;
use domain::sink::error::SinkError;
use domain::sink::stats::SinkStatsSnapshot;

/// Secondary port for accounting event egress.
///
/// Implemented by the sink adapters (stdout, line protocol, document
/// store). Push methods MUST be non-blocking and safe for concurrent
/// callers: the pipeline workers call them from the event hot path and
/// never wait on a slow store. Delivery failures are accounted in the
/// sink's stats, not propagated.
#[async_trait]
pub trait AcctSink: Send + Sync {
    /// Initialize the sink with its configuration. Callable once; a
    /// failed init leaves the sink unusable and unregistered.
    async fn init(&mut self, config: &SinkConfig) -> Result<(), SinkError>;

    /// Whether `init` completed successfully.
    fn is_ready(&self) -> bool;

    fn name(&self) -> &str;

    /// Which event kinds this sink wants delivered.
    fn wants_update(&self) -> bool;
    fn wants_destroy(&self) -> bool;

    /// Enqueue a flow update event. Never blocks; overflow is counted.
    fn push_update(&self, event: Event);

    /// Enqueue a flow destroy event. Never blocks; overflow is counted.
    fn push_destroy(&self, event: Event);

    /// Snapshot of the sink's delivery counters.
    fn stats(&self) -> SinkStatsSnapshot;
}
