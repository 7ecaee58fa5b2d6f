use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use domain::flow::entity::{Event, EventKind};
use domain::probe::error::ProbeError;
use domain::probe::stats::{ConsumerStats, PipelineStats, PipelineStatsSnapshot, ProbeStatsSnapshot};
use domain::sink::stats::SinkStatsSnapshot;
use ports::secondary::event_sink::AcctSink;

use crate::consumer::ConsumerMode;
use crate::probe::Probe;

/// Capacity of the pipeline's source channels from the probe.
const SOURCE_CHANNEL_CAPACITY: usize = 1024;

const UPDATE_SOURCE: &str = "PipelineAcctUpdate";
const DESTROY_SOURCE: &str = "PipelineAcctDestroy";

struct PipelineState {
    started: bool,
    update_rx: Option<mpsc::Receiver<(EventKind, Event)>>,
    destroy_rx: Option<mpsc::Receiver<(EventKind, Event)>>,
    workers: Vec<JoinHandle<()>>,
}

/// The accounting data pipeline: two probe consumers as sources, a
/// dynamic set of sinks as destinations.
///
/// One worker per source reads events and fans them out to every sink
/// interested in the event kind; sink pushes are non-blocking by the
/// sink contract, so a slow store never backs up into the probe.
pub struct Pipeline {
    probe: Arc<Probe>,
    sinks: Arc<RwLock<Vec<Arc<dyn AcctSink>>>>,
    stats: Arc<PipelineStats>,
    update_source: Arc<ConsumerStats>,
    destroy_source: Arc<ConsumerStats>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Wire a pipeline to `probe` by registering its two source
    /// consumers.
    pub fn new(probe: Arc<Probe>) -> Result<Self, ProbeError> {
        let (update_tx, update_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        let (destroy_tx, destroy_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);

        let update_source =
            probe.register_consumer(UPDATE_SOURCE, ConsumerMode::UPDATE, update_tx)?;
        let destroy_source =
            probe.register_consumer(DESTROY_SOURCE, ConsumerMode::DESTROY, destroy_tx)?;

        Ok(Self {
            probe,
            sinks: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(PipelineStats::default()),
            update_source,
            destroy_source,
            state: Mutex::new(PipelineState {
                started: false,
                update_rx: Some(update_rx),
                destroy_rx: Some(destroy_rx),
                workers: Vec::new(),
            }),
        })
    }

    /// Register an initialized sink. Events start flowing to it with the
    /// next fan-out pass.
    pub fn register_sink(&self, sink: Arc<dyn AcctSink>) {
        info!(sink = sink.name(), "sink registered with pipeline");
        self.sinks.write().expect("sink registry poisoned").push(sink);
    }

    /// Start the fan-out workers and the probe itself.
    pub async fn start(&self) -> Result<(), ProbeError> {
        let mut state = self.state.lock().await;
        if state.started {
            return Err(ProbeError::AlreadyStarted);
        }

        // Workers first so no source events pile up unread.
        let update_rx = state
            .update_rx
            .take()
            .ok_or_else(|| ProbeError::AttachFailed("update source consumed".into()))?;
        let destroy_rx = state
            .destroy_rx
            .take()
            .ok_or_else(|| ProbeError::AttachFailed("destroy source consumed".into()))?;

        state.workers.push(tokio::spawn(sink_worker(
            update_rx,
            Arc::clone(&self.sinks),
            Arc::clone(&self.stats),
        )));
        state.workers.push(tokio::spawn(sink_worker(
            destroy_rx,
            Arc::clone(&self.sinks),
            Arc::clone(&self.stats),
        )));

        self.probe.start().await?;
        state.started = true;
        info!("pipeline started");
        Ok(())
    }

    /// Stop the probe, drain the sources and join the workers.
    pub async fn stop(&self) -> Result<(), ProbeError> {
        let mut state = self.state.lock().await;
        if !state.started {
            return Err(ProbeError::NotStarted);
        }

        self.probe.stop().await?;

        // Removing the source consumers closes their channels; the
        // workers drain what is buffered and exit.
        self.probe.remove_consumer(UPDATE_SOURCE)?;
        self.probe.remove_consumer(DESTROY_SOURCE)?;
        for handle in state.workers.drain(..) {
            let _ = handle.await;
        }
        state.started = false;
        info!("pipeline stopped");
        Ok(())
    }

    pub fn probe_stats(&self) -> ProbeStatsSnapshot {
        self.probe.stats()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot(
            self.update_source.queue_length(),
            self.destroy_source.queue_length(),
        )
    }

    /// Per-sink stats snapshots, keyed by sink name.
    pub fn sink_stats(&self) -> BTreeMap<String, SinkStatsSnapshot> {
        self.sinks
            .read()
            .expect("sink registry poisoned")
            .iter()
            .map(|s| (s.name().to_string(), s.stats()))
            .collect()
    }
}

/// Reads one source channel and delivers to all interested sinks.
async fn sink_worker(
    mut rx: mpsc::Receiver<(EventKind, Event)>,
    sinks: Arc<RwLock<Vec<Arc<dyn AcctSink>>>>,
    stats: Arc<PipelineStats>,
) {
    while let Some((kind, event)) = rx.recv().await {
        match kind {
            EventKind::Update => stats.incr_update(),
            EventKind::Destroy => stats.incr_destroy(),
        }

        let sinks = sinks.read().expect("sink registry poisoned");
        for sink in sinks.iter() {
            match kind {
                EventKind::Update if sink.wants_update() => sink.push_update(event.clone()),
                EventKind::Destroy if sink.wants_destroy() => sink.push_destroy(event.clone()),
                _ => {}
            }
        }
    }
    debug!("pipeline source closed, sink worker exiting");
}
