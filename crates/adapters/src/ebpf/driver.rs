//! The kernel-side driver behind the application probe.
//!
//! Orders the whole bring-up: symbol precheck, object load, rate-curve
//! configuration (before any hook attaches, so the BPF object observes
//! fully-initialized configuration on its first invocation), per-hook
//! trace event + perf event attach in catalog order, ring readers last.
//! Teardown is the exact reverse.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use application::probe::{ProbeDriver, RingMessage, RingStreams, check_hook_symbols};
use domain::kernel::entity::KernelBuild;
use domain::probe::entity::ProbeConfig;
use domain::probe::error::ProbeError;
use ebpf_common::acct::{PERF_DESTROY_MAP, PERF_UPDATE_MAP};
use ports::secondary::symbol_table::SymbolTable;

use super::catalog;
use super::loader::AcctBpf;
use super::perf_event::PerfEvents;
use super::probe_config::ProbeConfigMaps;
use super::reader::spawn_ring_pumps;
use super::trace_event::TraceEvents;

/// Capacity of the channel between the ring pumps and a reader worker.
const RING_CHANNEL_CAPACITY: usize = 4096;

/// Driver for the accounting probe: owns the BPF collection, trace
/// events, perf event descriptors and ring pumps.
pub struct AcctProbeDriver {
    build: KernelBuild,
    bpf: AcctBpf,
    trace: TraceEvents,
    perf: PerfEvents,
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
}

impl AcctProbeDriver {
    /// Load and configure the probe for `build`, leaving it ready to
    /// attach. The object is resolved against `object_dirs` in order.
    pub fn prepare(
        build: KernelBuild,
        object_dirs: &[PathBuf],
        tracefs: &str,
        symbols: &dyn SymbolTable,
        config: &ProbeConfig,
    ) -> anyhow::Result<Self> {
        // Check kallsyms before the BPF load to fail with a named
        // symbol instead of an arcane attach error.
        check_hook_symbols(symbols, &build.hooks)?;

        let object = catalog::read_object(object_dirs, &build)?;
        let mut bpf = AcctBpf::load(&object)?;

        let mut maps = ProbeConfigMaps::new(&mut bpf)?;
        maps.apply(config)?;

        info!(version = %build.version, object = %build.object_file, "probe prepared");
        Ok(Self {
            build,
            bpf,
            trace: TraceEvents::new(tracefs),
            perf: PerfEvents::new(),
            cancel: CancellationToken::new(),
            pumps: Vec::new(),
        })
    }
}

impl ProbeDriver for AcctProbeDriver {
    fn attach(&mut self) -> Result<RingStreams, ProbeError> {
        let attach_err = |e: anyhow::Error| ProbeError::AttachFailed(format!("{e:#}"));

        // Hooks attach in catalog order; the catalog puts map-inserting
        // hooks last.
        for hook in &self.build.hooks {
            let trace_id = self.trace.create(hook).map_err(attach_err)?;
            let prog_fd = self
                .bpf
                .program_fd(&hook.program_name())
                .map_err(attach_err)?;
            self.perf
                .open_attach(trace_id, prog_fd)
                .map_err(attach_err)?;
            info!(symbol = %hook.symbol, kind = hook.kind.program_prefix(), "hook attached");
        }

        let (update_tx, update_rx) = mpsc::channel(RING_CHANNEL_CAPACITY);
        let (destroy_tx, destroy_rx) = mpsc::channel(RING_CHANNEL_CAPACITY);

        let update_map = self.bpf.take_map(PERF_UPDATE_MAP).map_err(attach_err)?;
        let destroy_map = self.bpf.take_map(PERF_DESTROY_MAP).map_err(attach_err)?;

        self.pumps.extend(
            spawn_ring_pumps(update_map, update_tx, self.cancel.clone()).map_err(attach_err)?,
        );
        self.pumps.extend(
            spawn_ring_pumps(destroy_map, destroy_tx, self.cancel.clone()).map_err(attach_err)?,
        );

        Ok(RingStreams {
            update: update_rx,
            destroy: destroy_rx,
        })
    }

    fn detach(&mut self) -> Result<(), ProbeError> {
        let detach_err = |e: anyhow::Error| ProbeError::AttachFailed(format!("{e:#}"));

        // Reverse order: readers first, then perf events, then trace
        // events. Cancelling the pumps drops the ring senders, which
        // closes the streams for the reader workers.
        self.cancel.cancel();
        self.pumps.clear();

        self.perf.close_all().map_err(detach_err)?;
        self.trace.remove_all().map_err(detach_err)?;
        info!(version = %self.build.version, "probe detached");
        Ok(())
    }
}
