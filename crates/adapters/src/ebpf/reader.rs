//! Per-CPU perf ring readers.
//!
//! A perf event array is one ring per CPU; each ring gets a pump task
//! reading batches and forwarding records plus lost-sample counts into
//! one channel per map. The probe's reader worker consumes that channel,
//! so per-CPU ordering is preserved and the probe sees a single stream.

use anyhow::{Context, anyhow};
use aya::maps::Map;
use aya::maps::perf::AsyncPerfEventArray;
use aya::util::online_cpus;
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use application::probe::RingMessage;

/// Pages per ring mapping; 2 pages keeps each reader at or above the
/// minimum 4 KiB buffer on every supported page size.
pub const RING_PAGES: usize = 2;

/// Read buffers handed to each `read_events` call.
const READ_BATCH: usize = 16;

/// Spawn one pump task per online CPU on `map`, forwarding into `tx`.
///
/// Pumps exit when `cancel` fires; dropping the last sender closes the
/// stream for the downstream reader worker.
pub fn spawn_ring_pumps(
    map: Map,
    tx: mpsc::Sender<RingMessage>,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut array: AsyncPerfEventArray<_> =
        AsyncPerfEventArray::try_from(map).context("opening perf event array")?;

    let cpus = online_cpus().map_err(|(_, e)| anyhow!("listing online CPUs: {e}"))?;
    let mut pumps = Vec::with_capacity(cpus.len());

    for cpu in cpus {
        let mut ring = array
            .open(cpu, Some(RING_PAGES))
            .with_context(|| format!("opening perf ring on cpu {cpu}"))?;
        let tx = tx.clone();
        let cancel = cancel.clone();

        pumps.push(tokio::spawn(async move {
            let mut buffers = (0..READ_BATCH)
                .map(|_| BytesMut::with_capacity(ebpf_common::acct::EVENT_LENGTH))
                .collect::<Vec<_>>();

            'pump: loop {
                let events = tokio::select! {
                    () = cancel.cancelled() => break 'pump,
                    events = ring.read_events(&mut buffers) => events,
                };

                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        error!(cpu, "perf ring read error: {e}");
                        break 'pump;
                    }
                };

                if events.lost > 0 {
                    if tx.send(RingMessage::Lost(events.lost as u64)).await.is_err() {
                        break 'pump;
                    }
                }
                for buf in buffers.iter().take(events.read) {
                    if tx.send(RingMessage::Record(buf.to_vec())).await.is_err() {
                        break 'pump;
                    }
                }
            }
            debug!(cpu, "perf ring pump exiting");
        }));
    }

    Ok(pumps)
}
