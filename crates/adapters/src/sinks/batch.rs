//! Shared batching machinery for sinks with batched transports.
//!
//! A `Batcher` owns the current batch under a mutex and a bounded send
//! queue. Appends flush on the size watermark; a tick worker flushes on
//! a period. Both flushes enqueue non-blockingly: a full send queue
//! drops the batch and counts it, the push path never waits on the
//! transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use domain::sink::stats::SinkStats;

/// Default depth of a sink's send queue.
pub const SEND_QUEUE_DEPTH: usize = 64;

/// Smallest allowed flush period.
pub const MIN_FLUSH_PERIOD: Duration = Duration::from_millis(100);

pub struct Batcher<T> {
    batch: Mutex<Vec<T>>,
    tx: mpsc::Sender<Vec<T>>,
    capacity: usize,
    stats: Arc<SinkStats>,
}

impl<T: Send + 'static> Batcher<T> {
    /// New batcher flushing at `capacity` items, with a send queue of
    /// `queue_depth` batches. The receiver goes to the sink's send
    /// worker.
    pub fn new(
        capacity: usize,
        queue_depth: usize,
        stats: Arc<SinkStats>,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<T>>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (
            Arc::new(Self {
                batch: Mutex::new(Vec::with_capacity(capacity)),
                tx,
                capacity,
                stats,
            }),
            rx,
        )
    }

    /// Append one item; flushes when the watermark is reached.
    pub fn push(&self, item: T) {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        batch.push(item);
        let len = batch.len();
        self.stats.set_batch_length(len as u64);

        if len >= self.capacity {
            self.flush_locked(&mut batch);
        }
    }

    /// Flush the current batch if it holds anything.
    pub fn flush(&self) {
        let mut batch = self.batch.lock().expect("batch lock poisoned");
        if !batch.is_empty() {
            self.flush_locked(&mut batch);
        }
    }

    fn flush_locked(&self, batch: &mut Vec<T>) {
        let full = std::mem::replace(batch, Vec::with_capacity(self.capacity));
        self.stats.set_batch_length(0);

        match self.tx.try_send(full) {
            Ok(()) => {
                self.stats.incr_batches_queued();
                let queued = self.tx.max_capacity() - self.tx.capacity();
                self.stats.set_batch_queue_length(queued as u64);
            }
            // No receiver ready and the queue is full: the batch is gone.
            Err(_) => self.stats.incr_batches_dropped(),
        }
    }
}

/// Periodic flusher for `batcher`, exiting when `cancel` fires.
pub fn spawn_ticker<T: Send + 'static>(
    batcher: Arc<Batcher<T>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_FLUSH_PERIOD);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => batcher.flush(),
            }
        }
    })
}
