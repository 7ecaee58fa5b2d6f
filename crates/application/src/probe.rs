use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use domain::flow::entity::{Event, EventKind};
use domain::kernel::entity::Hook;
use domain::kernel::error::KernelError;
use domain::probe::error::ProbeError;
use domain::probe::stats::{ConsumerStats, ProbeStats, ProbeStatsSnapshot};
use ports::secondary::symbol_table::SymbolTable;

use crate::consumer::{Consumer, ConsumerMode};

/// One message read off a perf ring.
#[derive(Debug)]
pub enum RingMessage {
    /// A raw accounting record.
    Record(Vec<u8>),
    /// The kernel overwrote `n` samples before user space kept up.
    Lost(u64),
}

/// The receiving ends of the two perf rings, handed out by the driver
/// when the probe attaches.
pub struct RingStreams {
    pub update: mpsc::Receiver<RingMessage>,
    pub destroy: mpsc::Receiver<RingMessage>,
}

/// Secondary interface over the kernel side of the probe.
///
/// The adapter implementation owns the loaded BPF collection, the trace
/// events, the perf event descriptors and the ring readers. `attach`
/// wires everything in catalog order; `detach` is the exact reverse and
/// closes the ring streams, which lets the reader workers drain and exit.
pub trait ProbeDriver: Send {
    fn attach(&mut self) -> Result<RingStreams, ProbeError>;
    fn detach(&mut self) -> Result<(), ProbeError>;
}

/// Verify every hook target exists before touching the kernel.
///
/// A missing symbol surfaces as a named error here instead of an arcane
/// attach failure later.
pub fn check_hook_symbols(table: &dyn SymbolTable, hooks: &[Hook]) -> Result<(), KernelError> {
    for hook in hooks {
        if !table.contains(&hook.symbol) {
            return Err(KernelError::SymbolMissing(hook.symbol.clone()));
        }
    }
    Ok(())
}

struct ProbeState {
    driver: Box<dyn ProbeDriver>,
    started: bool,
    workers: Vec<JoinHandle<()>>,
}

// Consumer registry and counters, shared with the reader workers.
struct Shared {
    consumers: RwLock<Vec<Arc<Consumer>>>,
    stats: ProbeStats,
}

impl Shared {
    /// Deliver one event to every interested consumer. Read-locks the
    /// registry; each delivery attempt is non-blocking.
    fn fan_out(&self, kind: EventKind, event: &Event) {
        let consumers = self.consumers.read().expect("consumer registry poisoned");
        for c in consumers.iter() {
            c.offer(kind, event.clone());
        }
    }
}

/// A BPF accounting probe running in the kernel.
///
/// Lifecycle: `new → started → stopped`, guarded by one mutex. `start`
/// attaches the program and spawns one reader worker per ring; `stop`
/// detaches and joins the workers. Consumers can be registered at any
/// point in the lifecycle.
pub struct Probe {
    state: Mutex<ProbeState>,
    shared: Arc<Shared>,
}

impl Probe {
    pub fn new(driver: Box<dyn ProbeDriver>) -> Self {
        Self {
            state: Mutex::new(ProbeState {
                driver,
                started: false,
                workers: Vec::new(),
            }),
            shared: Arc::new(Shared {
                consumers: RwLock::new(Vec::new()),
                stats: ProbeStats::default(),
            }),
        }
    }

    /// Attach the probe and start its reader workers.
    pub async fn start(&self) -> Result<(), ProbeError> {
        let mut state = self.state.lock().await;
        if state.started {
            return Err(ProbeError::AlreadyStarted);
        }

        let streams = state.driver.attach()?;

        state.workers.push(tokio::spawn(reader_worker(
            Arc::clone(&self.shared),
            streams.update,
            EventKind::Update,
        )));
        state.workers.push(tokio::spawn(reader_worker(
            Arc::clone(&self.shared),
            streams.destroy,
            EventKind::Destroy,
        )));

        state.started = true;
        info!("accounting probe started");
        Ok(())
    }

    /// Detach the probe, close the rings and join the reader workers.
    pub async fn stop(&self) -> Result<(), ProbeError> {
        let mut state = self.state.lock().await;
        if !state.started {
            return Err(ProbeError::NotStarted);
        }

        state.driver.detach()?;

        for handle in state.workers.drain(..) {
            let _ = handle.await;
        }
        info!("accounting probe stopped");
        Ok(())
    }

    /// Register a named consumer. The caller keeps the receiving half of
    /// `events`; the returned stats handle stays valid for the consumer's
    /// lifetime.
    pub fn register_consumer(
        &self,
        name: &str,
        mode: ConsumerMode,
        events: mpsc::Sender<(EventKind, Event)>,
    ) -> Result<Arc<ConsumerStats>, ProbeError> {
        let mut consumers = self
            .shared
            .consumers
            .write()
            .expect("consumer registry poisoned");
        if consumers.iter().any(|c| c.name() == name) {
            return Err(ProbeError::DuplicateConsumer(name.to_string()));
        }
        let consumer = Arc::new(Consumer::new(name, mode, events));
        let stats = consumer.stats();
        consumers.push(consumer);
        debug!(consumer = name, "probe consumer registered");
        Ok(stats)
    }

    /// Remove a consumer by name, closing its channel.
    pub fn remove_consumer(&self, name: &str) -> Result<(), ProbeError> {
        let mut consumers = self
            .shared
            .consumers
            .write()
            .expect("consumer registry poisoned");
        match consumers.iter().position(|c| c.name() == name) {
            Some(idx) => {
                consumers.swap_remove(idx);
                debug!(consumer = name, "probe consumer removed");
                Ok(())
            }
            None => Err(ProbeError::NoSuchConsumer(name.to_string())),
        }
    }

    pub fn stats(&self) -> ProbeStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// Drains one perf ring: accounts lost samples, decodes records and fans
/// events out. Exits when the driver closes the ring.
async fn reader_worker(
    shared: Arc<Shared>,
    mut ring: mpsc::Receiver<RingMessage>,
    kind: EventKind,
) {
    while let Some(msg) = ring.recv().await {
        match msg {
            RingMessage::Lost(n) => {
                match kind {
                    EventKind::Update => shared.stats.incr_update_lost(n),
                    EventKind::Destroy => shared.stats.incr_destroy_lost(n),
                }
                continue;
            }
            RingMessage::Record(bytes) => {
                let event = match Event::decode(&bytes) {
                    Ok(event) => event,
                    // Record length diverging from the ABI means the
                    // agent and the BPF object disagree on the layout;
                    // every further record would be garbage.
                    Err(e) => panic!("fatal: {kind} ring: {e}"),
                };

                match kind {
                    EventKind::Update => shared.stats.incr_update(),
                    EventKind::Destroy => shared.stats.incr_destroy(),
                }

                shared.fan_out(kind, &event);
            }
        }
    }
    debug!(ring = %kind, "perf ring closed, reader worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebpf_common::acct::EVENT_LENGTH;
    use ports::test_utils::StaticSymbolTable;
    use domain::kernel::entity::HookKind;

    /// Driver handing out channels owned by the test.
    struct TestDriver {
        streams: Option<RingStreams>,
        detached: Arc<std::sync::atomic::AtomicBool>,
    }

    fn test_driver() -> (
        Box<TestDriver>,
        mpsc::Sender<RingMessage>,
        mpsc::Sender<RingMessage>,
        Arc<std::sync::atomic::AtomicBool>,
    ) {
        let (update_tx, update) = mpsc::channel(64);
        let (destroy_tx, destroy) = mpsc::channel(64);
        let detached = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let driver = Box::new(TestDriver {
            streams: Some(RingStreams { update, destroy }),
            detached: Arc::clone(&detached),
        });
        (driver, update_tx, destroy_tx, detached)
    }

    impl ProbeDriver for TestDriver {
        fn attach(&mut self) -> Result<RingStreams, ProbeError> {
            self.streams
                .take()
                .ok_or_else(|| ProbeError::AttachFailed("already attached".into()))
        }

        fn detach(&mut self) -> Result<(), ProbeError> {
            self.detached
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(proto: u8) -> Vec<u8> {
        let mut b = vec![0u8; EVENT_LENGTH];
        b[96] = proto;
        b
    }

    async fn drain_until(stats: &Probe, events: u64) {
        for _ in 0..200 {
            if stats.stats().perf_events_total >= events {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("probe never observed {events} events");
    }

    #[tokio::test]
    async fn start_twice_returns_already_started() {
        let (driver, _u, _d, _) = test_driver();
        let probe = Probe::new(driver);
        probe.start().await.unwrap();
        assert_eq!(probe.start().await.unwrap_err(), ProbeError::AlreadyStarted);
    }

    #[tokio::test]
    async fn stop_before_start_returns_not_started() {
        let (driver, _u, _d, _) = test_driver();
        let probe = Probe::new(driver);
        assert_eq!(probe.stop().await.unwrap_err(), ProbeError::NotStarted);
    }

    #[tokio::test]
    async fn stop_detaches_and_joins_workers() {
        let (driver, update_tx, destroy_tx, detached) = test_driver();
        let probe = Probe::new(driver);
        probe.start().await.unwrap();

        // Closing the rings lets the workers exit once detach runs.
        drop(update_tx);
        drop(destroy_tx);
        probe.stop().await.unwrap();
        assert!(detached.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn events_are_decoded_counted_and_fanned_out() {
        let (driver, update_tx, destroy_tx, _) = test_driver();
        let probe = Probe::new(driver);

        let (tx, mut rx) = mpsc::channel(16);
        probe.register_consumer("test", ConsumerMode::BOTH, tx).unwrap();

        probe.start().await.unwrap();
        update_tx.send(RingMessage::Record(record(6))).await.unwrap();
        destroy_tx.send(RingMessage::Record(record(17))).await.unwrap();

        let (kind_a, event_a) = rx.recv().await.unwrap();
        assert_eq!(kind_a, EventKind::Update);
        assert_eq!(event_a.proto, 6);
        let (kind_b, _) = rx.recv().await.unwrap();
        assert_eq!(kind_b, EventKind::Destroy);

        drain_until(&probe, 2).await;
        let stats = probe.stats();
        assert_eq!(stats.perf_events_update, 1);
        assert_eq!(stats.perf_events_destroy, 1);
        assert_eq!(stats.perf_bytes_total, 2 * EVENT_LENGTH as u64);
    }

    #[tokio::test]
    async fn lost_samples_increment_per_ring_counters() {
        let (driver, update_tx, destroy_tx, _) = test_driver();
        let probe = Probe::new(driver);
        probe.start().await.unwrap();

        update_tx.send(RingMessage::Lost(3)).await.unwrap();
        destroy_tx.send(RingMessage::Lost(5)).await.unwrap();
        update_tx.send(RingMessage::Record(record(6))).await.unwrap();

        drain_until(&probe, 1).await;
        let stats = probe.stats();
        assert_eq!(stats.perf_events_update_lost, 3);
        assert_eq!(stats.perf_events_destroy_lost, 5);
        assert_eq!(stats.perf_events_total, 1);
    }

    #[tokio::test]
    async fn backpressured_consumer_loses_events_without_blocking_reader() {
        let (driver, update_tx, _d, _) = test_driver();
        let probe = Probe::new(driver);

        let (tx, _rx) = mpsc::channel(1);
        let stats = probe.register_consumer("slow", ConsumerMode::BOTH, tx).unwrap();

        probe.start().await.unwrap();
        for _ in 0..10 {
            update_tx.send(RingMessage::Record(record(6))).await.unwrap();
        }

        drain_until(&probe, 10).await;
        let snap = stats.snapshot();
        assert_eq!(snap.events_received, 1);
        assert_eq!(snap.events_lost, 9);
    }

    #[tokio::test]
    async fn consumers_only_see_their_event_kinds() {
        let (driver, update_tx, destroy_tx, _) = test_driver();
        let probe = Probe::new(driver);

        let (dtx, mut drx) = mpsc::channel(16);
        probe
            .register_consumer("destroys", ConsumerMode::DESTROY, dtx)
            .unwrap();

        probe.start().await.unwrap();
        update_tx.send(RingMessage::Record(record(6))).await.unwrap();
        destroy_tx.send(RingMessage::Record(record(17))).await.unwrap();

        let (kind, event) = drx.recv().await.unwrap();
        assert_eq!(kind, EventKind::Destroy);
        assert_eq!(event.proto, 17);
    }

    #[test]
    fn duplicate_consumer_rejected() {
        let (driver, _u, _d, _) = test_driver();
        let probe = Probe::new(driver);
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, _rx_b) = mpsc::channel(1);
        probe.register_consumer("dup", ConsumerMode::BOTH, tx_a).unwrap();
        let err = probe
            .register_consumer("dup", ConsumerMode::BOTH, tx_b)
            .unwrap_err();
        assert_eq!(err, ProbeError::DuplicateConsumer("dup".to_string()));
    }

    #[tokio::test]
    async fn remove_consumer_closes_its_channel_once() {
        let (driver, _u, _d, _) = test_driver();
        let probe = Probe::new(driver);
        let (tx, mut rx) = mpsc::channel(1);
        probe.register_consumer("c", ConsumerMode::BOTH, tx).unwrap();

        probe.remove_consumer("c").unwrap();
        assert!(rx.recv().await.is_none());

        let err = probe.remove_consumer("c").unwrap_err();
        assert_eq!(err, ProbeError::NoSuchConsumer("c".to_string()));
    }

    #[test]
    fn hook_symbol_check() {
        let table = StaticSymbolTable::new(["__nf_ct_refresh_acct", "nf_conntrack_free"]);
        let hooks = vec![
            Hook::new(HookKind::Entry, "__nf_ct_refresh_acct"),
            Hook::new(HookKind::Return, "__nf_ct_refresh_acct"),
            Hook::new(HookKind::Entry, "nf_conntrack_free"),
        ];
        assert!(check_hook_symbols(&table, &hooks).is_ok());

        let missing = vec![Hook::new(HookKind::Entry, "nf_ct_delete")];
        let err = check_hook_symbols(&table, &missing).unwrap_err();
        assert_eq!(err, KernelError::SymbolMissing("nf_ct_delete".to_string()));
    }
}
