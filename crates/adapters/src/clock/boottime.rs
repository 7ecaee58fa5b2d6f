//! Monotonic-origin estimation.
//!
//! Kernel events carry CLOCK_MONOTONIC nanoseconds; sinks need absolute
//! time. The origin of the monotonic clock is estimated by sampling the
//! monotonic and wall clocks back-to-back on a CPU-pinned thread and
//! voting on the subtraction result: the mode discards samples where the
//! two reads straddled a context switch. A background thread refreshes
//! the estimate every two seconds.

#![allow(unsafe_code)] // clock_gettime and sched_setaffinity

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Sampling rounds per estimate.
const ROUNDS: usize = 10;

/// Seconds between background refreshes.
const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Shared estimate of the absolute timestamp of monotonic zero.
pub struct BootClock {
    origin_ns: AtomicI64,
}

impl BootClock {
    /// Estimate the origin now and keep refreshing it in the background
    /// for as long as the returned handle is alive.
    pub fn start() -> Arc<Self> {
        let clock = Arc::new(Self {
            origin_ns: AtomicI64::new(estimate()),
        });

        let weak = Arc::downgrade(&clock);
        let spawned = std::thread::Builder::new()
            .name("boottime".to_string())
            .spawn(move || {
                loop {
                    std::thread::sleep(REFRESH_INTERVAL);
                    match weak.upgrade() {
                        Some(clock) => clock.origin_ns.store(estimate(), Ordering::Relaxed),
                        None => break,
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("boottime refresh thread failed to start: {e}");
        }

        clock
    }

    /// Absolute epoch nanoseconds of the monotonic clock's origin.
    pub fn origin_ns(&self) -> i64 {
        self.origin_ns.load(Ordering::Relaxed)
    }

    /// Convert a monotonic nanosecond reading to absolute epoch
    /// nanoseconds.
    pub fn absolute_ns(&self, monotonic_ns: u64) -> i64 {
        self.origin_ns() + monotonic_ns as i64
    }

    /// Like [`BootClock::absolute_ns`] but millisecond resolution.
    pub fn absolute_ms(&self, monotonic_ns: u64) -> i64 {
        self.absolute_ns(monotonic_ns) / 1_000_000
    }
}

/// Current CLOCK_MONOTONIC reading in nanoseconds.
pub fn monotonic_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    // CLOCK_MONOTONIC is unconditionally supported on Linux.
    assert_eq!(rc, 0, "clock_gettime(CLOCK_MONOTONIC) failed");
    ts.tv_sec * 1_000_000_000 + ts.tv_nsec
}

fn wall_ns() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

/// One estimation pass: pin to CPU 0, sample `ROUNDS` times, return the
/// modal origin.
fn estimate() -> i64 {
    let _pin = PinnedCpu::new(0);

    let mut votes: HashMap<i64, u8> = HashMap::with_capacity(ROUNDS);
    for _ in 0..ROUNDS {
        let mono = monotonic_ns();
        let wall = wall_ns();
        *votes.entry(wall - mono).or_insert(0) += 1;
    }

    votes
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(origin, _)| origin)
        .unwrap_or_default()
}

/// Scoped CPU pin for the current thread; restores the previous affinity
/// mask on drop. Pinning failures are tolerated, the estimate just gets
/// noisier.
struct PinnedCpu {
    previous: Option<libc::cpu_set_t>,
}

impl PinnedCpu {
    fn new(cpu: usize) -> Self {
        unsafe {
            let mut previous: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut previous)
                != 0
            {
                return Self { previous: None };
            }

            let mut pinned: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_SET(cpu, &mut pinned);
            if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &pinned) != 0 {
                return Self { previous: None };
            }

            Self {
                previous: Some(previous),
            }
        }
    }
}

impl Drop for PinnedCpu {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            unsafe {
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &previous);
            }
        }
    }
}
