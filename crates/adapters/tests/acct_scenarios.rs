//! End-to-end probe scenarios against the running kernel.
//!
//! These load the accounting BPF object, attach to the conntrack
//! symbols of the running kernel and observe real UDP traffic. They
//! need root, a mounted tracing filesystem, conntrack with accounting
//! enabled and a probe object for the running kernel, so they are
//! ignored by default:
//!
//!     sudo -E cargo test -p adapters -- --ignored

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use adapters::ebpf::{AcctProbeDriver, Kallsyms, builds, kernel_release};
use application::consumer::ConsumerMode;
use application::probe::Probe;
use domain::flow::entity::{Event, EventKind};
use domain::kernel::selector::select;
use domain::probe::entity::{CurvePoint, ProbeConfig};
use infrastructure::constants::{
    DEFAULT_PROBE_OBJECT_DIR, DEFAULT_PROBE_OBJECT_DIR_DEV, DEFAULT_TRACEFS_PATH,
    REQUIRED_SYSCTLS,
};
use udpecho::{EchoClient, EchoServer};

/// Aggressive curve so scenarios finish in milliseconds: updates every
/// 10ms for new flows, 25ms past 50ms of age, 50ms past 100ms.
fn scenario_curve() -> ProbeConfig {
    ProbeConfig {
        curve: [
            CurvePoint::new(Duration::ZERO, Duration::from_millis(10)),
            CurvePoint::new(Duration::from_millis(50), Duration::from_millis(25)),
            CurvePoint::new(Duration::from_millis(100), Duration::from_millis(50)),
        ],
    }
}

async fn start_probe() -> anyhow::Result<(Arc<Probe>, mpsc::Receiver<(EventKind, Event)>)> {
    adapters::sysctl::apply(REQUIRED_SYSCTLS)?;

    let release = kernel_release()?;
    let build = select(&builds(), &release)?.clone();
    let kallsyms = Kallsyms::load()?;

    let object_dirs = [
        PathBuf::from(DEFAULT_PROBE_OBJECT_DIR),
        PathBuf::from(DEFAULT_PROBE_OBJECT_DIR_DEV),
    ];
    let driver = AcctProbeDriver::prepare(
        build,
        &object_dirs,
        DEFAULT_TRACEFS_PATH,
        &kallsyms,
        &scenario_curve(),
    )?;

    let probe = Arc::new(Probe::new(Box::new(driver)));
    let (tx, rx) = mpsc::channel(1024);
    probe.register_consumer("scenario", ConsumerMode::BOTH, tx)?;
    probe.start().await?;
    Ok((probe, rx))
}

/// Next update event belonging to the flow towards `dst_port`, or None
/// when `deadline` passes. Other flows on the host are skipped.
async fn next_flow_event(
    rx: &mut mpsc::Receiver<(EventKind, Event)>,
    dst_port: u16,
    deadline: Duration,
) -> Option<Event> {
    let wait = tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Some((EventKind::Update, event)) if event.dst_port == dst_port => {
                    return Some(event);
                }
                Some(_) => continue,
                None => return None,
            }
        }
    });
    wait.await.ok().flatten()
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires root, tracefs, conntrack and a probe object for the running kernel"]
async fn first_packet_emits_one_event() {
    let (probe, mut rx) = start_probe().await.unwrap();

    let server = EchoServer::bind("127.0.1.1:0").await.unwrap();
    let client = EchoClient::connect(server.local_addr()).await.unwrap();

    // A 3-byte payload: 20 (IP) + 8 (UDP) + 3 = 31 bytes on the wire.
    client.nop(1).await.unwrap();

    let event = next_flow_event(&mut rx, server.port(), Duration::from_secs(2))
        .await
        .expect("no event for the first packet of a new flow");
    assert_eq!(event.packets_total(), 1);
    assert_eq!(event.bytes_orig, 31);
    assert_eq!(event.src_port, client.port().unwrap());
    assert_eq!(event.dst_port, server.port());
    assert_eq!(event.proto, 17);
    assert_eq!(event.start, 0, "unconfirmed flow must carry start = 0");

    // A second packet within the 10ms rate window must not emit.
    client.nop(1).await.unwrap();
    let suppressed = next_flow_event(&mut rx, server.port(), Duration::from_millis(8)).await;
    assert!(suppressed.is_none(), "rate curve failed to suppress: {suppressed:?}");

    server.shutdown();
    probe.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires root, tracefs, conntrack and a probe object for the running kernel"]
async fn rate_curve_paces_updates_by_flow_age() {
    let (probe, mut rx) = start_probe().await.unwrap();

    let server = EchoServer::bind("127.0.1.1:0").await.unwrap();
    let client = EchoClient::connect(server.local_addr()).await.unwrap();

    // Packet 1 opens the flow and emits immediately.
    client.nop(1).await.unwrap();
    let first = next_flow_event(&mut rx, server.port(), Duration::from_secs(2))
        .await
        .expect("no event for flow creation");
    assert_eq!(first.packets_total(), 1);

    // Past the first rate window a ping-pong emits exactly once, with
    // both directions accounted.
    tokio::time::sleep(Duration::from_millis(11)).await;
    client.ping(1).await.unwrap();
    let second = next_flow_event(&mut rx, server.port(), Duration::from_secs(2))
        .await
        .expect("no event after the rate window elapsed");
    assert_eq!(second.packets_total(), 3);
    assert_eq!(second.packets_ret, 1);
    assert!(second.start > 0, "confirmed flow must carry its start time");

    // Inside the window again: traffic flows, nothing emits.
    client.ping(1).await.unwrap();
    let suppressed = next_flow_event(&mut rx, server.port(), Duration::from_millis(8)).await;
    assert!(suppressed.is_none());

    server.shutdown();
    probe.stop().await.unwrap();
}
