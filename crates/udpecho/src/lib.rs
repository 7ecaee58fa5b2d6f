//! UDP echo pair for exercising conntrack flows.
//!
//! A server echoing `pong` for every `ping`, and a client producing
//! request/response or one-way traffic on a single connected socket, so
//! all packets belong to one conntrack flow. Used by the end-to-end
//! probe scenarios to generate accountable traffic with known packet
//! and byte counts.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::debug;

const PING: &[u8] = b"ping";
const PONG: &[u8] = b"pong";
const NOP: &[u8] = b"nop";

/// How long a pinging client waits for its pong.
const PONG_DEADLINE: Duration = Duration::from_millis(20);

/// UDP server replying `pong` to every `ping`; other payloads are
/// swallowed.
pub struct EchoServer {
    local_addr: SocketAddr,
    worker: JoinHandle<()>,
}

impl EchoServer {
    /// Bind and start echoing. Pass port 0 for an ephemeral port.
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding echo server to {addr}"))?;
        let local_addr = socket.local_addr()?;

        let worker = tokio::spawn(echo_worker(Arc::new(socket)));
        debug!(%local_addr, "echo server listening");
        Ok(Self { local_addr, worker })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop the echo worker.
    pub fn shutdown(self) {
        self.worker.abort();
    }
}

async fn echo_worker(socket: Arc<UdpSocket>) {
    let mut buf = [0u8; 2048];
    loop {
        let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
            return;
        };
        if &buf[..len] == PING {
            // Reply errors end the flow under test anyway; the client's
            // read deadline reports them.
            let _ = socket.send_to(PONG, peer).await;
        }
    }
}

/// Client side of one echo flow, locked to a single destination so all
/// traffic shares a conntrack entry.
pub struct EchoClient {
    socket: UdpSocket,
}

impl EchoClient {
    pub async fn connect(server: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("binding echo client")?;
        socket
            .connect(server)
            .await
            .with_context(|| format!("connecting echo client to {server}"))?;
        Ok(Self { socket })
    }

    /// Source port of the flow under test.
    pub fn port(&self) -> anyhow::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Send `count` pings, each awaiting its pong.
    pub async fn ping(&self, count: usize) -> anyhow::Result<()> {
        let mut buf = [0u8; 2048];
        for _ in 0..count {
            self.socket.send(PING).await.context("sending ping")?;

            let len = tokio::time::timeout(PONG_DEADLINE, self.socket.recv(&mut buf))
                .await
                .context("pong deadline exceeded")?
                .context("receiving pong")?;
            anyhow::ensure!(
                &buf[..len] == PONG,
                "expected pong, got {:?}",
                &buf[..len]
            );
        }
        Ok(())
    }

    /// Send `count` one-way packets; no response expected.
    pub async fn nop(&self, count: usize) -> anyhow::Result<()> {
        for _ in 0..count {
            self.socket.send(NOP).await.context("sending nop")?;
        }
        Ok(())
    }
}
