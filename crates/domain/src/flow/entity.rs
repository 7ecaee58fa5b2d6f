use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ebpf_common::acct::EVENT_LENGTH;

use super::error::FlowError;

/// Which perf ring an event was read from.
///
/// The kernel emits updates and destroys on separate rings; the
/// distinction travels next to the event, never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Update,
    Destroy,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accounting sample for a tracked flow, decoded from a kernel record.
///
/// Immutable after decode. `start` and `timestamp` are monotonic (ktime)
/// nanoseconds; sinks that need wall-clock time add the estimated
/// monotonic origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// ktime of flow creation; 0 until conntrack confirms the flow.
    pub start: u64,
    /// ktime this sample was taken.
    pub timestamp: u64,
    /// Stable per-flow hash, see [`Event::decode`].
    pub flow_id: u32,
    pub connmark: u32,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub packets_orig: u64,
    pub bytes_orig: u64,
    pub packets_ret: u64,
    pub bytes_ret: u64,
    /// Only meaningful for TCP/UDP, zero otherwise.
    pub src_port: u16,
    /// Only meaningful for TCP/UDP, zero otherwise.
    pub dst_port: u16,
    /// Network namespace inode number.
    pub netns: u32,
    pub proto: u8,

    // Truncated nf_conn kernel address, used only as flow hash input.
    conn_ptr: u32,
}

impl Event {
    /// Decode one 104-byte kernel record.
    ///
    /// Integer fields are native-endian except the ports, which arrive in
    /// network byte order. Ports are extracted only for TCP (6) and
    /// UDP (17). Any other input length is an ABI mismatch.
    pub fn decode(b: &[u8]) -> Result<Self, FlowError> {
        if b.len() != EVENT_LENGTH {
            return Err(FlowError::InvalidLength(b.len()));
        }

        let proto = b[96];
        let (src_port, dst_port) = if proto == 6 || proto == 17 {
            (u16_be_at(b, 88), u16_be_at(b, 90))
        } else {
            (0, 0)
        };

        let src_addr = decode_addr(&b[24..40]);
        let dst_addr = decode_addr(&b[40..56]);
        let conn_ptr = u32_at(b, 16);

        Ok(Self {
            start: u64_at(b, 0),
            timestamp: u64_at(b, 8),
            flow_id: hash_flow(&src_addr, &dst_addr, src_port, dst_port, proto, conn_ptr),
            connmark: u32_at(b, 20),
            src_addr,
            dst_addr,
            packets_orig: u64_at(b, 56),
            bytes_orig: u64_at(b, 64),
            packets_ret: u64_at(b, 72),
            bytes_ret: u64_at(b, 80),
            src_port,
            dst_port,
            netns: u32_at(b, 92),
            proto,
            conn_ptr,
        })
    }

    pub fn packets_total(&self) -> u64 {
        self.packets_orig + self.packets_ret
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_orig + self.bytes_ret
    }

    /// Protocol name for enrichment, after nf_conntrack_tuple_common.h.
    pub fn proto_name(&self) -> &'static str {
        proto_name(self.proto)
    }
}

/// Protocol number to name; only conntrack-known protocols are mapped.
pub fn proto_name(proto: u8) -> &'static str {
    match proto {
        1 => "icmp",
        6 => "tcp",
        17 => "udp",
        33 => "dccp",
        47 => "gre",
        132 => "sctp",
        _ => "unknown",
    }
}

/// An address slot holds IPv4 iff everything after the first four bytes
/// is zero, mirroring the kernel's nf_inet_addr union.
fn is_ipv4(b: &[u8]) -> bool {
    b[4..].iter().all(|&v| v == 0)
}

fn decode_addr(b: &[u8]) -> IpAddr {
    if is_ipv4(b) {
        IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(b);
        IpAddr::V6(Ipv6Addr::from(octets))
    }
}

/// Hash of the flow tuple plus the kernel connection pointer.
///
/// Stable for the lifetime of the process; the low 32 bits are shifted
/// right once so the id also fits downstream fields stored as signed
/// integers.
fn hash_flow(
    src: &IpAddr,
    dst: &IpAddr,
    src_port: u16,
    dst_port: u16,
    proto: u8,
    conn_ptr: u32,
) -> u32 {
    let mut h = DefaultHasher::new();
    write_addr(&mut h, src);
    write_addr(&mut h, dst);
    h.write(&src_port.to_be_bytes());
    h.write(&dst_port.to_be_bytes());
    h.write(&[proto]);
    h.write(&conn_ptr.to_be_bytes());
    (h.finish() as u32) >> 1
}

fn write_addr(h: &mut DefaultHasher, addr: &IpAddr) {
    match addr {
        IpAddr::V4(a) => h.write(&a.octets()),
        IpAddr::V6(a) => h.write(&a.octets()),
    }
}

fn u64_at(b: &[u8], off: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[off..off + 8]);
    u64::from_ne_bytes(buf)
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&b[off..off + 4]);
    u32::from_ne_bytes(buf)
}

fn u16_be_at(b: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([b[off], b[off + 1]])
}
