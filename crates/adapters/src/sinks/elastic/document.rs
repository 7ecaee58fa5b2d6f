//! The JSON document shape indexed per event.

use serde::Serialize;

use domain::flow::entity::{Event, EventKind};

use crate::clock::BootClock;

/// One flow event as indexed, enriched with absolute millisecond
/// timestamps, derived totals and the emitting host.
#[derive(Debug, Clone, Serialize)]
pub struct FlowDocument {
    pub event_type: &'static str,
    pub hostname: String,

    /// Indexed as a keyword: it is a join key, never aggregated over.
    pub flow_id: String,

    /// Milliseconds since the epoch. `start` falls back to `timestamp`
    /// for flows the kernel had not confirmed yet.
    pub start: i64,
    pub timestamp: i64,

    pub src_addr: String,
    pub dst_addr: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: u8,
    pub proto_name: &'static str,
    pub connmark: u32,
    pub netns: u32,

    pub packets_orig: u64,
    pub bytes_orig: u64,
    pub packets_ret: u64,
    pub bytes_ret: u64,
    pub packets_total: u64,
    pub bytes_total: u64,
}

impl FlowDocument {
    pub fn new(kind: EventKind, event: &Event, hostname: &str, clock: &BootClock) -> Self {
        let timestamp = clock.absolute_ms(event.timestamp);
        let start = if event.start == 0 {
            timestamp
        } else {
            clock.absolute_ms(event.start)
        };

        Self {
            event_type: kind.as_str(),
            hostname: hostname.to_string(),
            flow_id: event.flow_id.to_string(),
            start,
            timestamp,
            src_addr: event.src_addr.to_string(),
            dst_addr: event.dst_addr.to_string(),
            src_port: event.src_port,
            dst_port: event.dst_port,
            proto: event.proto,
            proto_name: event.proto_name(),
            connmark: event.connmark,
            netns: event.netns,
            packets_orig: event.packets_orig,
            bytes_orig: event.bytes_orig,
            packets_ret: event.packets_ret,
            bytes_ret: event.bytes_ret,
            packets_total: event.packets_total(),
            bytes_total: event.bytes_total(),
        }
    }
}
