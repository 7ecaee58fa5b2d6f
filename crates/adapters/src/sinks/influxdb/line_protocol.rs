//! InfluxDB line protocol encoding.
//!
//! One point per event, measurement `ct_acct`. Tags index the flow
//! tuple; counters go in fields. Tags and fields are written in
//! alphabetical key order so encodings are deterministic.

use domain::flow::entity::Event;

/// Encode one event as a line-protocol point with an absolute
/// nanosecond timestamp.
pub fn encode_point(event: &Event, timestamp_ns: i64, emit_source_port: bool) -> String {
    let mut line = String::with_capacity(256);
    line.push_str("ct_acct");

    // Tags, alphabetical.
    push_tag(&mut line, "conn_id", &event.flow_id.to_string());
    push_tag(&mut line, "connmark", &format!("{:x}", event.connmark));
    push_tag(&mut line, "dst_addr", &event.dst_addr.to_string());
    push_tag(&mut line, "dst_port", &event.dst_port.to_string());
    push_tag(&mut line, "netns", &event.netns.to_string());
    push_tag(&mut line, "proto", event.proto_name());
    push_tag(&mut line, "src_addr", &event.src_addr.to_string());
    // Source ports are opt-in: they are ephemeral on the originating
    // side and multiply series cardinality.
    if emit_source_port {
        push_tag(&mut line, "src_port", &event.src_port.to_string());
    }

    line.push(' ');

    // Fields, alphabetical. Signed integers: the wire protocol's
    // unsigned support is not generally deployed.
    push_field(&mut line, "bytes_orig", event.bytes_orig as i64, true);
    push_field(&mut line, "bytes_ret", event.bytes_ret as i64, false);
    push_field(&mut line, "bytes_total", event.bytes_total() as i64, false);
    push_field(&mut line, "conn_id", event.flow_id as i64, false);
    push_field(&mut line, "packets_orig", event.packets_orig as i64, false);
    push_field(&mut line, "packets_ret", event.packets_ret as i64, false);
    push_field(&mut line, "packets_total", event.packets_total() as i64, false);

    line.push(' ');
    line.push_str(&timestamp_ns.to_string());
    line
}

fn push_tag(line: &mut String, key: &str, value: &str) {
    line.push(',');
    line.push_str(key);
    line.push('=');
    for c in value.chars() {
        // Tag-value escaping per the line protocol.
        if c == ',' || c == ' ' || c == '=' {
            line.push('\\');
        }
        line.push(c);
    }
}

fn push_field(line: &mut String, key: &str, value: i64, first: bool) {
    if !first {
        line.push(',');
    }
    line.push_str(key);
    line.push('=');
    line.push_str(&value.to_string());
    line.push('i');
}

/// Pack lines into newline-joined payloads of at most `max_bytes` each.
/// A line longer than the limit is sent as its own payload rather than
/// silently dropped.
pub fn pack_payloads(lines: &[String], max_bytes: usize) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current = String::new();

    for line in lines {
        let needed = line.len() + usize::from(!current.is_empty());
        if !current.is_empty() && current.len() + needed > max_bytes {
            payloads.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        payloads.push(current);
    }
    payloads
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebpf_common::acct::EVENT_LENGTH;

    fn event() -> Event {
        let mut b = vec![0u8; EVENT_LENGTH];
        // src 1.2.3.4, dst 5.6.7.8, udp 1234 -> 4444
        b[24..28].copy_from_slice(&[1, 2, 3, 4]);
        b[40..44].copy_from_slice(&[5, 6, 7, 8]);
        b[56..64].copy_from_slice(&1u64.to_ne_bytes()); // packets_orig
        b[64..72].copy_from_slice(&31u64.to_ne_bytes()); // bytes_orig
        b[88..90].copy_from_slice(&1234u16.to_be_bytes());
        b[90..92].copy_from_slice(&4444u16.to_be_bytes());
        b[20..24].copy_from_slice(&0x2Au32.to_ne_bytes()); // connmark
        b[92..96].copy_from_slice(&7u32.to_ne_bytes()); // netns
        b[96] = 17;
        Event::decode(&b).unwrap()
    }

    #[test]
    fn point_layout() {
        let e = event();
        let line = encode_point(&e, 1_700_000_000_000_000_000, false);
        let expected = format!(
            "ct_acct,conn_id={id},connmark=2a,dst_addr=5.6.7.8,dst_port=4444,netns=7,\
proto=udp,src_addr=1.2.3.4 \
bytes_orig=31i,bytes_ret=0i,bytes_total=31i,conn_id={id}i,\
packets_orig=1i,packets_ret=0i,packets_total=1i 1700000000000000000",
            id = e.flow_id
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn source_port_tag_is_opt_in() {
        let e = event();
        assert!(!encode_point(&e, 0, false).contains("src_port"));
        assert!(encode_point(&e, 0, true).contains(",src_port=1234 "));
    }

    #[test]
    fn pack_respects_payload_limit() {
        let lines: Vec<String> = (0..4).map(|i| format!("line-{i}")).collect();
        // Two 6-byte lines plus separator fit in 15 bytes.
        let payloads = pack_payloads(&lines, 15);
        assert_eq!(payloads, vec!["line-0\nline-1", "line-2\nline-3"]);
    }

    #[test]
    fn pack_oversized_line_stands_alone() {
        let lines = vec!["x".repeat(50), "y".to_string()];
        let payloads = pack_payloads(&lines, 10);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].len(), 50);
        assert_eq!(payloads[1], "y");
    }

    #[test]
    fn pack_empty_input() {
        assert!(pack_payloads(&[], 10).is_empty());
    }
}
