//! ABI shared with the accounting BPF object.
//!
//! The BPF side emits fixed-size records on two perf maps, one for flow
//! updates and one for flow destroys. Map names, array keys and the record
//! layout defined here are the wire contract; the object is built per
//! kernel version by the BPF build tooling.

/// Length in bytes of one accounting record on the perf rings.
pub const EVENT_LENGTH: usize = 104;

/// Perf map carrying flow update records.
pub const PERF_UPDATE_MAP: &str = "perf_acct_update";
/// Perf map carrying flow destroy records.
pub const PERF_DESTROY_MAP: &str = "perf_acct_end";
/// Scalar configuration array.
pub const CONFIG_MAP: &str = "config";
/// Rate curve array, keys `CURVE0_AGE..=CURVE2_RATE`, i64 nanoseconds.
pub const RATECURVE_MAP: &str = "config_ratecurve";

/// Key of the ready sentinel in the `config` array.
pub const CONFIG_READY_KEY: u32 = 0;
/// Sentinel value that makes the BPF object start emitting events.
/// Any other value at `CONFIG_READY_KEY` means "do not emit".
pub const CONFIG_READY_VALUE: u64 = 0x90;

/// Keys into the `config_ratecurve` array.
pub const CURVE0_AGE: u32 = 0;
pub const CURVE0_RATE: u32 = 1;
pub const CURVE1_AGE: u32 = 2;
pub const CURVE1_RATE: u32 = 3;
pub const CURVE2_AGE: u32 = 4;
pub const CURVE2_RATE: u32 = 5;

/// Accounting record as written by the BPF object.
///
/// All integer fields are native-endian except `src_port`/`dst_port`,
/// which the kernel stores in network byte order. Addresses mirror the
/// kernel's `nf_inet_addr` union: an IPv4 address occupies the first four
/// bytes and the remaining twelve are zero.
///
/// Size: 104 bytes, aligned to 8.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAcctEvent {
    /// ktime of flow creation; 0 until conntrack confirms the flow.
    pub start: u64,
    /// ktime the record was sampled.
    pub timestamp: u64,
    /// Truncated kernel address of the `nf_conn`, for flow hashing only.
    pub conn_ptr: u32,
    pub connmark: u32,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
    pub packets_orig: u64,
    pub bytes_orig: u64,
    pub packets_ret: u64,
    pub bytes_ret: u64,
    /// Network byte order.
    pub src_port: u16,
    /// Network byte order.
    pub dst_port: u16,
    /// Network namespace inode number.
    pub netns: u32,
    pub proto: u8,
    pub _pad: [u8; 7],
}
