// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/conntracct/config.yaml";

/// Default directory containing compiled probe object files.
pub const DEFAULT_PROBE_OBJECT_DIR: &str = "/usr/local/lib/conntracct";

/// Fall-back for local development (relative to the workspace root).
pub const DEFAULT_PROBE_OBJECT_DIR_DEV: &str = "target/bpfel-unknown-none/release";

/// Tracing filesystem mount used for kprobe trace events.
pub const DEFAULT_TRACEFS_PATH: &str = "/sys/kernel/debug/tracing";

// ── Network defaults ───────────────────────────────────────────────

pub const DEFAULT_API_ENDPOINT: &str = "127.0.0.1:8000";
pub const DEFAULT_PPROF_ENDPOINT: &str = "127.0.0.1:6060";

// ── Sysctls required for accounting ────────────────────────────────

/// Sysctls the kernel needs before conntrack accounting data exists.
pub const REQUIRED_SYSCTLS: &[(&str, &str)] = &[
    ("net.netfilter.nf_conntrack_acct", "1"),
    ("net.netfilter.nf_conntrack_timestamp", "1"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_sysctls_enable_acct_and_timestamp() {
        assert_eq!(REQUIRED_SYSCTLS.len(), 2);
        assert!(REQUIRED_SYSCTLS.iter().all(|(_, v)| *v == "1"));
    }
}
