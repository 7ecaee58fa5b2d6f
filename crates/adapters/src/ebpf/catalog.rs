//! Probe build catalog: which object file and hook list to use per
//! kernel version.
//!
//! The objects are compiled against the listed kernel trees by the BPF
//! build tooling and shipped next to the agent; `params` records the
//! kernel config each build requires.

use std::path::{Path, PathBuf};

use anyhow::Context;

use domain::kernel::entity::{Hook, HookKind, KernelBuild, KernelRelease};

/// All probe builds shipped with this agent, unordered.
pub fn builds() -> Vec<KernelBuild> {
    vec![
        build(KernelRelease::new(4, 9, 142)),
        build(KernelRelease::new(4, 14, 85)),
    ]
}

fn build(version: KernelRelease) -> KernelBuild {
    KernelBuild {
        version,
        object_file: format!("acct_{version}.o"),
        // Attach order: the refresh entry hook inserts into shared maps,
        // so it goes last; earlier hooks must never see a stale entry.
        hooks: vec![
            Hook::new(HookKind::Entry, "nf_conntrack_free"),
            Hook::new(HookKind::Return, "__nf_ct_refresh_acct"),
            Hook::new(HookKind::Entry, "__nf_ct_refresh_acct"),
        ],
        params: mark_nft_nat(),
    }
}

// Kernel configuration the accounting probe is built against:
// conntrack with mark support, plus NAT through nftables.
fn mark_nft_nat() -> Vec<(String, String)> {
    [
        ("CONFIG_NETFILTER", "y"),
        ("CONFIG_NETFILTER_ADVANCED", "y"),
        ("CONFIG_NF_CONNTRACK", "m"),
        ("CONFIG_NF_CONNTRACK_MARK", "y"),
        ("CONFIG_NF_CONNTRACK_TIMESTAMP", "y"),
        ("CONFIG_NF_NAT", "m"),
        ("CONFIG_NF_TABLES", "m"),
        ("CONFIG_NFT_NAT", "m"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Read the object file of `build`, trying each candidate directory in
/// order.
pub fn read_object(dirs: &[PathBuf], build: &KernelBuild) -> anyhow::Result<Vec<u8>> {
    let mut tried = Vec::new();
    for dir in dirs {
        let path = object_path(dir, build);
        if path.is_file() {
            return std::fs::read(&path).with_context(|| format!("reading {}", path.display()));
        }
        tried.push(path.display().to_string());
    }
    anyhow::bail!(
        "probe object '{}' not found, tried: {}",
        build.object_file,
        tried.join(", ")
    )
}

pub fn object_path(dir: &Path, build: &KernelBuild) -> PathBuf {
    dir.join(&build.object_file)
}
