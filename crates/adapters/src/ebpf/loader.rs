use std::os::fd::{AsFd, AsRawFd, RawFd};

use anyhow::Context;
use aya::Ebpf;
use aya::maps::Map;
use aya::programs::KProbe;
use tracing::{info, warn};

use domain::probe::error::ProbeError;

/// The loaded accounting BPF collection.
///
/// Wraps the `aya::Ebpf` instance: programs are loaded into the kernel
/// here, maps and program fds are handed out to the attach and
/// configuration stages. Dropping this unloads everything that is not
/// otherwise pinned.
pub struct AcctBpf {
    ebpf: Ebpf,
}

impl AcctBpf {
    /// Parse and load a probe object from raw ELF bytes.
    pub fn load(object: &[u8]) -> anyhow::Result<Self> {
        let mut ebpf =
            Ebpf::load(object).map_err(|e| ProbeError::LoadFailed(e.to_string()))?;

        // aya-log init is best-effort: objects without log statements
        // have no log map.
        if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
            warn!("eBPF logger init failed (non-fatal): {e}");
        }

        info!("accounting BPF object loaded");
        Ok(Self { ebpf })
    }

    /// Load the named kprobe program into the kernel and return its fd
    /// for perf event attachment.
    pub fn program_fd(&mut self, name: &str) -> anyhow::Result<RawFd> {
        let program: &mut KProbe = self
            .ebpf
            .program_mut(name)
            .with_context(|| format!("program '{name}' not found in BPF object"))?
            .try_into()
            .with_context(|| format!("program '{name}' is not a kprobe"))?;

        program
            .load()
            .with_context(|| format!("loading program '{name}'"))?;
        let fd = program
            .fd()
            .with_context(|| format!("program '{name}' fd unavailable"))?
            .as_fd()
            .as_raw_fd();
        Ok(fd)
    }

    /// Take ownership of a named map.
    pub fn take_map(&mut self, name: &str) -> anyhow::Result<Map> {
        self.ebpf
            .take_map(name)
            .with_context(|| format!("map '{name}' not found in BPF object"))
    }
}
