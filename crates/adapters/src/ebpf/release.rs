use std::path::Path;

use anyhow::Context;

use domain::kernel::entity::KernelRelease;

const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Release of the running kernel, normalized to a version triple.
pub fn kernel_release() -> anyhow::Result<KernelRelease> {
    kernel_release_from(Path::new(OSRELEASE_PATH))
}

fn kernel_release_from(path: &Path) -> anyhow::Result<KernelRelease> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(raw.trim().parse::<KernelRelease>()?)
}
