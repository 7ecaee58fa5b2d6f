//! Probe build selection for a running kernel.
//!
//! Structure offsets the probe relies on change across minor releases, so
//! exact-or-lower is the correct default. A patch level newer than any
//! cataloged build of the same series still works against that series'
//! build, hence the minor-series fallback.

use super::entity::{KernelBuild, KernelRelease};
use super::error::KernelError;

/// Select the build to load for the running kernel `running`.
///
/// Order of preference:
/// 1. the highest cataloged version `<= running`,
/// 2. the highest cataloged version in the same major.minor series,
/// 3. the lowest cataloged version.
///
/// Fails only when the catalog is empty.
pub fn select<'a>(
    builds: &'a [KernelBuild],
    running: &KernelRelease,
) -> Result<&'a KernelBuild, KernelError> {
    let mut sorted: Vec<&KernelBuild> = builds.iter().collect();
    if sorted.is_empty() {
        return Err(KernelError::NoProgramForKernel);
    }
    sorted.sort_by_key(|b| b.version);

    if let Some(&b) = sorted.iter().rev().find(|b| b.version <= *running) {
        return Ok(b);
    }

    if let Some(&b) = sorted
        .iter()
        .rev()
        .find(|b| b.version.same_series(running))
    {
        return Ok(b);
    }

    Ok(sorted[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(version: &str) -> KernelBuild {
        KernelBuild {
            version: version.parse().unwrap(),
            object_file: format!("acct_{version}.bpf.o"),
            hooks: Vec::new(),
            params: Vec::new(),
        }
    }

    fn catalog() -> Vec<KernelBuild> {
        // Intentionally unsorted.
        vec![build("4.17.9"), build("5.3.14"), build("4.9.0")]
    }

    fn pick(running: &str) -> String {
        select(&catalog(), &running.parse().unwrap())
            .unwrap()
            .version
            .to_string()
    }

    #[test]
    fn newer_kernel_gets_highest_lower_build() {
        assert_eq!(pick("5.10.0"), "5.3.14");
    }

    #[test]
    fn kernel_between_builds_gets_next_lower() {
        assert_eq!(pick("4.15.0"), "4.9.0");
    }

    #[test]
    fn exact_match_is_selected() {
        assert_eq!(pick("4.17.9"), "4.17.9");
    }

    #[test]
    fn newer_patch_of_cataloged_series() {
        assert_eq!(pick("5.3.99"), "5.3.14");
    }

    #[test]
    fn older_than_all_builds_falls_back_to_lowest() {
        assert_eq!(pick("3.0.0"), "4.9.0");
    }

    #[test]
    fn series_fallback_when_patch_predates_build() {
        // 4.9.0 predates a hypothetical 4.9.142-only catalog; minor-series
        // matching still selects the 4.9 build.
        let builds = vec![build("4.9.142"), build("5.4.20")];
        let picked = select(&builds, &"4.9.10".parse().unwrap()).unwrap();
        assert_eq!(picked.version.to_string(), "4.9.142");
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let err = select(&[], &"5.0.0".parse().unwrap()).unwrap_err();
        assert_eq!(err, KernelError::NoProgramForKernel);
    }
}
