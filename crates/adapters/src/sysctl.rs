//! Sysctl writer backed by `/proc/sys`.

use std::path::Path;

use anyhow::Context;
use tracing::info;

const PROC_SYS: &str = "/proc/sys";

/// Apply a set of `key = value` sysctls, writing only the ones whose
/// current value differs and logging each change.
pub fn apply(ctls: &[(&str, &str)]) -> anyhow::Result<()> {
    apply_at(Path::new(PROC_SYS), ctls)
}

fn apply_at(root: &Path, ctls: &[(&str, &str)]) -> anyhow::Result<()> {
    for &(key, value) in ctls {
        let path = root.join(key.replace('.', "/"));

        let current = std::fs::read_to_string(&path)
            .with_context(|| format!("reading sysctl {key}"))?;
        if current.trim() == value {
            continue;
        }

        std::fs::write(&path, value).with_context(|| format!("writing sysctl {key}"))?;
        info!(sysctl = key, value, "sysctl applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(root: &Path, key: &str, value: &str) {
        let path = root.join(key.replace('.', "/"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{value}\n")).unwrap();
    }

    fn read(root: &Path, key: &str) -> String {
        std::fs::read_to_string(root.join(key.replace('.', "/")))
            .unwrap()
            .trim()
            .to_string()
    }

    #[test]
    fn changes_differing_values() {
        let dir = tempfile::tempdir().unwrap();
        plant(dir.path(), "net.netfilter.nf_conntrack_acct", "0");

        apply_at(dir.path(), &[("net.netfilter.nf_conntrack_acct", "1")]).unwrap();
        assert_eq!(read(dir.path(), "net.netfilter.nf_conntrack_acct"), "1");
    }

    #[test]
    fn leaves_matching_values_untouched() {
        let dir = tempfile::tempdir().unwrap();
        plant(dir.path(), "net.netfilter.nf_conntrack_timestamp", "1");

        apply_at(dir.path(), &[("net.netfilter.nf_conntrack_timestamp", "1")]).unwrap();
        assert_eq!(read(dir.path(), "net.netfilter.nf_conntrack_timestamp"), "1");
    }

    #[test]
    fn missing_sysctl_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply_at(dir.path(), &[("net.missing.key", "1")]).unwrap_err();
        assert!(err.to_string().contains("net.missing.key"));
    }
}
