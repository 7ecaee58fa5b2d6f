//! Kprobe trace events via the tracing filesystem.
//!
//! Appending `p:<group>/<name> <symbol>` (or `r:` for return probes) to
//! `kprobe_events` registers a trace event; `-:<group>/<name>` removes
//! it. The numeric id under `events/<group>/<name>/id` is what the perf
//! subsystem binds to.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

use domain::kernel::entity::Hook;

/// Trace events created by this process, grouped under a random group
/// name so stale state from prior invocations can never collide.
pub struct TraceEvents {
    tracefs: PathBuf,
    group: String,
    created: Vec<String>,
}

impl TraceEvents {
    pub fn new(tracefs: impl Into<PathBuf>) -> Self {
        Self {
            tracefs: tracefs.into(),
            group: format!("conntracct_{:08x}", rand::random::<u32>()),
            created: Vec::new(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Register a trace event for `hook` and return its id.
    pub fn create(&mut self, hook: &Hook) -> anyhow::Result<u64> {
        let name = hook.event_name();
        let entry = format!(
            "{}:{}/{} {}",
            hook.kind.event_prefix(),
            self.group,
            name,
            hook.symbol
        );
        self.append(&entry)
            .with_context(|| format!("registering trace event '{entry}'"))?;
        self.created.push(name.clone());

        let id = self.read_id(&name)?;
        debug!(group = %self.group, event = %name, id, "trace event created");
        Ok(id)
    }

    /// Remove every trace event created by this instance.
    pub fn remove_all(&mut self) -> anyhow::Result<()> {
        let names = std::mem::take(&mut self.created);
        for name in names {
            let entry = format!("-:{}/{}", self.group, name);
            self.append(&entry)
                .with_context(|| format!("removing trace event '{entry}'"))?;
            debug!(group = %self.group, event = %name, "trace event removed");
        }
        Ok(())
    }

    fn append(&self, entry: &str) -> anyhow::Result<()> {
        let path = self.tracefs.join("kprobe_events");
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(entry.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    fn read_id(&self, name: &str) -> anyhow::Result<u64> {
        let path = self
            .tracefs
            .join("events")
            .join(&self.group)
            .join(name)
            .join("id");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading trace event id {}", path.display()))?;
        raw.trim()
            .parse::<u64>()
            .with_context(|| format!("invalid trace event id '{}'", raw.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::kernel::entity::HookKind;

    fn fake_tracefs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kprobe_events"), b"").unwrap();
        dir
    }

    fn plant_id(dir: &tempfile::TempDir, group: &str, name: &str, id: u64) {
        let event_dir = dir.path().join("events").join(group).join(name);
        std::fs::create_dir_all(&event_dir).unwrap();
        std::fs::write(event_dir.join("id"), format!("{id}\n")).unwrap();
    }

    #[test]
    fn group_is_prefixed_and_unique_per_instance() {
        let dir = fake_tracefs();
        let a = TraceEvents::new(dir.path());
        let b = TraceEvents::new(dir.path());
        assert!(a.group().starts_with("conntracct_"));
        assert_ne!(a.group(), b.group());
    }

    #[test]
    fn create_writes_entry_and_reads_id() {
        let dir = fake_tracefs();
        let mut te = TraceEvents::new(dir.path());
        let hook = Hook::new(HookKind::Entry, "nf_conntrack_free");
        plant_id(&dir, te.group(), &hook.event_name(), 1234);

        let id = te.create(&hook).unwrap();
        assert_eq!(id, 1234);

        let written = std::fs::read_to_string(dir.path().join("kprobe_events")).unwrap();
        assert_eq!(
            written,
            format!(
                "p:{}/kprobe_nf_conntrack_free nf_conntrack_free\n",
                te.group()
            )
        );
    }

    #[test]
    fn return_hooks_use_r_prefix() {
        let dir = fake_tracefs();
        let mut te = TraceEvents::new(dir.path());
        let hook = Hook::new(HookKind::Return, "__nf_ct_refresh_acct");
        plant_id(&dir, te.group(), &hook.event_name(), 77);

        te.create(&hook).unwrap();
        let written = std::fs::read_to_string(dir.path().join("kprobe_events")).unwrap();
        assert!(written.starts_with(&format!("r:{}/", te.group())));
    }

    #[test]
    fn remove_all_appends_deletion_entries() {
        let dir = fake_tracefs();
        let mut te = TraceEvents::new(dir.path());
        let hook = Hook::new(HookKind::Entry, "nf_conntrack_free");
        plant_id(&dir, te.group(), &hook.event_name(), 1);
        te.create(&hook).unwrap();

        te.remove_all().unwrap();
        let written = std::fs::read_to_string(dir.path().join("kprobe_events")).unwrap();
        let group = te.group().to_string();
        assert!(written.contains(&format!("-:{group}/kprobe_nf_conntrack_free\n")));

        // Second call is a no-op.
        te.remove_all().unwrap();
        let again = std::fs::read_to_string(dir.path().join("kprobe_events")).unwrap();
        assert_eq!(written, again);
    }

    #[test]
    fn missing_id_file_is_an_error() {
        let dir = fake_tracefs();
        let mut te = TraceEvents::new(dir.path());
        let hook = Hook::new(HookKind::Entry, "nf_conntrack_free");
        assert!(te.create(&hook).is_err());
    }
}
