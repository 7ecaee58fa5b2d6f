use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::KernelError;

/// A kernel version triple, ordered numerically.
///
/// Parsed from `uname -r` style release strings. Distribution suffixes
/// (`4.20.3-200.fc29.x86_64`) are tolerated by extracting the leading
/// `X.Y(.Z)`; a missing patch level reads as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelRelease {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl KernelRelease {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Same major/minor series, any patch level.
    pub fn same_series(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl FromStr for KernelRelease {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KernelError::InvalidKernelRelease(s.to_string());

        // Take the numeric dotted prefix, cutting at the first character
        // that is neither a digit nor a dot.
        let end = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let mut parts = s[..end].split('.');

        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(invalid)?
            .parse::<u16>()
            .map_err(|_| invalid())?;
        let minor = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(invalid)?
            .parse::<u16>()
            .map_err(|_| invalid())?;
        let patch = match parts.next() {
            Some(p) if !p.is_empty() => p.parse::<u16>().map_err(|_| invalid())?,
            // '5.10' and '5.10.' both read as patch level zero.
            _ => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for KernelRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Kind of a kernel hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    /// Fires on function entry (kprobe).
    Entry,
    /// Fires on function return (kretprobe).
    Return,
}

impl HookKind {
    /// Program name prefix, BCC convention.
    pub fn program_prefix(self) -> &'static str {
        match self {
            Self::Entry => "kprobe",
            Self::Return => "kretprobe",
        }
    }

    /// Directive letter in the kprobe_events control file.
    pub fn event_prefix(self) -> char {
        match self {
            Self::Entry => 'p',
            Self::Return => 'r',
        }
    }
}

/// One attach point of a probe build: a kernel symbol plus hook kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub kind: HookKind,
    pub symbol: String,
}

impl Hook {
    pub fn new(kind: HookKind, symbol: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
        }
    }

    /// Name of the BPF program handling this hook, `<kind>__<symbol>`,
    /// e.g. `kprobe__nf_conntrack_free`.
    pub fn program_name(&self) -> String {
        format!("{}__{}", self.kind.program_prefix(), self.symbol)
    }

    /// Trace event name, unique within the probe's trace group.
    pub fn event_name(&self) -> String {
        format!("{}_{}", self.kind.program_prefix(), self.symbol)
    }
}

/// One entry of the probe build catalog.
///
/// `params` holds the kernel config the build tooling compiled the object
/// against; it is carried for provenance and never interpreted at runtime.
/// Hook order is attach order: hooks that insert into shared maps go last
/// so earlier hooks never observe a stale entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBuild {
    pub version: KernelRelease,
    /// Object file name, resolved against the configured object directory.
    pub object_file: String,
    pub hooks: Vec<Hook>,
    pub params: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_release() {
        let r: KernelRelease = "4.18.0".parse().unwrap();
        assert_eq!(r, KernelRelease::new(4, 18, 0));
    }

    #[test]
    fn parse_distribution_suffix() {
        let r: KernelRelease = "4.20.3-200.fc29.x86_64".parse().unwrap();
        assert_eq!(r, KernelRelease::new(4, 20, 3));
    }

    #[test]
    fn parse_two_component_release() {
        let r: KernelRelease = "5.10".parse().unwrap();
        assert_eq!(r, KernelRelease::new(5, 10, 0));
    }

    #[test]
    fn parse_suffix_without_patch() {
        let r: KernelRelease = "5.4-rc3".parse().unwrap();
        assert_eq!(r, KernelRelease::new(5, 4, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        for s in ["", "linux", "4", "x.y.z", ".4.2"] {
            assert!(
                s.parse::<KernelRelease>().is_err(),
                "'{s}' should not parse"
            );
        }
    }

    #[test]
    fn ordering_is_numeric() {
        let a: KernelRelease = "4.9.142".parse().unwrap();
        let b: KernelRelease = "4.14.85".parse().unwrap();
        let c: KernelRelease = "5.3.0".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn same_series_ignores_patch() {
        let a = KernelRelease::new(5, 3, 14);
        let b = KernelRelease::new(5, 3, 99);
        let c = KernelRelease::new(5, 4, 14);
        assert!(a.same_series(&b));
        assert!(!a.same_series(&c));
    }

    #[test]
    fn hook_program_name_convention() {
        let entry = Hook::new(HookKind::Entry, "__nf_ct_refresh_acct");
        assert_eq!(entry.program_name(), "kprobe____nf_ct_refresh_acct");

        let ret = Hook::new(HookKind::Return, "__nf_ct_refresh_acct");
        assert_eq!(ret.program_name(), "kretprobe____nf_ct_refresh_acct");
    }

    #[test]
    fn hook_event_prefixes() {
        assert_eq!(HookKind::Entry.event_prefix(), 'p');
        assert_eq!(HookKind::Return.event_prefix(), 'r');
    }

    #[test]
    fn release_display() {
        assert_eq!(KernelRelease::new(4, 9, 142).to_string(), "4.9.142");
    }
}
