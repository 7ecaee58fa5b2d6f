use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;

use ports::secondary::symbol_table::SymbolTable;

const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// The kernel's exported-symbol table, parsed from `/proc/kallsyms`.
///
/// Loaded once up front; an expensive parse, so callers keep the instance
/// around instead of re-reading per lookup.
pub struct Kallsyms {
    symbols: HashSet<String>,
}

impl Kallsyms {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_path(Path::new(KALLSYMS_PATH))
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    /// Lines are `<address> <type> <symbol> [module]`; columns may be
    /// separated by tabs or spaces. The third column is the symbol.
    fn parse(content: &str) -> Self {
        let symbols = content
            .lines()
            .filter_map(|line| line.split_whitespace().nth(2))
            .map(str::to_string)
            .collect();
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolTable for Kallsyms {
    fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
0000000000000000 A fixed_percpu_data
ffffffff81000000 T startup_64
ffffffff81234560\tt\t__nf_ct_refresh_acct
ffffffff81234570 t nf_conntrack_free\t[nf_conntrack]
ffffffff81234580 t nf_ct_delete [nf_conntrack]
";

    #[test]
    fn parses_third_column() {
        let ks = Kallsyms::parse(SAMPLE);
        assert_eq!(ks.len(), 5);
        assert!(ks.contains("startup_64"));
        assert!(ks.contains("nf_ct_delete"));
    }

    #[test]
    fn normalizes_tab_separated_columns() {
        let ks = Kallsyms::parse(SAMPLE);
        assert!(ks.contains("__nf_ct_refresh_acct"));
        assert!(ks.contains("nf_conntrack_free"));
    }

    #[test]
    fn module_column_is_not_a_symbol() {
        let ks = Kallsyms::parse(SAMPLE);
        assert!(!ks.contains("[nf_conntrack]"));
    }

    #[test]
    fn missing_symbol_not_found() {
        let ks = Kallsyms::parse(SAMPLE);
        assert!(!ks.contains("tcp_v4_rcv"));
    }

    #[test]
    fn short_lines_are_skipped() {
        let ks = Kallsyms::parse("bogus\n\nffffffff81000000 T ok\n");
        assert_eq!(ks.len(), 1);
        assert!(ks.contains("ok"));
    }

    #[test]
    fn from_path_reads_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let ks = Kallsyms::from_path(file.path()).unwrap();
        assert!(ks.contains("startup_64"));
    }
}
