/// Secondary port over the kernel's exported-symbol table.
///
/// The probe checks every hook target against this before attempting a
/// BPF load, turning arcane attach failures into a named-symbol error.
/// Implementations load the table once at construction; lookups are
/// in-memory.
pub trait SymbolTable: Send + Sync {
    /// Whether the kernel exports `symbol`.
    fn contains(&self, symbol: &str) -> bool;
}
