use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("cannot parse kernel release '{0}'")]
    InvalidKernelRelease(String),

    #[error("kernel symbol '{0}' not found in the symbol table")]
    SymbolMissing(String),

    #[error("probe catalog contains no builds")]
    NoProgramForKernel,
}
