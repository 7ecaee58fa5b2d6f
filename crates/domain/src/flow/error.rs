use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    /// The record length does not match the kernel ABI. Continuing after
    /// this would decode garbage, so callers treat it as terminal.
    #[error("accounting record has invalid length {0}, expected {expected}", expected = ebpf_common::acct::EVENT_LENGTH)]
    InvalidLength(usize),
}
