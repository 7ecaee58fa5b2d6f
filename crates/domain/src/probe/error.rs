use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Benign: `start` was called on a started probe.
    #[error("probe already started")]
    AlreadyStarted,

    /// Benign: `stop` was called before `start`.
    #[error("probe not started")]
    NotStarted,

    #[error("invalid rate curve: point ages must be strictly increasing")]
    InvalidCurve,

    #[error("consumer '{0}' is already registered")]
    DuplicateConsumer(String),

    #[error("no consumer named '{0}'")]
    NoSuchConsumer(String),

    /// Fatal during start: the BPF object could not be loaded.
    #[error("loading BPF object: {0}")]
    LoadFailed(String),

    /// Fatal during start: a hook could not be attached.
    #[error("attaching probe: {0}")]
    AttachFailed(String),
}
