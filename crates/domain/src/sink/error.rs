use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unknown sink type '{0}'")]
    UnknownSinkType(String),

    #[error("sink name must not be empty")]
    EmptyName,

    #[error("sink already initialized")]
    AlreadyInitialized,

    #[error("sink init failed: {0}")]
    InitFailed(String),
}
