use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format `{0}` (expected: text|json|journald)")]
    UnknownFormat(String),
    #[error("journald output needs linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
    #[error("installing subscriber failed: {0}")]
    Install(String),
    #[error("invalid log filter `{0}`")]
    InvalidFilter(String),
}
