use thiserror::Error;

/// Errors raised synchronously, before any sample is computed.
///
/// Divergence and numeric instability are never errors: they surface as
/// non-converged results.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The rectangle or interval is malformed, or the resolution is zero.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// A settings value is out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The worker pool could not be started.
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
