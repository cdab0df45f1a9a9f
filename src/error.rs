use thiserror::Error;

/// Failures from the classifier collaborators. Every variant is
/// recoverable: the engine treats them as "inconclusive" and keeps the
/// buffer open for a later trigger.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("classifier returned no choices")]
    EmptyResponse,

    #[error("could not parse classifier payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Caller-side misuse of the engine handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The worker loop has exited (stop() completed); the operation can
    /// never get an answer.
    #[error("engine is stopped")]
    Stopped,
}
