use thiserror::Error;

use crate::capability::TranscriberError;

#[derive(Debug, Error)]
pub enum StreamingError {
    #[error(transparent)]
    TranscriberFailed(#[from] TranscriberError),
    #[error("session timed out after {idle_seconds:.1}s idle")]
    SessionTimeout { idle_seconds: f64 },
    #[error("session already finalized")]
    AlreadyFinalized,
    #[error("session is not active (state: {state})")]
    NotActive { state: &'static str },
}

/// A failed `StreamingSession::finalize`, carrying the best-effort confirmed
/// text the strategy had accumulated before the failure so a caller can
/// surface it alongside the fatal error instead of discarding it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct FinalizeError {
    #[source]
    pub source: StreamingError,
    pub confirmed_text: String,
}
