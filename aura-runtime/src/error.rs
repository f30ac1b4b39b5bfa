//! Runtime error types.

use aura_core::AuraError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors surfaced by the async service handles.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The service task has shut down and no longer accepts commands.
    #[error("AURA service has stopped")]
    ServiceStopped,

    /// A payload failed validation at the ingestion boundary.
    #[error(transparent)]
    Core(#[from] AuraError),
}

impl<T> From<mpsc::error::SendError<T>> for RuntimeError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        RuntimeError::ServiceStopped
    }
}

impl From<oneshot::error::RecvError> for RuntimeError {
    fn from(_: oneshot::error::RecvError) -> Self {
        RuntimeError::ServiceStopped
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;
