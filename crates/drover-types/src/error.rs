use thiserror::Error;

/// Errors raised by repository ports (execution, queue and relation stores).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Backend(String),
}
