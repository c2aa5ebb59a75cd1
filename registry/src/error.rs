use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by registry operations. Each variant maps to one HTTP
/// status class: validation → 400, not-found → 404, conflict → 409,
/// store → 500.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
