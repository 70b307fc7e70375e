//! Store-level errors.

use crate::jsonl::JsonlError;
use trigmap_kernel::{ApiError, TriggerId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: u64 },

    #[error("dependency already exists: {down} -> {up}")]
    DependencyAlreadyExists { down: TriggerId, up: TriggerId },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NoPermission,
            other => ApiError::Store(other.to_string()),
        }
    }
}
