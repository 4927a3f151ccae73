//! Error types for the editor layer.

use thiserror::Error;
use vellum_model::ModelError;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("pending delta count diverged after rebase")]
    PendingMismatch,
}
