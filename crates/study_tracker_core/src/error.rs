//! crates/study_tracker_core/src/error.rs
//!
//! Errors surfaced by router commands.

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    /// Propagated from one of the ports (usually the document store).
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("No pending confirmation with id {0}")]
    UnknownConfirmation(uuid::Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type AppResult<T> = Result<T, AppError>;
