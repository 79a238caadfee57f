use thiserror::Error;
use time::OffsetDateTime;

use crate::repositories::exams::StoreError;

/// Earlier completed attempt surfaced to a caller whose start was refused.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PriorAttempt {
    pub(crate) attempt_number: u32,
    pub(crate) existing_score: f64,
    pub(crate) submitted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    StateConflict { message: String, prior: Option<PriorAttempt> },
    #[error("exam time has expired")]
    Expired { auto_submitted: bool },
    #[error("{requested} marks exceed the {max} available for question {question_number}")]
    OutOfRange { question_number: u32, requested: f64, max: f64 },
    #[error("exam {exam_id} changed concurrently; gave up after {retries} attempts")]
    Conflict { exam_id: String, retries: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttemptError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn state_conflict(message: impl Into<String>) -> Self {
        Self::StateConflict { message: message.into(), prior: None }
    }
}
