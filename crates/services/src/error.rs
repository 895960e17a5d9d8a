//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::LessonSummaryError;
use storage::repository::StorageError;

/// Errors emitted by the lesson session services.
///
/// Out-of-order learner actions are not errors; they are ignored and reported
/// through the return value of the operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("lesson is not completed yet")]
    NotCompleted,
    #[error(transparent)]
    Summary(#[from] LessonSummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
