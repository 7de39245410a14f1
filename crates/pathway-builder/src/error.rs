use pathway_core::repository::RepositoryError;
use thiserror::Error;

/// Errors surfaced to the editing surface.
///
/// Only [`BuilderError::Hydration`] ends a session. Persistence failures are
/// notices: the in-memory graph and history are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("failed to open course {course_id}: {source}")]
    Hydration {
        course_id: String,
        #[source]
        source: RepositoryError,
    },
    #[error("failed to save course: {0}")]
    Persistence(#[source] RepositoryError),
    #[error("review submission failed: {0}")]
    Review(#[source] RepositoryError),
    #[error("a course title is required before submitting for review")]
    MissingTitle,
    #[error("the editing session is closed")]
    Closed,
    #[error("the editing session has stopped")]
    SessionGone,
}
