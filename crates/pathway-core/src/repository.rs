//! Course repository contract and an in-memory implementation.
//!
//! The builder only talks to storage through [`CourseRepository`]. Every save
//! is a whole-document overwrite: there is no diffing and no conflict
//! detection, the last write wins.

use crate::schema::{CourseUpdate, NewCourse, PersistedCourse};
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors surfaced by a course repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("course not found: {0}")]
    NotFound(String),
    #[error("invalid course id: {0}")]
    InvalidId(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<anyhow::Error> for RepositoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

/// Storage seam for course documents.
pub trait CourseRepository: Send + Sync {
    /// Fetch a course by id.
    fn load_course(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<PersistedCourse, RepositoryError>> + Send;

    /// Overwrite an existing course with a full snapshot.
    fn save_course(
        &self,
        id: &str,
        update: CourseUpdate,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Create a course and return its assigned id.
    fn create_course(
        &self,
        course: NewCourse,
    ) -> impl Future<Output = Result<String, RepositoryError>> + Send;

    /// Mark a saved course as ready for review.
    fn submit_for_review(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// One recorded write against an [`InMemoryRepository`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub course_id: String,
    pub course: PersistedCourse,
}

#[derive(Debug, Default)]
struct MemoryState {
    courses: BTreeMap<String, PersistedCourse>,
    writes: Vec<WriteRecord>,
    submitted: Vec<String>,
    next_id: u64,
    fail_writes: Option<String>,
}

/// Repository that keeps courses in memory and logs every write.
///
/// Used by tests and by embedders that do their own persistence. Writes can
/// be made to fail with [`InMemoryRepository::set_fail_writes`].
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored course.
    pub fn with_course(self, course: PersistedCourse) -> Self {
        self.lock().courses.insert(course.id.clone(), course);
        self
    }

    /// Make subsequent saves and creates fail with `Unavailable(reason)`.
    /// `None` restores normal behavior.
    pub fn set_fail_writes(&self, reason: Option<&str>) {
        self.lock().fail_writes = reason.map(str::to_string);
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn course(&self, id: &str) -> Option<PersistedCourse> {
        self.lock().courses.get(id).cloned()
    }

    /// Ids submitted for review, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CourseRepository for InMemoryRepository {
    async fn load_course(&self, id: &str) -> Result<PersistedCourse, RepositoryError> {
        self.lock()
            .courses
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn save_course(&self, id: &str, update: CourseUpdate) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_writes {
            return Err(RepositoryError::Unavailable(reason.clone()));
        }
        let course = state
            .courses
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        course.apply(update);
        let record = WriteRecord {
            course_id: id.to_string(),
            course: course.clone(),
        };
        state.writes.push(record);
        Ok(())
    }

    async fn create_course(&self, course: NewCourse) -> Result<String, RepositoryError> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_writes {
            return Err(RepositoryError::Unavailable(reason.clone()));
        }
        state.next_id += 1;
        let id = format!("course-{}", state.next_id);
        let stored = PersistedCourse {
            id: id.clone(),
            title: course.title,
            nodes: course.nodes,
            edges: course.edges,
            updated_at: Utc::now(),
        };
        state.courses.insert(id.clone(), stored.clone());
        state.writes.push(WriteRecord {
            course_id: id.clone(),
            course: stored,
        });
        Ok(id)
    }

    async fn submit_for_review(&self, id: &str) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if !state.courses.contains_key(id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        state.submitted.push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CourseGraph, Position};

    fn block_on<F: Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    fn update(title: &str) -> CourseUpdate {
        CourseUpdate::from_graph(&CourseGraph::new(title, Position::default()), Utc::now())
    }

    #[test]
    fn test_create_then_save_overwrites() {
        let repo = InMemoryRepository::new();
        let id = block_on(repo.create_course(update("First").into_new_course())).unwrap();
        block_on(repo.save_course(&id, update("Second"))).unwrap();

        assert_eq!(repo.write_count(), 2);
        assert_eq!(repo.course(&id).unwrap().title, "Second");
        assert_eq!(block_on(repo.load_course(&id)).unwrap().title, "Second");
    }

    #[test]
    fn test_save_unknown_course_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = block_on(repo.save_course("nope", update("x"))).unwrap_err();
        assert_eq!(err, RepositoryError::NotFound("nope".to_string()));
        assert_eq!(repo.write_count(), 0);
    }

    #[test]
    fn test_failure_injection() {
        let repo = InMemoryRepository::new();
        repo.set_fail_writes(Some("offline"));
        let err = block_on(repo.create_course(update("x").into_new_course())).unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));

        repo.set_fail_writes(None);
        assert!(block_on(repo.create_course(update("x").into_new_course())).is_ok());
    }

    #[test]
    fn test_submit_requires_existing_course() {
        let repo = InMemoryRepository::new();
        assert!(block_on(repo.submit_for_review("c1")).is_err());
        let id = block_on(repo.create_course(update("x").into_new_course())).unwrap();
        block_on(repo.submit_for_review(&id)).unwrap();
        assert_eq!(repo.submitted(), vec![id]);
    }
}
