use chrono::Utc;
use pathway_builder::{
    BuilderController, BuilderError, BuilderState, SaveStatus, open_session, spawn_session,
};
use pathway_core::config::PathwayConfig;
use pathway_core::graph::{CourseGraph, ENTRY_NODE_ID, ModuleData, Position};
use pathway_core::repository::{CourseRepository, InMemoryRepository, RepositoryError};
use pathway_core::schema::{CourseUpdate, NewCourse, PersistedCourse};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};

fn make_module(title: &str, minutes: u32) -> ModuleData {
    ModuleData {
        module_ref: title.to_lowercase(),
        title: title.to_string(),
        description: String::new(),
        duration_minutes: minutes,
        family_label: "Core".to_string(),
        family_icon: "book".to_string(),
    }
}

fn stored_course(id: &str) -> PersistedCourse {
    let graph = CourseGraph::new("Stored", Position::default());
    PersistedCourse::from_graph(id, &graph, Utc::now())
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Repository whose writes take a fixed amount of (tokio) time.
struct SlowRepository {
    inner: InMemoryRepository,
    delay: Duration,
}

impl CourseRepository for SlowRepository {
    async fn load_course(&self, id: &str) -> Result<PersistedCourse, RepositoryError> {
        self.inner.load_course(id).await
    }

    async fn save_course(&self, id: &str, update: CourseUpdate) -> Result<(), RepositoryError> {
        sleep(self.delay).await;
        self.inner.save_course(id, update).await
    }

    async fn create_course(&self, course: NewCourse) -> Result<String, RepositoryError> {
        sleep(self.delay).await;
        self.inner.create_course(course).await
    }

    async fn submit_for_review(&self, id: &str) -> Result<(), RepositoryError> {
        self.inner.submit_for_review(id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_rapid_edits() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());
    let start = Instant::now();

    let intro = handle.add_module(make_module("Intro", 30), None).await.unwrap();
    sleep_until(start + ms(200)).await;
    let advanced = handle.add_module(make_module("Advanced", 90), None).await.unwrap();
    sleep_until(start + ms(400)).await;
    handle.connect(ENTRY_NODE_ID, &intro).await.unwrap().unwrap();
    assert_eq!(handle.save_status(), SaveStatus::Pending);

    sleep_until(start + ms(1899)).await;
    assert_eq!(repo.write_count(), 0);

    sleep_until(start + ms(1901)).await;
    let writes = repo.writes();
    assert_eq!(writes.len(), 1);
    let saved = &writes[0].course;
    assert_eq!(saved.nodes.len(), 3);
    assert!(saved.nodes.iter().any(|n| n.id == advanced));
    assert_eq!(saved.edges.len(), 1);

    sleep_until(start + ms(10_000)).await;
    assert_eq!(repo.write_count(), 1);
    assert_eq!(handle.save_status(), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_is_a_notice() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    repo.set_fail_writes(Some("backend down"));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());

    let a = handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep(ms(2000)).await;
    assert!(matches!(handle.save_status(), SaveStatus::Failed(_)));
    assert_eq!(handle.state(), BuilderState::Ready);

    let view = handle.view().await.unwrap();
    assert!(view.graph.contains_node(&a));
    assert!(view.can_undo);

    let err = handle.save().await.unwrap_err();
    assert!(matches!(err, BuilderError::Persistence(RepositoryError::Unavailable(_))));

    repo.set_fail_writes(None);
    handle.save().await.unwrap();
    assert_eq!(handle.save_status(), SaveStatus::Idle);
    assert_eq!(repo.course("c1").unwrap().nodes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_close_after_failed_write_stores_latest_graph() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    repo.set_fail_writes(Some("backend down"));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());

    handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep(ms(2000)).await;
    assert!(matches!(handle.save_status(), SaveStatus::Failed(_)));

    // No retry on its own.
    sleep(ms(10_000)).await;
    assert_eq!(repo.write_count(), 0);

    repo.set_fail_writes(None);
    handle.close().await.unwrap();
    assert_eq!(repo.write_count(), 1);
    assert_eq!(repo.course("c1").unwrap().nodes.len(), 2);
    assert_eq!(handle.state(), BuilderState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_after_failed_write_stores_graph() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    repo.set_fail_writes(Some("backend down"));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());

    handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep(ms(2000)).await;
    repo.set_fail_writes(None);
    drop(handle);

    sleep(ms(10)).await;
    assert_eq!(repo.course("c1").unwrap().nodes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_editing_continues_while_a_write_is_in_flight() {
    let repo = Arc::new(SlowRepository {
        inner: InMemoryRepository::new().with_course(stored_course("c1")),
        delay: ms(1000),
    });
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());
    let start = Instant::now();

    handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep_until(start + ms(1600)).await;
    assert_eq!(handle.save_status(), SaveStatus::Saving);

    // The running write carries only A; B must follow in a later write.
    let b = handle.add_module(make_module("B", 20), None).await.unwrap();
    assert_eq!(handle.view().await.unwrap().graph.nodes.len(), 3);

    sleep_until(start + ms(2600)).await;
    let writes = repo.inner.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].course.nodes.len(), 2);

    sleep_until(start + ms(4200)).await;
    let writes = repo.inner.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[1].course.nodes.iter().any(|n| n.id == b));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_save_during_write_is_queued() {
    let repo = Arc::new(SlowRepository {
        inner: InMemoryRepository::new().with_course(stored_course("c1")),
        delay: ms(1000),
    });
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());
    let start = Instant::now();

    handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep_until(start + ms(1600)).await;
    let b = handle.add_module(make_module("B", 20), None).await.unwrap();
    handle.save().await.unwrap();

    let writes = repo.inner.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[1].course.nodes.iter().any(|n| n.id == b));

    // The explicit save superseded the debounce armed by adding B.
    sleep_until(start + ms(10_000)).await;
    assert_eq!(repo.inner.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_undo_redo_through_session() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = BuilderController::new_course("Fresh", &PathwayConfig::default());
    let handle = spawn_session(controller, Arc::clone(&repo));

    let a = handle.add_module(make_module("A", 10), None).await.unwrap();
    handle.connect(ENTRY_NODE_ID, &a).await.unwrap();
    assert_eq!(handle.view().await.unwrap().reachability.total_duration_minutes, 10);

    assert!(handle.undo().await.unwrap());
    assert!(handle.undo().await.unwrap());
    assert!(!handle.undo().await.unwrap());
    let view = handle.view().await.unwrap();
    assert_eq!(view.graph.nodes.len(), 1);
    assert!(view.can_redo);

    assert!(handle.redo().await.unwrap());
    assert!(handle.redo().await.unwrap());
    assert_eq!(handle.view().await.unwrap().reachability.total_duration_minutes, 10);
}

#[tokio::test(start_paused = true)]
async fn test_new_course_is_created_on_first_write() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = BuilderController::new_course("Fresh", &PathwayConfig::default());
    let handle = spawn_session(controller, Arc::clone(&repo));

    handle.add_module(make_module("A", 10), None).await.unwrap();
    sleep(ms(2000)).await;
    let id = handle.view().await.unwrap().course_id.unwrap();

    handle.rename("Fresh v2").await.unwrap();
    handle.save().await.unwrap();
    assert_eq!(repo.write_count(), 2);
    assert_eq!(repo.course(&id).unwrap().title, "Fresh v2");
}

#[tokio::test(start_paused = true)]
async fn test_submit_for_review() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = BuilderController::new_course("", &PathwayConfig::default());
    let handle = spawn_session(controller, Arc::clone(&repo));

    assert_eq!(
        handle.submit_for_review().await.unwrap_err(),
        BuilderError::MissingTitle
    );
    handle.rename("Shippable").await.unwrap();
    handle.submit_for_review().await.unwrap();

    let id = handle.view().await.unwrap().course_id.unwrap();
    assert_eq!(repo.submitted(), vec![id]);
    assert_eq!(repo.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_flushes_then_rejects() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());

    handle.add_module(make_module("A", 10), None).await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(repo.write_count(), 1);
    assert_eq!(handle.state(), BuilderState::Closed);

    assert_eq!(
        handle.add_module(make_module("B", 10), None).await.unwrap_err(),
        BuilderError::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_flushes() {
    let repo = Arc::new(InMemoryRepository::new().with_course(stored_course("c1")));
    let handle = open_session(Arc::clone(&repo), "c1".to_string(), PathwayConfig::default());
    handle.add_module(make_module("A", 10), None).await.unwrap();
    drop(handle);

    sleep(ms(10)).await;
    assert_eq!(repo.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_rejects_every_command() {
    let repo = Arc::new(InMemoryRepository::new());
    let handle = open_session(Arc::clone(&repo), "missing".to_string(), PathwayConfig::default());

    let err = handle.add_module(make_module("A", 10), None).await.unwrap_err();
    assert!(matches!(
        err,
        BuilderError::Hydration {
            source: RepositoryError::NotFound(_),
            ..
        }
    ));
    assert_eq!(handle.state(), BuilderState::Closed);
    assert!(handle.view().await.is_err());
}
