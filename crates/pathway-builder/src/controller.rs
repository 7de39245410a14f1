//! The builder controller: routes every user intent through the graph model
//! and fans the result out to history, reachability and persistence.

use crate::error::BuilderError;
use crate::persistence::{PersistenceCoordinator, SaveStatus, WriteTrigger};
use chrono::Utc;
use pathway_core::config::{LayoutConfig, PathwayConfig};
use pathway_core::graph::{CourseGraph, GraphModel, ModuleData, Position};
use pathway_core::history::HistoryManager;
use pathway_core::layout::{self, Bounds};
use pathway_core::reachability::{Reachability, compute_reachable};
use pathway_core::repository::{CourseRepository, RepositoryError};
use pathway_core::schema::{CourseUpdate, PersistedCourse};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Loading,
    Ready,
    /// A write is in flight. Editing continues.
    Saving,
    Closed,
}

/// Owned copy of everything the editing surface renders.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorView {
    pub course_id: Option<String>,
    pub state: BuilderState,
    pub graph: CourseGraph,
    pub reachability: Reachability,
    pub can_undo: bool,
    pub can_redo: bool,
    pub save_status: SaveStatus,
}

/// A full-overwrite write, detached from the controller so it can run while
/// editing continues.
#[derive(Debug, Clone)]
pub struct WriteJob {
    /// `None` for a course that has never been written.
    pub course_id: Option<String>,
    pub trigger: WriteTrigger,
    pub payload: CourseUpdate,
}

impl WriteJob {
    /// Send the payload. Returns the id the course is stored under.
    pub async fn run<R: CourseRepository>(self, repo: &R) -> Result<String, RepositoryError> {
        match self.course_id {
            Some(id) => {
                repo.save_course(&id, self.payload).await?;
                Ok(id)
            }
            None => repo.create_course(self.payload.into_new_course()).await,
        }
    }
}

#[derive(Debug)]
pub struct BuilderController {
    course_id: Option<String>,
    state: BuilderState,
    model: GraphModel,
    history: HistoryManager,
    reachability: Reachability,
    persistence: PersistenceCoordinator,
    layout: LayoutConfig,
}

impl BuilderController {
    /// Author a brand-new course: Entry node only, no id until the first write.
    pub fn new_course(title: &str, config: &PathwayConfig) -> Self {
        let model = GraphModel::new(title, &config.layout);
        Self::assemble(None, model, config)
    }

    /// Hydrate from a stored document, repairing structural damage.
    pub fn from_persisted(course: PersistedCourse, config: &PathwayConfig) -> Self {
        let graph = course.to_graph();
        let (model, report) = GraphModel::hydrate(graph, &config.layout);
        if !report.is_clean() {
            warn!(
                course = %course.id,
                entry_inserted = report.entry_inserted,
                entry_renamed = report.entry_renamed,
                entries_removed = report.entries_removed,
                duplicates_removed = report.duplicates_removed,
                edges_pruned = report.edges_pruned,
                "repaired course graph on load"
            );
        }
        Self::assemble(Some(course.id), model, config)
    }

    /// Load a course from the repository. A load failure is fatal: no
    /// controller is produced.
    pub async fn open<R: CourseRepository>(
        repo: &R,
        course_id: &str,
        config: &PathwayConfig,
    ) -> Result<Self, BuilderError> {
        debug!(course = course_id, state = ?BuilderState::Loading, "opening course");
        let course = repo
            .load_course(course_id)
            .await
            .map_err(|source| BuilderError::Hydration {
                course_id: course_id.to_string(),
                source,
            })?;
        let controller = Self::from_persisted(course, config);
        info!(
            course = course_id,
            nodes = controller.graph().nodes.len(),
            edges = controller.graph().edges.len(),
            "course opened"
        );
        Ok(controller)
    }

    fn assemble(course_id: Option<String>, model: GraphModel, config: &PathwayConfig) -> Self {
        let history = HistoryManager::new(model.snapshot(), config.history.max_depth);
        let reachability = compute_reachable(model.graph());
        Self {
            course_id,
            state: BuilderState::Ready,
            model,
            history,
            reachability,
            persistence: PersistenceCoordinator::new(config.persistence.debounce()),
            layout: config.layout.clone(),
        }
    }

    pub fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn graph(&self) -> &CourseGraph {
        self.model.graph()
    }

    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.persistence.status()
    }

    pub fn has_pending_write(&self) -> bool {
        self.persistence.has_pending()
    }

    pub fn view(&self) -> EditorView {
        EditorView {
            course_id: self.course_id.clone(),
            state: self.state,
            graph: self.model.snapshot(),
            reachability: self.reachability.clone(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            save_status: self.save_status(),
        }
    }

    // Intents. Each one that changes the graph is committed exactly once.

    pub fn add_module(
        &mut self,
        data: ModuleData,
        position: Option<Position>,
        now: Instant,
    ) -> Result<String, BuilderError> {
        self.ensure_open()?;
        let id = self.model.add_module_node(data, position);
        self.commit("add_module", now);
        Ok(id)
    }

    pub fn connect(
        &mut self,
        source_id: &str,
        target_id: &str,
        now: Instant,
    ) -> Result<Option<String>, BuilderError> {
        self.ensure_open()?;
        let edge = self.model.connect(source_id, target_id);
        if edge.is_some() {
            self.commit("connect", now);
        }
        Ok(edge)
    }

    pub fn delete_selected(
        &mut self,
        node_ids: &[String],
        edge_ids: &[String],
        now: Instant,
    ) -> Result<bool, BuilderError> {
        self.ensure_open()?;
        let changed = self.model.delete_selected(node_ids, edge_ids);
        if changed {
            self.commit("delete_selected", now);
        }
        Ok(changed)
    }

    pub fn duplicate_selected(
        &mut self,
        node_ids: &[String],
        now: Instant,
    ) -> Result<Vec<String>, BuilderError> {
        self.ensure_open()?;
        let copies = self.model.duplicate_selected(node_ids);
        if !copies.is_empty() {
            self.commit("duplicate_selected", now);
        }
        Ok(copies)
    }

    pub fn rename(&mut self, title: &str, now: Instant) -> Result<bool, BuilderError> {
        self.ensure_open()?;
        let changed = self.model.rename_graph(title);
        if changed {
            self.commit("rename", now);
        }
        Ok(changed)
    }

    pub fn move_node(
        &mut self,
        node_id: &str,
        position: Position,
        now: Instant,
    ) -> Result<bool, BuilderError> {
        self.ensure_open()?;
        let changed = self.model.move_node(node_id, position);
        if changed {
            self.commit("move_node", now);
        }
        Ok(changed)
    }

    /// Run the layered layout and apply it as one step. Returns the bounding
    /// box of the module positions so the caller can re-center the view.
    pub fn auto_arrange(&mut self, now: Instant) -> Result<Option<Bounds>, BuilderError> {
        self.ensure_open()?;
        let positions = layout::layout(self.model.graph(), &self.layout);
        if self.model.apply_positions(&positions) {
            self.commit("auto_arrange", now);
        }
        Ok(layout::bounds(positions.values()))
    }

    pub fn undo(&mut self, now: Instant) -> Result<bool, BuilderError> {
        self.ensure_open()?;
        let Some(graph) = self.history.undo().cloned() else {
            return Ok(false);
        };
        self.replace_graph(graph, now);
        Ok(true)
    }

    pub fn redo(&mut self, now: Instant) -> Result<bool, BuilderError> {
        self.ensure_open()?;
        let Some(graph) = self.history.redo().cloned() else {
            return Ok(false);
        };
        self.replace_graph(graph, now);
        Ok(true)
    }

    fn commit(&mut self, intent: &str, now: Instant) {
        self.history.record(self.model.snapshot());
        self.reachability = compute_reachable(self.model.graph());
        self.persistence.schedule(now);
        debug!(
            intent,
            nodes = self.model.graph().nodes.len(),
            edges = self.model.graph().edges.len(),
            total_minutes = self.reachability.total_duration_minutes,
            "mutation committed"
        );
    }

    fn replace_graph(&mut self, graph: CourseGraph, now: Instant) {
        self.model.restore(graph);
        self.reachability = compute_reachable(self.model.graph());
        self.persistence.schedule(now);
    }

    fn ensure_open(&self) -> Result<(), BuilderError> {
        if self.state == BuilderState::Closed {
            return Err(BuilderError::Closed);
        }
        Ok(())
    }

    // Writes. The controller decides what to send; the caller runs the job.

    /// Queue an explicit save, cancelling the pending debounced one.
    pub fn request_save(&mut self) -> Result<(), BuilderError> {
        self.ensure_open()?;
        self.persistence.request_immediate();
        Ok(())
    }

    /// Start the write that is due at `now`, if any, with the current graph.
    pub fn poll_write(&mut self, now: Instant) -> Option<WriteJob> {
        let trigger = self.persistence.poll_due(now)?;
        self.persistence.begin_write();
        if self.state == BuilderState::Ready {
            self.state = BuilderState::Saving;
        }
        info!(course = ?self.course_id, ?trigger, "writing course");
        Some(WriteJob {
            course_id: self.course_id.clone(),
            trigger,
            payload: CourseUpdate::from_graph(self.model.graph(), Utc::now()),
        })
    }

    /// Record the outcome of the in-flight write. Failures are returned for
    /// reporting but leave the graph and history untouched.
    pub fn complete_write(
        &mut self,
        result: Result<String, RepositoryError>,
    ) -> Result<(), BuilderError> {
        if self.state == BuilderState::Saving {
            self.state = BuilderState::Ready;
        }
        match result {
            Ok(id) => {
                if self.course_id.is_none() {
                    info!(course = %id, "course created");
                    self.course_id = Some(id);
                }
                self.persistence.finish_write(Ok(()));
                Ok(())
            }
            Err(err) => {
                warn!(course = ?self.course_id, error = %err, "course write failed");
                self.persistence.finish_write(Err(&err.to_string()));
                Err(BuilderError::Persistence(err))
            }
        }
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.persistence.deadline()
    }

    /// Run the debounced write if it is due. Returns whether a write happened.
    pub async fn flush_due<R: CourseRepository>(
        &mut self,
        repo: &R,
        now: Instant,
    ) -> Result<bool, BuilderError> {
        let Some(job) = self.poll_write(now) else {
            return Ok(false);
        };
        let result = job.run(repo).await;
        self.complete_write(result)?;
        Ok(true)
    }

    /// Write the current graph immediately.
    pub async fn save_now<R: CourseRepository>(&mut self, repo: &R) -> Result<(), BuilderError> {
        self.request_save()?;
        self.flush_due(repo, Instant::now()).await?;
        Ok(())
    }

    /// Save, then hand the course to the review workflow. Requires a title.
    pub async fn submit_for_review<R: CourseRepository>(
        &mut self,
        repo: &R,
    ) -> Result<(), BuilderError> {
        self.check_submittable()?;
        self.save_now(repo).await?;
        self.request_review(repo).await
    }

    pub fn check_submittable(&self) -> Result<(), BuilderError> {
        self.ensure_open()?;
        if self.graph().title.trim().is_empty() {
            return Err(BuilderError::MissingTitle);
        }
        Ok(())
    }

    /// Hand an already saved course to the review workflow.
    pub async fn request_review<R: CourseRepository>(&self, repo: &R) -> Result<(), BuilderError> {
        let Some(id) = self.course_id.clone() else {
            return Err(BuilderError::Persistence(RepositoryError::Rejected(
                "course has no id after saving".to_string(),
            )));
        };
        repo.submit_for_review(&id).await.map_err(BuilderError::Review)?;
        info!(course = %id, "submitted for review");
        Ok(())
    }

    /// End the session, writing first if anything is still pending.
    pub async fn close<R: CourseRepository>(&mut self, repo: &R) -> Result<(), BuilderError> {
        if self.state == BuilderState::Closed {
            return Ok(());
        }
        let flushed = if self.persistence.has_pending() {
            self.save_now(repo).await
        } else {
            Ok(())
        };
        self.mark_closed();
        flushed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = BuilderState::Closed;
        debug!(course = ?self.course_id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathway_core::graph::ENTRY_NODE_ID;
    use pathway_core::repository::InMemoryRepository;
    use std::time::Duration;

    fn module(title: &str, minutes: u32) -> ModuleData {
        ModuleData {
            module_ref: title.to_lowercase(),
            title: title.to_string(),
            description: String::new(),
            duration_minutes: minutes,
            family_label: String::new(),
            family_icon: String::new(),
        }
    }

    fn controller() -> BuilderController {
        BuilderController::new_course("Course", &PathwayConfig::default())
    }

    #[test]
    fn test_noop_intents_are_not_recorded() {
        let now = Instant::now();
        let mut c = controller();
        assert_eq!(c.connect("ghost", ENTRY_NODE_ID, now).unwrap(), None);
        assert!(!c.delete_selected(&[ENTRY_NODE_ID.to_string()], &[], now).unwrap());
        assert!(!c.rename("Course", now).unwrap());
        assert!(!c.can_undo());
        assert!(!c.has_pending_write());
    }

    #[test]
    fn test_intents_update_reachability_and_schedule() {
        let now = Instant::now();
        let mut c = controller();
        let intro = c.add_module(module("Intro", 30), None, now).unwrap();
        c.connect(ENTRY_NODE_ID, &intro, now).unwrap();
        let advanced = c.add_module(module("Advanced", 90), None, now).unwrap();
        assert_eq!(c.reachability().total_duration_minutes, 30);

        c.connect(&intro, &advanced, now).unwrap();
        assert_eq!(c.reachability().total_duration_minutes, 120);
        assert_eq!(c.save_status(), SaveStatus::Pending);
        assert_eq!(
            c.write_deadline(),
            Some(now + Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_undo_redo_restore_reachability() {
        let now = Instant::now();
        let mut c = controller();
        let a = c.add_module(module("A", 10), None, now).unwrap();
        c.connect(ENTRY_NODE_ID, &a, now).unwrap();
        assert_eq!(c.reachability().total_duration_minutes, 10);

        assert!(c.undo(now).unwrap());
        assert_eq!(c.reachability().total_duration_minutes, 0);
        assert!(c.can_redo());
        assert!(c.redo(now).unwrap());
        assert_eq!(c.reachability().total_duration_minutes, 10);
        assert!(!c.redo(now).unwrap());
    }

    #[test]
    fn test_auto_arrange_is_one_step() {
        let now = Instant::now();
        let mut c = controller();
        let a = c.add_module(module("A", 10), Some(Position::new(900.0, 900.0)), now).unwrap();
        let b = c.add_module(module("B", 10), Some(Position::new(-50.0, 40.0)), now).unwrap();
        c.connect(&a, &b, now).unwrap();

        let bounds = c.auto_arrange(now).unwrap().unwrap();
        assert!(bounds.min_x > 0.0);
        assert!(c.undo(now).unwrap());
        assert_eq!(c.graph().node(&a).unwrap().position, Position::new(900.0, 900.0));

        c.redo(now).unwrap();
        // Already arranged: nothing new is recorded.
        c.auto_arrange(now).unwrap();
        assert!(!c.can_redo());
        c.undo(now).unwrap();
        assert_eq!(c.graph().node(&a).unwrap().position, Position::new(900.0, 900.0));
    }

    #[tokio::test]
    async fn test_first_write_creates_course() {
        let repo = InMemoryRepository::new();
        let mut c = controller();
        c.add_module(module("A", 10), None, Instant::now()).unwrap();
        c.save_now(&repo).await.unwrap();

        let id = c.course_id().unwrap().to_string();
        c.rename("Renamed", Instant::now()).unwrap();
        c.save_now(&repo).await.unwrap();

        let writes = repo.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| w.course_id == id));
        assert_eq!(repo.course(&id).unwrap().title, "Renamed");
        assert_eq!(c.save_status(), SaveStatus::Idle);
        assert_eq!(c.state(), BuilderState::Ready);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_graph() {
        let repo = InMemoryRepository::new();
        repo.set_fail_writes(Some("offline"));
        let mut c = controller();
        let a = c.add_module(module("A", 10), None, Instant::now()).unwrap();

        let err = c.save_now(&repo).await.unwrap_err();
        assert!(matches!(err, BuilderError::Persistence(_)));
        assert!(c.graph().contains_node(&a));
        assert!(c.can_undo());
        assert!(matches!(c.save_status(), SaveStatus::Failed(_)));

        repo.set_fail_writes(None);
        c.save_now(&repo).await.unwrap();
        assert_eq!(c.save_status(), SaveStatus::Idle);
    }

    #[tokio::test]
    async fn test_close_after_failed_write_stores_graph() {
        let repo = InMemoryRepository::new();
        repo.set_fail_writes(Some("offline"));
        let mut c = controller();
        c.add_module(module("A", 10), None, Instant::now()).unwrap();
        assert!(c.save_now(&repo).await.is_err());
        assert!(c.has_pending_write());

        repo.set_fail_writes(None);
        c.close(&repo).await.unwrap();
        let id = c.course_id().unwrap();
        assert_eq!(repo.course(id).unwrap().nodes.len(), 2);
        assert_eq!(c.state(), BuilderState::Closed);
    }

    #[tokio::test]
    async fn test_submit_requires_title() {
        let repo = InMemoryRepository::new();
        let mut c = BuilderController::new_course("  ", &PathwayConfig::default());
        assert_eq!(
            c.submit_for_review(&repo).await.unwrap_err(),
            BuilderError::MissingTitle
        );
        assert_eq!(repo.write_count(), 0);

        c.rename("Ready to ship", Instant::now()).unwrap();
        c.submit_for_review(&repo).await.unwrap();
        assert_eq!(repo.submitted(), vec![c.course_id().unwrap().to_string()]);
    }

    #[tokio::test]
    async fn test_open_failure_is_hydration_error() {
        let repo = InMemoryRepository::new();
        let err = BuilderController::open(&repo, "missing", &PathwayConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BuilderError::Hydration { .. }));
    }

    #[tokio::test]
    async fn test_close_flushes_and_rejects_intents() {
        let repo = InMemoryRepository::new();
        let mut c = controller();
        c.add_module(module("A", 10), None, Instant::now()).unwrap();
        c.close(&repo).await.unwrap();

        assert_eq!(repo.write_count(), 1);
        assert_eq!(c.state(), BuilderState::Closed);
        assert_eq!(
            c.add_module(module("B", 10), None, Instant::now()).unwrap_err(),
            BuilderError::Closed
        );
        assert_eq!(c.undo(Instant::now()).unwrap_err(), BuilderError::Closed);
    }
}
