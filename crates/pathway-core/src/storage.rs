//! Read/write course documents from disk.
//!
//! Layout under the project root:
//!
//! ```text
//! .pathway/
//!   config.toml
//!   courses/
//!     <id>.json          course document (optionally zstd-compressed)
//!     <id>.review.json   review marker written on submit
//! ```

use crate::config::StorageConfig;
use crate::repository::{CourseRepository, RepositoryError};
use crate::schema::{self, CourseUpdate, NewCourse, PersistedCourse};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

const PATHWAY_DIR: &str = ".pathway";
const COURSES_DIR: &str = "courses";
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const ZSTD_LEVEL: i32 = 3;

/// Get the path to the pathway directory for a given project root.
pub fn pathway_dir(project_root: &Path) -> PathBuf {
    project_root.join(PATHWAY_DIR)
}

pub fn courses_dir(project_root: &Path) -> PathBuf {
    pathway_dir(project_root).join(COURSES_DIR)
}

pub fn course_file(project_root: &Path, id: &str) -> PathBuf {
    courses_dir(project_root).join(format!("{id}.json"))
}

pub fn review_file(project_root: &Path, id: &str) -> PathBuf {
    courses_dir(project_root).join(format!("{id}.review.json"))
}

/// Check if a course document exists for the given id.
pub fn course_exists(project_root: &Path, id: &str) -> bool {
    course_file(project_root, id).exists()
}

/// Load a course from disk. Compressed documents are detected by their magic bytes.
pub fn load(project_root: &Path, id: &str) -> Result<PersistedCourse> {
    let path = course_file(project_root, id);
    let bytes =
        fs::read(&path).with_context(|| format!("failed to read course from {}", path.display()))?;

    let json = if bytes.starts_with(&ZSTD_MAGIC) {
        let raw = zstd::decode_all(bytes.as_slice())
            .with_context(|| format!("failed to decompress {}", path.display()))?;
        String::from_utf8(raw).context("decompressed course is not UTF-8")?
    } else {
        String::from_utf8(bytes).context("course file is not UTF-8")?
    };
    schema::from_json(&json)
}

/// Save a course to disk, creating the courses directory if needed.
pub fn save(project_root: &Path, course: &PersistedCourse, config: &StorageConfig) -> Result<()> {
    let dir = courses_dir(project_root);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create course directory {}", dir.display()))?;

    let path = course_file(project_root, &course.id);
    let json = schema::to_json(course)?;
    let bytes = if config.compress {
        zstd::encode_all(json.as_bytes(), ZSTD_LEVEL).context("failed to compress course")?
    } else {
        json.into_bytes()
    };
    fs::write(&path, bytes)
        .with_context(|| format!("failed to write course to {}", path.display()))?;

    Ok(())
}

/// Ids of all stored courses, sorted.
pub fn list_courses(project_root: &Path) -> Result<Vec<String>> {
    let dir = courses_dir(project_root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = name.strip_suffix(".json")
            && !id.ends_with(".review")
        {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Reject ids that could escape the courses directory.
fn check_id(id: &str) -> Result<(), RepositoryError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(RepositoryError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// File-backed [`CourseRepository`] rooted at a project directory.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
    config: StorageConfig,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>, config: StorageConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn allocate_id(&self) -> String {
        let base = format!("course-{}", Utc::now().format("%Y%m%d%H%M%S%3f"));
        if !course_exists(&self.root, &base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !course_exists(&self.root, id))
            .unwrap_or(base)
    }
}

impl CourseRepository for FileRepository {
    async fn load_course(&self, id: &str) -> Result<PersistedCourse, RepositoryError> {
        check_id(id)?;
        if !course_exists(&self.root, id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(load(&self.root, id)?)
    }

    async fn save_course(&self, id: &str, update: CourseUpdate) -> Result<(), RepositoryError> {
        check_id(id)?;
        if !course_exists(&self.root, id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let mut course = load(&self.root, id)?;
        course.apply(update);
        save(&self.root, &course, &self.config)?;
        tracing::debug!(course = id, nodes = course.nodes.len(), "course saved");
        Ok(())
    }

    async fn create_course(&self, course: NewCourse) -> Result<String, RepositoryError> {
        let id = self.allocate_id();
        let stored = PersistedCourse {
            id: id.clone(),
            title: course.title,
            nodes: course.nodes,
            edges: course.edges,
            updated_at: Utc::now(),
        };
        save(&self.root, &stored, &self.config)?;
        tracing::info!(course = %id, "course created");
        Ok(id)
    }

    async fn submit_for_review(&self, id: &str) -> Result<(), RepositoryError> {
        check_id(id)?;
        if !course_exists(&self.root, id) {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let marker = serde_json::json!({
            "courseId": id,
            "submittedAt": Utc::now(),
        });
        let path = review_file(&self.root, id);
        let json = serde_json::to_string_pretty(&marker)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        fs::write(&path, json).map_err(|e| {
            RepositoryError::Storage(format!("failed to write {}: {e}", path.display()))
        })?;
        tracing::info!(course = id, "course submitted for review");
        Ok(())
    }
}
