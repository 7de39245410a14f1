//! Persisted course document and its JSON codec.
//!
//! The document is one row per course, always written whole:
//! `{ id, title, nodes, edges, updatedAt }`.

use crate::graph::{CourseGraph, Edge, Node};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course as stored by the course repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCourse {
    pub id: String,
    pub title: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub updated_at: DateTime<Utc>,
}

/// Full overwrite sent on every save: never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a course that has no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl PersistedCourse {
    pub fn from_graph(
        id: impl Into<String>,
        graph: &CourseGraph,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: graph.title.clone(),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            updated_at,
        }
    }

    pub fn to_graph(&self) -> CourseGraph {
        CourseGraph {
            title: self.title.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Overwrite this document with an update. Title is kept when the update has none.
    pub fn apply(&mut self, update: CourseUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        self.nodes = update.nodes;
        self.edges = update.edges;
        self.updated_at = update.updated_at;
    }
}

impl CourseUpdate {
    pub fn from_graph(graph: &CourseGraph, updated_at: DateTime<Utc>) -> Self {
        Self {
            title: Some(graph.title.clone()),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            updated_at,
        }
    }

    pub fn into_new_course(self) -> NewCourse {
        NewCourse {
            title: self.title.unwrap_or_default(),
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

/// Serialize a course document to a pretty-printed JSON string.
pub fn to_json(course: &PersistedCourse) -> Result<String> {
    serde_json::to_string_pretty(course).context("failed to serialize course document to JSON")
}

/// Deserialize a course document from a JSON string.
pub fn from_json(json: &str) -> Result<PersistedCourse> {
    serde_json::from_str(json).context("failed to deserialize course document from JSON")
}
