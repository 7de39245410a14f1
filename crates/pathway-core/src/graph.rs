//! Course-flow graph data model and the single owner of its mutations.

use crate::config::LayoutConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Fixed id of the one Entry node every course graph carries.
pub const ENTRY_NODE_ID: &str = "entry";

/// Canvas coordinates of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// A module record as supplied by the module catalog.
/// Consumed verbatim by [`GraphModel::add_module_node`]; the builder never edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleData {
    pub module_ref: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub family_label: String,
    #[serde(default)]
    pub family_icon: String,
}

/// What a node is. Serialized as the `kind` tag of the node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// The fixed starting point of the path.
    Entry,
    /// A catalog module placed on the path.
    Module(ModuleData),
}

/// A node in the course graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub position: Position,
}

impl Node {
    pub fn entry(position: Position) -> Self {
        Self {
            id: ENTRY_NODE_ID.to_string(),
            kind: NodeKind::Entry,
            position,
        }
    }

    pub fn module(id: impl Into<String>, data: ModuleData, position: Position) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Module(data),
            position,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, NodeKind::Entry)
    }

    pub fn module_data(&self) -> Option<&ModuleData> {
        match &self.kind {
            NodeKind::Entry => None,
            NodeKind::Module(data) => Some(data),
        }
    }

    /// Duration contributed by this node; the Entry node contributes nothing.
    pub fn duration_minutes(&self) -> u32 {
        match &self.kind {
            NodeKind::Entry => 0,
            NodeKind::Module(data) => data.duration_minutes,
        }
    }

    /// Display label: the module title, or "Start" for the Entry node.
    pub fn label(&self) -> &str {
        match &self.kind {
            NodeKind::Entry => "Start",
            NodeKind::Module(data) => &data.title,
        }
    }
}

/// Rendering variant of an edge. Carries no semantics beyond ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Step,
}

/// A prerequisite edge: `source_id` comes before `target_id` on the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

/// The course graph value: title plus ordered nodes and edges.
///
/// Node order is insertion order; the layout engine relies on it for
/// deterministic tie breaking and for the orphan row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseGraph {
    pub title: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A structural problem found by [`CourseGraph::integrity_issues`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    MissingEntry,
    SurplusEntry(String),
    DuplicateNodeId(String),
    DanglingEdge { edge_id: String, missing: String },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntry => write!(f, "no entry node"),
            Self::SurplusEntry(id) => write!(f, "surplus entry node: {}", id),
            Self::DuplicateNodeId(id) => write!(f, "duplicate node id: {}", id),
            Self::DanglingEdge { edge_id, missing } => {
                write!(f, "edge {} references missing node {}", edge_id, missing)
            }
        }
    }
}

impl CourseGraph {
    /// A brand-new course: the Entry node and nothing else.
    pub fn new(title: impl Into<String>, entry_position: Position) -> Self {
        Self {
            title: title.into(),
            nodes: vec![Node::entry(entry_position)],
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn entry(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_entry())
    }

    pub fn module_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_entry())
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source_id == id)
    }

    /// Check the structural invariants: one Entry node, unique node ids,
    /// no edge endpoint outside the node set.
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        let mut entries = self.nodes.iter().filter(|n| n.is_entry());
        if entries.next().is_none() {
            issues.push(IntegrityIssue::MissingEntry);
        }
        for extra in entries {
            issues.push(IntegrityIssue::SurplusEntry(extra.id.clone()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                issues.push(IntegrityIssue::DuplicateNodeId(node.id.clone()));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !seen.contains(endpoint.as_str()) {
                    issues.push(IntegrityIssue::DanglingEdge {
                        edge_id: edge.id.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        issues
    }
}

/// What [`GraphModel::hydrate`] had to fix in a loaded graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub entry_inserted: bool,
    pub entry_renamed: bool,
    pub entries_removed: usize,
    pub duplicates_removed: usize,
    pub edges_pruned: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Owner of the live course graph. The only place nodes and edges are mutated.
///
/// Mutations report what they changed. Unknown ids are silently ignored; a call
/// that changes nothing returns `None`, `false` or an empty list, and callers
/// must not record it as a history step.
#[derive(Debug, Clone)]
pub struct GraphModel {
    graph: CourseGraph,
    placement: LayoutConfig,
    next_id: u64,
}

impl GraphModel {
    /// Start an empty course (Entry node only).
    pub fn new(title: impl Into<String>, placement: &LayoutConfig) -> Self {
        Self {
            graph: CourseGraph::new(title, placement.entry_position),
            placement: placement.clone(),
            next_id: 0,
        }
    }

    /// Adopt a loaded graph, repairing structural damage instead of failing:
    /// a missing Entry node is re-inserted, an Entry node under another id is
    /// renamed (its edges follow), surplus Entry nodes and duplicate ids are
    /// dropped, and edges left dangling by any of this are pruned.
    pub fn hydrate(mut graph: CourseGraph, placement: &LayoutConfig) -> (Self, RepairReport) {
        let mut report = RepairReport::default();

        let mut entry_seen = false;
        graph.nodes.retain(|node| {
            if !node.is_entry() {
                return true;
            }
            if entry_seen {
                report.entries_removed += 1;
                return false;
            }
            entry_seen = true;
            true
        });

        let legacy_entry_id = graph
            .entry()
            .filter(|e| e.id != ENTRY_NODE_ID)
            .map(|e| e.id.clone());
        let squatting = graph.nodes.len();
        graph
            .nodes
            .retain(|n| n.is_entry() || n.id != ENTRY_NODE_ID);
        report.duplicates_removed += squatting - graph.nodes.len();

        if let Some(old_id) = legacy_entry_id {
            for node in graph.nodes.iter_mut().filter(|n| n.is_entry()) {
                node.id = ENTRY_NODE_ID.to_string();
            }
            for edge in &mut graph.edges {
                if edge.source_id == old_id {
                    edge.source_id = ENTRY_NODE_ID.to_string();
                }
                if edge.target_id == old_id {
                    edge.target_id = ENTRY_NODE_ID.to_string();
                }
            }
            report.entry_renamed = true;
        } else if !entry_seen {
            graph.nodes.insert(0, Node::entry(placement.entry_position));
            report.entry_inserted = true;
        }

        let mut seen = HashSet::new();
        let before = graph.nodes.len();
        graph.nodes.retain(|n| seen.insert(n.id.clone()));
        report.duplicates_removed += before - graph.nodes.len();

        let before = graph.edges.len();
        graph
            .edges
            .retain(|e| seen.contains(&e.source_id) && seen.contains(&e.target_id));
        report.edges_pruned = before - graph.edges.len();

        let model = Self {
            graph,
            placement: placement.clone(),
            next_id: 0,
        };
        (model, report)
    }

    pub fn graph(&self) -> &CourseGraph {
        &self.graph
    }

    /// An owned copy of the current graph.
    pub fn snapshot(&self) -> CourseGraph {
        self.graph.clone()
    }

    /// Replace the whole graph with a history snapshot.
    /// Skips validation: snapshots were produced by this model.
    pub fn restore(&mut self, graph: CourseGraph) {
        self.graph = graph;
    }

    /// Add a module node and return its id.
    ///
    /// Without an explicit position the node goes directly below the lowest
    /// module, never left of the module column, or at the default anchor when
    /// the graph has no modules yet.
    pub fn add_module_node(&mut self, data: ModuleData, position: Option<Position>) -> String {
        let position = position.unwrap_or_else(|| self.next_free_position());
        let id = self.fresh_node_id();
        self.graph.nodes.push(Node::module(id.clone(), data, position));
        id
    }

    /// Append an edge when both endpoints exist. Self-loops and parallel
    /// edges are allowed.
    pub fn connect(&mut self, source_id: &str, target_id: &str) -> Option<String> {
        if !self.graph.contains_node(source_id) || !self.graph.contains_node(target_id) {
            return None;
        }
        let id = self.fresh_edge_id();
        self.graph.edges.push(Edge {
            id: id.clone(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind: EdgeKind::Step,
        });
        Some(id)
    }

    /// Remove the selected nodes (never the Entry node) and edges, plus every
    /// edge touching a removed node, in one step.
    pub fn delete_selected(&mut self, node_ids: &[String], edge_ids: &[String]) -> bool {
        let doomed_nodes: HashSet<&str> = node_ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.graph.node(id).is_some_and(|n| !n.is_entry()))
            .collect();
        let doomed_edges: HashSet<&str> = edge_ids.iter().map(String::as_str).collect();

        let nodes_before = self.graph.nodes.len();
        let edges_before = self.graph.edges.len();

        self.graph
            .nodes
            .retain(|n| !doomed_nodes.contains(n.id.as_str()));
        self.graph.edges.retain(|e| {
            !doomed_edges.contains(e.id.as_str())
                && !doomed_nodes.contains(e.source_id.as_str())
                && !doomed_nodes.contains(e.target_id.as_str())
        });

        self.graph.nodes.len() != nodes_before || self.graph.edges.len() != edges_before
    }

    /// Clone each selected module with a fresh id at a small offset.
    /// Incident edges are not cloned; the copies start disconnected.
    pub fn duplicate_selected(&mut self, node_ids: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let originals: Vec<(ModuleData, Position)> = node_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.graph.node(id))
            .filter_map(|n| n.module_data().map(|d| (d.clone(), n.position)))
            .collect();

        let delta = self.placement.duplicate_offset;
        originals
            .into_iter()
            .map(|(data, position)| {
                let id = self.fresh_node_id();
                self.graph
                    .nodes
                    .push(Node::module(id.clone(), data, position.offset(delta, delta)));
                id
            })
            .collect()
    }

    /// Change the course title. Nodes and edges are untouched.
    pub fn rename_graph(&mut self, title: &str) -> bool {
        if self.graph.title == title {
            return false;
        }
        self.graph.title = title.to_string();
        true
    }

    /// Drag a module node. The Entry node is pinned.
    pub fn move_node(&mut self, node_id: &str, position: Position) -> bool {
        match self.graph.nodes.iter_mut().find(|n| n.id == node_id) {
            Some(node) if !node.is_entry() && node.position != position => {
                node.position = position;
                true
            }
            _ => false,
        }
    }

    /// Batch position update from the layout engine. Entry and unknown ids are skipped.
    pub fn apply_positions(&mut self, positions: &BTreeMap<String, Position>) -> bool {
        let mut changed = false;
        for node in &mut self.graph.nodes {
            if node.is_entry() {
                continue;
            }
            if let Some(&position) = positions.get(&node.id)
                && node.position != position
            {
                node.position = position;
                changed = true;
            }
        }
        changed
    }

    fn next_free_position(&self) -> Position {
        let min_x = self.entry_position().x + self.placement.module_column_offset;
        let lowest = self.graph.module_nodes().max_by(|a, b| {
            a.position
                .y
                .partial_cmp(&b.position.y)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        match lowest {
            Some(node) => Position::new(
                node.position.x.max(min_x),
                node.position.y + self.placement.append_gap,
            ),
            None => Position::new(min_x, self.entry_position().y),
        }
    }

    fn entry_position(&self) -> Position {
        self.graph
            .entry()
            .map_or(self.placement.entry_position, |e| e.position)
    }

    fn fresh_node_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("module-{}", self.next_id);
            if !self.graph.contains_node(&id) {
                return id;
            }
        }
    }

    fn fresh_edge_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("edge-{}", self.next_id);
            if !self.graph.edges.iter().any(|e| e.id == id) {
                return id;
            }
        }
    }
}
