//! Which modules are actually on the path, and how long the path takes.
//!
//! Only modules reachable from the Entry node along forward edges count.
//! Modules that exist in the graph but are not wired into the path contribute
//! nothing to the total.

use crate::graph::{CourseGraph, NodeKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Modules reachable from Entry and their summed duration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reachability {
    pub reachable_module_ids: BTreeSet<String>,
    /// Raw minute sum over reachable modules.
    pub total_duration_minutes: u64,
}

impl Reachability {
    /// Total duration in hours, rounded to one decimal for display.
    pub fn total_hours(&self) -> f64 {
        (self.total_duration_minutes as f64 / 60.0 * 10.0).round() / 10.0
    }

    pub fn is_reachable(&self, node_id: &str) -> bool {
        self.reachable_module_ids.contains(node_id)
    }
}

/// Breadth-first walk from the Entry node following `source → target` edges.
///
/// Each node is visited once, so converging paths do not double count.
/// Cycles terminate for the same reason. O(V + E).
pub fn compute_reachable(graph: &CourseGraph) -> Reachability {
    let Some(entry) = graph.entry() else {
        return Reachability::default();
    };

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.source_id.as_str())
            .or_default()
            .push(edge.target_id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(entry.id.as_str());
    queue.push_back(entry.id.as_str());

    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(current).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    let mut result = Reachability::default();
    for node in &graph.nodes {
        if !visited.contains(node.id.as_str()) {
            continue;
        }
        match &node.kind {
            NodeKind::Entry => {}
            NodeKind::Module(data) => {
                result.reachable_module_ids.insert(node.id.clone());
                result.total_duration_minutes += u64::from(data.duration_minutes);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::graph::{ENTRY_NODE_ID, GraphModel, ModuleData};

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

    fn ids<S: AsRef<str>>(list: &[S]) -> BTreeSet<String> {
        list.iter().map(|s| s.as_ref().to_string()).collect()
    }

    #[test]
    fn test_chain_and_orphan() {
        let mut m = GraphModel::new("T", &LayoutConfig::default());
        let a = m.add_module_node(module("A", 30), None);
        let b = m.add_module_node(module("B", 45), None);
        let c = m.add_module_node(module("C", 500), None);
        m.connect(ENTRY_NODE_ID, &a);
        m.connect(&a, &b);

        let r = compute_reachable(m.graph());
        assert_eq!(r.reachable_module_ids, ids(&[&a, &b]));
        assert_eq!(r.total_duration_minutes, 75);
        assert!(!r.is_reachable(&c));
    }

    #[test]
    fn test_intro_advanced_scenario() {
        let mut m = GraphModel::new("T", &LayoutConfig::default());
        let intro = m.add_module_node(module("Intro", 30), None);
        m.connect(ENTRY_NODE_ID, &intro);
        let advanced = m.add_module_node(module("Advanced", 90), None);

        let r = compute_reachable(m.graph());
        assert_eq!(r.total_duration_minutes, 30);
        assert_eq!(r.reachable_module_ids, ids(&[&intro]));

        m.connect(&intro, &advanced);
        let r = compute_reachable(m.graph());
        assert_eq!(r.total_duration_minutes, 120);
        assert_eq!(r.reachable_module_ids, ids(&[&intro, &advanced]));
        assert_eq!(r.total_hours(), 2.0);
    }

    #[test]
    fn test_converging_paths_count_once() {
        let mut m = GraphModel::new("T", &LayoutConfig::default());
        let a = m.add_module_node(module("A", 10), None);
        let b = m.add_module_node(module("B", 10), None);
        let join = m.add_module_node(module("Join", 60), None);
        m.connect(ENTRY_NODE_ID, &a);
        m.connect(ENTRY_NODE_ID, &b);
        m.connect(&a, &join);
        m.connect(&b, &join);
        m.connect(&b, &join);

        let r = compute_reachable(m.graph());
        assert_eq!(r.total_duration_minutes, 80);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut m = GraphModel::new("T", &LayoutConfig::default());
        let a = m.add_module_node(module("A", 10), None);
        let b = m.add_module_node(module("B", 20), None);
        m.connect(ENTRY_NODE_ID, &a);
        m.connect(&a, &b);
        m.connect(&b, &a);
        m.connect(&b, ENTRY_NODE_ID);

        let r = compute_reachable(m.graph());
        assert_eq!(r.total_duration_minutes, 30);
    }

    #[test]
    fn test_edges_are_directed() {
        let mut m = GraphModel::new("T", &LayoutConfig::default());
        let a = m.add_module_node(module("A", 10), None);
        m.connect(&a, ENTRY_NODE_ID);

        let r = compute_reachable(m.graph());
        assert!(r.reachable_module_ids.is_empty());
        assert_eq!(r.total_duration_minutes, 0);
    }

    #[test]
    fn test_total_hours_rounds_to_one_decimal() {
        let r = Reachability {
            reachable_module_ids: BTreeSet::new(),
            total_duration_minutes: 100,
        };
        // 100 / 60 = 1.666..
        assert_eq!(r.total_hours(), 1.7);

        let r = Reachability {
            reachable_module_ids: BTreeSet::new(),
            total_duration_minutes: 0,
        };
        assert_eq!(r.total_hours(), 0.0);
    }
}
