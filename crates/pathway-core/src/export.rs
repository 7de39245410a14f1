//! Export a course graph as DOT (Graphviz) or Mermaid flowchart.
//!
//! Modules not reachable from the Entry node are drawn dashed so a reviewer
//! can see what the duration total leaves out.

use crate::graph::{CourseGraph, NodeKind};
use crate::reachability::compute_reachable;

/// Export format for graph visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Dot,
    Mermaid,
}

/// Export the graph as a DOT (Graphviz) string.
pub fn export_dot(graph: &CourseGraph) -> String {
    let reach = compute_reachable(graph);
    let mut out = String::new();
    out.push_str("digraph Course {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, fontsize=10];\n");
    out.push_str(&format!("  label=\"{}\";\n\n", escape(&graph.title)));

    for node in &graph.nodes {
        match &node.kind {
            NodeKind::Entry => {
                out.push_str(&format!(
                    "  \"{}\" [shape=circle, style=filled, fillcolor=\"#d0f0d0\", label=\"Start\"];\n",
                    dot_id(&node.id)
                ));
            }
            NodeKind::Module(data) => {
                let style = if reach.is_reachable(&node.id) {
                    "filled"
                } else {
                    "\"filled,dashed\""
                };
                out.push_str(&format!(
                    "  \"{}\" [style={}, fillcolor=\"#ffffff\", label=\"{}\\n{} min\"];\n",
                    dot_id(&node.id),
                    style,
                    escape(&data.title),
                    data.duration_minutes
                ));
            }
        }
    }

    out.push('\n');
    for edge in &graph.edges {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\";\n",
            dot_id(&edge.source_id),
            dot_id(&edge.target_id)
        ));
    }

    out.push_str("}\n");
    out
}

/// Export the graph as a Mermaid flowchart string.
pub fn export_mermaid(graph: &CourseGraph) -> String {
    let reach = compute_reachable(graph);
    let mut out = String::new();
    out.push_str("flowchart LR\n");

    let mut unreachable = Vec::new();
    for node in &graph.nodes {
        let safe_id = mermaid_safe_id(&node.id);
        match &node.kind {
            NodeKind::Entry => out.push_str(&format!("  {safe_id}((\"Start\"))\n")),
            NodeKind::Module(data) => {
                out.push_str(&format!(
                    "  {}[\"{}\\n{} min\"]\n",
                    safe_id,
                    escape(&data.title),
                    data.duration_minutes
                ));
                if !reach.is_reachable(&node.id) {
                    unreachable.push(safe_id);
                }
            }
        }
    }

    out.push('\n');
    for edge in &graph.edges {
        out.push_str(&format!(
            "  {} --> {}\n",
            mermaid_safe_id(&edge.source_id),
            mermaid_safe_id(&edge.target_id)
        ));
    }

    if !unreachable.is_empty() {
        out.push_str("\n  classDef unreachable stroke-dasharray: 5 5\n");
        out.push_str(&format!("  class {} unreachable\n", unreachable.join(",")));
    }

    out
}

/// Quoted-string body for a DOT id. Distinct ids stay distinct.
fn dot_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Mermaid node id using only ASCII alphanumerics and `_`. `_` is doubled
/// and any other character becomes `_<hex code point>_`, so no two ids map
/// to the same output.
fn mermaid_safe_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' => out.push_str("__"),
            c => out.push_str(&format!("_{:x}_", u32::from(c))),
        }
    }
    out
}

fn escape(label: &str) -> String {
    label.replace('"', "'")
}

/// Export the graph in the specified format.
pub fn export(graph: &CourseGraph, format: ExportFormat) -> String {
    match format {
        ExportFormat::Dot => export_dot(graph),
        ExportFormat::Mermaid => export_mermaid(graph),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::graph::{ENTRY_NODE_ID, GraphModel, ModuleData};

    fn sample() -> CourseGraph {
        let mut m = GraphModel::new("Say \"hi\"", &LayoutConfig::default());
        let data = |title: &str, minutes| ModuleData {
            module_ref: title.to_lowercase(),
            title: title.to_string(),
            description: String::new(),
            duration_minutes: minutes,
            family_label: String::new(),
            family_icon: String::new(),
        };
        let intro = m.add_module_node(data("Intro", 30), None);
        m.add_module_node(data("Extra", 15), None);
        m.connect(ENTRY_NODE_ID, &intro);
        m.snapshot()
    }

    #[test]
    fn test_dot_marks_unreachable_modules() {
        let dot = export_dot(&sample());
        assert!(dot.starts_with("digraph Course {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("\"entry\" -> \"module-1\";"));
        assert!(dot.contains("label=\"Say 'hi'\""));
        let extra = dot.lines().find(|l| l.contains("Extra")).unwrap();
        assert!(extra.contains("dashed"));
        let intro = dot.lines().find(|l| l.contains("Intro")).unwrap();
        assert!(!intro.contains("dashed"));
    }

    #[test]
    fn test_mermaid_ids_are_safe() {
        let mermaid = export(&sample(), ExportFormat::Mermaid);
        assert!(mermaid.starts_with("flowchart LR"));
        assert!(mermaid.contains("entry --> module_2d_1"));
        assert!(mermaid.contains("class module_2d_2 unreachable"));
        assert!(!mermaid.contains("module-1"));
    }

    #[test]
    fn test_mermaid_ids_stay_distinct() {
        assert_eq!(mermaid_safe_id("a-b"), "a_2d_b");
        assert_eq!(mermaid_safe_id("a_b"), "a__b");
        assert_ne!(mermaid_safe_id("a-b"), mermaid_safe_id("a_b"));
        assert_ne!(mermaid_safe_id("a b"), mermaid_safe_id("a.b"));
    }

    #[test]
    fn test_dot_escapes_quoted_ids() {
        let mut graph = sample();
        graph.nodes[1].id = "say \"hi\"".to_string();
        graph.edges[0].target_id = graph.nodes[1].id.clone();

        let dot = export_dot(&graph);
        assert!(dot.contains("\"entry\" -> \"say \\\"hi\\\"\";"));
        for line in dot.lines() {
            let unescaped_quotes = line
                .char_indices()
                .filter(|&(i, c)| c == '"' && !line[..i].ends_with('\\'))
                .count();
            assert_eq!(unescaped_quotes % 2, 0, "unbalanced quotes in {line}");
        }
    }
}
