//! Left-to-right layered layout for the course flow.
//!
//! Pipeline over module nodes only (the Entry node keeps its anchor):
//! 1. break cycles by ignoring DFS back edges (ranking only)
//! 2. longest-path layering
//! 3. barycenter crossing reduction, alternating sweeps
//! 4. rank → x column, order → y row
//! 5. modules with no edge at all go to a trailing row below everything
//!
//! The result depends only on node order and the edge set, never on current
//! positions, so running it twice on an unchanged graph gives the same answer.

use crate::config::LayoutConfig;
use crate::graph::{CourseGraph, Position};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Axis-aligned box around a set of positions, used to re-center the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn center(&self) -> Position {
        Position::new(
            f64::midpoint(self.min_x, self.max_x),
            f64::midpoint(self.min_y, self.max_y),
        )
    }
}

/// Bounding box of the given positions, `None` when empty.
pub fn bounds<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Bounds> {
    positions.into_iter().fold(None, |acc, p| {
        Some(match acc {
            None => Bounds {
                min_x: p.x,
                min_y: p.y,
                max_x: p.x,
                max_y: p.y,
            },
            Some(b) => Bounds {
                min_x: b.min_x.min(p.x),
                min_y: b.min_y.min(p.y),
                max_x: b.max_x.max(p.x),
                max_y: b.max_y.max(p.y),
            },
        })
    })
}

/// Compute a position for every module node.
pub fn layout(graph: &CourseGraph, config: &LayoutConfig) -> BTreeMap<String, Position> {
    let entry = graph.entry().map_or(config.entry_position, |e| e.position);

    let ids: Vec<&str> = graph.module_nodes().map(|n| n.id.as_str()).collect();
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let node_count = ids.len();

    // Any edge counts for orphan detection, including edges to or from Entry.
    let mut connected = vec![false; node_count];
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for edge in &graph.edges {
        let source = index.get(edge.source_id.as_str()).copied();
        let target = index.get(edge.target_id.as_str()).copied();
        for i in [source, target].into_iter().flatten() {
            connected[i] = true;
        }
        if let (Some(s), Some(t)) = (source, target)
            && s != t
        {
            edges.push((s, t));
        }
    }

    let back_edges = find_back_edges(node_count, &edges);
    let layer = assign_layers(node_count, &edges, &back_edges);

    let mut layers: Vec<Vec<usize>> = Vec::new();
    for i in (0..node_count).filter(|&i| connected[i]) {
        if layers.len() <= layer[i] {
            layers.resize(layer[i] + 1, Vec::new());
        }
        layers[layer[i]].push(i);
    }
    reduce_crossings(&mut layers, &layer, &edges, config.crossing_passes);

    let column = |rank: usize| {
        entry.x + config.module_column_offset + rank as f64 * config.rank_spacing()
    };
    let row = |order: usize| entry.y + order as f64 * config.row_spacing;

    let mut positions = BTreeMap::new();
    for (rank, members) in layers.iter().enumerate() {
        for (order, &i) in members.iter().enumerate() {
            positions.insert(ids[i].to_string(), Position::new(column(rank), row(order)));
        }
    }

    let tallest = layers.iter().map(Vec::len).max().unwrap_or(0);
    for (slot, i) in (0..node_count).filter(|&i| !connected[i]).enumerate() {
        positions.insert(ids[i].to_string(), Position::new(column(slot), row(tallest)));
    }

    positions
}

/// Edges closing a cycle, found by DFS from each node in order.
fn find_back_edges(node_count: usize, edges: &[(usize, usize)]) -> HashSet<usize> {
    let mut adjacency = vec![Vec::new(); node_count];
    for (idx, &(from, _)) in edges.iter().enumerate() {
        adjacency[from].push(idx);
    }

    let mut state = vec![0u8; node_count];
    let mut back = HashSet::new();
    for node in 0..node_count {
        if state[node] == 0 {
            dfs_back_edges(node, &adjacency, edges, &mut state, &mut back);
        }
    }
    back
}

fn dfs_back_edges(
    node: usize,
    adjacency: &[Vec<usize>],
    edges: &[(usize, usize)],
    state: &mut [u8],
    back: &mut HashSet<usize>,
) {
    state[node] = 1;
    for &edge_idx in &adjacency[node] {
        let to = edges[edge_idx].1;
        match state[to] {
            0 => dfs_back_edges(to, adjacency, edges, state, back),
            1 => {
                back.insert(edge_idx);
            }
            _ => {}
        }
    }
    state[node] = 2;
}

/// Longest path from any source: Kahn order, then relax forward edges.
fn assign_layers(
    node_count: usize,
    edges: &[(usize, usize)],
    back: &HashSet<usize>,
) -> Vec<usize> {
    let mut indegree = vec![0usize; node_count];
    let mut outgoing = vec![Vec::new(); node_count];
    for (idx, &(from, to)) in edges.iter().enumerate() {
        if back.contains(&idx) {
            continue;
        }
        outgoing[from].push(to);
        indegree[to] += 1;
    }

    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &outgoing[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let mut layer = vec![0usize; node_count];
    for &node in &order {
        for &next in &outgoing[node] {
            layer[next] = layer[next].max(layer[node] + 1);
        }
    }
    layer
}

/// Reorder each rank by the mean order of its neighbors in the rank just
/// swept. Even passes sweep left to right, odd passes right to left.
fn reduce_crossings(
    layers: &mut [Vec<usize>],
    layer: &[usize],
    edges: &[(usize, usize)],
    passes: usize,
) {
    let node_count = layer.len();
    let mut left = vec![Vec::new(); node_count];
    let mut right = vec![Vec::new(); node_count];
    for &(a, b) in edges {
        let (lo, hi) = match layer[b].checked_sub(layer[a]) {
            Some(1) => (a, b),
            _ if layer[a].checked_sub(layer[b]) == Some(1) => (b, a),
            _ => continue,
        };
        right[lo].push(hi);
        left[hi].push(lo);
    }

    let mut order = vec![0usize; node_count];
    for members in &*layers {
        for (pos, &i) in members.iter().enumerate() {
            order[i] = pos;
        }
    }

    for pass in 0..passes {
        if pass % 2 == 0 {
            for members in layers.iter_mut().skip(1) {
                reorder_rank(members, &left, &mut order);
            }
        } else {
            for members in layers.iter_mut().rev().skip(1) {
                reorder_rank(members, &right, &mut order);
            }
        }
    }
}

fn reorder_rank(members: &mut [usize], neighbors: &[Vec<usize>], order: &mut [usize]) {
    let mut scored: Vec<(usize, f64, usize)> = members
        .iter()
        .map(|&i| {
            let adjacent = &neighbors[i];
            let score = if adjacent.is_empty() {
                order[i] as f64
            } else {
                adjacent.iter().map(|&n| order[n] as f64).sum::<f64>() / adjacent.len() as f64
            };
            (i, score, order[i])
        })
        .collect();

    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

    for (pos, (i, _, _)) in scored.into_iter().enumerate() {
        members[pos] = i;
        order[i] = pos;
    }
}
