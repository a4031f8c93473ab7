use std::collections::VecDeque;

use tracing::debug;

use super::BiblioGraph;

/// Induced subgraph over the largest connected component. Ties go to the
/// component containing the lowest node index.
pub fn largest_component(graph: &BiblioGraph) -> BiblioGraph {
    let adjacency = graph.adjacency();
    let mut visited = vec![false; graph.node_count()];
    let mut best: Vec<usize> = Vec::new();
    let mut components = 0usize;

    for start in 0..graph.node_count() {
        if visited[start] {
            continue;
        }
        components += 1;

        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(current) = queue.pop_front() {
            members.push(current);
            for &next in &adjacency[current] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        if members.len() > best.len() {
            best = members;
        }
    }

    debug!(
        components,
        kept = best.len(),
        dropped = graph.node_count() - best.len(),
        "extracted largest component"
    );
    graph.induced(&best)
}
