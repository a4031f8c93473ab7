mod forces;
mod quadtree;
mod simulation;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use eframe::egui::Vec2;
use tracing::{debug, info};

use crate::graph::BiblioGraph;
use crate::util::circle_point;

pub use simulation::{ForceSettings, ForceSimulation};

const YIELD_EVERY: usize = 20;
const SEED_SPACING: f32 = 10.0;
const PERTURBATION: f32 = 0.01;

/// Whichever limit is reached first ends a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBudget {
    pub max_iterations: usize,
    pub time_limit: Duration,
}

impl LayoutBudget {
    pub const fn new(max_iterations: usize, time_limit: Duration) -> Self {
        Self {
            max_iterations,
            time_limit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    pub core: LayoutBudget,
    pub satellites: LayoutBudget,
    pub reference_max_size: f32,
    pub metadata_max_size: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            core: LayoutBudget::new(1000, Duration::from_secs(10)),
            satellites: LayoutBudget::new(200, Duration::from_secs(5)),
            reference_max_size: 30.0,
            metadata_max_size: 50.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub nodes: usize,
    pub iterations: usize,
    pub elapsed: Duration,
    pub timed_out: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutReport {
    pub core: PhaseReport,
    pub satellites: PhaseReport,
}

/// Rescales every node against the heaviest node of its data type.
/// `maxima` should come from the graph before component extraction so sizes
/// stay comparable across filter changes.
pub fn apply_node_sizes(graph: &mut BiblioGraph, maxima: &HashMap<String, u32>, config: &LayoutConfig) {
    for node in graph.nodes_mut() {
        let max_size = if node.is_reference() {
            config.reference_max_size
        } else {
            config.metadata_max_size
        };
        let max_nb = maxima
            .get(&node.field)
            .copied()
            .unwrap_or(node.nb_articles)
            .max(1);
        node.size = (max_size * node.nb_articles.max(1) as f32 / max_nb as f32).sqrt();
    }
}

/// Steps `simulation` until the iteration cap or the wall-clock limit,
/// yielding to the runtime between batches.
pub async fn relax(simulation: &mut ForceSimulation, budget: LayoutBudget) -> PhaseReport {
    let started = Instant::now();
    let mut iterations = 0;
    let mut timed_out = false;

    while iterations < budget.max_iterations {
        if started.elapsed() >= budget.time_limit {
            timed_out = true;
            break;
        }

        simulation.step();
        iterations += 1;
        if iterations % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }

    PhaseReport {
        nodes: simulation.node_count(),
        iterations,
        elapsed: started.elapsed(),
        timed_out,
    }
}

/// Embeds the reference-only subgraph from a circular seed, writes the
/// positions back and pins those nodes.
pub async fn layout_references(graph: &mut BiblioGraph, budget: LayoutBudget) -> PhaseReport {
    let references = graph
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(index, node)| node.is_reference().then_some(index))
        .collect::<Vec<_>>();
    let mut local = vec![None; graph.node_count()];
    for (position, &index) in references.iter().enumerate() {
        local[index] = Some(position);
    }

    let count = references.len();
    if count == 0 {
        return PhaseReport::default();
    }
    let seed_radius = (count as f32).sqrt() * SEED_SPACING;
    let positions = (0..count)
        .map(|index| {
            if count == 1 {
                Vec2::ZERO
            } else {
                circle_point(index, count) * seed_radius
            }
        })
        .collect::<Vec<_>>();
    let radii = references
        .iter()
        .map(|&index| graph.nodes()[index].size)
        .collect::<Vec<_>>();
    let edges = graph
        .edges()
        .iter()
        .filter_map(|edge| {
            Some((
                local[edge.source]?,
                local[edge.target]?,
                edge.weight as f32,
            ))
        })
        .collect::<Vec<_>>();

    let settings = ForceSettings::infer(count)
        .with_initial_temperature((seed_radius * 0.25).max(5.0));
    let mut simulation =
        ForceSimulation::new(positions, radii, vec![false; count], edges, settings);
    let report = relax(&mut simulation, budget).await;

    let nodes = graph.nodes_mut();
    for (&index, position) in references.iter().zip(simulation.into_positions()) {
        nodes[index].position = position;
        nodes[index].fixed = true;
    }

    debug!(
        nodes = report.nodes,
        iterations = report.iterations,
        timed_out = report.timed_out,
        "reference embedding finished"
    );
    report
}

/// Places every unpinned node at the mean of its pinned neighbours, nudged
/// onto a tiny circle by enumeration index. Nodes without pinned neighbours
/// start from the centroid of the pinned nodes.
pub fn seed_satellites(graph: &mut BiblioGraph) {
    let adjacency = graph.adjacency();
    let pinned = graph
        .nodes()
        .iter()
        .filter(|node| node.fixed)
        .map(|node| node.position)
        .collect::<Vec<_>>();
    let centroid = if pinned.is_empty() {
        Vec2::ZERO
    } else {
        pinned.iter().fold(Vec2::ZERO, |sum, &point| sum + point) / pinned.len() as f32
    };

    let satellites = graph
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(index, node)| (!node.fixed).then_some(index))
        .collect::<Vec<_>>();
    let total = satellites.len();

    let seeds = satellites
        .iter()
        .enumerate()
        .map(|(order, &index)| {
            let mut sum = Vec2::ZERO;
            let mut qualifying = 0usize;
            for &neighbour in &adjacency[index] {
                let node = &graph.nodes()[neighbour];
                if node.fixed {
                    sum += node.position;
                    qualifying += 1;
                }
            }

            let base = if qualifying == 0 {
                centroid
            } else {
                sum / qualifying as f32
            };
            base + circle_point(order, total) * PERTURBATION
        })
        .collect::<Vec<_>>();

    let nodes = graph.nodes_mut();
    for (index, seed) in satellites.into_iter().zip(seeds) {
        nodes[index].position = seed;
    }
}

/// Relaxes the whole graph with pinned nodes held in place.
pub async fn layout_satellites(graph: &mut BiblioGraph, budget: LayoutBudget) -> PhaseReport {
    seed_satellites(graph);

    let count = graph.node_count();
    if graph.nodes().iter().all(|node| node.fixed) {
        return PhaseReport {
            nodes: count,
            ..PhaseReport::default()
        };
    }

    let positions = graph.nodes().iter().map(|node| node.position).collect();
    let radii = graph.nodes().iter().map(|node| node.size).collect();
    let fixed = graph.nodes().iter().map(|node| node.fixed).collect();
    let edges = graph
        .edges()
        .iter()
        .map(|edge| (edge.source, edge.target, edge.weight as f32))
        .collect();

    let settings = ForceSettings::infer(count).with_initial_temperature(2.0);
    let mut simulation = ForceSimulation::new(positions, radii, fixed, edges, settings);
    let report = relax(&mut simulation, budget).await;

    for (node, position) in graph.nodes_mut().iter_mut().zip(simulation.into_positions()) {
        if !node.fixed {
            node.position = position;
        }
    }

    debug!(
        nodes = report.nodes,
        iterations = report.iterations,
        timed_out = report.timed_out,
        "satellite relaxation finished"
    );
    report
}

pub async fn layout_graph(graph: &mut BiblioGraph, config: &LayoutConfig) -> LayoutReport {
    let core = layout_references(graph, config.core).await;
    tokio::task::yield_now().await;
    let satellites = layout_satellites(graph, config.satellites).await;

    info!(
        references = core.nodes,
        core_iterations = core.iterations,
        satellite_iterations = satellites.iterations,
        elapsed_ms = (core.elapsed + satellites.elapsed).as_millis() as u64,
        "layout finished"
    );
    LayoutReport { core, satellites }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::fields::Category;
    use crate::graph::{Edge, GraphAttributes, Node, NodeKey};

    fn reference(id: &str, nb_articles: u32) -> Node {
        Node {
            key: NodeKey::Reference(id.to_string()),
            label: None,
            full_label: id.to_string(),
            field: "refs".to_string(),
            category: Category::Reference,
            color: "#ebebeb".to_string(),
            nb_articles,
            size: 1.0,
            position: Vec2::ZERO,
            fixed: false,
        }
    }

    fn metadata(id: &str, nb_articles: u32) -> Node {
        Node {
            key: NodeKey::metadata("topics", id),
            label: Some(id.to_string()),
            full_label: id.to_string(),
            field: "topics".to_string(),
            category: Category::Metadata,
            color: "#ff7f0e".to_string(),
            nb_articles,
            size: 1.0,
            position: Vec2::ZERO,
            fixed: false,
        }
    }

    fn edge(source: usize, target: usize, weight: u32) -> Edge {
        Edge {
            source,
            target,
            weight,
        }
    }

    fn sample_graph() -> BiblioGraph {
        BiblioGraph::from_parts(
            vec![
                reference("A", 3),
                reference("B", 2),
                reference("C", 1),
                metadata("t1", 2),
                metadata("t2", 1),
                metadata("t3", 1),
            ],
            vec![
                edge(0, 1, 2),
                edge(1, 2, 1),
                edge(0, 3, 2),
                edge(1, 3, 1),
                edge(2, 4, 1),
                edge(4, 5, 1),
            ],
            GraphAttributes::default(),
        )
    }

    fn quick() -> LayoutConfig {
        LayoutConfig {
            core: LayoutBudget::new(150, Duration::from_secs(30)),
            satellites: LayoutBudget::new(60, Duration::from_secs(30)),
            ..LayoutConfig::default()
        }
    }

    #[test]
    fn sizes_scale_with_weight_per_data_type() {
        let mut graph = sample_graph();
        let maxima = HashMap::from([("refs".to_string(), 4), ("topics".to_string(), 2)]);
        apply_node_sizes(&mut graph, &maxima, &LayoutConfig::default());

        let nodes = graph.nodes();
        assert!((nodes[0].size - (30.0_f32 * 3.0 / 4.0).sqrt()).abs() < 1e-5);
        assert!((nodes[3].size - 50.0_f32.sqrt()).abs() < 1e-5);
        assert!(nodes[0].size > nodes[1].size);
    }

    #[tokio::test]
    async fn layout_is_finite_and_pins_references() {
        let mut graph = sample_graph();
        let report = layout_graph(&mut graph, &quick()).await;

        assert_eq!(report.core.nodes, 3);
        assert_eq!(report.core.iterations, 150);
        assert!(!report.core.timed_out);
        for node in graph.nodes() {
            assert!(node.position.x.is_finite() && node.position.y.is_finite());
            assert_eq!(node.fixed, node.is_reference());
        }
    }

    #[tokio::test]
    async fn satellite_phase_leaves_references_untouched() {
        let mut graph = sample_graph();
        layout_references(&mut graph, quick().core).await;
        let pinned = graph.nodes()[..3]
            .iter()
            .map(|node| node.position)
            .collect::<Vec<_>>();

        layout_satellites(&mut graph, quick().satellites).await;
        let after = graph.nodes()[..3]
            .iter()
            .map(|node| node.position)
            .collect::<Vec<_>>();
        assert_eq!(pinned, after);
    }

    #[test]
    fn barycenter_uses_pinned_neighbours_and_falls_back_to_centroid() {
        let mut graph = sample_graph();
        {
            let nodes = graph.nodes_mut();
            nodes[0].position = vec2(0.0, 0.0);
            nodes[1].position = vec2(10.0, 0.0);
            nodes[2].position = vec2(20.0, 30.0);
            for node in &mut nodes[..3] {
                node.fixed = true;
            }
        }
        seed_satellites(&mut graph);

        let nodes = graph.nodes();
        // t1 sits between A and B, t3 has no pinned neighbour.
        assert!((nodes[3].position - vec2(5.0, 0.0)).length() <= PERTURBATION + 1e-5);
        assert!((nodes[4].position - vec2(20.0, 30.0)).length() <= PERTURBATION + 1e-5);
        assert!((nodes[5].position - vec2(10.0, 10.0)).length() <= PERTURBATION + 1e-5);
        assert_ne!(nodes[4].position, nodes[5].position);
    }

    #[test]
    fn zero_pinned_nodes_fall_back_to_origin() {
        let mut graph = BiblioGraph::from_parts(
            vec![metadata("t1", 1), metadata("t2", 1)],
            vec![edge(0, 1, 1)],
            GraphAttributes::default(),
        );
        seed_satellites(&mut graph);
        for node in graph.nodes() {
            assert!(node.position.length() <= PERTURBATION + 1e-5);
        }
    }

    #[tokio::test]
    async fn single_reference_sits_at_origin() {
        let mut graph = BiblioGraph::from_parts(
            vec![reference("A", 1), metadata("t1", 1)],
            vec![edge(0, 1, 1)],
            GraphAttributes::default(),
        );
        layout_graph(&mut graph, &quick()).await;
        assert_eq!(graph.nodes()[0].position, Vec2::ZERO);
        assert!(graph.nodes()[1].position.x.is_finite());
    }

    #[tokio::test]
    async fn zero_time_budget_freezes_seed_positions() {
        let mut graph = sample_graph();
        let budget = LayoutBudget::new(1000, Duration::ZERO);
        let report = layout_references(&mut graph, budget).await;

        assert!(report.timed_out);
        assert_eq!(report.iterations, 0);
        let seed_radius = 3.0_f32.sqrt() * SEED_SPACING;
        assert!((graph.nodes()[0].position - vec2(seed_radius, 0.0)).length() < 1e-3);
    }

    #[tokio::test]
    async fn identical_graphs_get_identical_layouts() {
        let mut first = sample_graph();
        let mut second = sample_graph();
        layout_graph(&mut first, &quick()).await;
        layout_graph(&mut second, &quick()).await;

        let positions = |graph: &BiblioGraph| {
            graph
                .nodes()
                .iter()
                .map(|node| node.position)
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(&first), positions(&second));
    }
}
