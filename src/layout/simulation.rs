use eframe::egui::Vec2;

use super::forces::{Collision, repulsion_between, tree_collisions, tree_repulsion};
use super::quadtree::QuadCell;

const BARNES_HUT_THETA: f32 = 0.72;
const BARNES_HUT_MIN_NODES: usize = 2000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceSettings {
    pub scaling_ratio: f32,
    pub gravity: f32,
    pub edge_weight_influence: f32,
    pub slow_down: f32,
    pub collision_strength: f32,
    pub collision_margin: f32,
    /// Barnes–Hut opening angle; `None` computes every pair exactly.
    pub theta: Option<f32>,
    pub initial_temperature: f32,
    pub cooling: f32,
    pub min_temperature: f32,
}

impl ForceSettings {
    pub fn infer(node_count: usize) -> Self {
        let order = node_count.max(1) as f32;
        Self {
            scaling_ratio: 10.0,
            gravity: 0.05,
            edge_weight_influence: 1.0,
            slow_down: 1.0 + order.ln(),
            collision_strength: 0.8,
            collision_margin: 1.2,
            theta: (node_count > BARNES_HUT_MIN_NODES).then_some(BARNES_HUT_THETA),
            initial_temperature: (order.sqrt() * 2.5).max(5.0),
            cooling: 0.995,
            min_temperature: 0.05,
        }
    }

    pub fn with_initial_temperature(mut self, temperature: f32) -> Self {
        self.initial_temperature = temperature;
        self
    }
}

/// Weighted attraction along edges, mass-scaled repulsion between every pair,
/// overlap push between node discs and linear pull toward the origin. Fixed
/// nodes exert forces but never move.
pub struct ForceSimulation {
    positions: Vec<Vec2>,
    masses: Vec<f32>,
    radii: Vec<f32>,
    fixed: Vec<bool>,
    edges: Vec<(usize, usize, f32)>,
    settings: ForceSettings,
    temperature: f32,
    forces: Vec<Vec2>,
    iterations: usize,
}

impl ForceSimulation {
    pub fn new(
        positions: Vec<Vec2>,
        radii: Vec<f32>,
        fixed: Vec<bool>,
        edges: Vec<(usize, usize, f32)>,
        settings: ForceSettings,
    ) -> Self {
        let node_count = positions.len();
        let mut masses = vec![1.0; node_count];
        let edges = edges
            .into_iter()
            .filter(|&(from, to, _)| from < node_count && to < node_count && from != to)
            .collect::<Vec<_>>();
        for &(from, to, _) in &edges {
            masses[from] += 1.0;
            masses[to] += 1.0;
        }

        let mut radii = radii;
        radii.resize(node_count, 1.0);
        let mut fixed = fixed;
        fixed.resize(node_count, false);

        Self {
            forces: vec![Vec2::ZERO; node_count],
            positions,
            masses,
            radii,
            fixed,
            edges,
            temperature: settings.initial_temperature,
            settings,
            iterations: 0,
        }
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn into_positions(self) -> Vec<Vec2> {
        self.positions
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn step(&mut self) {
        let node_count = self.positions.len();
        self.iterations += 1;
        if node_count < 2 || self.fixed.iter().all(|&fixed| fixed) {
            return;
        }

        self.forces.fill(Vec2::ZERO);
        self.accumulate_repulsion();
        self.accumulate_attraction();

        let gravity = self.settings.gravity;
        for (index, force) in self.forces.iter_mut().enumerate() {
            *force -= self.positions[index] * (gravity * self.masses[index]);
        }

        let slow_down = self.settings.slow_down.max(1.0);
        for index in 0..node_count {
            if self.fixed[index] {
                continue;
            }

            let displacement = self.forces[index] / slow_down;
            let length = displacement.length();
            if length > 0.0 && length.is_finite() {
                self.positions[index] += displacement / length * length.min(self.temperature);
            }
        }

        self.temperature =
            (self.temperature * self.settings.cooling).max(self.settings.min_temperature);
    }

    fn accumulate_repulsion(&mut self) {
        let scaling = self.settings.scaling_ratio;
        let collision = Collision {
            strength: self.settings.collision_strength,
            margin: self.settings.collision_margin,
        };

        let Some(theta) = self.settings.theta else {
            let node_count = self.positions.len();
            for i in 0..node_count {
                for j in (i + 1)..node_count {
                    let push = repulsion_between(
                        self.positions[i],
                        self.masses[i],
                        self.positions[j],
                        self.masses[j],
                        scaling,
                    );
                    self.forces[i] += push;
                    self.forces[j] -= push;
                    if let Some(push) = collision.push(i, j, &self.positions, &self.radii) {
                        self.forces[i] += push;
                        self.forces[j] -= push;
                    }
                }
            }
            return;
        };

        let Some(tree) = QuadCell::build(&self.positions, &self.masses) else {
            return;
        };
        for (index, force) in self.forces.iter_mut().enumerate() {
            *force += tree_repulsion(&tree, index, &self.positions, &self.masses, scaling, theta);
        }
        tree_collisions(&tree, &self.positions, &self.radii, collision, &mut self.forces);
    }

    fn accumulate_attraction(&mut self) {
        let influence = self.settings.edge_weight_influence;
        for &(from, to, weight) in &self.edges {
            let delta = self.positions[from] - self.positions[to];
            let factor = if influence == 1.0 {
                weight
            } else {
                weight.powf(influence)
            };
            let pull = delta * factor;
            self.forces[from] -= pull;
            self.forces[to] += pull;
        }
    }
}
