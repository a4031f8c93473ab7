use eframe::egui::{Vec2, vec2};

use super::quadtree::QuadCell;

/// Overlap push between node discs grown by `margin`.
#[derive(Clone, Copy, Debug)]
pub(super) struct Collision {
    pub(super) strength: f32,
    pub(super) margin: f32,
}

impl Collision {
    /// Push on `from` while the two discs overlap; `to` takes the opposite.
    pub(super) fn push(
        self,
        from: usize,
        to: usize,
        positions: &[Vec2],
        radii: &[f32],
    ) -> Option<Vec2> {
        let delta = positions[from] - positions[to];
        let distance = delta.length();
        let min_distance = (radii[from] + radii[to]) * self.margin;
        if distance >= min_distance {
            return None;
        }

        let direction = if distance > 0.0001 {
            delta / distance
        } else {
            tie_break_direction(from, to)
        };
        Some(direction * ((min_distance - distance) * self.strength))
    }
}

/// Direction used when two points coincide; depends only on the indices.
pub(super) fn tie_break_direction(from: usize, to: usize) -> Vec2 {
    let angle = ((from as f32) * 0.618_034 + (to as f32) * 0.414_214) * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin())
}

/// Repulsion felt at `point_a`: `scaling * mass_a * mass_b / distance`.
pub(super) fn repulsion_between(
    point_a: Vec2,
    mass_a: f32,
    point_b: Vec2,
    mass_b: f32,
    scaling: f32,
) -> Vec2 {
    let delta = point_a - point_b;
    let distance_sq = delta.length_sq();
    if distance_sq <= 0.0001 * 0.0001 {
        return Vec2::ZERO;
    }
    delta * (scaling * mass_a * mass_b / distance_sq)
}

/// Barnes–Hut repulsion on node `index`. A cell is taken as one body when the
/// node lies outside it and `size / distance < theta`.
pub(super) fn tree_repulsion(
    cell: &QuadCell,
    index: usize,
    positions: &[Vec2],
    masses: &[f32],
    scaling: f32,
    theta: f32,
) -> Vec2 {
    if cell.mass <= 0.0 {
        return Vec2::ZERO;
    }

    let point = positions[index];
    let mass = masses[index];
    if cell.is_leaf() {
        return cell
            .members()
            .iter()
            .filter(|&&other| other != index)
            .fold(Vec2::ZERO, |force, &other| {
                force + repulsion_between(point, mass, positions[other], masses[other], scaling)
            });
    }

    let delta = point - cell.centroid;
    let distance_sq = delta.length_sq().max(0.0001);
    if !cell.square.contains(point) && cell.square.size < theta * distance_sq.sqrt() {
        return delta * (scaling * mass * cell.mass / distance_sq);
    }

    cell.children().iter().fold(Vec2::ZERO, |force, child| {
        force + tree_repulsion(child, index, positions, masses, scaling, theta)
    })
}

/// Applies every overlap push, looking up candidate pairs through the tree.
pub(super) fn tree_collisions(
    cell: &QuadCell,
    positions: &[Vec2],
    radii: &[f32],
    collision: Collision,
    forces: &mut [Vec2],
) {
    let max_radius = radii.iter().copied().fold(0.0_f32, f32::max);
    let mut near = Vec::new();
    for (index, &point) in positions.iter().enumerate() {
        let reach = (radii[index] + max_radius) * collision.margin;
        if reach <= 0.0 {
            continue;
        }

        near.clear();
        cell.members_near(point, reach, &mut near);
        for &other in near.iter().filter(|&&other| other > index) {
            if let Some(push) = collision.push(index, other, positions, radii) {
                forces[index] += push;
                forces[other] -= push;
            }
        }
    }
}
