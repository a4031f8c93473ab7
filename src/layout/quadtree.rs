use eframe::egui::{Vec2, vec2};

const LEAF_CAPACITY: usize = 12;
const MAX_DEPTH: usize = 10;

/// Axis-aligned square anchored at its lower corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Square {
    pub(super) min: Vec2,
    pub(super) size: f32,
}

impl Square {
    /// Padded square around `points`; `None` when empty or any point is not finite.
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let (low, high) = points.iter().try_fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(low, high), &point| point.is_finite().then(|| (low.min(point), high.max(point))),
        )?;
        if !low.is_finite() {
            return None;
        }

        Some(Self {
            min: low - Vec2::splat(1.0),
            size: (high - low).max_elem().max(1.0) + 2.0,
        })
    }

    fn max(self) -> Vec2 {
        self.min + Vec2::splat(self.size)
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        let max = self.max();
        point.x >= self.min.x && point.y >= self.min.y && point.x <= max.x && point.y <= max.y
    }

    /// Squared distance from `point` to the closest point of the square.
    pub(super) fn gap_sq(self, point: Vec2) -> f32 {
        let max = self.max();
        let dx = (self.min.x - point.x).max(point.x - max.x).max(0.0);
        let dy = (self.min.y - point.y).max(point.y - max.y).max(0.0);
        dx * dx + dy * dy
    }

    /// Bit 0 is the right half, bit 1 the upper half.
    fn quadrant(self, point: Vec2) -> usize {
        let half = self.size * 0.5;
        usize::from(point.x >= self.min.x + half) | (usize::from(point.y >= self.min.y + half) << 1)
    }

    fn quarter(self, quadrant: usize) -> Self {
        let half = self.size * 0.5;
        Self {
            min: self.min + vec2((quadrant & 1) as f32 * half, (quadrant >> 1) as f32 * half),
            size: half,
        }
    }
}

/// Barnes–Hut cell. `mass` sums member masses (degree + 1) and `centroid` is
/// mass-weighted. Only leaves keep their members.
pub(super) struct QuadCell {
    pub(super) square: Square,
    pub(super) mass: f32,
    pub(super) centroid: Vec2,
    members: Vec<usize>,
    children: Vec<QuadCell>,
}

impl QuadCell {
    pub(super) fn build(positions: &[Vec2], masses: &[f32]) -> Option<Self> {
        let square = Square::enclosing(positions)?;
        let members = (0..positions.len()).collect();
        Some(Self::grow(square, members, positions, masses, 0))
    }

    fn grow(
        square: Square,
        members: Vec<usize>,
        positions: &[Vec2],
        masses: &[f32],
        depth: usize,
    ) -> Self {
        let mass = members.iter().map(|&index| masses[index]).sum::<f32>();
        let weighted = members
            .iter()
            .fold(Vec2::ZERO, |sum, &index| sum + positions[index] * masses[index]);
        let mut cell = Self {
            square,
            mass,
            centroid: if mass > 0.0 { weighted / mass } else { weighted },
            members,
            children: Vec::new(),
        };
        if depth >= MAX_DEPTH || cell.members.len() <= LEAF_CAPACITY {
            return cell;
        }

        let mut quadrants: [Vec<usize>; 4] = Default::default();
        for &index in &cell.members {
            quadrants[square.quadrant(positions[index])].push(index);
        }
        if quadrants.iter().filter(|quadrant| !quadrant.is_empty()).count() < 2 {
            return cell;
        }

        cell.children = quadrants
            .into_iter()
            .enumerate()
            .filter(|(_, members)| !members.is_empty())
            .map(|(quadrant, members)| {
                Self::grow(square.quarter(quadrant), members, positions, masses, depth + 1)
            })
            .collect();
        cell.members.clear();
        cell
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(super) fn members(&self) -> &[usize] {
        &self.members
    }

    pub(super) fn children(&self) -> &[QuadCell] {
        &self.children
    }

    /// Leaf members of every cell within `reach` of `point`.
    pub(super) fn members_near(&self, point: Vec2, reach: f32, out: &mut Vec<usize>) {
        if self.square.gap_sq(point) > reach * reach {
            return;
        }
        out.extend_from_slice(&self.members);
        for child in &self.children {
            child.members_near(point, reach, out);
        }
    }
}
