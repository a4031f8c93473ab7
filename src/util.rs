use std::f32::consts::TAU;

use eframe::egui::{Vec2, vec2};

/// Unit-circle point for slot `index` of `total` evenly spaced slots.
pub fn circle_point(index: usize, total: usize) -> Vec2 {
    let angle = (index as f32 / total.max(1) as f32) * TAU;
    vec2(angle.cos(), angle.sin())
}

pub fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_points_are_unit_length_and_spread() {
        let first = circle_point(0, 4);
        let second = circle_point(1, 4);
        assert!((first - vec2(1.0, 0.0)).length() < 1e-6);
        assert!((second - vec2(0.0, 1.0)).length() < 1e-6);
        assert!((circle_point(3, 7).length() - 1.0).abs() < 1e-6);
        assert!(circle_point(0, 0).x.is_finite());
    }
}
