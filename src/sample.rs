use std::collections::HashSet;

use eframe::egui::Vec2;
use rand::Rng;
use rand::seq::index;

use crate::error::{PipelineError, Result};

/// Fixed-step k-means over 2D points. Centers start on `k` distinct points;
/// an empty cluster is reseeded on a random point.
pub fn kmeans<R: Rng + ?Sized>(
    points: &[Vec2],
    k: usize,
    steps: usize,
    rng: &mut R,
) -> Result<Vec<Vec2>> {
    if k == 0 {
        return Err(PipelineError::ZeroClusters);
    }
    if points.is_empty() {
        return Err(PipelineError::EmptyPoints);
    }
    if k > points.len() {
        return Err(PipelineError::TooManyClusters {
            k,
            available: points.len(),
        });
    }

    let mut centers = index::sample(rng, points.len(), k)
        .into_iter()
        .map(|index| points[index])
        .collect::<Vec<_>>();

    let mut sums = vec![Vec2::ZERO; k];
    let mut counts = vec![0usize; k];
    for _ in 0..steps {
        sums.fill(Vec2::ZERO);
        counts.fill(0);

        for &point in points {
            let cluster = nearest(&centers, point);
            sums[cluster] += point;
            counts[cluster] += 1;
        }

        for (cluster, center) in centers.iter_mut().enumerate() {
            *center = if counts[cluster] > 0 {
                sums[cluster] / counts[cluster] as f32
            } else {
                points[rng.gen_range(0..points.len())]
            };
        }
    }

    Ok(centers)
}

fn nearest(centers: &[Vec2], point: Vec2) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (index, center) in centers.iter().enumerate() {
        let distance = (*center - point).length_sq();
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

/// Picks up to `k` spatially spread ids: one per k-means center, each the
/// closest point not already taken.
pub fn sample_representatives<R: Rng + ?Sized>(
    points: &[(String, Vec2)],
    k: usize,
    steps: usize,
    rng: &mut R,
) -> Result<Vec<String>> {
    let coordinates = points.iter().map(|(_, point)| *point).collect::<Vec<_>>();
    let centers = kmeans(&coordinates, k, steps, rng)?;

    let mut taken = HashSet::new();
    let mut sampled = Vec::with_capacity(k);
    for center in centers {
        let closest = points
            .iter()
            .filter(|(id, _)| !taken.contains(id.as_str()))
            .min_by(|(_, a), (_, b)| {
                (*a - center)
                    .length_sq()
                    .total_cmp(&(*b - center).length_sq())
            });

        if let Some((id, _)) = closest {
            taken.insert(id.as_str());
            sampled.push(id.clone());
        }
    }

    Ok(sampled)
}
