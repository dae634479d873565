//! K-means clustering on vehicle positions
//!
//! K is derived from the population (`⌈N / target_size⌉`). Initial
//! centroids are taken at even strides through the id-sorted population so
//! identical inputs always produce identical partitions. After convergence,
//! members outside the cluster radius of their centroid are shed, groups
//! above the size cap keep the members nearest their centroid, and
//! undersized groups are discarded.

use crate::candidate::Candidate;
use nalgebra::{Point2, Vector2};
use vanetsim_core::config::ClusteringConfig;
use vanetsim_core::vehicle::VehicleId;

const MAX_ITERATIONS: usize = 25;

/// Partition `candidates` into `⌈N / target_size⌉` positional clusters
pub fn partition(candidates: &[Candidate], config: &ClusteringConfig) -> Vec<Vec<VehicleId>> {
    let n = candidates.len();
    if n < config.min_cluster_size {
        return Vec::new();
    }
    let k = n.div_ceil(config.kmeans_target_size).max(1);

    // Even strides through the id-sorted population seed the centroids.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| candidates[i].id);
    let mut centroids: Vec<Point2<f64>> = (0..k)
        .map(|c| candidates[order[c * n / k]].position)
        .collect();

    let mut assignment = vec![0usize; n];
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;

        for (i, candidate) in candidates.iter().enumerate() {
            let nearest = nearest_centroid(&candidate.position, &centroids);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }

        for (c, centroid) in centroids.iter_mut().enumerate() {
            let mut sum = Vector2::zeros();
            let mut count = 0usize;
            for (i, candidate) in candidates.iter().enumerate() {
                if assignment[i] == c {
                    sum += candidate.position.coords;
                    count += 1;
                }
            }
            if count > 0 {
                *centroid = Point2::from(sum / count as f64);
            }
        }

        if !changed {
            break;
        }
    }

    // Shed members beyond the radius of their centroid. A group above the
    // size cap keeps the members nearest its centroid, the way the greedy
    // algorithms keep the neighbors nearest their seed.
    let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, candidate) in candidates.iter().enumerate() {
        let c = assignment[i];
        if (candidate.position - centroids[c]).norm() <= config.max_cluster_radius {
            grouped[c].push(i);
        }
    }

    let mut groups: Vec<Vec<VehicleId>> = Vec::new();
    for (c, mut members) in grouped.into_iter().enumerate() {
        if members.len() < config.min_cluster_size {
            continue;
        }
        members.sort_by(|&i, &j| {
            (candidates[i].position - centroids[c])
                .norm_squared()
                .partial_cmp(&(candidates[j].position - centroids[c]).norm_squared())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(candidates[i].id.cmp(&candidates[j].id))
        });
        members.truncate(config.max_cluster_size);

        let mut group: Vec<VehicleId> = members.iter().map(|&i| candidates[i].id).collect();
        group.sort_unstable();
        groups.push(group);
    }
    groups
}

fn nearest_centroid(position: &Point2<f64>, centroids: &[Point2<f64>]) -> usize {
    let mut best = 0usize;
    let mut best_d2 = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d2 = (position - centroid).norm_squared();
        if d2 < best_d2 {
            best_d2 = d2;
            best = c;
        }
    }
    best
}
