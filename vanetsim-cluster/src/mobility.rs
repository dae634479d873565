//! Mobility-based clustering (default algorithm)
//!
//! Greedy growth: seed from the highest-trust unassigned vehicle, then
//! absorb compatible unassigned neighbors nearest-first until the size cap.
//! Two vehicles are compatible when they are within the cluster radius,
//! their speeds differ by at most the speed threshold, and their headings
//! differ by at most the direction threshold.

use crate::candidate::{heading_delta, Candidate};
use vanetsim_core::config::ClusteringConfig;
use vanetsim_core::vehicle::VehicleId;

fn compatible(a: &Candidate, b: &Candidate, config: &ClusteringConfig) -> bool {
    a.distance_to(b) <= config.max_cluster_radius
        && (a.speed - b.speed).abs() <= config.speed_threshold
        && heading_delta(a.heading, b.heading) <= config.direction_threshold
}

/// Partition `candidates` into mobility-compatible groups
pub fn partition(candidates: &[Candidate], config: &ClusteringConfig) -> Vec<Vec<VehicleId>> {
    grow_greedy(candidates, config, compatible)
}

/// Shared greedy growth used by the mobility and direction algorithms
pub(crate) fn grow_greedy(
    candidates: &[Candidate],
    config: &ClusteringConfig,
    compat: fn(&Candidate, &Candidate, &ClusteringConfig) -> bool,
) -> Vec<Vec<VehicleId>> {
    // Highest trust seeds first; ids break ties for determinism.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&i, &j| {
        candidates[j]
            .trust
            .partial_cmp(&candidates[i].trust)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(candidates[i].id.cmp(&candidates[j].id))
    });

    let mut assigned = vec![false; candidates.len()];
    let mut groups = Vec::new();

    for &seed_idx in &order {
        if assigned[seed_idx] {
            continue;
        }
        let seed = &candidates[seed_idx];

        // Compatible unassigned neighbors, nearest first.
        let mut neighbors: Vec<usize> = (0..candidates.len())
            .filter(|&i| i != seed_idx && !assigned[i] && compat(seed, &candidates[i], config))
            .collect();
        neighbors.sort_by(|&i, &j| {
            seed.distance_to(&candidates[i])
                .partial_cmp(&seed.distance_to(&candidates[j]))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(candidates[i].id.cmp(&candidates[j].id))
        });
        neighbors.truncate(config.max_cluster_size.saturating_sub(1));

        if neighbors.len() + 1 < config.min_cluster_size {
            // Too small to form a cluster; the seed stays unclustered but
            // its would-be members remain available to later seeds.
            assigned[seed_idx] = true;
            continue;
        }

        assigned[seed_idx] = true;
        let mut group = vec![seed.id];
        for idx in neighbors {
            assigned[idx] = true;
            group.push(candidates[idx].id);
        }
        group.sort_unstable();
        groups.push(group);
    }

    groups
}
