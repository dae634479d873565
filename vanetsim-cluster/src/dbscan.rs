//! DBSCAN density clustering
//!
//! Core points are vehicles with at least `min_pts` neighbors (themselves
//! included) within `epsilon`. Clusters grow by breadth-first expansion
//! from core points; border vehicles join the first cluster that reaches
//! them and noise vehicles are left unclustered. Oversized density
//! clusters are emitted as-is; the lifecycle manager's split pass restores
//! the size cap in the same tick.

use crate::candidate::Candidate;
use std::collections::VecDeque;
use vanetsim_core::config::ClusteringConfig;
use vanetsim_core::vehicle::VehicleId;

#[derive(Clone, Copy, PartialEq)]
enum Label {
    Unvisited,
    Noise,
    Clustered(usize),
}

/// Partition `candidates` by spatial density
pub fn partition(candidates: &[Candidate], config: &ClusteringConfig) -> Vec<Vec<VehicleId>> {
    let epsilon = config.dbscan_epsilon();
    let min_pts = config.dbscan_min_pts();
    let eps2 = epsilon * epsilon;

    let neighbors_of = |i: usize| -> Vec<usize> {
        (0..candidates.len())
            .filter(|&j| {
                (candidates[i].position - candidates[j].position).norm_squared() <= eps2
            })
            .collect()
    };

    let mut labels = vec![Label::Unvisited; candidates.len()];
    let mut groups: Vec<Vec<VehicleId>> = Vec::new();

    for i in 0..candidates.len() {
        if labels[i] != Label::Unvisited {
            continue;
        }
        let seed_neighbors = neighbors_of(i);
        if seed_neighbors.len() < min_pts {
            labels[i] = Label::Noise;
            continue;
        }

        let cluster = groups.len();
        groups.push(Vec::new());
        labels[i] = Label::Clustered(cluster);
        groups[cluster].push(candidates[i].id);

        let mut frontier: VecDeque<usize> = seed_neighbors.into();
        while let Some(j) = frontier.pop_front() {
            match labels[j] {
                Label::Clustered(_) => continue,
                Label::Noise | Label::Unvisited => {
                    let was_unvisited = labels[j] == Label::Unvisited;
                    labels[j] = Label::Clustered(cluster);
                    groups[cluster].push(candidates[j].id);

                    if was_unvisited {
                        let js_neighbors = neighbors_of(j);
                        if js_neighbors.len() >= min_pts {
                            frontier.extend(js_neighbors);
                        }
                    }
                }
            }
        }
    }

    groups.retain(|g| g.len() >= config.min_cluster_size);
    for group in &mut groups {
        group.sort_unstable();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn candidate(id: VehicleId, x: f64, y: f64) -> Candidate {
        Candidate {
            id,
            position: Point2::new(x, y),
            speed: 20.0,
            heading: 0.0,
            lane: 0,
            trust: 0.8,
        }
    }

    #[test]
    fn test_dense_groups_found() {
        let config = ClusteringConfig::default();
        let mut candidates = Vec::new();
        for i in 0..5 {
            candidates.push(candidate(i, i as f64 * 20.0, 0.0));
        }
        for i in 10..15 {
            candidates.push(candidate(i, 2000.0 + (i - 10) as f64 * 20.0, 0.0));
        }

        let mut groups = partition(&candidates, &config);
        groups.sort();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec![0, 1, 2, 3, 4]);
        assert_eq!(groups[1], vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_isolated_vehicle_is_noise() {
        let config = ClusteringConfig::default();
        let candidates = vec![
            candidate(1, 0.0, 0.0),
            candidate(2, 50.0, 0.0),
            candidate(3, 10_000.0, 0.0),
        ];

        let groups = partition(&candidates, &config);
        assert_eq!(groups, vec![vec![1, 2]]);
    }

    #[test]
    fn test_chain_connects_through_core_points() {
        let mut config = ClusteringConfig::default();
        config.dbscan_epsilon = Some(100.0);
        config.dbscan_min_pts = Some(2);
        // A chain with 80 m spacing: each vehicle sees its neighbors, so
        // density expansion walks the whole chain.
        let candidates: Vec<Candidate> =
            (0..6).map(|i| candidate(i, i as f64 * 80.0, 0.0)).collect();

        let groups = partition(&candidates, &config);
        assert_eq!(groups, vec![vec![0, 1, 2, 3, 4, 5]]);
    }

    #[test]
    fn test_deterministic() {
        let config = ClusteringConfig::default();
        let candidates: Vec<Candidate> = (0..40)
            .map(|i| candidate(i, (i as f64 * 53.0) % 700.0, (i as f64 * 29.0) % 300.0))
            .collect();
        assert_eq!(
            partition(&candidates, &config),
            partition(&candidates, &config)
        );
    }
}
