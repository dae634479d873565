//! Direction-based clustering
//!
//! Same greedy growth as the mobility algorithm, but compatibility only
//! requires co-location plus either a shared lane or near-identical heading.

use crate::candidate::{heading_delta, Candidate};
use crate::mobility::grow_greedy;
use vanetsim_core::config::ClusteringConfig;
use vanetsim_core::vehicle::VehicleId;

fn compatible(a: &Candidate, b: &Candidate, config: &ClusteringConfig) -> bool {
    a.distance_to(b) <= config.max_cluster_radius
        && (a.lane == b.lane
            || heading_delta(a.heading, b.heading) <= config.lane_direction_threshold)
}

/// Partition `candidates` by lane and travel direction
pub fn partition(candidates: &[Candidate], config: &ClusteringConfig) -> Vec<Vec<VehicleId>> {
    grow_greedy(candidates, config, compatible)
}
