//! Cluster records and lifecycle states

use crate::vehicle::VehicleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a cluster; never reused within a run
pub type ClusterId = u64;

/// Smoothing factor of the membership-churn EWMA
const STABILITY_ALPHA: f64 = 0.3;

/// Lifecycle state of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    /// Created, waiting for its first election to settle
    Forming,
    /// Elected head and a full heartbeat interval without churn
    Stable,
    /// Being absorbed into another cluster
    Merging,
    /// Being divided into two clusters
    Splitting,
    /// Below minimum size; removed at the end of the tick
    Dissolving,
}

/// A cluster of mutually compatible vehicles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    /// Elected head; transiently `None` during re-election
    pub head_id: Option<VehicleId>,
    /// Member set, ordered for deterministic iteration
    pub members: BTreeSet<VehicleId>,
    pub formation_time: f64,
    pub state: ClusterState,
    /// Runner-up kept warm for fast failover
    pub co_leader_id: Option<VehicleId>,
    /// High-trust boundary members forwarding inter-cluster traffic
    pub relay_nodes: BTreeSet<VehicleId>,
    /// Members near the edge of the communication radius
    pub boundary_nodes: BTreeSet<VehicleId>,
    pub last_election_time: f64,
    /// EWMA of member retention across membership changes
    pub stability_score: f64,
    /// Simulation time of the most recent membership change
    pub last_membership_change: f64,
}

impl Cluster {
    /// Fresh cluster in `Forming` state
    pub fn new(id: ClusterId, members: BTreeSet<VehicleId>, sim_time: f64) -> Self {
        Self {
            id,
            head_id: None,
            members,
            formation_time: sim_time,
            state: ClusterState::Forming,
            co_leader_id: None,
            relay_nodes: BTreeSet::new(),
            boundary_nodes: BTreeSet::new(),
            last_election_time: sim_time,
            stability_score: 1.0,
            last_membership_change: sim_time,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.members.contains(&id)
    }

    /// True unless the cluster is being torn down
    pub fn is_active(&self) -> bool {
        self.state != ClusterState::Dissolving
    }

    /// Fold a membership change of `changed` vehicles into the churn EWMA
    pub fn record_churn(&mut self, changed: usize, sim_time: f64) {
        if changed == 0 {
            return;
        }
        let size = self.members.len().max(1) as f64;
        let retention = (1.0 - changed as f64 / size).max(0.0);
        self.stability_score =
            (1.0 - STABILITY_ALPHA) * self.stability_score + STABILITY_ALPHA * retention;
        self.last_membership_change = sim_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(ids: &[VehicleId]) -> BTreeSet<VehicleId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_new_cluster_is_forming() {
        let c = Cluster::new(1, members(&[1, 2, 3]), 0.0);
        assert_eq!(c.state, ClusterState::Forming);
        assert_eq!(c.len(), 3);
        assert!(c.head_id.is_none());
        assert_eq!(c.stability_score, 1.0);
    }

    #[test]
    fn test_churn_lowers_stability() {
        let mut c = Cluster::new(1, members(&[1, 2, 3, 4]), 0.0);
        c.record_churn(2, 1.0);
        assert!(c.stability_score < 1.0);
        assert_eq!(c.last_membership_change, 1.0);

        let before = c.stability_score;
        c.record_churn(0, 2.0);
        assert_eq!(c.stability_score, before);
        assert_eq!(c.last_membership_change, 1.0);
    }

    #[test]
    fn test_dissolving_is_not_active() {
        let mut c = Cluster::new(1, members(&[1, 2]), 0.0);
        assert!(c.is_active());
        c.state = ClusterState::Dissolving;
        assert!(!c.is_active());
    }
}
