//! Clustering engine: cadenced partition runs and membership ownership
//!
//! The engine owns every cluster record plus the inverse vehicle-to-cluster
//! map. A partition run filters the population by trust, hands the
//! survivors to the configured algorithm, matches the resulting groups back
//! to existing clusters by member overlap (so settled clusters keep their
//! identity and their head), and emits the membership delta for the
//! lifecycle manager. Between runs membership only changes through the
//! explicit member operations driven by the maintenance protocol.

use crate::candidate::Candidate;
use crate::{dbscan, direction, kmeans, mobility};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use vanetsim_core::cluster::{Cluster, ClusterId, ClusterState};
use vanetsim_core::config::{ClusteringAlgorithm, ClusteringConfig};
use vanetsim_core::error::{SimError, SimResult};
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::VehicleId;

/// Membership delta emitted by a partition run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    ClusterFormed { cluster: ClusterId },
    ClusterDissolved { cluster: ClusterId },
    MemberAdded { cluster: ClusterId, vehicle: VehicleId },
    MemberRemoved { cluster: ClusterId, vehicle: VehicleId },
}

/// Owns cluster records and runs the partitioning algorithms
pub struct ClusteringEngine {
    config: ClusteringConfig,
    clusters: BTreeMap<ClusterId, Cluster>,
    membership: BTreeMap<VehicleId, ClusterId>,
    next_cluster_id: ClusterId,
    last_run: Option<f64>,
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            clusters: BTreeMap::new(),
            membership: BTreeMap::new(),
            next_cluster_id: 1,
            last_run: None,
        }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn clusters(&self) -> &BTreeMap<ClusterId, Cluster> {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_mut(&mut self, id: ClusterId) -> Option<&mut Cluster> {
        self.clusters.get_mut(&id)
    }

    /// Inverse lookup: the cluster a vehicle currently belongs to
    pub fn cluster_of(&self, vehicle: VehicleId) -> Option<ClusterId> {
        self.membership.get(&vehicle).copied()
    }

    /// Cluster ids are monotonic and never reused within a run
    pub fn allocate_id(&mut self) -> ClusterId {
        let id = self.next_cluster_id;
        self.next_cluster_id += 1;
        id
    }

    /// True when the partition cadence has elapsed
    pub fn due(&self, sim_time: f64) -> bool {
        match self.last_run {
            None => true,
            Some(last) => sim_time - last >= self.config.clustering_interval,
        }
    }

    /// Vehicles eligible for clustering under the trust filter
    fn eligible_candidates(&self, store: &VehicleStore) -> Vec<Candidate> {
        store
            .iter_all()
            .filter(|v| {
                !self.config.enable_trust_filter
                    || (!v.is_malicious() && v.trust >= self.config.min_trust_for_clustering)
            })
            .map(Candidate::from_vehicle)
            .collect()
    }

    /// Run the configured algorithm and apply the resulting partition
    pub fn run(&mut self, store: &mut VehicleStore, sim_time: f64) -> Vec<MembershipEvent> {
        self.last_run = Some(sim_time);

        let candidates = self.eligible_candidates(store);
        let groups = match self.config.algorithm {
            ClusteringAlgorithm::Mobility => mobility::partition(&candidates, &self.config),
            ClusteringAlgorithm::Direction => direction::partition(&candidates, &self.config),
            ClusteringAlgorithm::KMeans => kmeans::partition(&candidates, &self.config),
            ClusteringAlgorithm::Dbscan => dbscan::partition(&candidates, &self.config),
        };
        debug!(
            groups = groups.len(),
            eligible = candidates.len(),
            "partition run complete"
        );

        self.apply_partition(store, groups, sim_time)
    }

    /// Match groups to existing clusters by member overlap and diff
    fn apply_partition(
        &mut self,
        store: &mut VehicleStore,
        groups: Vec<Vec<VehicleId>>,
        sim_time: f64,
    ) -> Vec<MembershipEvent> {
        let mut events = Vec::new();

        // Score every (group, cluster) overlap, then assign greedily so the
        // strongest continuity wins when groups contest a cluster id.
        let mut overlaps: Vec<(usize, ClusterId, usize)> = Vec::new();
        for (g, group) in groups.iter().enumerate() {
            for (cid, cluster) in &self.clusters {
                if !cluster.is_active() {
                    continue;
                }
                let shared = group.iter().filter(|v| cluster.contains(**v)).count();
                if shared > 0 {
                    overlaps.push((g, *cid, shared));
                }
            }
        }
        overlaps.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));

        let mut group_for_cluster: BTreeMap<ClusterId, usize> = BTreeMap::new();
        let mut cluster_for_group: BTreeMap<usize, ClusterId> = BTreeMap::new();
        for (g, cid, _) in overlaps {
            if group_for_cluster.contains_key(&cid) || cluster_for_group.contains_key(&g) {
                continue;
            }
            group_for_cluster.insert(cid, g);
            cluster_for_group.insert(g, cid);
        }

        // Existing clusters first: diff matched ones, dissolve the rest.
        let existing: Vec<ClusterId> = self
            .clusters
            .iter()
            .filter(|(_, c)| c.is_active())
            .map(|(id, _)| *id)
            .collect();
        for cid in existing {
            match group_for_cluster.get(&cid) {
                Some(&g) => {
                    let new_members: BTreeSet<VehicleId> = groups[g].iter().copied().collect();
                    events.extend(self.rewrite_members(store, cid, new_members, sim_time));
                }
                None => {
                    events.extend(self.dissolve(store, cid, sim_time));
                }
            }
        }

        // Remaining groups become brand-new clusters.
        for (g, group) in groups.iter().enumerate() {
            if cluster_for_group.contains_key(&g) {
                continue;
            }
            let id = self.allocate_id();
            let members: BTreeSet<VehicleId> = group.iter().copied().collect();
            for &vehicle in &members {
                self.attach(store, vehicle, id);
                events.push(MembershipEvent::MemberAdded {
                    cluster: id,
                    vehicle,
                });
            }
            self.clusters.insert(id, Cluster::new(id, members, sim_time));
            events.push(MembershipEvent::ClusterFormed { cluster: id });
            info!(cluster = id, size = group.len(), "cluster formed");
        }

        events
    }

    /// Point a vehicle record (and the inverse map) at a cluster
    ///
    /// A newly attached vehicle is a plain member; any head flag it still
    /// carries from a previous cluster is stale.
    fn attach(&mut self, store: &mut VehicleStore, vehicle: VehicleId, cluster: ClusterId) {
        if let Some(record) = store.get_mut(vehicle) {
            record.cluster_id = Some(cluster);
            record.is_head = false;
        }
        self.membership.insert(vehicle, cluster);
    }

    /// Detach a vehicle record, but only while it still points at `from`
    ///
    /// A vehicle can be re-attached to another cluster before its old
    /// cluster's removal is processed within the same partition run; the
    /// guard keeps the late removal from clobbering the new membership.
    fn detach(&mut self, store: &mut VehicleStore, vehicle: VehicleId, from: ClusterId) {
        if self.membership.get(&vehicle) != Some(&from) {
            return;
        }
        if let Some(record) = store.get_mut(vehicle) {
            record.cluster_id = None;
            record.is_head = false;
        }
        self.membership.remove(&vehicle);
    }

    /// Replace a cluster's member set, emitting the per-member delta
    fn rewrite_members(
        &mut self,
        store: &mut VehicleStore,
        cid: ClusterId,
        new_members: BTreeSet<VehicleId>,
        sim_time: f64,
    ) -> Vec<MembershipEvent> {
        let Some(cluster) = self.clusters.get(&cid) else {
            return Vec::new();
        };
        let old_members = cluster.members.clone();

        let removed: Vec<VehicleId> = old_members.difference(&new_members).copied().collect();
        let added: Vec<VehicleId> = new_members.difference(&old_members).copied().collect();

        let mut events = Vec::new();
        for &vehicle in &removed {
            self.detach(store, vehicle, cid);
            events.push(MembershipEvent::MemberRemoved {
                cluster: cid,
                vehicle,
            });
        }
        for &vehicle in &added {
            self.attach(store, vehicle, cid);
            events.push(MembershipEvent::MemberAdded {
                cluster: cid,
                vehicle,
            });
        }

        let churn = removed.len() + added.len();
        if let Some(cluster) = self.clusters.get_mut(&cid) {
            cluster.members = new_members;
            if let Some(head) = cluster.head_id {
                if !cluster.members.contains(&head) {
                    cluster.head_id = None;
                }
            }
            if let Some(co) = cluster.co_leader_id {
                if !cluster.members.contains(&co) {
                    cluster.co_leader_id = None;
                }
            }
            cluster.record_churn(churn, sim_time);
        }

        events
    }

    /// Add one vehicle to a cluster (maintenance-protocol join)
    pub fn add_member(
        &mut self,
        store: &mut VehicleStore,
        cid: ClusterId,
        vehicle: VehicleId,
        sim_time: f64,
    ) -> SimResult<()> {
        if !store.contains(vehicle) {
            return Err(SimError::UnknownVehicle(vehicle));
        }
        let cluster = self
            .clusters
            .get_mut(&cid)
            .ok_or(SimError::UnknownCluster(cid))?;
        if !cluster.members.insert(vehicle) {
            return Ok(());
        }
        cluster.record_churn(1, sim_time);
        self.attach(store, vehicle, cid);
        Ok(())
    }

    /// Remove one vehicle from a cluster (leave, eviction, departure)
    pub fn remove_member(
        &mut self,
        store: &mut VehicleStore,
        cid: ClusterId,
        vehicle: VehicleId,
        sim_time: f64,
    ) -> SimResult<()> {
        let cluster = self
            .clusters
            .get_mut(&cid)
            .ok_or(SimError::UnknownCluster(cid))?;
        if !cluster.members.remove(&vehicle) {
            return Ok(());
        }
        if cluster.head_id == Some(vehicle) {
            cluster.head_id = None;
        }
        if cluster.co_leader_id == Some(vehicle) {
            cluster.co_leader_id = None;
        }
        cluster.relay_nodes.remove(&vehicle);
        cluster.boundary_nodes.remove(&vehicle);
        cluster.record_churn(1, sim_time);
        self.detach(store, vehicle, cid);
        Ok(())
    }

    /// Move a cluster into `Dissolving`, releasing every member
    pub fn dissolve(
        &mut self,
        store: &mut VehicleStore,
        cid: ClusterId,
        sim_time: f64,
    ) -> Vec<MembershipEvent> {
        let Some(cluster) = self.clusters.get_mut(&cid) else {
            return Vec::new();
        };
        cluster.state = ClusterState::Dissolving;
        cluster.head_id = None;
        cluster.co_leader_id = None;
        let members: Vec<VehicleId> = cluster.members.iter().copied().collect();
        cluster.members.clear();
        cluster.last_membership_change = sim_time;

        let mut events = Vec::new();
        for vehicle in members {
            self.detach(store, vehicle, cid);
            events.push(MembershipEvent::MemberRemoved {
                cluster: cid,
                vehicle,
            });
        }
        events.push(MembershipEvent::ClusterDissolved { cluster: cid });
        info!(cluster = cid, "cluster dissolving");
        events
    }

    /// Retire a cluster id outright (merge absorption)
    pub fn retire(&mut self, cid: ClusterId) {
        self.clusters.remove(&cid);
    }

    /// Drop `Dissolving` records at the end of the tick
    pub fn sweep_dissolving(&mut self) -> Vec<ClusterId> {
        let swept: Vec<ClusterId> = self
            .clusters
            .iter()
            .filter(|(_, c)| c.state == ClusterState::Dissolving)
            .map(|(id, _)| *id)
            .collect();
        for id in &swept {
            self.clusters.remove(id);
        }
        swept
    }

    /// Register a cluster created outside a partition run (splits)
    pub fn insert_cluster(&mut self, store: &mut VehicleStore, cluster: Cluster) {
        let members: Vec<VehicleId> = cluster.members.iter().copied().collect();
        let id = cluster.id;
        for vehicle in members {
            self.attach(store, vehicle, id);
        }
        self.clusters.insert(id, cluster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use vanetsim_core::vehicle::{Vehicle, VehicleSnapshot};

    fn store_with_line(n: u64, spacing: f64) -> VehicleStore {
        let mut store = VehicleStore::new(300.0);
        for id in 0..n {
            let snapshot = VehicleSnapshot {
                id,
                position: Point2::new(id as f64 * spacing, 0.0),
                speed: 20.0,
                heading: 0.0,
                lane: 0,
                is_emergency: false,
                timestamp: 0.0,
            };
            store.upsert(Vehicle::from_snapshot(&snapshot, 100.0, 2.0, 0.7));
        }
        store
    }

    #[test]
    fn test_run_forms_clusters_and_sets_membership() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(5, 50.0);

        let events = engine.run(&mut store, 0.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, MembershipEvent::ClusterFormed { .. })));
        assert_eq!(engine.clusters().len(), 1);

        let (cid, cluster) = engine.clusters().iter().next().unwrap();
        assert_eq!(cluster.len(), 5);
        for id in 0..5 {
            assert_eq!(engine.cluster_of(id), Some(*cid));
            assert_eq!(store.get(id).unwrap().cluster_id, Some(*cid));
        }
    }

    #[test]
    fn test_identity_preserved_across_runs() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(5, 50.0);

        engine.run(&mut store, 0.0);
        let cid = *engine.clusters().keys().next().unwrap();

        // Same population, one second later: no churn, same cluster id.
        let events = engine.run(&mut store, 1.0);
        assert!(events.is_empty());
        assert_eq!(engine.clusters().len(), 1);
        assert!(engine.cluster(cid).is_some());
    }

    #[test]
    fn test_trust_filter_excludes_low_trust() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(5, 50.0);
        store.get_mut(2).unwrap().set_trust(0.25);

        engine.run(&mut store, 0.0);
        assert_eq!(engine.cluster_of(2), None);
        assert!(store.get(2).unwrap().cluster_id.is_none());

        let cluster = engine.clusters().values().next().unwrap();
        assert_eq!(cluster.len(), 4);
    }

    #[test]
    fn test_filter_can_be_disabled() {
        let mut config = ClusteringConfig::default();
        config.enable_trust_filter = false;
        let mut engine = ClusteringEngine::new(config);
        let mut store = store_with_line(5, 50.0);
        store.get_mut(2).unwrap().set_trust(0.1);

        engine.run(&mut store, 0.0);
        assert!(engine.cluster_of(2).is_some());
    }

    #[test]
    fn test_departed_members_detached() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(5, 50.0);
        engine.run(&mut store, 0.0);
        let cid = *engine.clusters().keys().next().unwrap();

        // Vehicle 4 drives far away before the next run.
        let old = store.get(4).unwrap().position;
        store.get_mut(4).unwrap().position = Point2::new(10_000.0, 0.0);
        store.reindex(4, old);

        let events = engine.run(&mut store, 1.0);
        assert!(events.contains(&MembershipEvent::MemberRemoved {
            cluster: cid,
            vehicle: 4
        }));
        assert_eq!(engine.cluster_of(4), None);
    }

    #[test]
    fn test_cadence() {
        let engine = ClusteringEngine::new(ClusteringConfig::default());
        assert!(engine.due(0.0));

        let mut engine = engine;
        let mut store = store_with_line(2, 50.0);
        engine.run(&mut store, 0.0);
        assert!(!engine.due(0.5));
        assert!(engine.due(1.0));
    }

    #[test]
    fn test_dispersed_cluster_dissolves() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(3, 50.0);
        engine.run(&mut store, 0.0);
        let cid = *engine.clusters().keys().next().unwrap();

        // Everyone scatters out of range of everyone else.
        for id in 0..3 {
            let old = store.get(id).unwrap().position;
            store.get_mut(id).unwrap().position =
                Point2::new(id as f64 * 5_000.0, id as f64 * 5_000.0);
            store.reindex(id, old);
        }

        let events = engine.run(&mut store, 1.0);
        assert!(events.contains(&MembershipEvent::ClusterDissolved { cluster: cid }));
        let swept = engine.sweep_dissolving();
        assert_eq!(swept, vec![cid]);
        assert!(engine.clusters().is_empty());
    }

    #[test]
    fn test_single_vehicle_never_clusters() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(1, 50.0);
        let events = engine.run(&mut store, 0.0);
        assert!(events.is_empty());
        assert!(engine.clusters().is_empty());
    }

    #[test]
    fn test_member_operations_keep_maps_synced() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = store_with_line(6, 50.0);
        engine.run(&mut store, 0.0);
        let cid = *engine.clusters().keys().next().unwrap();

        engine.remove_member(&mut store, cid, 3, 1.0).unwrap();
        assert_eq!(engine.cluster_of(3), None);
        assert!(!engine.cluster(cid).unwrap().contains(3));

        engine.add_member(&mut store, cid, 3, 2.0).unwrap();
        assert_eq!(engine.cluster_of(3), Some(cid));
        assert_eq!(store.get(3).unwrap().cluster_id, Some(cid));

        assert!(engine.add_member(&mut store, 999, 3, 2.0).is_err());
        assert!(engine.add_member(&mut store, cid, 999, 2.0).is_err());
    }
}
