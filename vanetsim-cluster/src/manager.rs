//! Cluster lifecycle management
//!
//! Runs once per tick after the clustering engine: heartbeat eviction,
//! state promotion, the periodic overlap-merge pass, oversize/diameter
//! splits, undersize dissolution, re-election triggers, and relay/boundary
//! designation. Re-elections requested here are executed by the election
//! engine within the same tick.

use crate::engine::ClusteringEngine;
use nalgebra::Point2;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use vanetsim_core::cluster::{Cluster, ClusterId, ClusterState};
use vanetsim_core::config::{ClusteringConfig, ElectionConfig, ProtocolConfig, TrustConfig};
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::VehicleId;

/// Overlap-merge decision thresholds
pub mod merge_thresholds {
    /// Head separation below which clusters always merge (meters)
    pub const CLOSE_HEAD_DISTANCE_M: f64 = 200.0;

    /// Head separation admitting an overlap-based merge (meters)
    pub const MERGE_HEAD_DISTANCE_M: f64 = 300.0;

    /// Member-overlap fraction required within merge distance
    pub const OVERLAP_RATIO: f64 = 0.30;

    /// Member-overlap fraction that forces a merge at any distance
    pub const ABSOLUTE_OVERLAP_RATIO: f64 = 0.50;
}

/// Members beyond this fraction of the radius count as boundary nodes
const BOUNDARY_FRACTION: f64 = 0.8;

/// Relay nodes designated per cluster
const RELAY_COUNT: usize = 2;

/// One committed merge, with the heads involved in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeEvent {
    pub absorbed: ClusterId,
    pub primary: ClusterId,
    /// Head demoted to plain member of the primary
    pub absorbed_head: VehicleId,
    /// Head retained without re-election
    pub primary_head: VehicleId,
}

/// What the manager decided this tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Clusters that must (re-)elect within this tick
    pub reelect: Vec<ClusterId>,
    pub merges: Vec<MergeEvent>,
    /// (original, offshoot) split pairs
    pub splits: Vec<(ClusterId, ClusterId)>,
    /// Clusters that entered `Dissolving`
    pub dissolved: Vec<ClusterId>,
    /// Members evicted for heartbeat silence
    pub evicted: Vec<(ClusterId, VehicleId)>,
    /// Co-leader promotions (cluster, new head)
    pub handovers: Vec<(ClusterId, VehicleId)>,
}

/// Drives cluster state transitions and the maintenance protocol
pub struct ClusterManager {
    clustering: ClusteringConfig,
    trust: TrustConfig,
    election: ElectionConfig,
    protocol: ProtocolConfig,
    last_merge_pass: f64,
    /// Last heartbeat seen per clustered vehicle
    heartbeats: HashMap<VehicleId, f64>,
}

impl ClusterManager {
    pub fn new(
        clustering: ClusteringConfig,
        trust: TrustConfig,
        election: ElectionConfig,
        protocol: ProtocolConfig,
    ) -> Self {
        Self {
            clustering,
            trust,
            election,
            protocol,
            last_merge_pass: 0.0,
            heartbeats: HashMap::new(),
        }
    }

    /// Record a heartbeat from a member
    pub fn record_heartbeat(&mut self, vehicle: VehicleId, sim_time: f64) {
        self.heartbeats.insert(vehicle, sim_time);
    }

    /// Full maintenance pass for one tick
    pub fn process_tick(
        &mut self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        dt: f64,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        self.accrue_head_time(engine, store, dt);
        self.evict_silent_members(engine, store, sim_time, &mut outcome);
        self.promote_forming(engine, sim_time);

        if sim_time - self.last_merge_pass >= self.clustering.merge_interval {
            self.last_merge_pass = sim_time;
            self.merge_pass(engine, store, sim_time, &mut outcome);
        }

        self.split_pass(engine, store, sim_time, &mut outcome);
        self.dissolve_pass(engine, store, sim_time, &mut outcome);
        self.election_triggers(engine, store, sim_time, &mut outcome);
        self.designate_relays(engine, store);

        outcome
    }

    /// `time_as_head` accrues while the head flag holds
    fn accrue_head_time(&self, engine: &ClusteringEngine, store: &mut VehicleStore, dt: f64) {
        let heads: Vec<VehicleId> = engine
            .clusters()
            .values()
            .filter(|c| c.is_active())
            .filter_map(|c| c.head_id)
            .collect();
        for head in heads {
            if let Some(vehicle) = store.get_mut(head) {
                if vehicle.is_head {
                    vehicle.time_as_head += dt;
                }
            }
        }
    }

    /// Members silent beyond the timeout receive a synthetic leave
    fn evict_silent_members(
        &mut self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let mut evictions: Vec<(ClusterId, VehicleId)> = Vec::new();
        for (cid, cluster) in engine.clusters() {
            if !cluster.is_active() {
                continue;
            }
            for &member in &cluster.members {
                let last = *self.heartbeats.entry(member).or_insert(sim_time);
                if sim_time - last > self.protocol.member_timeout {
                    evictions.push((*cid, member));
                }
            }
        }
        for (cid, member) in evictions {
            debug!(cluster = cid, vehicle = member, "member evicted on silence");
            let _ = engine.remove_member(store, cid, member, sim_time);
            self.heartbeats.remove(&member);
            outcome.evicted.push((cid, member));
        }
    }

    /// Forming clusters stabilize after an election plus a quiet heartbeat
    fn promote_forming(&self, engine: &mut ClusteringEngine, sim_time: f64) {
        let interval = self.protocol.heartbeat_interval;
        let promote: Vec<ClusterId> = engine
            .clusters()
            .values()
            .filter(|c| {
                c.state == ClusterState::Forming
                    && c.head_id.is_some()
                    && sim_time - c.last_election_time >= interval
                    && sim_time - c.last_membership_change >= interval
            })
            .map(|c| c.id)
            .collect();
        for cid in promote {
            if let Some(cluster) = engine.cluster_mut(cid) {
                cluster.state = ClusterState::Stable;
                debug!(cluster = cid, "cluster stabilized");
            }
        }
    }

    /// Fraction of `a`'s members within the cluster radius of `b`'s head
    fn overlap_toward(
        &self,
        a: &Cluster,
        b_head_position: Point2<f64>,
        store: &VehicleStore,
    ) -> f64 {
        if a.members.is_empty() {
            return 0.0;
        }
        let covered = a
            .members
            .iter()
            .filter_map(|m| store.get(*m))
            .filter(|v| (v.position - b_head_position).norm() <= self.clustering.max_cluster_radius)
            .count();
        covered as f64 / a.members.len() as f64
    }

    fn merge_condition(&self, d_heads: f64, overlap: f64) -> bool {
        d_heads < merge_thresholds::CLOSE_HEAD_DISTANCE_M
            || (d_heads < merge_thresholds::MERGE_HEAD_DISTANCE_M
                && overlap >= merge_thresholds::OVERLAP_RATIO)
            || overlap >= merge_thresholds::ABSOLUTE_OVERLAP_RATIO
    }

    /// Periodic pairwise overlap-merge scan
    fn merge_pass(
        &mut self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let ids: Vec<ClusterId> = engine
            .clusters()
            .values()
            .filter(|c| c.is_active() && c.head_id.is_some())
            .map(|c| c.id)
            .collect();

        let mut absorbed: BTreeSet<ClusterId> = BTreeSet::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a_id, b_id) = (ids[i], ids[j]);
                if absorbed.contains(&a_id) || absorbed.contains(&b_id) {
                    continue;
                }

                let (Some(a), Some(b)) = (engine.cluster(a_id), engine.cluster(b_id)) else {
                    continue;
                };
                let (Some(a_head), Some(b_head)) = (a.head_id, b.head_id) else {
                    continue;
                };
                let (Some(a_head_v), Some(b_head_v)) = (store.get(a_head), store.get(b_head))
                else {
                    continue;
                };

                let d_heads = (a_head_v.position - b_head_v.position).norm();
                let overlap_ab = self.overlap_toward(a, b_head_v.position, store);
                let overlap_ba = self.overlap_toward(b, a_head_v.position, store);
                if !self.merge_condition(d_heads, overlap_ab)
                    && !self.merge_condition(d_heads, overlap_ba)
                {
                    continue;
                }

                // Higher-trust head keeps its cluster; ties keep the older id.
                let (primary, secondary, primary_head, secondary_head) =
                    if a_head_v.trust >= b_head_v.trust {
                        (a_id, b_id, a_head, b_head)
                    } else {
                        (b_id, a_id, b_head, a_head)
                    };
                self.merge_into(engine, store, secondary, primary, sim_time);
                absorbed.insert(secondary);
                outcome.merges.push(MergeEvent {
                    absorbed: secondary,
                    primary,
                    absorbed_head: secondary_head,
                    primary_head,
                });
            }
        }
    }

    /// Absorb `secondary` into `primary`; no re-election is triggered
    fn merge_into(
        &self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        secondary: ClusterId,
        primary: ClusterId,
        sim_time: f64,
    ) {
        let Some(sec) = engine.cluster_mut(secondary) else {
            return;
        };
        sec.state = ClusterState::Merging;
        let moved: Vec<VehicleId> = sec.members.iter().copied().collect();

        for &vehicle in &moved {
            let _ = engine.remove_member(store, secondary, vehicle, sim_time);
            let _ = engine.add_member(store, primary, vehicle, sim_time);
            if let Some(record) = store.get_mut(vehicle) {
                // The absorbed head demotes to plain member.
                record.is_head = false;
            }
        }
        engine.retire(secondary);
        info!(
            absorbed = secondary,
            into = primary,
            members = moved.len(),
            "clusters merged"
        );
    }

    /// Split oversized or overstretched clusters with a local 2-means
    fn split_pass(
        &self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let candidates: Vec<ClusterId> = engine
            .clusters()
            .values()
            .filter(|c| c.is_active())
            .filter(|c| {
                c.len() > self.clustering.max_cluster_size
                    || self.diameter(c, store) > 2.0 * self.clustering.max_cluster_radius
            })
            .map(|c| c.id)
            .collect();

        for cid in candidates {
            self.split_cluster(engine, store, cid, sim_time, outcome);
        }
    }

    /// Largest pairwise member distance
    fn diameter(&self, cluster: &Cluster, store: &VehicleStore) -> f64 {
        let positions: Vec<Point2<f64>> = cluster
            .members
            .iter()
            .filter_map(|m| store.get(*m))
            .map(|v| v.position)
            .collect();
        let mut max = 0.0f64;
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                max = max.max((positions[i] - positions[j]).norm());
            }
        }
        max
    }

    fn split_cluster(
        &self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        cid: ClusterId,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let Some(cluster) = engine.cluster(cid) else {
            return;
        };
        let members: Vec<VehicleId> = cluster.members.iter().copied().collect();
        let positions: Vec<Point2<f64>> = members
            .iter()
            .filter_map(|m| store.get(*m))
            .map(|v| v.position)
            .collect();
        if positions.len() != members.len() || members.len() < 2 {
            return;
        }

        if let Some(c) = engine.cluster_mut(cid) {
            c.state = ClusterState::Splitting;
        }

        let (first, second) = two_means(&members, &positions);
        debug!(
            cluster = cid,
            left = first.len(),
            right = second.len(),
            "cluster splitting"
        );

        // The larger half keeps the cluster id and its head when retained.
        let (keep, spawn) = if first.len() >= second.len() {
            (first, second)
        } else {
            (second, first)
        };

        for &vehicle in &spawn {
            let _ = engine.remove_member(store, cid, vehicle, sim_time);
        }

        if keep.len() < self.clustering.min_cluster_size {
            // The remainder is not viable on its own; release everyone.
            engine.dissolve(store, cid, sim_time);
            outcome.dissolved.push(cid);
        } else {
            if let Some(c) = engine.cluster_mut(cid) {
                c.state = ClusterState::Forming;
            }
            outcome.reelect.push(cid);
        }

        if spawn.len() >= self.clustering.min_cluster_size {
            let new_id = engine.allocate_id();
            let members: BTreeSet<VehicleId> = spawn.iter().copied().collect();
            engine.insert_cluster(store, Cluster::new(new_id, members, sim_time));
            outcome.splits.push((cid, new_id));
            outcome.reelect.push(new_id);
            info!(cluster = cid, offshoot = new_id, "cluster split");
        }
        // Halves below the minimum size simply stay unclustered.
    }

    /// Undersized clusters enter `Dissolving`
    fn dissolve_pass(
        &self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let undersized: Vec<ClusterId> = engine
            .clusters()
            .values()
            .filter(|c| c.is_active() && c.len() < self.clustering.min_cluster_size)
            .map(|c| c.id)
            .collect();
        for cid in undersized {
            engine.dissolve(store, cid, sim_time);
            outcome.dissolved.push(cid);
        }
    }

    /// Collect clusters whose head situation demands an election now
    fn election_triggers(
        &self,
        engine: &mut ClusteringEngine,
        store: &mut VehicleStore,
        sim_time: f64,
        outcome: &mut TickOutcome,
    ) {
        let mut promote: Vec<(ClusterId, VehicleId)> = Vec::new();

        for cluster in engine.clusters().values() {
            if !cluster.is_active() {
                continue;
            }
            if outcome.reelect.contains(&cluster.id) {
                continue;
            }

            match cluster.head_id {
                None => {
                    // Fast failover when a warm co-leader is available;
                    // otherwise a full election.
                    let co = cluster.co_leader_id.and_then(|c| store.get(c)).filter(|v| {
                        v.trust >= self.election.co_leader_min_trust && !v.is_malicious()
                    });
                    match co {
                        Some(v) => promote.push((cluster.id, v.id)),
                        None => outcome.reelect.push(cluster.id),
                    }
                }
                Some(head) => {
                    let overdue =
                        sim_time - cluster.last_election_time >= self.election.reelection_interval;
                    let head_bad = match store.get(head) {
                        Some(v) => v.trust < self.trust.min_trust_threshold || v.is_malicious(),
                        None => true,
                    };
                    if overdue || head_bad {
                        outcome.reelect.push(cluster.id);
                    }
                }
            }
        }

        for (cid, new_head) in promote {
            if let Some(cluster) = engine.cluster_mut(cid) {
                cluster.head_id = Some(new_head);
                cluster.co_leader_id = None;
            }
            if let Some(vehicle) = store.get_mut(new_head) {
                vehicle.is_head = true;
            }
            info!(cluster = cid, head = new_head, "co-leader promoted");
            outcome.handovers.push((cid, new_head));
        }
    }

    /// Boundary members sit near the radius edge; the two highest-trust
    /// boundary members act as relays
    fn designate_relays(&self, engine: &mut ClusteringEngine, store: &VehicleStore) {
        let threshold = BOUNDARY_FRACTION * self.clustering.max_cluster_radius;
        let ids: Vec<ClusterId> = engine
            .clusters()
            .values()
            .filter(|c| c.is_active() && c.head_id.is_some())
            .map(|c| c.id)
            .collect();

        for cid in ids {
            let Some(cluster) = engine.cluster(cid) else {
                continue;
            };
            let Some(head_pos) = cluster
                .head_id
                .and_then(|h| store.get(h))
                .map(|v| v.position)
            else {
                continue;
            };

            let mut boundary: Vec<(VehicleId, f64)> = cluster
                .members
                .iter()
                .filter_map(|m| store.get(*m))
                .filter(|v| (v.position - head_pos).norm() > threshold)
                .map(|v| (v.id, v.trust))
                .collect();
            boundary.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });

            let relays: BTreeSet<VehicleId> =
                boundary.iter().take(RELAY_COUNT).map(|(id, _)| *id).collect();
            let boundary_set: BTreeSet<VehicleId> = boundary.iter().map(|(id, _)| *id).collect();

            if let Some(cluster) = engine.cluster_mut(cid) {
                cluster.boundary_nodes = boundary_set;
                cluster.relay_nodes = relays;
            }
        }
    }
}

/// Deterministic 2-means over member positions: the two farthest members
/// seed the halves, every member joins the nearer seed.
fn two_means(
    members: &[VehicleId],
    positions: &[Point2<f64>],
) -> (Vec<VehicleId>, Vec<VehicleId>) {
    let mut seed_a = 0usize;
    let mut seed_b = 1usize;
    let mut max_d2 = 0.0f64;
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let d2 = (positions[i] - positions[j]).norm_squared();
            if d2 > max_d2 {
                max_d2 = d2;
                seed_a = i;
                seed_b = j;
            }
        }
    }

    let mut first = Vec::new();
    let mut second = Vec::new();
    for (i, &member) in members.iter().enumerate() {
        let da = (positions[i] - positions[seed_a]).norm_squared();
        let db = (positions[i] - positions[seed_b]).norm_squared();
        if da <= db {
            first.push(member);
        } else {
            second.push(member);
        }
    }
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanetsim_core::vehicle::{Vehicle, VehicleSnapshot};

    fn manager() -> ClusterManager {
        ClusterManager::new(
            ClusteringConfig::default(),
            TrustConfig::default(),
            ElectionConfig::default(),
            ProtocolConfig::default(),
        )
    }

    fn add_vehicle(store: &mut VehicleStore, id: VehicleId, x: f64, y: f64, trust: f64) {
        let snapshot = VehicleSnapshot {
            id,
            position: Point2::new(x, y),
            speed: 20.0,
            heading: 0.0,
            lane: 0,
            is_emergency: false,
            timestamp: 0.0,
        };
        store.upsert(Vehicle::from_snapshot(&snapshot, 100.0, 2.0, trust));
    }

    /// Two 5-member clusters around heads at (0,0) and (x_offset,0)
    fn two_cluster_setup(
        x_offset: f64,
        h1_trust: f64,
        h2_trust: f64,
    ) -> (ClusteringEngine, VehicleStore) {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = VehicleStore::new(300.0);

        for i in 0..5u64 {
            let trust = if i == 0 { h1_trust } else { 0.7 };
            add_vehicle(&mut store, i, i as f64 * 20.0, 0.0, trust);
        }
        for i in 10..15u64 {
            let trust = if i == 10 { h2_trust } else { 0.7 };
            add_vehicle(&mut store, i, x_offset + (i - 10) as f64 * 20.0, 0.0, trust);
        }

        let c1 = engine.allocate_id();
        engine.insert_cluster(
            &mut store,
            Cluster::new(c1, (0..5u64).collect(), 0.0),
        );
        let c2 = engine.allocate_id();
        engine.insert_cluster(
            &mut store,
            Cluster::new(c2, (10..15u64).collect(), 0.0),
        );

        for (cid, head) in [(c1, 0u64), (c2, 10u64)] {
            engine.cluster_mut(cid).unwrap().head_id = Some(head);
            engine.cluster_mut(cid).unwrap().state = ClusterState::Stable;
            store.get_mut(head).unwrap().is_head = true;
        }
        (engine, store)
    }

    #[test]
    fn test_close_heads_merge_without_election() {
        // Heads at (0,0) and (150,0): inside the close-distance threshold.
        let (mut engine, mut store) = two_cluster_setup(150.0, 0.9, 0.7);
        let mut mgr = manager();
        mgr.last_merge_pass = -10.0;

        let outcome = mgr.process_tick(&mut engine, &mut store, 5.0, 0.1);

        assert_eq!(outcome.merges.len(), 1);
        let merge = outcome.merges[0];
        assert_eq!(merge.primary, 1);
        assert_eq!(merge.absorbed, 2);
        assert_eq!(merge.primary_head, 0);
        assert_eq!(merge.absorbed_head, 10);

        let merged = engine.cluster(1).unwrap();
        assert_eq!(merged.len(), 10);
        assert_eq!(merged.head_id, Some(0));
        assert!(store.get(0).unwrap().is_head);
        assert!(!store.get(10).unwrap().is_head);
        assert!(engine.cluster(2).is_none());
        // No re-election on merge.
        assert!(!outcome.reelect.contains(&1));
    }

    #[test]
    fn test_higher_trust_head_wins_merge() {
        let (mut engine, mut store) = two_cluster_setup(150.0, 0.6, 0.95);
        let mut mgr = manager();
        mgr.last_merge_pass = -10.0;

        let outcome = mgr.process_tick(&mut engine, &mut store, 5.0, 0.1);
        let merge = outcome.merges[0];
        assert_eq!(merge.primary, 2);
        assert_eq!(merge.absorbed, 1);
        assert_eq!(engine.cluster(2).unwrap().head_id, Some(10));
    }

    #[test]
    fn test_distant_clusters_do_not_merge() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        let mut mgr = manager();
        mgr.last_merge_pass = -10.0;

        let outcome = mgr.process_tick(&mut engine, &mut store, 5.0, 0.1);
        assert!(outcome.merges.is_empty());
        assert_eq!(engine.clusters().len(), 2);
    }

    #[test]
    fn test_merge_respects_cadence() {
        let (mut engine, mut store) = two_cluster_setup(150.0, 0.9, 0.7);
        let mut mgr = manager();
        mgr.last_merge_pass = 3.0;

        // Only 2 s since the last pass; the 5 s cadence has not elapsed.
        let outcome = mgr.process_tick(&mut engine, &mut store, 5.0, 0.1);
        assert!(outcome.merges.is_empty());
    }

    #[test]
    fn test_oversize_cluster_splits() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = VehicleStore::new(300.0);

        // 12 members in two lobes; the size cap of 10 forces a split.
        for i in 0..6u64 {
            add_vehicle(&mut store, i, i as f64 * 10.0, 0.0, 0.7);
        }
        for i in 6..12u64 {
            add_vehicle(&mut store, i, 2_000.0 + i as f64 * 10.0, 0.0, 0.7);
        }
        let cid = engine.allocate_id();
        engine.insert_cluster(&mut store, Cluster::new(cid, (0..12u64).collect(), 0.0));
        engine.cluster_mut(cid).unwrap().head_id = Some(0);
        store.get_mut(0).unwrap().is_head = true;

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);

        assert_eq!(outcome.splits.len(), 1);
        let (original, offshoot) = outcome.splits[0];
        assert_eq!(original, cid);
        assert_eq!(engine.cluster(original).unwrap().len(), 6);
        assert_eq!(engine.cluster(offshoot).unwrap().len(), 6);
        // Both halves elect their own heads.
        assert!(outcome.reelect.contains(&original));
        assert!(outcome.reelect.contains(&offshoot));
    }

    #[test]
    fn test_undersized_cluster_dissolves() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = VehicleStore::new(300.0);
        add_vehicle(&mut store, 1, 0.0, 0.0, 0.7);
        let cid = engine.allocate_id();
        engine.insert_cluster(&mut store, Cluster::new(cid, [1u64].into(), 0.0));

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);

        assert_eq!(outcome.dissolved, vec![cid]);
        assert_eq!(
            engine.cluster(cid).unwrap().state,
            ClusterState::Dissolving
        );
        assert!(store.get(1).unwrap().cluster_id.is_none());

        engine.sweep_dissolving();
        assert!(engine.cluster(cid).is_none());
    }

    #[test]
    fn test_low_trust_head_triggers_reelection() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        store.get_mut(0).unwrap().set_trust(0.5);

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);
        assert!(outcome.reelect.contains(&1));
        assert!(!outcome.reelect.contains(&2));
    }

    #[test]
    fn test_overdue_election_triggers() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        engine.cluster_mut(1).unwrap().last_election_time = 0.0;
        engine.cluster_mut(2).unwrap().last_election_time = 25.0;

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 31.0, 0.1);
        assert!(outcome.reelect.contains(&1));
        assert!(!outcome.reelect.contains(&2));
    }

    #[test]
    fn test_headless_cluster_with_co_leader_promotes() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        let cluster = engine.cluster_mut(1).unwrap();
        cluster.head_id = None;
        cluster.co_leader_id = Some(1);
        store.get_mut(0).unwrap().is_head = false;

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);

        assert_eq!(outcome.handovers, vec![(1, 1)]);
        assert_eq!(engine.cluster(1).unwrap().head_id, Some(1));
        assert!(store.get(1).unwrap().is_head);
        assert!(!outcome.reelect.contains(&1));
    }

    #[test]
    fn test_headless_cluster_without_co_leader_elects() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        engine.cluster_mut(1).unwrap().head_id = None;
        store.get_mut(0).unwrap().is_head = false;

        let mut mgr = manager();
        let outcome = mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);
        assert!(outcome.reelect.contains(&1));
    }

    #[test]
    fn test_silent_member_evicted() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        let mut mgr = manager();

        // Heartbeats at t=10 for everyone, then vehicle 3 falls silent.
        for id in [0u64, 1, 2, 3, 4] {
            mgr.record_heartbeat(id, 10.0);
        }
        for id in [0u64, 1, 2, 4] {
            mgr.record_heartbeat(id, 14.0);
        }

        let outcome = mgr.process_tick(&mut engine, &mut store, 14.0, 0.1);
        assert!(outcome.evicted.contains(&(1, 3)));
        assert!(!engine.cluster(1).unwrap().contains(3));
    }

    #[test]
    fn test_head_time_accrues() {
        let (mut engine, mut store) = two_cluster_setup(5_000.0, 0.9, 0.7);
        let mut mgr = manager();
        mgr.process_tick(&mut engine, &mut store, 0.1, 0.1);
        mgr.process_tick(&mut engine, &mut store, 0.2, 0.1);

        assert!((store.get(0).unwrap().time_as_head - 0.2).abs() < 1e-12);
        assert_eq!(store.get(1).unwrap().time_as_head, 0.0);
    }

    #[test]
    fn test_boundary_and_relay_designation() {
        let mut engine = ClusteringEngine::new(ClusteringConfig::default());
        let mut store = VehicleStore::new(300.0);

        add_vehicle(&mut store, 0, 0.0, 0.0, 0.9); // head
        add_vehicle(&mut store, 1, 50.0, 0.0, 0.8); // interior
        add_vehicle(&mut store, 2, 260.0, 0.0, 0.7); // boundary
        add_vehicle(&mut store, 3, 270.0, 0.0, 0.85); // boundary, higher trust

        let cid = engine.allocate_id();
        engine.insert_cluster(&mut store, Cluster::new(cid, (0..4u64).collect(), 0.0));
        engine.cluster_mut(cid).unwrap().head_id = Some(0);
        store.get_mut(0).unwrap().is_head = true;

        let mut mgr = manager();
        mgr.process_tick(&mut engine, &mut store, 1.0, 0.1);

        let cluster = engine.cluster(cid).unwrap();
        assert_eq!(cluster.boundary_nodes, [2u64, 3].into());
        assert_eq!(cluster.relay_nodes, [2u64, 3].into());
    }
}
