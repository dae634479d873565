//! VanetSim discrete-time engine
//!
//! `Simulation` owns the vehicle store and every component, advancing them
//! in a fixed order each tick: snapshot ingest, adversary behavior,
//! clustering, lifecycle maintenance, elections, protocol messages, trust
//! updates, statistics. Later components always observe the updated state
//! of earlier ones, and a re-election demanded in a tick commits within
//! that same tick.
//!
//! # Example
//!
//! ```rust
//! use vanetsim_engine::{Simulation, source::{KinematicsSource, ScriptedSource}};
//! use vanetsim_core::config::SimulationConfig;
//!
//! let mut sim = Simulation::new(SimulationConfig::with_seed(7)).unwrap();
//! let mut traffic = ScriptedSource::convoy(8, 40.0, 22.0);
//!
//! for tick in 0..50 {
//!     let snapshots = traffic.next_tick(tick, sim.sim_time(), 0.1);
//!     sim.tick(&snapshots).unwrap();
//! }
//! assert!(!sim.clusters().is_empty());
//! ```

pub mod messaging;
pub mod reporter;
pub mod runner;
pub mod source;
pub mod stats;

use rand::Rng;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use vanetsim_cluster::{
    ClusterManager, ClusteringEngine, ElectionEngine, ElectionRecord, MembershipEvent,
};
use vanetsim_core::cluster::{Cluster, ClusterId};
use vanetsim_core::config::SimulationConfig;
use vanetsim_core::error::{SimError, SimResult};
use vanetsim_core::message::{Destination, MessageKind};
use vanetsim_core::rng::RngStreams;
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::{SubScores, Vehicle, VehicleId, VehicleSnapshot};
use vanetsim_trust::{
    poa_confirmation, AdversarySimulator, Detection, TrustEngine, TrustEventKind, TrustSink,
};

pub use messaging::MessageProcessor;
pub use reporter::{CollectingSink, JsonLinesSink, ReportSink};
pub use runner::Runner;
pub use source::{KinematicsSource, ScriptedSource, ScriptedVehicle};
pub use stats::{StatisticsCollector, StatsSnapshot};

use std::collections::BTreeMap;

/// Stream label salt for per-vehicle admission draws
const ADMISSION_SALT: u64 = 1;

/// Largest erratic speed jump, normalizes evidence severity
const MAX_ERRATIC_DELTA_MPS: f64 = 35.0;

/// What one tick produced, handed to the runner/reporter
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub sim_time_s: f64,
    pub elections: Vec<ElectionRecord>,
    pub detections: Vec<Detection>,
    pub snapshot: StatsSnapshot,
}

/// The simulation core: all components in lockstep on one clock
pub struct Simulation {
    config: SimulationConfig,
    run_id: Uuid,
    rngs: RngStreams,
    store: VehicleStore,
    adversary: AdversarySimulator,
    clustering: ClusteringEngine,
    manager: ClusterManager,
    elections: ElectionEngine,
    trust: TrustEngine,
    messaging: MessageProcessor,
    stats: StatisticsCollector,
    tick_index: u64,
    /// HeadElection requests seen on the wire, honored next tick
    pending_election_requests: Vec<ClusterId>,
}

impl Simulation {
    /// Validate the configuration and assemble all components
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let rngs = RngStreams::from_config_seed(config.random_seed);
        let adversary =
            AdversarySimulator::new(config.adversary.clone(), rngs.stream("adversary"));
        let clustering = ClusteringEngine::new(config.clustering.clone());
        let manager = ClusterManager::new(
            config.clustering.clone(),
            config.trust.clone(),
            config.election.clone(),
            config.protocol.clone(),
        );
        let elections = ElectionEngine::from_config(&config);
        let trust = TrustEngine::new(config.trust.clone());
        let messaging = MessageProcessor::new(config.protocol.clone());
        let stats = StatisticsCollector::new(run_id);
        let store = VehicleStore::new(config.clustering.max_cluster_radius);

        Ok(Self {
            config,
            run_id,
            rngs,
            store,
            adversary,
            clustering,
            manager,
            elections,
            trust,
            messaging,
            stats,
            tick_index: 0,
            pending_election_requests: Vec::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Effective master seed, reportable for replay
    pub fn seed(&self) -> u64 {
        self.rngs.seed()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulation time of the next tick to execute (seconds)
    pub fn sim_time(&self) -> f64 {
        self.tick_index as f64 * self.config.tick_dt
    }

    pub fn current_tick(&self) -> u64 {
        self.tick_index
    }

    pub fn store(&self) -> &VehicleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VehicleStore {
        &mut self.store
    }

    pub fn clusters(&self) -> &BTreeMap<ClusterId, Cluster> {
        self.clustering.clusters()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn ground_truth_adversaries(&self) -> Vec<VehicleId> {
        self.adversary.ground_truth().keys().copied().collect()
    }

    /// Report external trust evidence; takes effect immediately so that
    /// triggers depending on it fire within the same tick
    pub fn record_event(&mut self, subject: VehicleId, source: VehicleId, kind: TrustEventKind) {
        let sim_time = self.sim_time();
        if let Some(detection) =
            self.trust
                .record_and_apply(&mut self.store, subject, source, kind, sim_time)
        {
            self.stats
                .record_detection(self.adversary.is_designated(detection.vehicle_id));
        }
    }

    /// Inject a wire-level message (tests and external collaborators)
    pub fn ingest_wire(
        &mut self,
        wire_kind: u8,
        source: VehicleId,
        destination: Destination,
        cluster_id: Option<ClusterId>,
    ) {
        let sim_time = self.sim_time();
        self.messaging
            .ingest_wire(wire_kind, source, destination, cluster_id, sim_time, &self.stats);
    }

    /// Advance the simulation by one tick
    pub fn tick(&mut self, snapshots: &[VehicleSnapshot]) -> SimResult<TickReport> {
        let started = Instant::now();
        let sim_time = self.sim_time();
        let dt = self.config.tick_dt;

        // 1. Vehicle store: ingest kinematics, admit newcomers.
        self.ingest(snapshots, sim_time);

        // 2. Adversary behavior; erratic jumps are observable by the
        // cluster and turn into malicious evidence.
        let erratic = self.adversary.step(&mut self.store, sim_time);
        for (vehicle, delta) in erratic {
            let observed = self
                .store
                .get(vehicle)
                .and_then(|v| v.cluster_id)
                .is_some();
            if observed {
                let severity = (delta / MAX_ERRATIC_DELTA_MPS).clamp(0.0, 1.0);
                self.trust.record(
                    vehicle,
                    vehicle,
                    TrustEventKind::MaliciousEvidence { severity },
                );
            }
        }

        // 3. Clustering at its own cadence.
        if self.clustering.due(sim_time) {
            let events = self.clustering.run(&mut self.store, sim_time);
            self.apply_membership_events(&events, sim_time);
            self.emit_cluster_feedback();
        }

        // 4. Lifecycle maintenance.
        let outcome = self
            .manager
            .process_tick(&mut self.clustering, &mut self.store, sim_time, dt);
        self.stats.record_merges(outcome.merges.len() as u64);
        self.stats.record_splits(outcome.splits.len() as u64);
        self.stats
            .record_dissolutions(outcome.dissolved.len() as u64);
        self.emit_lifecycle_traffic(&outcome, sim_time);

        // 5. Elections where the manager demanded one, within this tick;
        // wire-level election requests from the previous tick join in.
        let mut to_elect = outcome.reelect;
        to_elect.append(&mut self.pending_election_requests);
        to_elect.sort_unstable();
        to_elect.dedup();
        let elections = self.run_elections(&to_elect, sim_time)?;

        // 6. Protocol traffic.
        self.messaging.emit_maintenance(
            &self.store,
            self.clustering.clusters(),
            sim_time,
            &self.stats,
        );
        self.pending_election_requests = self.messaging.process(
            &mut self.store,
            &mut self.clustering,
            &mut self.manager,
            &mut self.trust,
            sim_time,
            &self.stats,
        );

        // 7. Trust: queued events, authority confirmation, periodic pass.
        let mut detections = self.trust.apply_pending(&mut self.store, sim_time);
        detections.extend(poa_confirmation(
            &mut self.store,
            self.clustering.clusters(),
            self.trust.config(),
            sim_time,
        ));
        if self.trust.periodic_due(sim_time) {
            detections.extend(self.trust.run_periodic(&mut self.store, sim_time));
        }
        for detection in &detections {
            self.stats
                .record_detection(self.adversary.is_designated(detection.vehicle_id));
        }

        // 8. Invariant sweep, then retire Dissolving records.
        let heals = self.enforce_invariants();
        if heals > 0 {
            warn!(heals, "invariants self-healed");
            debug_assert!(false, "invariant violations healed: {heals}");
            self.stats.record_invariant_heals(heals);
        }
        self.clustering.sweep_dissolving();

        // 9. Close out the tick.
        let tick = self.tick_index;
        self.stats.record_tick(tick, sim_time, started.elapsed());
        self.tick_index += 1;

        Ok(TickReport {
            tick,
            sim_time_s: sim_time,
            elections,
            detections,
            snapshot: self.stats.snapshot(),
        })
    }

    /// Apply snapshots in ascending id order; admit unknown vehicles
    fn ingest(&mut self, snapshots: &[VehicleSnapshot], sim_time: f64) {
        let mut ordered: Vec<&VehicleSnapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| s.id);

        for snapshot in ordered {
            let old_position = self.store.get(snapshot.id).map(|v| v.position);
            match old_position {
                Some(old) => {
                    if let Some(vehicle) = self.store.get_mut(snapshot.id) {
                        vehicle.apply_snapshot(snapshot);
                    }
                    self.store.reindex(snapshot.id, old);
                }
                None => self.admit(snapshot, sim_time),
            }
        }
    }

    /// First sighting: draw resources and trust, apply adversary designation
    fn admit(&mut self, snapshot: &VehicleSnapshot, sim_time: f64) {
        // Per-vehicle derived stream: the draw depends only on the seed and
        // the vehicle id, not on admission order.
        let mut draw = self.rngs.derived(snapshot.id, ADMISSION_SALT);
        let initial_trust = draw.gen_range(0.6..=0.8);
        let bandwidth = draw.gen_range(50.0..=150.0);
        let processing = draw.gen_range(1.0..=4.0);

        let mut vehicle = Vehicle::from_snapshot(snapshot, bandwidth, processing, initial_trust);
        if let Some((state, trust, erratic)) =
            self.adversary
                .designate(snapshot.id, snapshot.is_emergency, sim_time)
        {
            vehicle.adversary = state;
            vehicle.set_trust(trust);
            vehicle.sub_scores = SubScores::uniform(trust);
            vehicle.erratic_count = erratic;
        }
        debug!(vehicle = vehicle.id, trust = vehicle.trust, "vehicle admitted");
        self.store.upsert(vehicle);
    }

    /// Count formations/dissolutions and mirror the delta onto the wire
    fn apply_membership_events(&mut self, events: &[MembershipEvent], sim_time: f64) {
        for event in events {
            match *event {
                MembershipEvent::ClusterFormed { .. } => {
                    self.stats.record_clusters_formed(1);
                }
                MembershipEvent::ClusterDissolved { .. } => {
                    self.stats.record_dissolutions(1);
                }
                MembershipEvent::MemberAdded { cluster, vehicle } => {
                    self.messaging.send(
                        MessageKind::JoinRequest,
                        vehicle,
                        Destination::Cluster(cluster),
                        Some(cluster),
                        sim_time,
                        &self.stats,
                    );
                }
                MembershipEvent::MemberRemoved { cluster, vehicle } => {
                    self.messaging.send(
                        MessageKind::LeaveNotification,
                        vehicle,
                        Destination::Cluster(cluster),
                        Some(cluster),
                        sim_time,
                        &self.stats,
                    );
                }
            }
        }
    }

    /// Cluster-stability feedback to the trust engine, one event per member
    fn emit_cluster_feedback(&mut self) {
        let mut feedback: Vec<(VehicleId, VehicleId, f64)> = Vec::new();
        for cluster in self.clustering.clusters().values() {
            if !cluster.is_active() {
                continue;
            }
            let reporter = cluster.head_id.unwrap_or_else(|| {
                cluster.members.iter().next().copied().unwrap_or_default()
            });
            for &member in &cluster.members {
                feedback.push((member, reporter, cluster.stability_score));
            }
        }
        for (member, reporter, stability) in feedback {
            self.trust
                .record(member, reporter, TrustEventKind::ClusterBehavior { stability });
        }
    }

    /// Merge/split/handover announcements onto the wire
    fn emit_lifecycle_traffic(
        &mut self,
        outcome: &vanetsim_cluster::TickOutcome,
        sim_time: f64,
    ) {
        for merge in &outcome.merges {
            // The demoted head asks the retained head to absorb its members;
            // the ack machinery answers with the MergeResponse.
            self.messaging.send(
                MessageKind::MergeRequest,
                merge.absorbed_head,
                Destination::Unicast(merge.primary_head),
                Some(merge.primary),
                sim_time,
                &self.stats,
            );
        }
        for &(original, offshoot) in &outcome.splits {
            let announcer = self
                .clustering
                .cluster(original)
                .and_then(|c| c.head_id.or_else(|| c.members.iter().next().copied()));
            if let Some(source) = announcer {
                self.messaging.send(
                    MessageKind::SplitNotification,
                    source,
                    Destination::Cluster(offshoot),
                    Some(original),
                    sim_time,
                    &self.stats,
                );
            }
        }
        for &(cluster, new_head) in &outcome.handovers {
            self.messaging.send(
                MessageKind::HeadHandover,
                new_head,
                Destination::Cluster(cluster),
                Some(cluster),
                sim_time,
                &self.stats,
            );
        }
        for &(cluster, vehicle) in &outcome.evicted {
            // Synthetic leave on behalf of the silent member.
            self.messaging.send(
                MessageKind::LeaveNotification,
                vehicle,
                Destination::Cluster(cluster),
                Some(cluster),
                sim_time,
                &self.stats,
            );
        }
    }

    /// Elections committed within the current tick
    fn run_elections(
        &mut self,
        cluster_ids: &[ClusterId],
        sim_time: f64,
    ) -> SimResult<Vec<ElectionRecord>> {
        let mut records = Vec::new();

        for &cid in cluster_ids {
            let Some(cluster) = self.clustering.cluster_mut(cid) else {
                continue;
            };
            if !cluster.is_active() {
                continue;
            }

            match self
                .elections
                .run(cluster, &mut self.store, sim_time, self.tick_index)
            {
                Ok(record) => {
                    self.stats
                        .record_election(record.mode, record.election_time_ms);
                    self.messaging.send(
                        MessageKind::HeadAnnouncement,
                        record.winner_id,
                        Destination::Cluster(cid),
                        Some(cid),
                        sim_time,
                        &self.stats,
                    );
                    records.push(record);
                }
                Err(SimError::ElectionInfeasible(_)) => {
                    self.stats.record_election_infeasible();
                    self.clustering.dissolve(&mut self.store, cid, sim_time);
                    self.stats.record_dissolutions(1);
                }
                Err(other) => return Err(other),
            }
        }

        Ok(records)
    }

    /// End-of-tick invariant sweep; violations are healed and counted
    fn enforce_invariants(&mut self) -> u64 {
        let mut heals = 0u64;

        // Heads must be members, flagged, and pointing at their cluster.
        let cluster_ids: Vec<ClusterId> = self.clustering.clusters().keys().copied().collect();
        for cid in cluster_ids {
            let head = match self.clustering.cluster(cid) {
                Some(c) if c.is_active() => c.head_id,
                _ => continue,
            };
            let Some(head) = head else {
                continue;
            };

            if !self
                .clustering
                .cluster(cid)
                .map(|c| c.contains(head))
                .unwrap_or(false)
            {
                if let Some(cluster) = self.clustering.cluster_mut(cid) {
                    cluster.head_id = None;
                }
                heals += 1;
                continue;
            }
            if let Some(vehicle) = self.store.get_mut(head) {
                if !vehicle.is_head {
                    vehicle.is_head = true;
                    heals += 1;
                }
                if vehicle.cluster_id != Some(cid) {
                    vehicle.cluster_id = Some(cid);
                    heals += 1;
                }
            } else if let Some(cluster) = self.clustering.cluster_mut(cid) {
                cluster.head_id = None;
                heals += 1;
            }
        }

        // No stray head flags, and scores stay within range.
        for id in self.store.ids() {
            let is_head_of_cluster = self
                .clustering
                .cluster_of(id)
                .and_then(|cid| self.clustering.cluster(cid))
                .map(|c| c.head_id == Some(id))
                .unwrap_or(false);
            let Some(vehicle) = self.store.get_mut(id) else {
                continue;
            };
            if vehicle.is_head && !is_head_of_cluster {
                vehicle.is_head = false;
                heals += 1;
            }
            if !(0.0..=1.0).contains(&vehicle.trust) {
                vehicle.set_trust(vehicle.trust);
                heals += 1;
            }
            if !vehicle.sub_scores.in_range() {
                vehicle.sub_scores.clamp_all();
                heals += 1;
            }
        }

        heals
    }
}
