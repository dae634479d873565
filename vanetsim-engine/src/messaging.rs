//! Cluster-protocol message processing
//!
//! A single inbound queue per run carries every protocol message; the
//! processor drains it with a per-tick bound, validates envelopes
//! (expiry, dedup window, known kind, reachable recipient), dispatches to
//! the owning component, and generates confirmations for request kinds.
//! Emergency kinds bypass both the dedup window and overflow shedding.

use crate::stats::StatisticsCollector;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};
use vanetsim_cluster::{ClusterManager, ClusteringEngine};
use vanetsim_core::cluster::{Cluster, ClusterId};
use vanetsim_core::config::ProtocolConfig;
use vanetsim_core::error::SimError;
use vanetsim_core::message::{DedupWindow, Destination, MessageEnvelope, MessageKind};
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::VehicleId;
use vanetsim_trust::{TrustEventKind, TrustSink};

/// Routes protocol messages between vehicles and components
pub struct MessageProcessor {
    config: ProtocolConfig,
    inbound: VecDeque<MessageEnvelope>,
    dedup: DedupWindow,
    next_seq: HashMap<VehicleId, u64>,
    last_emission: HashMap<VehicleId, f64>,
}

impl MessageProcessor {
    pub fn new(config: ProtocolConfig) -> Self {
        let dedup = DedupWindow::new(config.dedup_window);
        Self {
            config,
            inbound: VecDeque::new(),
            dedup,
            next_seq: HashMap::new(),
            last_emission: HashMap::new(),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inbound.len()
    }

    fn allocate_seq(&mut self, source: VehicleId) -> u64 {
        let seq = self.next_seq.entry(source).or_insert(0);
        let out = *seq;
        *seq += 1;
        out
    }

    /// Build and enqueue a message from `source`
    pub fn send(
        &mut self,
        kind: MessageKind,
        source: VehicleId,
        destination: Destination,
        cluster_id: Option<ClusterId>,
        sim_time: f64,
        stats: &StatisticsCollector,
    ) {
        let seq = self.allocate_seq(source);
        let message = MessageEnvelope {
            kind,
            source,
            destination,
            cluster_id,
            seq,
            expiry: sim_time + self.config.default_ttl_s,
            payload: Vec::new(),
        };
        stats.record_sent(kind);
        self.enqueue(message, stats);
    }

    /// Enqueue a message that arrived with a raw wire kind
    ///
    /// Unknown kinds are counted and dropped here, before they ever reach
    /// the queue.
    pub fn ingest_wire(
        &mut self,
        wire_kind: u8,
        source: VehicleId,
        destination: Destination,
        cluster_id: Option<ClusterId>,
        sim_time: f64,
        stats: &StatisticsCollector,
    ) {
        match MessageKind::try_from(wire_kind) {
            Ok(kind) => self.send(kind, source, destination, cluster_id, sim_time, stats),
            Err(SimError::UnknownMessageKind(id)) => {
                warn!(wire_kind = id, "unknown message kind dropped");
                stats.record_dropped_unknown_kind();
            }
            Err(_) => stats.record_dropped_unknown_kind(),
        }
    }

    /// Append to the queue, shedding the oldest non-emergency on overflow
    fn enqueue(&mut self, message: MessageEnvelope, stats: &StatisticsCollector) {
        if self.inbound.len() >= self.config.queue_capacity {
            let victim = self
                .inbound
                .iter()
                .position(|m| !m.kind.is_emergency());
            match victim {
                Some(idx) => {
                    self.inbound.remove(idx);
                    stats.record_shed(1);
                }
                None if !message.kind.is_emergency() => {
                    // Queue is saturated with emergency traffic; the new
                    // message is the one shed.
                    stats.record_shed(1);
                    return;
                }
                None => {}
            }
        }
        self.inbound.push_back(message);
    }

    /// Periodic protocol traffic: beacons, heartbeats, discovery, and
    /// gateway data from designated relay nodes
    pub fn emit_maintenance(
        &mut self,
        store: &VehicleStore,
        clusters: &BTreeMap<ClusterId, Cluster>,
        sim_time: f64,
        stats: &StatisticsCollector,
    ) {
        struct Planned {
            kind: MessageKind,
            source: VehicleId,
            destination: Destination,
            cluster_id: Option<ClusterId>,
        }

        let relays: BTreeSet<VehicleId> = clusters
            .values()
            .filter(|c| c.is_active())
            .flat_map(|c| c.relay_nodes.iter().copied())
            .collect();

        let mut planned = Vec::new();
        for vehicle in store.iter_all() {
            let due = self
                .last_emission
                .get(&vehicle.id)
                .map(|last| sim_time - last >= self.config.heartbeat_interval)
                .unwrap_or(true);
            if !due {
                continue;
            }

            if vehicle.is_emergency {
                planned.push(Planned {
                    kind: MessageKind::EmergencyBroadcast,
                    source: vehicle.id,
                    destination: Destination::Broadcast,
                    cluster_id: vehicle.cluster_id,
                });
            }
            match vehicle.cluster_id {
                Some(cid) if vehicle.is_head => planned.push(Planned {
                    kind: MessageKind::Beacon,
                    source: vehicle.id,
                    destination: Destination::Broadcast,
                    cluster_id: Some(cid),
                }),
                Some(cid) => planned.push(Planned {
                    kind: MessageKind::Heartbeat,
                    source: vehicle.id,
                    destination: Destination::Cluster(cid),
                    cluster_id: Some(cid),
                }),
                None => planned.push(Planned {
                    kind: MessageKind::NeighborDiscovery,
                    source: vehicle.id,
                    destination: Destination::Broadcast,
                    cluster_id: None,
                }),
            }
            if relays.contains(&vehicle.id) {
                planned.push(Planned {
                    kind: MessageKind::GatewayData,
                    source: vehicle.id,
                    destination: Destination::Broadcast,
                    cluster_id: vehicle.cluster_id,
                });
            }
            self.last_emission.insert(vehicle.id, sim_time);
        }

        for p in planned {
            self.send(p.kind, p.source, p.destination, p.cluster_id, sim_time, stats);
        }
    }

    /// Drain the inbound queue with the per-tick bound and dispatch
    ///
    /// Returns clusters for which a `HeadElection` request arrived; the
    /// engine honors them at the next election stage.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        store: &mut VehicleStore,
        clustering: &mut ClusteringEngine,
        manager: &mut ClusterManager,
        trust: &mut dyn TrustSink,
        sim_time: f64,
        stats: &StatisticsCollector,
    ) -> Vec<ClusterId> {
        let mut budget = self.config.max_messages_per_tick;
        let mut responses: Vec<(MessageKind, VehicleId, Destination, Option<ClusterId>)> =
            Vec::new();
        let mut election_requests = Vec::new();

        while budget > 0 {
            let Some(message) = self.inbound.pop_front() else {
                break;
            };
            budget -= 1;

            if message.is_expired(sim_time) {
                stats.record_dropped_expired();
                continue;
            }
            if !message.kind.is_emergency()
                && !self.dedup.record(message.source, message.seq)
            {
                stats.record_dropped_duplicate();
                continue;
            }
            if let Destination::Unicast(target) = message.destination {
                if !store.contains(target) {
                    stats.record_dropped_unknown_recipient();
                    continue;
                }
            }

            self.dispatch(
                &message,
                store,
                clustering,
                manager,
                trust,
                sim_time,
                stats,
                &mut responses,
                &mut election_requests,
            );
        }

        for (kind, source, destination, cluster_id) in responses {
            self.send(kind, source, destination, cluster_id, sim_time, stats);
        }
        election_requests
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &mut self,
        message: &MessageEnvelope,
        store: &mut VehicleStore,
        clustering: &mut ClusteringEngine,
        manager: &mut ClusterManager,
        trust: &mut dyn TrustSink,
        sim_time: f64,
        stats: &StatisticsCollector,
        responses: &mut Vec<(MessageKind, VehicleId, Destination, Option<ClusterId>)>,
        election_requests: &mut Vec<ClusterId>,
    ) {
        use MessageKind::*;

        match message.kind {
            Heartbeat => {
                manager.record_heartbeat(message.source, sim_time);
            }
            HeadElection => {
                if let Some(cid) = message.cluster_id {
                    election_requests.push(cid);
                }
            }
            JoinRequest => {
                let Some(cid) = message.cluster_id else {
                    stats.record_dropped_unknown_recipient();
                    return;
                };
                match clustering.add_member(store, cid, message.source, sim_time) {
                    Ok(()) => {
                        if let Some(head) =
                            clustering.cluster(cid).and_then(|c| c.head_id)
                        {
                            responses.push((
                                JoinResponse,
                                head,
                                Destination::Unicast(message.source),
                                Some(cid),
                            ));
                        }
                    }
                    Err(_) => {
                        stats.record_dropped_unknown_recipient();
                        return;
                    }
                }
            }
            LeaveNotification => {
                if let Some(cid) = message.cluster_id {
                    let _ = clustering.remove_member(store, cid, message.source, sim_time);
                }
            }
            MergeRequest => {
                if let Destination::Unicast(target) = message.destination {
                    responses.push((
                        MergeResponse,
                        target,
                        Destination::Unicast(message.source),
                        message.cluster_id,
                    ));
                }
            }
            RouteRequest => {
                if let Destination::Unicast(target) = message.destination {
                    responses.push((
                        RouteResponse,
                        target,
                        Destination::Unicast(message.source),
                        message.cluster_id,
                    ));
                }
            }
            EmergencyBroadcast | ClusterEmergency => {
                debug!(source = message.source, "emergency traffic relayed");
            }
            GatewayData | InterClusterData => {
                // Relaying across the cluster boundary is a cooperation on
                // behalf of the cluster.
                trust.record(
                    message.source,
                    message.source,
                    TrustEventKind::Cooperation { score: 1.0 },
                );
            }
            Beacon | DataBroadcast | IntraClusterData | NeighborDiscovery | LinkStateUpdate => {
                trust.record(message.source, message.source, TrustEventKind::DeliverySuccess);
            }
            HeadAnnouncement | JoinResponse | HeadHandover | MergeResponse
            | SplitNotification | RouteResponse => {}
        }

        stats.record_received(message.kind);
    }
}
