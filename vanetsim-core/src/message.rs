//! Cluster-protocol message envelopes
//!
//! Wire identifiers are stable across releases: beacon/data in 0-1,
//! membership in 10-13, maintenance in 20-25, data relay in 30-32,
//! emergency in 40-41, routing in 50-53.

use crate::cluster::ClusterId;
use crate::error::SimError;
use crate::vehicle::VehicleId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Protocol message kind with its stable wire identifier
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Beacon = 0,
    DataBroadcast = 1,

    HeadAnnouncement = 10,
    JoinRequest = 11,
    JoinResponse = 12,
    LeaveNotification = 13,

    Heartbeat = 20,
    HeadElection = 21,
    HeadHandover = 22,
    MergeRequest = 23,
    MergeResponse = 24,
    SplitNotification = 25,

    IntraClusterData = 30,
    InterClusterData = 31,
    GatewayData = 32,

    EmergencyBroadcast = 40,
    ClusterEmergency = 41,

    NeighborDiscovery = 50,
    LinkStateUpdate = 51,
    RouteRequest = 52,
    RouteResponse = 53,
}

impl MessageKind {
    /// Every kind, in wire-id order
    pub const ALL: [MessageKind; 21] = [
        MessageKind::Beacon,
        MessageKind::DataBroadcast,
        MessageKind::HeadAnnouncement,
        MessageKind::JoinRequest,
        MessageKind::JoinResponse,
        MessageKind::LeaveNotification,
        MessageKind::Heartbeat,
        MessageKind::HeadElection,
        MessageKind::HeadHandover,
        MessageKind::MergeRequest,
        MessageKind::MergeResponse,
        MessageKind::SplitNotification,
        MessageKind::IntraClusterData,
        MessageKind::InterClusterData,
        MessageKind::GatewayData,
        MessageKind::EmergencyBroadcast,
        MessageKind::ClusterEmergency,
        MessageKind::NeighborDiscovery,
        MessageKind::LinkStateUpdate,
        MessageKind::RouteRequest,
        MessageKind::RouteResponse,
    ];

    /// Stable wire identifier
    pub const fn wire_id(self) -> u8 {
        self as u8
    }

    /// Emergency kinds bypass dedup and overflow shedding
    pub const fn is_emergency(self) -> bool {
        matches!(
            self,
            MessageKind::EmergencyBroadcast | MessageKind::ClusterEmergency
        )
    }

    /// Unicast kinds whose receipt must be confirmed
    pub const fn requests_ack(self) -> bool {
        matches!(
            self,
            MessageKind::JoinRequest | MessageKind::MergeRequest | MessageKind::RouteRequest
        )
    }

    /// Confirmation kind paired with a request kind
    pub const fn ack_kind(self) -> Option<MessageKind> {
        match self {
            MessageKind::JoinRequest => Some(MessageKind::JoinResponse),
            MessageKind::MergeRequest => Some(MessageKind::MergeResponse),
            MessageKind::RouteRequest => Some(MessageKind::RouteResponse),
            _ => None,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|k| k.wire_id() == value)
            .ok_or(SimError::UnknownMessageKind(value))
    }
}

/// Delivery scope of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Broadcast,
    Cluster(ClusterId),
    Unicast(VehicleId),
}

/// A protocol message in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub kind: MessageKind,
    pub source: VehicleId,
    pub destination: Destination,
    pub cluster_id: Option<ClusterId>,
    /// Monotonic per source
    pub seq: u64,
    /// Simulation time after which the message is dropped unprocessed
    pub expiry: f64,
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    pub fn is_expired(&self, sim_time: f64) -> bool {
        sim_time > self.expiry
    }
}

/// Per-source sliding window of recently seen sequence numbers
#[derive(Debug, Default)]
pub struct DedupWindow {
    window: usize,
    seen: HashMap<VehicleId, (VecDeque<u64>, HashSet<u64>)>,
}

impl DedupWindow {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Record (source, seq); returns false when it was already in the window
    pub fn record(&mut self, source: VehicleId, seq: u64) -> bool {
        let (order, set) = self
            .seen
            .entry(source)
            .or_insert_with(|| (VecDeque::new(), HashSet::new()));
        if !set.insert(seq) {
            return false;
        }
        order.push_back(seq);
        if order.len() > self.window {
            if let Some(evicted) = order.pop_front() {
                set.remove(&evicted);
            }
        }
        true
    }

    /// Drop all state for a departed source
    pub fn forget(&mut self, source: VehicleId) {
        self.seen.remove(&source);
    }
}
