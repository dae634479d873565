//! Vehicle state: kinematics, resources, trust, cluster membership
//!
//! A single record per vehicle holds everything the components mutate in
//! lockstep. Adversary designation is a sum type on the record rather than
//! an attribute bolted on at runtime, so sleeper and malicious handling is
//! exhaustive at compile time.

use crate::cluster::ClusterId;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unique identifier for a vehicle
pub type VehicleId = u64;

/// Opaque lane identifier
pub type LaneId = u32;

/// Number of trust samples retained per vehicle
pub const TRUST_HISTORY_LEN: usize = 10;

/// Per-tick kinematic input from the mobility collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    /// Position in meters
    pub position: Point2<f64>,
    /// Speed (m/s)
    pub speed: f64,
    /// Heading (radians)
    pub heading: f64,
    pub lane: LaneId,
    pub is_emergency: bool,
    /// Snapshot simulation time (seconds)
    pub timestamp: f64,
}

/// Adversary designation of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AdversaryState {
    /// Legitimate vehicle
    Normal,
    /// Openly malicious since the given simulation time
    Malicious { since: f64 },
    /// Masquerading adversary that turns at `activation_time`
    Sleeper { activation_time: f64, activated: bool },
}

impl AdversaryState {
    /// True for vehicles currently behaving maliciously
    pub fn is_active_malicious(&self) -> bool {
        match self {
            AdversaryState::Normal => false,
            AdversaryState::Malicious { .. } => true,
            AdversaryState::Sleeper { activated, .. } => *activated,
        }
    }

    /// True for sleeper agents, activated or not
    pub fn is_sleeper(&self) -> bool {
        matches!(self, AdversaryState::Sleeper { .. })
    }
}

/// One timestamped trust sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSample {
    pub sim_time: f64,
    pub trust: f64,
}

/// Bounded ring buffer of recent trust samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustHistory {
    samples: VecDeque<TrustSample>,
}

impl TrustHistory {
    /// Append a sample, evicting the oldest beyond the retention bound
    pub fn push(&mut self, sim_time: f64, trust: f64) {
        if self.samples.len() == TRUST_HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(TrustSample { sim_time, trust });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the retained samples, or `fallback` when none exist
    pub fn mean_or(&self, fallback: f64) -> f64 {
        if self.samples.is_empty() {
            return fallback;
        }
        self.samples.iter().map(|s| s.trust).sum::<f64>() / self.samples.len() as f64
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<TrustSample> {
        self.samples.back().copied()
    }

    /// Sample `n` positions before the most recent one
    pub fn nth_back(&self, n: usize) -> Option<TrustSample> {
        let len = self.samples.len();
        if n + 1 > len {
            return None;
        }
        self.samples.get(len - 1 - n).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustSample> {
        self.samples.iter()
    }
}

/// The five trust sub-scores, each within [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubScores {
    pub message_authenticity: f64,
    pub behavior_consistency: f64,
    pub network_participation: f64,
    pub response_reliability: f64,
    pub location_verification: f64,
}

impl SubScores {
    /// Uniform sub-scores, used at vehicle insertion
    pub fn uniform(value: f64) -> Self {
        let v = value.clamp(0.0, 1.0);
        Self {
            message_authenticity: v,
            behavior_consistency: v,
            network_participation: v,
            response_reliability: v,
            location_verification: v,
        }
    }

    /// Weighted recombination into a single trust value
    pub fn weighted(&self) -> f64 {
        0.25 * self.message_authenticity
            + 0.20 * self.behavior_consistency
            + 0.20 * self.network_participation
            + 0.20 * self.response_reliability
            + 0.15 * self.location_verification
    }

    /// Clamp every sub-score back into [0, 1]
    pub fn clamp_all(&mut self) {
        self.message_authenticity = self.message_authenticity.clamp(0.0, 1.0);
        self.behavior_consistency = self.behavior_consistency.clamp(0.0, 1.0);
        self.network_participation = self.network_participation.clamp(0.0, 1.0);
        self.response_reliability = self.response_reliability.clamp(0.0, 1.0);
        self.location_verification = self.location_verification.clamp(0.0, 1.0);
    }

    /// True when every sub-score lies within [0, 1]
    pub fn in_range(&self) -> bool {
        [
            self.message_authenticity,
            self.behavior_consistency,
            self.network_participation,
            self.response_reliability,
            self.location_verification,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    }
}

impl Default for SubScores {
    fn default() -> Self {
        Self::uniform(0.7)
    }
}

/// Full per-vehicle simulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: Point2<f64>,
    /// Speed (m/s)
    pub speed: f64,
    /// Heading (radians)
    pub heading: f64,
    pub lane: LaneId,
    pub is_emergency: bool,

    /// Link bandwidth (Mbps), drawn once at insertion
    pub bandwidth_mbps: f64,
    /// Processing power (GHz), drawn once at insertion
    pub processing_ghz: f64,

    /// Current trust score within [0, 1]
    pub trust: f64,
    pub sub_scores: SubScores,
    pub history: TrustHistory,
    /// Simulation time of the last trust-relevant update
    pub last_update: f64,

    pub cluster_id: Option<ClusterId>,
    pub is_head: bool,
    /// Accumulated seconds spent as a cluster head
    pub time_as_head: f64,
    pub cooperation_requests: u64,
    pub cooperation_successes: u64,
    pub erratic_count: u32,

    /// Ground-truth adversary designation
    pub adversary: AdversaryState,
    /// The system's belief that this vehicle is malicious
    pub flagged_malicious: bool,
}

impl Vehicle {
    /// Build a vehicle from its first snapshot
    pub fn from_snapshot(
        snapshot: &VehicleSnapshot,
        bandwidth_mbps: f64,
        processing_ghz: f64,
        initial_trust: f64,
    ) -> Self {
        let trust = initial_trust.clamp(0.0, 1.0);
        Self {
            id: snapshot.id,
            position: snapshot.position,
            speed: snapshot.speed,
            heading: snapshot.heading,
            lane: snapshot.lane,
            is_emergency: snapshot.is_emergency,
            bandwidth_mbps,
            processing_ghz,
            trust,
            sub_scores: SubScores::uniform(trust),
            history: TrustHistory::default(),
            last_update: snapshot.timestamp,
            cluster_id: None,
            is_head: false,
            time_as_head: 0.0,
            cooperation_requests: 0,
            cooperation_successes: 0,
            erratic_count: 0,
            adversary: AdversaryState::Normal,
            flagged_malicious: false,
        }
    }

    /// Apply a kinematic snapshot, leaving trust and cluster state untouched
    pub fn apply_snapshot(&mut self, snapshot: &VehicleSnapshot) {
        self.position = snapshot.position;
        self.speed = snapshot.speed;
        self.heading = snapshot.heading;
        self.lane = snapshot.lane;
        self.is_emergency = snapshot.is_emergency;
    }

    /// Malicious from the protocol's point of view: detected or openly acting
    pub fn is_malicious(&self) -> bool {
        self.flagged_malicious || self.adversary.is_active_malicious()
    }

    /// Successful cooperations over requests; zero when never asked
    pub fn cooperation_rate(&self) -> f64 {
        self.cooperation_successes as f64 / (self.cooperation_requests.max(1)) as f64
    }

    /// Set trust, clamped to [0, 1]
    pub fn set_trust(&mut self, value: f64) {
        self.trust = value.clamp(0.0, 1.0);
    }

    /// Adjust trust by a delta, clamped to [0, 1]
    pub fn adjust_trust(&mut self, delta: f64) {
        self.set_trust(self.trust + delta);
    }
}
