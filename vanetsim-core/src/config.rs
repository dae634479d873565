//! Simulation configuration
//!
//! All knobs recognized by the engine live here, grouped by the component
//! they drive. Every section is serde-backed so a run can be described in a
//! JSON file, and `SimulationConfig::validate` rejects inconsistent setups
//! before the first tick.

use crate::error::{SimError, SimResult};
use crate::vehicle::VehicleId;
use serde::{Deserialize, Serialize};

/// Clustering algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringAlgorithm {
    /// Greedy growth under distance/speed/heading compatibility (default)
    Mobility,
    /// Same-lane or near-heading compatibility
    Direction,
    /// Fixed-K centroid iteration on positions
    KMeans,
    /// Density clustering; noise vehicles stay unclustered
    Dbscan,
}

/// Clustering engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Algorithm used on each clustering pass
    pub algorithm: ClusteringAlgorithm,

    /// Seconds between clustering passes
    pub clustering_interval: f64,

    /// Maximum communication radius within a cluster (meters)
    pub max_cluster_radius: f64,

    /// Smallest viable cluster
    pub min_cluster_size: usize,

    /// Largest allowed cluster
    pub max_cluster_size: usize,

    /// Maximum speed difference between compatible vehicles (m/s)
    pub speed_threshold: f64,

    /// Maximum heading difference between compatible vehicles (radians)
    pub direction_threshold: f64,

    /// Heading tolerance for the direction-based algorithm (radians)
    pub lane_direction_threshold: f64,

    /// Target members per cluster for the k-means K heuristic
    pub kmeans_target_size: usize,

    /// DBSCAN neighborhood radius; `None` means `max_cluster_radius / 2`
    pub dbscan_epsilon: Option<f64>,

    /// DBSCAN core-point threshold; `None` means `min_cluster_size`
    pub dbscan_min_pts: Option<usize>,

    /// Exclude low-trust and malicious vehicles before clustering
    pub enable_trust_filter: bool,

    /// Minimum trust for clustering eligibility
    pub min_trust_for_clustering: f64,

    /// Seconds between overlap-merge passes
    pub merge_interval: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: ClusteringAlgorithm::Mobility,
            clustering_interval: 1.0,
            max_cluster_radius: 300.0,
            min_cluster_size: 2,
            max_cluster_size: 10,
            speed_threshold: 5.0,
            direction_threshold: 0.5,
            lane_direction_threshold: 0.25,
            kmeans_target_size: 6,
            dbscan_epsilon: None,
            dbscan_min_pts: None,
            enable_trust_filter: true,
            min_trust_for_clustering: 0.3,
            merge_interval: 5.0,
        }
    }
}

impl ClusteringConfig {
    /// Effective DBSCAN neighborhood radius
    pub fn dbscan_epsilon(&self) -> f64 {
        self.dbscan_epsilon
            .unwrap_or(self.max_cluster_radius / 2.0)
    }

    /// Effective DBSCAN core-point threshold
    pub fn dbscan_min_pts(&self) -> usize {
        self.dbscan_min_pts.unwrap_or(self.min_cluster_size)
    }
}

/// Trust engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Seconds between periodic trust maintenance passes
    pub trust_update_interval: f64,

    /// Trust decay rate per hour of inactivity
    pub decay_rate_per_hour: f64,

    /// Idle time before decay applies (seconds)
    pub inactivity_threshold_s: f64,

    /// Trust below which a vehicle is flagged malicious
    pub malicious_threshold: f64,

    /// Minimum trust for head eligibility and head retention
    pub min_trust_threshold: f64,

    /// Run the historical-spike sleeper detector
    pub enable_sleeper_detection: bool,

    /// Trust gain over two samples that counts as a suspicious spike
    pub sleeper_spike_threshold: f64,

    /// Maximum sample span for a spike to count (seconds)
    pub sleeper_spike_window_s: f64,

    /// Voting-power share required for a PoA malicious confirmation
    pub poa_vote_share: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_update_interval: 10.0,
            decay_rate_per_hour: 0.05,
            inactivity_threshold_s: 300.0,
            malicious_threshold: 0.3,
            min_trust_threshold: 0.6,
            enable_sleeper_detection: true,
            sleeper_spike_threshold: 0.30,
            sleeper_spike_window_s: 10.0,
            poa_vote_share: 0.51,
        }
    }
}

/// Adversary population parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdversaryConfig {
    /// Every k-th non-emergency, non-sleeper vehicle starts malicious
    pub malicious_interval: usize,

    /// Vehicles designated as sleeper agents
    pub sleeper_ids: Vec<VehicleId>,

    /// Sleeper activation window lower bound (seconds)
    pub sleeper_activation_min_s: f64,

    /// Sleeper activation window upper bound (seconds)
    pub sleeper_activation_max_s: f64,

    /// Initial trust for regular malicious vehicles
    pub initial_malicious_trust: f64,

    /// Initial trust for sleeper agents
    pub initial_sleeper_trust: f64,

    /// Per-tick probability of an erratic event (regular malicious)
    pub erratic_probability: f64,

    /// Per-tick probability of an erratic event (activated sleeper)
    pub activated_erratic_probability: f64,
}

impl Default for AdversaryConfig {
    fn default() -> Self {
        Self {
            malicious_interval: 8,
            sleeper_ids: Vec::new(),
            sleeper_activation_min_s: 20.0,
            sleeper_activation_max_s: 40.0,
            initial_malicious_trust: 0.2,
            initial_sleeper_trust: 0.85,
            erratic_probability: 0.10,
            activated_erratic_probability: 0.15,
        }
    }
}

/// Weights of the five election metrics; must sum to 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ElectionWeights {
    pub trust: f64,
    pub resource: f64,
    pub stability: f64,
    pub behavior: f64,
    pub centrality: f64,
}

impl Default for ElectionWeights {
    fn default() -> Self {
        Self {
            trust: 0.40,
            resource: 0.20,
            stability: 0.15,
            behavior: 0.15,
            centrality: 0.10,
        }
    }
}

impl ElectionWeights {
    /// Sum of all five weights
    pub fn sum(&self) -> f64 {
        self.trust + self.resource + self.stability + self.behavior + self.centrality
    }
}

/// Election engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Seconds between periodic re-elections of a healthy head
    pub reelection_interval: f64,

    /// Keep malicious vehicles out of the candidate set
    pub exclude_malicious: bool,

    /// Composite score weights
    pub weights: ElectionWeights,

    /// Voting-power share required for a majority win
    pub majority_share: f64,

    /// Minimum trust for the runner-up to become co-leader
    pub co_leader_min_trust: f64,

    /// Modeled DSRC round latency added to reported election times (ms)
    pub dsrc_latency_ms: f64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            reelection_interval: 30.0,
            exclude_malicious: true,
            weights: ElectionWeights::default(),
            majority_share: 0.51,
            co_leader_min_trust: 0.6,
            dsrc_latency_ms: 1.15,
        }
    }
}

/// Maintenance protocol parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Seconds between member heartbeats
    pub heartbeat_interval: f64,

    /// Silence after which a member is evicted (seconds)
    pub member_timeout: f64,

    /// Inbound messages processed per tick before yielding
    pub max_messages_per_tick: usize,

    /// Inbound queue capacity; overflow sheds oldest non-emergency traffic
    pub queue_capacity: usize,

    /// Per-source (source, seq) dedup window size
    pub dedup_window: usize,

    /// Default message lifetime (seconds)
    pub default_ttl_s: f64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 1.0,
            member_timeout: 3.0,
            max_messages_per_tick: 1024,
            queue_capacity: 4096,
            dedup_window: 256,
            default_ttl_s: 5.0,
        }
    }
}

/// Top-level simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulation timestep (seconds)
    pub tick_dt: f64,

    /// Run length used to normalize the stability metric (seconds)
    pub max_simulation_time: f64,

    /// Master RNG seed; 0 derives one from entropy
    pub random_seed: u64,

    pub clustering: ClusteringConfig,
    pub trust: TrustConfig,
    pub adversary: AdversaryConfig,
    pub election: ElectionConfig,
    pub protocol: ProtocolConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl SimulationConfig {
    /// Configuration with the canonical defaults and a fixed seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            random_seed: seed,
            ..Self::standard()
        }
    }

    /// Canonical defaults (0.1 s ticks, 300 s nominal run)
    pub fn standard() -> Self {
        Self {
            tick_dt: 0.1,
            max_simulation_time: 300.0,
            random_seed: 0,
            clustering: ClusteringConfig::default(),
            trust: TrustConfig::default(),
            adversary: AdversaryConfig::default(),
            election: ElectionConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }

    /// Validate the configuration, rejecting the run on any inconsistency
    pub fn validate(&self) -> SimResult<()> {
        if self.tick_dt <= 0.0 {
            return Err(SimError::InvalidConfig("tick_dt must be > 0".into()));
        }
        if self.max_simulation_time <= 0.0 {
            return Err(SimError::InvalidConfig(
                "max_simulation_time must be > 0".into(),
            ));
        }

        let c = &self.clustering;
        if c.min_cluster_size < 2 {
            return Err(SimError::InvalidConfig(
                "min_cluster_size must be at least 2".into(),
            ));
        }
        if c.max_cluster_size < c.min_cluster_size {
            return Err(SimError::InvalidConfig(
                "max_cluster_size must be >= min_cluster_size".into(),
            ));
        }
        if c.max_cluster_radius <= 0.0 {
            return Err(SimError::InvalidConfig(
                "max_cluster_radius must be > 0".into(),
            ));
        }
        for (name, interval) in [
            ("clustering_interval", c.clustering_interval),
            ("merge_interval", c.merge_interval),
            ("trust_update_interval", self.trust.trust_update_interval),
            ("reelection_interval", self.election.reelection_interval),
            ("heartbeat_interval", self.protocol.heartbeat_interval),
        ] {
            if interval <= 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be > 0"
                )));
            }
        }
        if !(0.0..=1.0).contains(&c.min_trust_for_clustering) {
            return Err(SimError::InvalidConfig(
                "min_trust_for_clustering must be within [0, 1]".into(),
            ));
        }

        let t = &self.trust;
        for (name, v) in [
            ("malicious_threshold", t.malicious_threshold),
            ("min_trust_threshold", t.min_trust_threshold),
            ("decay_rate_per_hour", t.decay_rate_per_hour),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }

        let w = self.election.weights;
        if (w.sum() - 1.0).abs() > 1e-9 {
            return Err(SimError::InvalidConfig(format!(
                "election weights must sum to 1.0, got {:.6}",
                w.sum()
            )));
        }
        if !(0.5..=1.0).contains(&self.election.majority_share) {
            return Err(SimError::InvalidConfig(
                "majority_share must be within [0.5, 1.0]".into(),
            ));
        }

        let a = &self.adversary;
        if a.malicious_interval == 0 {
            return Err(SimError::InvalidConfig(
                "malicious_interval must be > 0".into(),
            ));
        }
        if a.sleeper_activation_max_s < a.sleeper_activation_min_s {
            return Err(SimError::InvalidConfig(
                "sleeper activation window is inverted".into(),
            ));
        }
        for (name, p) in [
            ("erratic_probability", a.erratic_probability),
            (
                "activated_erratic_probability",
                a.activated_erratic_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }

        let p = &self.protocol;
        if p.max_messages_per_tick == 0 || p.queue_capacity == 0 || p.dedup_window == 0 {
            return Err(SimError::InvalidConfig(
                "protocol limits must be > 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_config_is_valid() {
        assert!(SimulationConfig::standard().validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ElectionWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = SimulationConfig::standard();
        config.election.weights.trust = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_cluster_sizes_rejected() {
        let mut config = SimulationConfig::standard();
        config.clustering.max_cluster_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dbscan_defaults_derive_from_radius() {
        let c = ClusteringConfig::default();
        assert_eq!(c.dbscan_epsilon(), 150.0);
        assert_eq!(c.dbscan_min_pts(), 2);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SimulationConfig::standard();
        let json = serde_json::to_string(&config).unwrap();
        let back: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.clustering.algorithm, ClusteringAlgorithm::Mobility);
    }
}
