//! VanetSim Core Library
//!
//! Shared types for the VANET clustering simulator: vehicle and cluster
//! records, protocol message envelopes, the vehicle store with its spatial
//! index, validated configuration, and seeded per-component randomness.
//!
//! The simulation itself lives in the companion crates:
//!
//! - `vanetsim-trust`: trust engine and adversary models
//! - `vanetsim-cluster`: clustering algorithms, lifecycle, elections
//! - `vanetsim-engine`: the discrete-time orchestrator
//!
//! # Example
//!
//! ```rust
//! use vanetsim_core::prelude::*;
//! use nalgebra::Point2;
//!
//! let mut store = VehicleStore::new(300.0);
//! let snapshot = VehicleSnapshot {
//!     id: 1,
//!     position: Point2::new(12.0, 4.0),
//!     speed: 22.0,
//!     heading: 0.1,
//!     lane: 2,
//!     is_emergency: false,
//!     timestamp: 0.0,
//! };
//! store.upsert(Vehicle::from_snapshot(&snapshot, 100.0, 2.0, 0.7));
//!
//! let near = store.ids_in_radius(&Point2::new(0.0, 0.0), 50.0);
//! assert_eq!(near, vec![1]);
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod message;
pub mod rng;
pub mod store;
pub mod vehicle;

// Re-exports for convenience
pub use cluster::{Cluster, ClusterId, ClusterState};
pub use config::{
    AdversaryConfig, ClusteringAlgorithm, ClusteringConfig, ElectionConfig, ElectionWeights,
    ProtocolConfig, SimulationConfig, TrustConfig,
};
pub use error::{SimError, SimResult};
pub use message::{DedupWindow, Destination, MessageEnvelope, MessageKind};
pub use rng::RngStreams;
pub use store::VehicleStore;
pub use vehicle::{
    AdversaryState, LaneId, SubScores, TrustHistory, TrustSample, Vehicle, VehicleId,
    VehicleSnapshot, TRUST_HISTORY_LEN,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::cluster::{Cluster, ClusterId, ClusterState};
    pub use crate::config::{
        AdversaryConfig, ClusteringAlgorithm, ClusteringConfig, ElectionConfig, ElectionWeights,
        ProtocolConfig, SimulationConfig, TrustConfig,
    };
    pub use crate::error::{SimError, SimResult};
    pub use crate::message::{DedupWindow, Destination, MessageEnvelope, MessageKind};
    pub use crate::rng::RngStreams;
    pub use crate::store::VehicleStore;
    pub use crate::vehicle::{
        AdversaryState, LaneId, SubScores, TrustHistory, Vehicle, VehicleId, VehicleSnapshot,
    };
    pub use nalgebra::{Point2, Vector2};
}
