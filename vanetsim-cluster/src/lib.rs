//! Clustering pipeline: algorithms, lifecycle, elections
//!
//! Four interchangeable partitioning algorithms feed a cadenced clustering
//! engine that owns all cluster records. The lifecycle manager maintains
//! those records each tick (merge, split, dissolve, heartbeat eviction,
//! re-election triggers) and the election engine runs the five-metric
//! trust-weighted consensus vote wherever the manager demands one.

pub mod candidate;
pub mod dbscan;
pub mod direction;
pub mod election;
pub mod engine;
pub mod kmeans;
pub mod manager;
pub mod mobility;

pub use candidate::{heading_delta, Candidate};
pub use election::{
    CandidateScore, ElectionEngine, ElectionMode, ElectionRecord, VoteRecord,
};
pub use engine::{ClusteringEngine, MembershipEvent};
pub use manager::{merge_thresholds, ClusterManager, MergeEvent, TickOutcome};
