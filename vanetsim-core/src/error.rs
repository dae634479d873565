// Error types shared across the simulation crates

use crate::cluster::ClusterId;
use crate::vehicle::VehicleId;
use thiserror::Error;

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur during a simulation run
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(VehicleId),

    #[error("Unknown cluster: {0}")]
    UnknownCluster(ClusterId),

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("Message queue full (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    #[error("No eligible head candidates in cluster {0}")]
    ElectionInfeasible(ClusterId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
