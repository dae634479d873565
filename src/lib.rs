//! VanetSim: a VANET clustering simulator with trust-based head election
//!
//! This facade re-exports the workspace crates:
//!
//! - [`core`](vanetsim_core): shared types, configuration, vehicle store
//! - [`trust`](vanetsim_trust): trust engine, adversaries, detection
//! - [`cluster`](vanetsim_cluster): partitioning, lifecycle, elections
//! - [`engine`](vanetsim_engine): the discrete-time orchestrator and runner
//!
//! # Example
//!
//! ```rust,no_run
//! use vanetsim::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let simulation = Simulation::new(SimulationConfig::with_seed(7))?;
//!     let traffic = ScriptedSource::convoy(40, 35.0, 22.0);
//!     let sink = JsonLinesSink::new(tokio::io::stdout());
//!
//!     let (mut runner, _cancel) = Runner::new(simulation, traffic, sink);
//!     runner.run(3000).await?;
//!     Ok(())
//! }
//! ```

pub use vanetsim_cluster as cluster;
pub use vanetsim_core as core;
pub use vanetsim_engine as engine;
pub use vanetsim_trust as trust;

/// Prelude module for common imports
pub mod prelude {
    pub use vanetsim_cluster::{ElectionMode, ElectionRecord};
    pub use vanetsim_core::config::{ClusteringAlgorithm, SimulationConfig};
    pub use vanetsim_core::prelude::*;
    pub use vanetsim_engine::{
        CollectingSink, JsonLinesSink, KinematicsSource, ReportSink, Runner, ScriptedSource,
        ScriptedVehicle, Simulation, StatsSnapshot,
    };
    pub use vanetsim_trust::{Detection, DetectionReason, TrustEventKind};
}
