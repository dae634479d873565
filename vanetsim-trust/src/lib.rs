//! Trust model and adversary dynamics
//!
//! This crate owns everything that moves a vehicle's trust score:
//!
//! - **Trust engine**: event-driven updates with deterministic ordering,
//!   periodic decay and sub-score recombination, history bookkeeping
//! - **Adversary simulator**: regular malicious vehicles and sleeper
//!   agents, with the ground truth used for detection accounting
//! - **Detection**: the historical trust-spike heuristic and the
//!   Proof-of-Authority confirmation vote

pub mod adversary;
pub mod detection;
pub mod engine;

pub use adversary::{AdversarySimulator, Designation};
pub use detection::{poa_confirmation, Detection, DetectionReason};
pub use engine::{TrustEngine, TrustEvent, TrustEventKind, TrustSink};
