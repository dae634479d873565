//! Malicious-vehicle detection
//!
//! Two detectors feed the statistics ledger: a historical trust-spike
//! heuristic that unmasks trust-building sleeper agents, and a
//! Proof-of-Authority vote where cluster members confirm a suspect with
//! voting power equal to their own trust.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use vanetsim_core::cluster::{Cluster, ClusterId};
use vanetsim_core::config::TrustConfig;
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::{Vehicle, VehicleId};

/// A vehicle newly flagged as malicious by the system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub vehicle_id: VehicleId,
    pub sim_time: f64,
    pub reason: DetectionReason,
}

/// What triggered a detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectionReason {
    /// Trust fell below the malicious threshold under evidence
    TrustCollapse,
    /// Cluster authority vote reached the required share
    PoaVote { share: f64 },
    /// Unjustified historical trust spike
    TrustSpike { delta: f64 },
}

/// Historical spike check for one vehicle; flags and halves trust on hit
pub fn detect_trust_spike(
    vehicle: &mut Vehicle,
    sim_time: f64,
    config: &TrustConfig,
) -> Option<Detection> {
    if vehicle.flagged_malicious || vehicle.history.len() < 3 {
        return None;
    }
    let latest = vehicle.history.latest()?;
    let reference = vehicle.history.nth_back(2)?;

    let delta = latest.trust - reference.trust;
    let span = latest.sim_time - reference.sim_time;
    if delta <= config.sleeper_spike_threshold || span > config.sleeper_spike_window_s {
        return None;
    }

    // A spike backed by near-perfect authenticity and consistency is earned.
    let justified = vehicle.sub_scores.message_authenticity > 0.9
        && vehicle.sub_scores.behavior_consistency > 0.9;
    if justified {
        return None;
    }

    vehicle.flagged_malicious = true;
    vehicle.set_trust(vehicle.trust / 2.0);
    info!(
        vehicle = vehicle.id,
        delta, span, "trust spike flagged as sleeper behavior"
    );
    Some(Detection {
        vehicle_id: vehicle.id,
        sim_time,
        reason: DetectionReason::TrustSpike { delta },
    })
}

/// Cluster-authority confirmation of low-trust members
///
/// Runs every tick so a collapsed vehicle is confirmed within the tick
/// following the collapse rather than at the next periodic trust pass.
pub fn poa_confirmation(
    store: &mut VehicleStore,
    clusters: &BTreeMap<ClusterId, Cluster>,
    config: &TrustConfig,
    sim_time: f64,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for cluster in clusters.values() {
        if !cluster.is_active() {
            continue;
        }
        for &suspect in &cluster.members {
            let Some(vehicle) = store.get(suspect) else {
                continue;
            };
            if vehicle.flagged_malicious || vehicle.trust >= config.malicious_threshold {
                continue;
            }

            // Every co-member votes with weight equal to its trust; a vote
            // is cast against the suspect when the voter observes its trust
            // below the malicious threshold.
            let mut total_power = 0.0;
            let mut against_power = 0.0;
            let suspect_trust = vehicle.trust;
            for &voter in &cluster.members {
                if voter == suspect {
                    continue;
                }
                let Some(voter_vehicle) = store.get(voter) else {
                    continue;
                };
                total_power += voter_vehicle.trust;
                if suspect_trust < config.malicious_threshold {
                    against_power += voter_vehicle.trust;
                }
            }
            if total_power <= 0.0 {
                continue;
            }

            let share = against_power / total_power;
            if share >= config.poa_vote_share {
                if let Some(vehicle) = store.get_mut(suspect) {
                    vehicle.flagged_malicious = true;
                }
                info!(
                    vehicle = suspect,
                    cluster = cluster.id,
                    share,
                    "authority vote confirmed malicious member"
                );
                detections.push(Detection {
                    vehicle_id: suspect,
                    sim_time,
                    reason: DetectionReason::PoaVote { share },
                });
            }
        }
    }

    detections
}
