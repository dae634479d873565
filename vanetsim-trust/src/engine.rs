//! Event-driven trust maintenance
//!
//! Components report trust-relevant events through the [`TrustSink`]
//! capability; the engine applies them in deterministic `(source, seq)`
//! order at its slot in the tick, then runs periodic decay, sub-score
//! recombination, and history bookkeeping on its own cadence.

use crate::detection::{detect_trust_spike, Detection, DetectionReason};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vanetsim_core::config::TrustConfig;
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::VehicleId;

/// A trust-relevant observation about one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrustEventKind {
    /// Message from the subject delivered and verified
    DeliverySuccess,
    /// Expected delivery from the subject failed
    DeliveryFailure,
    /// Cooperation outcome scored within [0, 1]
    Cooperation { score: f64 },
    /// Cluster stability feedback for the subject's cluster
    ClusterBehavior { stability: f64 },
    /// Evidence of malicious behavior with severity within [0, 1]
    MaliciousEvidence { severity: f64 },
}

/// A queued trust event awaiting deterministic application
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustEvent {
    /// Vehicle whose trust the event concerns
    pub subject: VehicleId,
    /// Reporting vehicle or component proxy id
    pub source: VehicleId,
    /// Monotonic per engine; orders same-source events
    pub seq: u64,
    pub kind: TrustEventKind,
}

/// Capability handed to components that report trust events
pub trait TrustSink {
    fn record(&mut self, subject: VehicleId, source: VehicleId, kind: TrustEventKind);
}

/// Event-driven and periodic trust updates
pub struct TrustEngine {
    config: TrustConfig,
    pending: Vec<TrustEvent>,
    next_seq: u64,
    last_periodic: f64,
}

impl TrustSink for TrustEngine {
    fn record(&mut self, subject: VehicleId, source: VehicleId, kind: TrustEventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(TrustEvent {
            subject,
            source,
            seq,
            kind,
        });
    }
}

impl TrustEngine {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            next_seq: 0,
            last_periodic: 0.0,
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Number of events queued for this tick
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record an event and apply it immediately
    ///
    /// External evidence takes effect right away so triggers that depend on
    /// it (a head's trust collapsing, for instance) fire within the same
    /// tick. Pipeline-internal events go through [`TrustSink`] instead and
    /// are merged deterministically at the engine's slot in the tick.
    pub fn record_and_apply(
        &mut self,
        store: &mut VehicleStore,
        subject: VehicleId,
        source: VehicleId,
        kind: TrustEventKind,
        sim_time: f64,
    ) -> Option<Detection> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = TrustEvent {
            subject,
            source,
            seq,
            kind,
        };
        self.apply_event(store, &event, sim_time)
    }

    /// Apply queued events in `(source, seq)` order; returns new detections
    pub fn apply_pending(&mut self, store: &mut VehicleStore, sim_time: f64) -> Vec<Detection> {
        let mut events = std::mem::take(&mut self.pending);
        events.sort_by_key(|e| (e.source, e.seq));

        let mut detections = Vec::new();
        for event in events {
            if let Some(detection) = self.apply_event(store, &event, sim_time) {
                detections.push(detection);
            }
        }
        detections
    }

    fn apply_event(
        &self,
        store: &mut VehicleStore,
        event: &TrustEvent,
        sim_time: f64,
    ) -> Option<Detection> {
        let vehicle = store.get_mut(event.subject)?;
        match event.kind {
            TrustEventKind::DeliverySuccess => {
                vehicle.adjust_trust(0.002);
                vehicle.sub_scores.message_authenticity += 0.01;
                vehicle.sub_scores.behavior_consistency += 0.005;
            }
            TrustEventKind::DeliveryFailure => {
                vehicle.adjust_trust(-0.005);
                vehicle.sub_scores.message_authenticity -= 0.02;
            }
            TrustEventKind::Cooperation { score } => {
                let score = score.clamp(0.0, 1.0);
                vehicle.adjust_trust((score - 0.5) * 0.02);
                vehicle.cooperation_requests += 1;
                if score >= 0.5 {
                    vehicle.cooperation_successes += 1;
                }
            }
            TrustEventKind::ClusterBehavior { stability } => {
                let delta = if stability > 0.7 {
                    if vehicle.is_head {
                        0.003
                    } else {
                        0.001
                    }
                } else if stability < 0.3 {
                    if vehicle.is_head {
                        -0.002
                    } else {
                        -0.001
                    }
                } else {
                    0.0
                };
                vehicle.adjust_trust(delta);
            }
            TrustEventKind::MaliciousEvidence { severity } => {
                let severity = severity.clamp(0.0, 1.0);
                vehicle.adjust_trust(-0.05 * (1.0 + severity));
                vehicle.sub_scores.message_authenticity -= 0.075 * severity;
                vehicle.sub_scores.behavior_consistency -= 0.06 * severity;
            }
        }
        vehicle.sub_scores.clamp_all();
        vehicle.last_update = sim_time;

        if !vehicle.flagged_malicious && vehicle.trust < self.config.malicious_threshold {
            if matches!(event.kind, TrustEventKind::MaliciousEvidence { .. }) {
                vehicle.flagged_malicious = true;
                return Some(Detection {
                    vehicle_id: vehicle.id,
                    sim_time,
                    reason: DetectionReason::TrustCollapse,
                });
            }
        }
        None
    }

    /// True when the periodic maintenance pass is due
    pub fn periodic_due(&self, sim_time: f64) -> bool {
        sim_time - self.last_periodic >= self.config.trust_update_interval
    }

    /// Decay, sub-score recombination, history push, and spike detection
    pub fn run_periodic(&mut self, store: &mut VehicleStore, sim_time: f64) -> Vec<Detection> {
        self.last_periodic = sim_time;
        let mut detections = Vec::new();

        for id in store.ids() {
            let Some(vehicle) = store.get_mut(id) else {
                continue;
            };

            // Decay for vehicles idle past the inactivity threshold.
            let idle = sim_time - vehicle.last_update;
            if idle > self.config.inactivity_threshold_s {
                let hours_inactive = idle / 3600.0;
                let decayed =
                    vehicle.trust * (1.0 - self.config.decay_rate_per_hour).powf(hours_inactive);
                vehicle.set_trust(decayed);
                debug!(vehicle = id, trust = vehicle.trust, "trust decayed");
            }

            // Recombine sub-scores; keep whichever path is higher so event
            // penalties are not applied twice. Malicious vehicles are
            // exempt: recombination must not undo a deliberate collapse.
            if !vehicle.is_malicious() {
                let recombined = vehicle.sub_scores.weighted();
                if recombined > vehicle.trust {
                    vehicle.set_trust(recombined);
                }
            }

            vehicle.history.push(sim_time, vehicle.trust);

            if self.config.enable_sleeper_detection && !vehicle.is_head {
                if let Some(detection) = detect_trust_spike(vehicle, sim_time, &self.config) {
                    detections.push(detection);
                }
            }
        }

        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use vanetsim_core::vehicle::{Vehicle, VehicleSnapshot};

    fn store_with(trust: f64) -> VehicleStore {
        let mut store = VehicleStore::new(300.0);
        let snapshot = VehicleSnapshot {
            id: 1,
            position: Point2::new(0.0, 0.0),
            speed: 20.0,
            heading: 0.0,
            lane: 0,
            is_emergency: false,
            timestamp: 0.0,
        };
        store.upsert(Vehicle::from_snapshot(&snapshot, 100.0, 2.0, trust));
        store
    }

    #[test]
    fn test_delivery_events_adjust_trust() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.7);

        engine.record(1, 1, TrustEventKind::DeliverySuccess);
        engine.apply_pending(&mut store, 0.1);
        assert_relative_eq!(store.get(1).unwrap().trust, 0.702, epsilon = 1e-12);

        engine.record(1, 1, TrustEventKind::DeliveryFailure);
        engine.apply_pending(&mut store, 0.2);
        assert_relative_eq!(store.get(1).unwrap().trust, 0.697, epsilon = 1e-12);
    }

    #[test]
    fn test_opposite_events_nearly_commute() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.5);

        engine.record(1, 1, TrustEventKind::Cooperation { score: 1.0 });
        engine.record(1, 1, TrustEventKind::Cooperation { score: 0.0 });
        engine.apply_pending(&mut store, 0.1);

        assert_relative_eq!(store.get(1).unwrap().trust, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_malicious_evidence_flags_below_threshold() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.35);

        engine.record(1, 2, TrustEventKind::MaliciousEvidence { severity: 0.8 });
        let detections = engine.apply_pending(&mut store, 1.0);

        let vehicle = store.get(1).unwrap();
        assert!(vehicle.trust < 0.3);
        assert!(vehicle.flagged_malicious);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].vehicle_id, 1);
    }

    #[test]
    fn test_events_applied_in_source_seq_order() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.31);

        // Regardless of recording order, source 1's events apply before
        // source 2's; the final trust is the same either way here, but the
        // flag must be raised by the evidence event, not the success.
        engine.record(1, 2, TrustEventKind::MaliciousEvidence { severity: 1.0 });
        engine.record(1, 1, TrustEventKind::DeliverySuccess);
        let detections = engine.apply_pending(&mut store, 1.0);

        assert_eq!(detections.len(), 1);
        assert!(store.get(1).unwrap().flagged_malicious);
    }

    #[test]
    fn test_cluster_behavior_head_weighting() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.7);
        store.get_mut(1).unwrap().is_head = true;

        engine.record(1, 1, TrustEventKind::ClusterBehavior { stability: 0.9 });
        engine.apply_pending(&mut store, 0.1);
        assert_relative_eq!(store.get(1).unwrap().trust, 0.703, epsilon = 1e-12);
    }

    #[test]
    fn test_periodic_pushes_history() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.7);

        assert!(engine.periodic_due(10.0));
        engine.run_periodic(&mut store, 10.0);
        assert!(!engine.periodic_due(15.0));

        let vehicle = store.get(1).unwrap();
        assert_eq!(vehicle.history.len(), 1);
        assert_eq!(vehicle.history.latest().unwrap().sim_time, 10.0);
    }

    #[test]
    fn test_decay_applies_after_inactivity() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.8);
        // Keep recombination below the decayed value so it cannot mask decay.
        store.get_mut(1).unwrap().sub_scores =
            vanetsim_core::vehicle::SubScores::uniform(0.2);

        // Vehicle last updated at t=0; at t=3600 it has been idle an hour.
        engine.run_periodic(&mut store, 3600.0);
        let trust = store.get(1).unwrap().trust;
        assert!(trust < 0.8);
        assert_relative_eq!(trust, 0.8 * 0.95, epsilon = 1e-9);
    }

    #[test]
    fn test_recombination_never_lowers_trust() {
        let mut engine = TrustEngine::new(TrustConfig::default());
        let mut store = store_with(0.9);
        // Sub-scores default to 0.9 via uniform init; force them lower.
        store.get_mut(1).unwrap().sub_scores =
            vanetsim_core::vehicle::SubScores::uniform(0.2);
        store.get_mut(1).unwrap().last_update = 3599.0;

        engine.run_periodic(&mut store, 3600.0);
        assert_relative_eq!(store.get(1).unwrap().trust, 0.9, epsilon = 1e-12);
    }
}
