//! Adversary population and behavior
//!
//! Two disjoint adversary populations are designated when vehicles first
//! enter the simulation: regular malicious vehicles that start distrusted
//! and misbehave from the beginning, and sleeper agents that hold high
//! trust until a preset activation time. The simulator owns the ground
//! truth used for detection accounting; the rest of the system only ever
//! sees vehicle behavior.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use vanetsim_core::config::AdversaryConfig;
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::{AdversaryState, VehicleId};

/// Initial erratic count given to regular malicious vehicles
const INITIAL_MALICIOUS_ERRATIC_COUNT: u32 = 10;

/// Ground-truth designation of an adversary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Designation {
    Malicious,
    Sleeper,
}

/// Drives malicious and sleeper-agent vehicles
pub struct AdversarySimulator {
    config: AdversaryConfig,
    rng: ChaCha8Rng,
    /// Ground truth, by vehicle id
    designated: BTreeMap<VehicleId, Designation>,
    /// Ordinal of designation decisions, drives the every-k-th rule
    admission_count: usize,
}

impl AdversarySimulator {
    pub fn new(config: AdversaryConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rng,
            designated: BTreeMap::new(),
            admission_count: 0,
        }
    }

    /// Ground-truth adversary set for detection accounting
    pub fn ground_truth(&self) -> &BTreeMap<VehicleId, Designation> {
        &self.designated
    }

    /// True when the vehicle is a designated adversary of either kind
    pub fn is_designated(&self, id: VehicleId) -> bool {
        self.designated.contains_key(&id)
    }

    /// Decide the adversary role of a newly admitted vehicle
    ///
    /// Returns the trust override to use instead of the normal initial
    /// draw, or `None` for legitimate vehicles. Must be called exactly once
    /// per vehicle, in admission order.
    pub fn designate(
        &mut self,
        id: VehicleId,
        is_emergency: bool,
        sim_time: f64,
    ) -> Option<(AdversaryState, f64, u32)> {
        if self.config.sleeper_ids.contains(&id) {
            let activation = Uniform::new_inclusive(
                self.config.sleeper_activation_min_s,
                self.config.sleeper_activation_max_s,
            )
            .sample(&mut self.rng);
            self.designated.insert(id, Designation::Sleeper);
            info!(vehicle = id, activation, "sleeper agent designated");
            return Some((
                AdversaryState::Sleeper {
                    activation_time: activation,
                    activated: false,
                },
                self.config.initial_sleeper_trust,
                0,
            ));
        }

        self.admission_count += 1;
        if is_emergency {
            return None;
        }
        if self.admission_count % self.config.malicious_interval == 0 {
            self.designated.insert(id, Designation::Malicious);
            debug!(vehicle = id, "regular malicious vehicle designated");
            return Some((
                AdversaryState::Malicious { since: sim_time },
                self.config.initial_malicious_trust,
                INITIAL_MALICIOUS_ERRATIC_COUNT,
            ));
        }
        None
    }

    /// Advance adversary behavior one tick
    ///
    /// Returns the erratic events injected this tick as `(vehicle,
    /// speed_delta)` pairs; the jumps are observable behavior that the
    /// rest of the system may turn into malicious evidence.
    pub fn step(&mut self, store: &mut VehicleStore, sim_time: f64) -> Vec<(VehicleId, f64)> {
        let mut erratic = Vec::new();
        for id in store.ids() {
            let Some(designation) = self.designated.get(&id).copied() else {
                continue;
            };
            let Some(vehicle) = store.get_mut(id) else {
                continue;
            };

            match designation {
                Designation::Malicious => {
                    if self.rng.gen_bool(self.config.erratic_probability) {
                        let delta = Uniform::new_inclusive(10.0, 25.0).sample(&mut self.rng);
                        vehicle.speed += delta;
                        vehicle.erratic_count += 1;
                        vehicle.set_trust(vehicle.trust * 0.95);
                        erratic.push((id, delta));
                    }
                }
                Designation::Sleeper => {
                    let AdversaryState::Sleeper {
                        activation_time,
                        activated,
                    } = vehicle.adversary
                    else {
                        continue;
                    };

                    if !activated {
                        if sim_time >= activation_time {
                            vehicle.adversary = AdversaryState::Sleeper {
                                activation_time,
                                activated: true,
                            };
                            vehicle.set_trust(0.15);
                            vehicle.sub_scores =
                                vanetsim_core::vehicle::SubScores::uniform(0.15);
                            info!(
                                vehicle = id,
                                sim_time, activation_time, "sleeper agent activated"
                            );
                        }
                        continue;
                    }

                    // Activated sleepers attack harder than regular malicious.
                    if self
                        .rng
                        .gen_bool(self.config.activated_erratic_probability)
                    {
                        let delta = Uniform::new_inclusive(15.0, 35.0).sample(&mut self.rng);
                        vehicle.speed += delta;
                        vehicle.erratic_count += 1;
                        vehicle.set_trust(vehicle.trust * 0.90);
                        erratic.push((id, delta));
                    }
                }
            }
        }
        erratic
    }
}
