//! Kinematics collaborator boundary
//!
//! The engine consumes per-tick snapshot lists and does not care how they
//! were produced. `ScriptedSource` provides constant-velocity traffic for
//! demos and tests; a real deployment plugs a microscopic traffic model in
//! behind the same trait.

use nalgebra::{Point2, Vector2};
use vanetsim_core::vehicle::{LaneId, VehicleId, VehicleSnapshot};

/// Produces the kinematic state of every online vehicle each tick
pub trait KinematicsSource {
    fn next_tick(&mut self, tick: u64, sim_time: f64, dt: f64) -> Vec<VehicleSnapshot>;
}

/// One constant-velocity vehicle trajectory
#[derive(Debug, Clone)]
pub struct ScriptedVehicle {
    pub id: VehicleId,
    pub origin: Point2<f64>,
    pub velocity: Vector2<f64>,
    pub lane: LaneId,
    pub is_emergency: bool,
}

/// Straight-line traffic from a fixed script
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    vehicles: Vec<ScriptedVehicle>,
}

impl ScriptedSource {
    pub fn new(vehicles: Vec<ScriptedVehicle>) -> Self {
        Self { vehicles }
    }

    /// A single-lane convoy heading east at a common speed
    pub fn convoy(count: u64, spacing_m: f64, speed_mps: f64) -> Self {
        let vehicles = (0..count)
            .map(|i| ScriptedVehicle {
                id: i,
                origin: Point2::new(i as f64 * spacing_m, 0.0),
                velocity: Vector2::new(speed_mps, 0.0),
                lane: 0,
                is_emergency: false,
            })
            .collect();
        Self::new(vehicles)
    }

    /// Parallel convoys on separate lanes, offset laterally
    pub fn lanes(lanes: u32, per_lane: u64, spacing_m: f64, speed_mps: f64) -> Self {
        let mut vehicles = Vec::new();
        for lane in 0..lanes {
            for i in 0..per_lane {
                vehicles.push(ScriptedVehicle {
                    id: lane as u64 * per_lane + i,
                    origin: Point2::new(i as f64 * spacing_m, lane as f64 * 4.0),
                    velocity: Vector2::new(speed_mps, 0.0),
                    lane,
                    is_emergency: false,
                });
            }
        }
        Self::new(vehicles)
    }

    pub fn push(&mut self, vehicle: ScriptedVehicle) {
        self.vehicles.push(vehicle);
    }
}

impl KinematicsSource for ScriptedSource {
    fn next_tick(&mut self, _tick: u64, sim_time: f64, _dt: f64) -> Vec<VehicleSnapshot> {
        self.vehicles
            .iter()
            .map(|v| {
                let position = v.origin + v.velocity * sim_time;
                VehicleSnapshot {
                    id: v.id,
                    position,
                    speed: v.velocity.norm(),
                    heading: v.velocity.y.atan2(v.velocity.x),
                    lane: v.lane,
                    is_emergency: v.is_emergency,
                    timestamp: sim_time,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convoy_advances() {
        let mut source = ScriptedSource::convoy(3, 50.0, 20.0);
        let at_zero = source.next_tick(0, 0.0, 0.1);
        let at_ten = source.next_tick(100, 10.0, 0.1);

        assert_eq!(at_zero.len(), 3);
        assert_eq!(at_zero[0].position.x, 0.0);
        assert_eq!(at_ten[0].position.x, 200.0);
        assert_eq!(at_ten[1].position.x, 250.0);
        assert_eq!(at_ten[0].speed, 20.0);
        assert_eq!(at_ten[0].heading, 0.0);
    }

    #[test]
    fn test_lanes_assign_distinct_ids() {
        let mut source = ScriptedSource::lanes(2, 5, 40.0, 15.0);
        let snapshots = source.next_tick(0, 0.0, 0.1);
        assert_eq!(snapshots.len(), 10);
        let mut ids: Vec<u64> = snapshots.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }
}
