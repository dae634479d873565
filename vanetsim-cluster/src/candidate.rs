//! Candidate view of a vehicle as seen by the partitioning algorithms

use nalgebra::Point2;
use vanetsim_core::vehicle::{LaneId, Vehicle, VehicleId};

/// The slice of vehicle state the partitioning algorithms read
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: VehicleId,
    pub position: Point2<f64>,
    pub speed: f64,
    pub heading: f64,
    pub lane: LaneId,
    pub trust: f64,
}

impl Candidate {
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            position: vehicle.position,
            speed: vehicle.speed,
            heading: vehicle.heading,
            lane: vehicle.lane,
            trust: vehicle.trust,
        }
    }

    pub fn distance_to(&self, other: &Candidate) -> f64 {
        (self.position - other.position).norm()
    }
}

/// Smallest angular difference between two headings (radians)
pub fn heading_delta(a: f64, b: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let d = (a - b).rem_euclid(two_pi);
    d.min(two_pi - d)
}
