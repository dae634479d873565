//! Vehicle store with a uniform-grid spatial index
//!
//! The radius query is the clustering hot path; the grid keeps it linear in
//! the local population instead of the whole store. Results are exhaustive
//! and returned in ascending id order so callers behave deterministically.

use crate::vehicle::{Vehicle, VehicleId};
use nalgebra::Point2;
use std::collections::{BTreeMap, HashMap};

/// Owning store of all vehicle records
#[derive(Debug)]
pub struct VehicleStore {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    grid: HashMap<(i64, i64), Vec<VehicleId>>,
    cell_size: f64,
}

impl VehicleStore {
    /// Create a store; `cell_size` should match the clustering radius
    pub fn new(cell_size: f64) -> Self {
        Self {
            vehicles: BTreeMap::new(),
            grid: HashMap::new(),
            cell_size: cell_size.max(1.0),
        }
    }

    fn cell_of(&self, p: &Point2<f64>) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    fn grid_remove(&mut self, id: VehicleId, cell: (i64, i64)) {
        if let Some(ids) = self.grid.get_mut(&cell) {
            ids.retain(|v| *v != id);
            if ids.is_empty() {
                self.grid.remove(&cell);
            }
        }
    }

    /// Insert a vehicle or move an existing record to a new position
    pub fn upsert(&mut self, vehicle: Vehicle) {
        let new_cell = self.cell_of(&vehicle.position);
        if let Some(existing) = self.vehicles.get(&vehicle.id) {
            let old_cell = self.cell_of(&existing.position);
            if old_cell != new_cell {
                self.grid_remove(vehicle.id, old_cell);
                self.grid.entry(new_cell).or_default().push(vehicle.id);
            }
        } else {
            self.grid.entry(new_cell).or_default().push(vehicle.id);
        }
        self.vehicles.insert(vehicle.id, vehicle);
    }

    /// Reindex one vehicle after an in-place position mutation
    pub fn reindex(&mut self, id: VehicleId, old_position: Point2<f64>) {
        let Some(vehicle) = self.vehicles.get(&id) else {
            return;
        };
        let old_cell = self.cell_of(&old_position);
        let new_cell = self.cell_of(&vehicle.position);
        if old_cell != new_cell {
            self.grid_remove(id, old_cell);
            self.grid.entry(new_cell).or_default().push(id);
        }
    }

    /// Remove a vehicle, returning its record
    pub fn remove(&mut self, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(&id)?;
        let cell = self.cell_of(&vehicle.position);
        self.grid_remove(id, cell);
        Some(vehicle)
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.vehicles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// All vehicles in ascending id order
    pub fn iter_all(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// All vehicle ids in ascending order
    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().copied().collect()
    }

    /// Ids of vehicles within `radius` of `point`, ascending
    pub fn ids_in_radius(&self, point: &Point2<f64>, radius: f64) -> Vec<VehicleId> {
        let r2 = radius * radius;
        let span = (radius / self.cell_size).ceil() as i64;
        let center = self.cell_of(point);

        let mut out = Vec::new();
        for cx in (center.0 - span)..=(center.0 + span) {
            for cy in (center.1 - span)..=(center.1 + span) {
                let Some(ids) = self.grid.get(&(cx, cy)) else {
                    continue;
                };
                for id in ids {
                    let v = &self.vehicles[id];
                    if (v.position - point).norm_squared() <= r2 {
                        out.push(*id);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}
