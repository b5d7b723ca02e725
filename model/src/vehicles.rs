use std::collections::BTreeMap;

use geom::LonLat;

use crate::canvas::{MapCanvas, MarkerSpec};
use crate::{Location, Vehicle, VehicleID};

pub struct VehicleEntry<C: MapCanvas> {
    pub vehicle: Vehicle,
    marker: Option<C::Marker>,
}

/// Owns every known vehicle and its marker. Refreshes update markers in place, so anything
/// attached to a marker stays valid.
pub struct VehicleRegistry<C: MapCanvas> {
    entries: BTreeMap<VehicleID, VehicleEntry<C>>,
    selected: Option<VehicleID>,
    // Only in debug mode, to fake movement
    draggable: bool,
}

impl<C: MapCanvas> VehicleRegistry<C> {
    pub fn new(draggable: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            selected: None,
            draggable,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: VehicleID) -> Option<&Vehicle> {
        self.entries.get(&id).map(|e| &e.vehicle)
    }

    pub fn marker(&self, id: VehicleID) -> Option<&C::Marker> {
        self.entries.get(&id).and_then(|e| e.marker.as_ref())
    }

    pub fn selected(&self) -> Option<VehicleID> {
        self.selected
    }

    /// Sorted by ID
    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.entries.values().map(|e| &e.vehicle)
    }

    pub fn labels(&self) -> Vec<String> {
        self.iter()
            .enumerate()
            .map(|(idx, v)| format!("{}. {}", idx + 1, v.name))
            .collect()
    }

    pub fn load(&mut self, canvas: &mut C, mut vehicles: Vec<Vehicle>) {
        self.clear(canvas);
        vehicles.sort_by_key(|v| v.id);
        for vehicle in vehicles {
            self.materialize(canvas, vehicle);
        }
    }

    pub fn clear(&mut self, canvas: &mut C) {
        self.selected = None;
        for (_, entry) in std::mem::take(&mut self.entries) {
            if let Some(marker) = entry.marker {
                canvas.remove_marker(marker);
            }
        }
    }

    /// The first time a vehicle is seen. Vehicles without a location don't get a marker yet.
    pub fn materialize(&mut self, canvas: &mut C, vehicle: Vehicle) {
        if self.entries.contains_key(&vehicle.id) {
            self.update(canvas, vehicle);
            return;
        }
        let id = vehicle.id;
        let number = self.entries.range(..id).count() + 1;
        let marker = vehicle.location().map(|pos| {
            canvas.add_marker(MarkerSpec {
                pos,
                title: vehicle.name.clone(),
                label: number.to_string(),
                draggable: self.draggable,
            })
        });
        self.entries.insert(id, VehicleEntry { vehicle, marker });
        self.relabel_after(canvas, id);
    }

    /// Marker labels are positions in ID order, so everything after a newcomer moves down one.
    fn relabel_after(&self, canvas: &mut C, id: VehicleID) {
        for (idx, (other, entry)) in self.entries.iter().enumerate() {
            if *other <= id {
                continue;
            }
            if let Some(ref marker) = entry.marker {
                canvas.set_marker_label(marker, &(idx + 1).to_string());
            }
        }
    }

    /// Vehicles missing from this batch are left alone, markers included.
    pub fn refresh(&mut self, canvas: &mut C, vehicles: Vec<Vehicle>) {
        for vehicle in vehicles {
            self.materialize(canvas, vehicle);
        }
    }

    fn update(&mut self, canvas: &mut C, vehicle: Vehicle) {
        let id = vehicle.id;
        let number = self.entries.range(..id).count() + 1;
        let draggable = self.draggable;
        let entry = match self.entries.get_mut(&id) {
            Some(entry) => entry,
            None => return,
        };
        // Losing the location keeps the last known position on the map
        if let Some(pos) = vehicle.location() {
            match entry.marker {
                Some(ref marker) => {
                    canvas.move_marker(marker, pos);
                }
                // A vehicle that finally reports a location gets its marker now
                None => {
                    entry.marker = Some(canvas.add_marker(MarkerSpec {
                        pos,
                        title: vehicle.name.clone(),
                        label: number.to_string(),
                        draggable,
                    }));
                }
            }
        }
        entry.vehicle = vehicle;
    }

    /// Recenters on the vehicle if it has a location. Unknown vehicles deselect.
    pub fn select(&mut self, canvas: &mut C, id: Option<VehicleID>, recenter: bool) {
        self.selected = id.filter(|id| self.entries.contains_key(id));
        if !recenter {
            return;
        }
        if let Some(pos) = self
            .selected
            .and_then(|id| self.get(id))
            .and_then(|v| v.location())
        {
            canvas.center_on(pos);
        }
    }

    /// Only used in debug mode, when a marker is dragged by hand
    pub fn set_location(&mut self, canvas: &mut C, id: VehicleID, pos: LonLat) -> bool {
        let mut vehicle = match self.get(id) {
            Some(v) => v.clone(),
            None => return false,
        };
        vehicle.status.location = Some(Location::from(pos));
        self.update(canvas, vehicle);
        true
    }
}
