use std::collections::{BTreeMap, BTreeSet};

use geom::{Distance, LonLat};

use crate::canvas::{CircleSpec, Fill, MapCanvas};
use crate::Geofence;

/// Stable for the lifetime of one load. The host only knows geofences by position, so these
/// never leave the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneID(usize);

pub struct Zone<C: MapCanvas> {
    pub geofence: Geofence,
    fill: Fill,
    circle: C::Circle,
}

/// Owns every geofence along with its circle on the map. Nothing else touches the circles.
pub struct ZoneRegistry<C: MapCanvas> {
    zones: BTreeMap<ZoneID, Zone<C>>,
    // Display order, which is also the order saved back to the host
    order: Vec<ZoneID>,
    next_id: usize,
    selected: Option<ZoneID>,
}

impl<C: MapCanvas> ZoneRegistry<C> {
    pub fn new() -> Self {
        Self {
            zones: BTreeMap::new(),
            order: Vec::new(),
            next_id: 0,
            selected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn id_at(&self, idx: usize) -> Option<ZoneID> {
        self.order.get(idx).cloned()
    }

    pub fn index_of(&self, id: ZoneID) -> Option<usize> {
        self.order.iter().position(|x| *x == id)
    }

    pub fn get(&self, id: ZoneID) -> Option<&Geofence> {
        self.zones.get(&id).map(|z| &z.geofence)
    }

    pub fn fill(&self, id: ZoneID) -> Option<Fill> {
        self.zones.get(&id).map(|z| z.fill)
    }

    pub fn circle(&self, id: ZoneID) -> Option<&C::Circle> {
        self.zones.get(&id).map(|z| &z.circle)
    }

    pub fn selected(&self) -> Option<ZoneID> {
        self.selected
    }

    /// In display order
    pub fn iter(&self) -> impl Iterator<Item = (ZoneID, &Geofence)> {
        self.order.iter().map(move |id| (*id, &self.zones[id].geofence))
    }

    /// What the zone picker shows, like "1. Home"
    pub fn labels(&self) -> Vec<String> {
        self.iter()
            .enumerate()
            .map(|(idx, (_, geofence))| label(idx, geofence))
            .collect()
    }

    /// Release every circle and start over with these geofences.
    pub fn load(&mut self, canvas: &mut C, geofences: Vec<Geofence>) {
        self.clear(canvas);
        for geofence in geofences {
            self.add(canvas, geofence, Fill::Free);
        }
    }

    pub fn clear(&mut self, canvas: &mut C) {
        self.order.clear();
        self.selected = None;
        for (_, zone) in std::mem::take(&mut self.zones) {
            canvas.remove_circle(zone.circle);
        }
    }

    pub fn add(&mut self, canvas: &mut C, geofence: Geofence, fill: Fill) -> ZoneID {
        let idx = self.order.len();
        self.insert(canvas, idx, geofence, fill)
    }

    /// Everything at or after `idx` shifts down one place.
    pub fn insert(&mut self, canvas: &mut C, idx: usize, geofence: Geofence, fill: Fill) -> ZoneID {
        let idx = idx.min(self.order.len());
        let id = ZoneID(self.next_id);
        self.next_id += 1;

        let circle = canvas.add_circle(CircleSpec {
            center: geofence.center(),
            radius: geofence.radius(),
            label: label(idx, &geofence),
            fill,
        });
        self.zones.insert(
            id,
            Zone {
                geofence,
                fill,
                circle,
            },
        );
        self.order.insert(idx, id);
        self.relabel_from(canvas, idx + 1);
        id
    }

    /// False if the zone doesn't exist or already has this name.
    pub fn rename(&mut self, canvas: &mut C, id: ZoneID, name: String) -> bool {
        let (idx, zone) = match (self.index_of(id), self.zones.get_mut(&id)) {
            (Some(idx), Some(zone)) => (idx, zone),
            _ => return false,
        };
        if zone.geofence.name == name {
            return false;
        }
        zone.geofence.name = name;
        canvas.set_label(&zone.circle, &label(idx, &zone.geofence));
        true
    }

    /// Everything after the removed zone moves up one place, and its label is renumbered.
    pub fn remove(&mut self, canvas: &mut C, id: ZoneID) -> Option<Geofence> {
        let idx = self.index_of(id)?;
        self.order.remove(idx);
        let zone = self.zones.remove(&id)?;
        canvas.remove_circle(zone.circle);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.relabel_from(canvas, idx);
        Some(zone.geofence)
    }

    /// At most one circle is editable at a time. Selecting a zone that doesn't exist deselects.
    pub fn select(&mut self, canvas: &mut C, id: Option<ZoneID>) {
        self.selected = id.filter(|id| self.zones.contains_key(id));
        for (id, zone) in &self.zones {
            canvas.set_editable(&zone.circle, self.selected == Some(*id));
        }
    }

    pub fn move_center(&mut self, canvas: &mut C, id: ZoneID, center: LonLat) -> bool {
        match self.zones.get_mut(&id) {
            Some(zone) => {
                zone.geofence.set_center(center);
                canvas.set_circle_geometry(
                    &zone.circle,
                    zone.geofence.center(),
                    zone.geofence.radius(),
                );
                true
            }
            None => false,
        }
    }

    pub fn resize(&mut self, canvas: &mut C, id: ZoneID, radius: Distance) -> bool {
        match self.zones.get_mut(&id) {
            Some(zone) => {
                zone.geofence.set_radius(radius);
                canvas.set_circle_geometry(
                    &zone.circle,
                    zone.geofence.center(),
                    zone.geofence.radius(),
                );
                true
            }
            None => false,
        }
    }

    /// What gets sent to the host, in display order
    pub fn snapshot(&self) -> Vec<Geofence> {
        self.iter().map(|(_, geofence)| geofence.clone()).collect()
    }

    /// With unsaved edits, every zone is pending. Otherwise a zone is occupied if any vehicle
    /// reports being inside a zone with that name. Two zones sharing a name can't be told apart.
    pub fn recolor(&mut self, canvas: &mut C, dirty: bool, occupied: &BTreeSet<String>) {
        for zone in self.zones.values_mut() {
            let fill = if dirty {
                Fill::Pending
            } else if occupied.contains(&zone.geofence.name) {
                Fill::Occupied
            } else {
                Fill::Free
            };
            if zone.fill != fill {
                zone.fill = fill;
                canvas.set_fill(&zone.circle, fill);
            }
        }
    }

    fn relabel_from(&mut self, canvas: &mut C, start: usize) {
        for (idx, id) in self.order.iter().enumerate().skip(start) {
            let zone = &self.zones[id];
            canvas.set_label(&zone.circle, &label(idx, &zone.geofence));
        }
    }
}

fn label(idx: usize, geofence: &Geofence) -> String {
    format!("{}. {}", idx + 1, geofence.name)
}
