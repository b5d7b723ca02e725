use std::collections::BTreeSet;

use geom::LonLat;
use serde::{Deserialize, Serialize};

use crate::geofence::lenient_f64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleID(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleID,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: VehicleStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Zone names joined by ';'
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones_in: Option<String>,
    /// "name;meters|name;meters", as computed by the plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub longitude: f64,
}

impl Location {
    pub fn to_lonlat(self) -> LonLat {
        LonLat::new(self.longitude, self.latitude)
    }
}

impl From<LonLat> for Location {
    fn from(pt: LonLat) -> Self {
        Self {
            latitude: pt.y(),
            longitude: pt.x(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NearestZone {
    pub name: String,
    pub meters: f64,
    pub inside: bool,
}

impl Vehicle {
    pub fn location(&self) -> Option<LonLat> {
        self.status.location.map(|loc| loc.to_lonlat())
    }

    pub fn zones_in(&self) -> BTreeSet<String> {
        match self.status.zones_in {
            Some(ref raw) => split_zone_names(raw),
            None => BTreeSet::new(),
        }
    }

    /// Malformed entries are skipped.
    pub fn nearest_zone(&self) -> Option<NearestZone> {
        let raw = self.status.distances.as_ref()?;
        let zones_in = self.zones_in();
        let mut best: Option<NearestZone> = None;
        for entry in raw.split('|') {
            let mut parts = entry.split(';');
            let (name, meters) = match (parts.next(), parts.next()) {
                (Some(name), Some(meters)) => (name, meters),
                _ => continue,
            };
            let meters: i64 = match meters.trim().parse() {
                Ok(x) => x,
                Err(_) => continue,
            };
            let meters = meters as f64;
            if best.as_ref().map(|b| meters < b.meters).unwrap_or(true) {
                best = Some(NearestZone {
                    name: name.to_string(),
                    meters,
                    inside: zones_in.contains(name),
                });
            }
        }
        best
    }

    pub fn info_lines(&self) -> Vec<String> {
        let mut lines = vec![match self.status.location {
            Some(loc) => format!("Geoloc: {},{}", loc.latitude, loc.longitude),
            None => "Geoloc: no location".to_string(),
        }];
        if let Some(nearest) = self.nearest_zone() {
            if nearest.inside {
                lines.push(format!("In zone: {}", nearest.name));
            } else {
                lines.push(format!(
                    "Nearest zone: {} ({}m)",
                    nearest.name, nearest.meters
                ));
            }
        }
        lines
    }
}

pub fn split_zone_names(raw: &str) -> BTreeSet<String> {
    raw.split(';')
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .collect()
}

/// Every zone name that at least one vehicle reports being inside
pub fn occupied_zones<'a, I: IntoIterator<Item = &'a Vehicle>>(vehicles: I) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for vehicle in vehicles {
        names.extend(vehicle.zones_in());
    }
    names
}
