use anyhow::Result;
use geom::{Distance, LonLat};
use serde::{Deserialize, Deserializer, Serialize};

/// A named circle. The host stores these as a plain JSON array, so a geofence has no identity
/// of its own; the editor hands out `ZoneID`s instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub longitude: f64,
    /// In meters
    #[serde(deserialize_with = "lenient_f64")]
    pub radius: f64,
}

impl Geofence {
    pub fn new<S: Into<String>>(name: S, center: LonLat, radius: Distance) -> Self {
        let mut geofence = Self {
            name: name.into(),
            latitude: 0.0,
            longitude: 0.0,
            radius: 1.0,
        };
        geofence.set_center(center);
        geofence.set_radius(radius);
        geofence
    }

    pub fn center(&self) -> LonLat {
        LonLat::new(self.longitude, self.latitude)
    }

    pub fn radius(&self) -> Distance {
        Distance::meters(self.radius)
    }

    /// Dragging produces arbitrary precision; the host only ever stored 6 decimals.
    pub fn set_center(&mut self, center: LonLat) {
        self.latitude = round_degrees(center.y());
        self.longitude = round_degrees(center.x());
    }

    /// Rounded up to whole meters, never below 1m.
    pub fn set_radius(&mut self, radius: Distance) {
        self.radius = radius.inner_meters().ceil().max(1.0);
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radius > 0.0) {
            bail!("Geofence {} has a non-positive radius {}", self.name, self.radius);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            bail!("Geofence {} has a bad latitude {}", self.name, self.latitude);
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            bail!("Geofence {} has a bad longitude {}", self.name, self.longitude);
        }
        Ok(())
    }

    pub fn contains(&self, pos: LonLat) -> bool {
        self.center().gps_dist(pos).inner_meters() <= self.radius
    }

    pub fn info_lines(&self) -> Vec<String> {
        vec![
            format!("Geoloc: {},{}", self.latitude, self.longitude),
            format!("Radius: {}m", self.radius),
        ]
    }
}

fn round_degrees(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Older revisions of the map wrote coordinates back as strings, so accept both.
pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Number(x) => Ok(x),
        Raw::Text(x) => x.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_strings() {
        let geofences: Vec<Geofence> = serde_json::from_str(
            r#"[{"name":"Home","latitude":"48.850000","longitude":2.35,"radius":"500"}]"#,
        )
        .unwrap();
        assert_eq!(geofences[0].latitude, 48.85);
        assert_eq!(geofences[0].longitude, 2.35);
        assert_eq!(geofences[0].radius, 500.0);

        // But always written back as numbers
        let json = serde_json::to_string(&geofences).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"Home","latitude":48.85,"longitude":2.35,"radius":500.0}]"#
        );
    }

    #[test]
    fn rejects_garbage_coordinates() {
        let result: serde_json::Result<Geofence> = serde_json::from_str(
            r#"{"name":"Home","latitude":"north","longitude":2.35,"radius":500}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn drag_values_are_rounded() {
        assert_eq!(round_degrees(48.987654321), 48.987654);
        assert_eq!(round_degrees(2.1234567), 2.123457);

        let mut geofence = Geofence::new("Work", LonLat::new(2.35, 48.85), Distance::meters(120.2));
        assert_eq!(geofence.radius, 121.0);

        geofence.set_radius(Distance::meters(0.0));
        assert_eq!(geofence.radius, 1.0);
    }

    #[test]
    fn validation() {
        let mut geofence = Geofence::new("Home", LonLat::new(2.35, 48.85), Distance::meters(500.0));
        assert!(geofence.validate().is_ok());
        geofence.radius = 0.0;
        assert!(geofence.validate().is_err());
        geofence.radius = 10.0;
        geofence.latitude = 91.0;
        assert!(geofence.validate().is_err());
    }

    #[test]
    fn containment() {
        let geofence = Geofence::new("Home", LonLat::new(2.35, 48.85), Distance::meters(500.0));
        assert!(geofence.contains(LonLat::new(2.351, 48.851)));
        assert!(!geofence.contains(LonLat::new(2.36, 48.86)));
    }

    #[test]
    fn info_panel() {
        let geofence = Geofence::new("Home", LonLat::new(2.35, 48.85), Distance::meters(500.0));
        assert_eq!(
            geofence.info_lines(),
            vec!["Geoloc: 48.85,2.35".to_string(), "Radius: 500m".to_string()]
        );
    }
}
