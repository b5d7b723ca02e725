//! Talks to the home automation host, which owns the geofences and relays vehicles from the
//! telematics cloud.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod http;

use anyhow::Result;
use geom::LonLat;
use serde::de::DeserializeOwned;

use model::{Geofence, Vehicle, VehicleID};

pub use self::http::HttpGateway;

#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn get_geofences(&self) -> Result<Vec<Geofence>>;
    /// The host's acknowledgement carries nothing useful, so only failure matters.
    async fn set_geofences(&self, geofences: &[Geofence]) -> Result<()>;
    /// Sorted by ID
    async fn get_vehicles(&self) -> Result<Vec<Vehicle>>;
    /// Only for debugging; the host pretends the vehicle moved here.
    async fn set_vehicle_location(&self, id: VehicleID, pos: LonLat) -> Result<()>;
}

/// Anything besides a JSON array is treated like a network failure.
pub fn parse_array<T: DeserializeOwned>(what: &str, body: &str) -> Result<Vec<T>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| anyhow!("{} response isn't JSON: {}", what, err))?;
    if !value.is_array() {
        bail!("{} response isn't an array: {}", what, abbreviate(body));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn parse_vehicles(body: &str) -> Result<Vec<Vehicle>> {
    let mut vehicles: Vec<Vehicle> = parse_array("vehicles", body)?;
    vehicles.sort_by_key(|v| v.id);
    Ok(vehicles)
}

fn abbreviate(body: &str) -> String {
    let mut out: String = body.chars().take(80).collect();
    if out.len() < body.len() {
        out.push_str("...");
    }
    out
}
