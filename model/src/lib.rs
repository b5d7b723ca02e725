#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod canvas;
mod editor;
mod geofence;
mod session;
mod vehicle;
mod vehicles;
mod zones;

pub use self::canvas::{
    default_center, CircleSpec, Fill, MapCanvas, MarkerSpec, DEFAULT_ZOOM, STROKE_COLOR,
};
pub use self::editor::{Editor, EditorOptions, Prompt, SaveRequest};
pub use self::geofence::Geofence;
pub use self::session::{Mode, SaveOutcome};
pub use self::vehicle::{
    occupied_zones, split_zone_names, Location, NearestZone, Vehicle, VehicleID, VehicleStatus,
};
pub use self::vehicles::{VehicleEntry, VehicleRegistry};
pub use self::zones::{Zone, ZoneID, ZoneRegistry};
