use geom::{Distance, LonLat};

/// Where the map opens when there are no zones yet
pub fn default_center() -> LonLat {
    LonLat::new(26.500353, 66.624447)
}

pub const DEFAULT_ZOOM: u8 = 12;

pub const STROKE_COLOR: &str = "#AAAAAA";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// No vehicle is inside
    Free,
    /// At least one vehicle reports being inside
    Occupied,
    /// There are unsaved edits, so occupancy isn't meaningful
    Pending,
}

impl Fill {
    pub fn hex(self) -> &'static str {
        match self {
            Fill::Free => "#00FF00",
            Fill::Occupied => "#FF0000",
            Fill::Pending => "#AAAAAA",
        }
    }
}

pub struct CircleSpec {
    pub center: LonLat,
    pub radius: Distance,
    pub label: String,
    pub fill: Fill,
}

pub struct MarkerSpec {
    pub pos: LonLat,
    pub title: String,
    pub label: String,
    pub draggable: bool,
}

/// The map library. Handles are owned by exactly one registry entry and given back when the
/// entry is destroyed, so they deliberately aren't `Clone`.
pub trait MapCanvas {
    type Circle;
    type Marker;

    fn add_circle(&mut self, spec: CircleSpec) -> Self::Circle;
    fn set_fill(&mut self, circle: &Self::Circle, fill: Fill);
    /// Editable circles show drag handles for the center and radius.
    fn set_editable(&mut self, circle: &Self::Circle, editable: bool);
    fn set_label(&mut self, circle: &Self::Circle, label: &str);
    fn set_circle_geometry(&mut self, circle: &Self::Circle, center: LonLat, radius: Distance);
    fn remove_circle(&mut self, circle: Self::Circle);

    fn add_marker(&mut self, spec: MarkerSpec) -> Self::Marker;
    fn move_marker(&mut self, marker: &Self::Marker, pos: LonLat);
    fn set_marker_label(&mut self, marker: &Self::Marker, label: &str);
    fn remove_marker(&mut self, marker: Self::Marker);

    fn center_on(&mut self, pos: LonLat);
}

#[cfg(test)]
pub mod recording {
    use std::collections::BTreeMap;

    use super::*;

    /// Handles are just numbers, so tests can check identity
    #[derive(Debug, PartialEq, Eq)]
    pub struct Handle(pub usize);

    pub struct RecordedCircle {
        pub lat: f64,
        pub lon: f64,
        pub radius: f64,
        pub label: String,
        pub fill: Fill,
        pub editable: bool,
    }

    pub struct RecordedMarker {
        pub lat: f64,
        pub lon: f64,
        pub label: String,
        pub draggable: bool,
    }

    #[derive(Default)]
    pub struct RecordingCanvas {
        next_handle: usize,
        pub circles: BTreeMap<usize, RecordedCircle>,
        pub markers: BTreeMap<usize, RecordedMarker>,
        pub center: Option<(f64, f64)>,
    }

    impl RecordingCanvas {
        fn handle(&mut self) -> usize {
            self.next_handle += 1;
            self.next_handle
        }

        pub fn labels(&self) -> Vec<String> {
            self.circles.values().map(|c| c.label.clone()).collect()
        }
    }

    impl MapCanvas for RecordingCanvas {
        type Circle = Handle;
        type Marker = Handle;

        fn add_circle(&mut self, spec: CircleSpec) -> Handle {
            let id = self.handle();
            self.circles.insert(
                id,
                RecordedCircle {
                    lat: spec.center.y(),
                    lon: spec.center.x(),
                    radius: spec.radius.inner_meters(),
                    label: spec.label,
                    fill: spec.fill,
                    editable: false,
                },
            );
            Handle(id)
        }

        fn set_fill(&mut self, circle: &Handle, fill: Fill) {
            self.circles.get_mut(&circle.0).unwrap().fill = fill;
        }

        fn set_editable(&mut self, circle: &Handle, editable: bool) {
            self.circles.get_mut(&circle.0).unwrap().editable = editable;
        }

        fn set_label(&mut self, circle: &Handle, label: &str) {
            self.circles.get_mut(&circle.0).unwrap().label = label.to_string();
        }

        fn set_circle_geometry(&mut self, circle: &Handle, center: LonLat, radius: Distance) {
            let c = self.circles.get_mut(&circle.0).unwrap();
            c.lat = center.y();
            c.lon = center.x();
            c.radius = radius.inner_meters();
        }

        fn remove_circle(&mut self, circle: Handle) {
            self.circles.remove(&circle.0).unwrap();
        }

        fn add_marker(&mut self, spec: MarkerSpec) -> Handle {
            let id = self.handle();
            self.markers.insert(
                id,
                RecordedMarker {
                    lat: spec.pos.y(),
                    lon: spec.pos.x(),
                    label: spec.label,
                    draggable: spec.draggable,
                },
            );
            Handle(id)
        }

        fn move_marker(&mut self, marker: &Handle, pos: LonLat) {
            let m = self.markers.get_mut(&marker.0).unwrap();
            m.lat = pos.y();
            m.lon = pos.x();
        }

        fn set_marker_label(&mut self, marker: &Handle, label: &str) {
            self.markers.get_mut(&marker.0).unwrap().label = label.to_string();
        }

        fn remove_marker(&mut self, marker: Handle) {
            self.markers.remove(&marker.0).unwrap();
        }

        fn center_on(&mut self, pos: LonLat) {
            self.center = Some((pos.y(), pos.x()));
        }
    }
}
