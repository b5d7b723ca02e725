use std::collections::BTreeMap;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use geom::{Distance, LonLat};
use serde_json::json;

use model::{default_center, CircleSpec, Fill, MapCanvas, MarkerSpec, DEFAULT_ZOOM, STROKE_COLOR};

pub struct CircleHandle(usize);
pub struct MarkerHandle(usize);

struct DrawnCircle {
    center: LonLat,
    radius: Distance,
    label: String,
    fill: Fill,
    editable: bool,
}

struct DrawnMarker {
    pos: LonLat,
    title: String,
    label: String,
    draggable: bool,
}

/// Keeps the map as plain data and renders it to GeoJSON, which any web map can overlay.
pub struct GeoJsonCanvas {
    next_handle: usize,
    circles: BTreeMap<usize, DrawnCircle>,
    markers: BTreeMap<usize, DrawnMarker>,
    center: LonLat,
    zoom: u8,
}

impl GeoJsonCanvas {
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            circles: BTreeMap::new(),
            markers: BTreeMap::new(),
            center: default_center(),
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn num_circles(&self) -> usize {
        self.circles.len()
    }

    pub fn num_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn center(&self) -> LonLat {
        self.center
    }

    fn handle(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle
    }

    /// Circles first, then markers, each in creation order. The map view goes in a foreign
    /// member.
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut features = Vec::new();
        for circle in self.circles.values() {
            let mut props = JsonObject::new();
            props.insert("kind".to_string(), json!("zone"));
            props.insert("label".to_string(), json!(circle.label));
            props.insert("radius".to_string(), json!(circle.radius.inner_meters()));
            props.insert("fill".to_string(), json!(circle.fill.hex()));
            props.insert("stroke".to_string(), json!(STROKE_COLOR));
            props.insert("editable".to_string(), json!(circle.editable));
            features.push(point_feature(circle.center, props));
        }
        for marker in self.markers.values() {
            let mut props = JsonObject::new();
            props.insert("kind".to_string(), json!("vehicle"));
            props.insert("title".to_string(), json!(marker.title));
            props.insert("label".to_string(), json!(marker.label));
            props.insert("draggable".to_string(), json!(marker.draggable));
            features.push(point_feature(marker.pos, props));
        }

        let mut view = JsonObject::new();
        view.insert(
            "center".to_string(),
            json!([self.center.x(), self.center.y()]),
        );
        view.insert("zoom".to_string(), json!(self.zoom));
        let mut foreign_members = JsonObject::new();
        foreign_members.insert("view".to_string(), serde_json::Value::Object(view));

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }
}

fn point_feature(pos: LonLat, props: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![pos.x(), pos.y()]))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

impl MapCanvas for GeoJsonCanvas {
    type Circle = CircleHandle;
    type Marker = MarkerHandle;

    fn add_circle(&mut self, spec: CircleSpec) -> CircleHandle {
        let id = self.handle();
        self.circles.insert(
            id,
            DrawnCircle {
                center: spec.center,
                radius: spec.radius,
                label: spec.label,
                fill: spec.fill,
                editable: false,
            },
        );
        CircleHandle(id)
    }

    fn set_fill(&mut self, circle: &CircleHandle, fill: Fill) {
        if let Some(c) = self.circles.get_mut(&circle.0) {
            c.fill = fill;
        }
    }

    fn set_editable(&mut self, circle: &CircleHandle, editable: bool) {
        if let Some(c) = self.circles.get_mut(&circle.0) {
            c.editable = editable;
        }
    }

    fn set_label(&mut self, circle: &CircleHandle, label: &str) {
        if let Some(c) = self.circles.get_mut(&circle.0) {
            c.label = label.to_string();
        }
    }

    fn set_circle_geometry(&mut self, circle: &CircleHandle, center: LonLat, radius: Distance) {
        if let Some(c) = self.circles.get_mut(&circle.0) {
            c.center = center;
            c.radius = radius;
        }
    }

    fn remove_circle(&mut self, circle: CircleHandle) {
        self.circles.remove(&circle.0);
    }

    fn add_marker(&mut self, spec: MarkerSpec) -> MarkerHandle {
        let id = self.handle();
        self.markers.insert(
            id,
            DrawnMarker {
                pos: spec.pos,
                title: spec.title,
                label: spec.label,
                draggable: spec.draggable,
            },
        );
        MarkerHandle(id)
    }

    fn move_marker(&mut self, marker: &MarkerHandle, pos: LonLat) {
        if let Some(m) = self.markers.get_mut(&marker.0) {
            m.pos = pos;
        }
    }

    fn set_marker_label(&mut self, marker: &MarkerHandle, label: &str) {
        if let Some(m) = self.markers.get_mut(&marker.0) {
            m.label = label.to_string();
        }
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        self.markers.remove(&marker.0);
    }

    fn center_on(&mut self, pos: LonLat) {
        self.center = pos;
    }
}
