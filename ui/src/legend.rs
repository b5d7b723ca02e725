use abstutil::prettyprint_usize;

use model::{Editor, Fill, MapCanvas, Mode};

/// The two legends over the map: zones with the selected zone's details, then vehicles.
pub fn describe<C: MapCanvas>(editor: &Editor<C>) -> Vec<String> {
    let zones = editor.zones();
    let vehicles = editor.vehicles();

    let mut lines = vec![format!(
        "{} zones, {} vehicles",
        prettyprint_usize(zones.len()),
        prettyprint_usize(vehicles.len())
    )];
    lines.push(match editor.mode() {
        Mode::Idle => "Mode: idle".to_string(),
        Mode::Adding => "Mode: click the map to place a new zone".to_string(),
        Mode::Selected(id) => format!(
            "Mode: editing zone {}",
            zones.index_of(id).map(|idx| idx + 1).unwrap_or(0)
        ),
    });
    if editor.is_dirty() {
        lines.push("Unsaved changes".to_string());
    }
    if editor.save_in_flight() {
        lines.push("Saving...".to_string());
    }

    lines.push("Zones:".to_string());
    for ((id, _), label) in zones.iter().zip(zones.labels()) {
        let status = match zones.fill(id) {
            Some(Fill::Occupied) => "occupied",
            Some(Fill::Free) => "free",
            Some(Fill::Pending) | None => "pending",
        };
        lines.push(format!("  {label} ({status})"));
    }
    for line in editor.zone_infos() {
        lines.push(format!("    {line}"));
    }

    lines.push("Vehicles:".to_string());
    for (vehicle, label) in vehicles.iter().zip(vehicles.labels()) {
        let marker = if vehicle.status.location.is_some() {
            ""
        } else {
            " (no location)"
        };
        lines.push(format!("  {label} [id {}]{marker}", vehicle.id.0));
    }
    for line in editor.vehicle_infos() {
        lines.push(format!("    {line}"));
    }
    lines
}
