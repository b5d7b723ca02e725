use std::collections::BTreeSet;

use anyhow::Result;
use geom::{Distance, LonLat};

use crate::canvas::{default_center, Fill, MapCanvas};
use crate::session::{Mode, SaveOutcome, Session};
use crate::vehicle::occupied_zones;
use crate::{Geofence, Vehicle, VehicleID, VehicleRegistry, ZoneID, ZoneRegistry};

/// Asks the user things. The real map pops up dialogs; tests answer in advance.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
    /// None if the user cancels
    fn ask_name(&mut self, current: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct EditorOptions {
    /// The radius of zones created by clicking
    pub default_radius: Distance,
    /// Vehicle markers can be dragged to fake a location
    pub debug: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            default_radius: Distance::meters(200.0),
            debug: false,
        }
    }
}

/// Everything sent by one save
#[derive(Clone, Debug, PartialEq)]
pub struct SaveRequest {
    pub version: u64,
    pub geofences: Vec<Geofence>,
}

/// One map and all of its state. Gestures come in through methods here, and anything that
/// needs the host comes back out as a request for the caller to perform.
pub struct Editor<C: MapCanvas> {
    canvas: C,
    options: EditorOptions,
    zones: ZoneRegistry<C>,
    vehicles: VehicleRegistry<C>,
    session: Session,
    // From the latest vehicle fetch
    occupied: BTreeSet<String>,
    // Until the host's zones arrive, saving would overwrite them with nothing
    zones_ready: bool,
}

impl<C: MapCanvas> Editor<C> {
    pub fn new(canvas: C, options: EditorOptions) -> Self {
        let vehicles = VehicleRegistry::new(options.debug);
        Self {
            canvas,
            options,
            zones: ZoneRegistry::new(),
            vehicles,
            session: Session::new(),
            occupied: BTreeSet::new(),
            zones_ready: false,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn zones(&self) -> &ZoneRegistry<C> {
        &self.zones
    }

    pub fn vehicles(&self) -> &VehicleRegistry<C> {
        &self.vehicles
    }

    pub fn mode(&self) -> Mode {
        self.session.mode
    }

    pub fn is_dirty(&self) -> bool {
        self.session.is_dirty()
    }

    pub fn save_in_flight(&self) -> bool {
        self.session.save_in_flight()
    }

    /// False until zones load successfully, and again after any failed load
    pub fn zones_ready(&self) -> bool {
        self.zones_ready
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Replaces every zone. A failure leaves the map without zones; nothing retries.
    pub fn zones_loaded(&mut self, result: Result<Vec<Geofence>>) {
        self.zones_ready = result.is_ok();
        let geofences: Vec<Geofence> = match result {
            Ok(list) => list
                .into_iter()
                .filter(|g| match g.validate() {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("Skipping geofence: {}", err);
                        false
                    }
                })
                .collect(),
            Err(err) => {
                warn!("Couldn't load geofences: {}", err);
                Vec::new()
            }
        };
        info!("Loaded {} geofences", geofences.len());

        self.zones.load(&mut self.canvas, geofences);
        self.session.reset();
        // The first zone is the main one
        let center = self
            .zones
            .iter()
            .next()
            .map(|(_, g)| g.center())
            .unwrap_or_else(default_center);
        self.canvas.center_on(center);
        self.recolor();
    }

    /// The initial fetch. A failure shows no vehicles.
    pub fn vehicles_loaded(&mut self, result: Result<Vec<Vehicle>>) {
        match result {
            Ok(list) => {
                info!("Loaded {} vehicles", list.len());
                self.occupied = occupied_zones(&list);
                self.vehicles.load(&mut self.canvas, list);
                self.recolor();
            }
            Err(err) => {
                warn!("Couldn't load vehicles: {}", err);
            }
        }
    }

    /// A periodic fetch. A failure changes nothing.
    pub fn vehicles_refreshed(&mut self, result: Result<Vec<Vehicle>>) {
        match result {
            Ok(list) => {
                debug!("Refreshed {} vehicles", list.len());
                self.occupied = occupied_zones(&list);
                self.vehicles.refresh(&mut self.canvas, list);
                self.recolor();
            }
            Err(err) => {
                warn!("Couldn't refresh vehicles: {}", err);
            }
        }
    }

    fn recolor(&mut self) {
        self.zones
            .recolor(&mut self.canvas, self.session.is_dirty(), &self.occupied);
    }

    fn mark_dirty(&mut self) {
        self.session.mark_dirty();
        self.recolor();
    }

    pub fn zone_fills(&self) -> Vec<Fill> {
        self.zones
            .iter()
            .filter_map(|(id, _)| self.zones.fill(id))
            .collect()
    }

    /// Refused until the host's zones have loaded
    pub fn press_add(&mut self) -> bool {
        if !self.zones_ready {
            warn!("Can't add zones before the existing ones load");
            return false;
        }
        self.zones.select(&mut self.canvas, None);
        self.session.mode = Mode::Adding;
        true
    }

    pub fn cancel_add(&mut self) {
        if self.session.mode == Mode::Adding {
            self.session.mode = Mode::Idle;
        }
    }

    /// In add mode, creates a zone here and selects it. Otherwise clears every selection.
    pub fn click_map(&mut self, pos: LonLat) -> Option<ZoneID> {
        if self.session.mode != Mode::Adding {
            self.zones.select(&mut self.canvas, None);
            self.vehicles.select(&mut self.canvas, None, false);
            self.session.mode = Mode::Idle;
            return None;
        }

        let name = self.new_zone_name();
        info!("Adding zone {}", name);
        let geofence = Geofence::new(name, pos, self.options.default_radius);
        let id = self.zones.add(&mut self.canvas, geofence, Fill::Pending);
        self.mark_dirty();
        self.click_zone(id);
        Some(id)
    }

    fn new_zone_name(&self) -> String {
        let names: BTreeSet<&str> = self.zones.iter().map(|(_, g)| g.name.as_str()).collect();
        let mut n = self.zones.len() + 1;
        loop {
            let name = format!("Zone {}", n);
            if !names.contains(name.as_str()) {
                return name;
            }
            n += 1;
        }
    }

    pub fn click_zone(&mut self, id: ZoneID) {
        if self.zones.get(id).is_none() {
            return;
        }
        self.zones.select(&mut self.canvas, Some(id));
        self.session.mode = Mode::Selected(id);
    }

    /// From the zone picker, which also recenters the map
    pub fn pick_zone(&mut self, idx: usize) -> Option<ZoneID> {
        let id = self.zones.id_at(idx)?;
        let center = self.zones.get(id)?.center();
        self.canvas.center_on(center);
        self.click_zone(id);
        Some(id)
    }

    pub fn click_vehicle(&mut self, id: VehicleID) {
        self.cancel_add();
        self.vehicles.select(&mut self.canvas, Some(id), false);
    }

    /// From the vehicle picker, which also recenters the map
    pub fn pick_vehicle(&mut self, id: VehicleID) {
        self.cancel_add();
        self.vehicles.select(&mut self.canvas, Some(id), true);
    }

    pub fn selected_zone(&self) -> Option<ZoneID> {
        match self.session.mode {
            Mode::Selected(id) => Some(id),
            _ => None,
        }
    }

    pub fn zone_infos(&self) -> Vec<String> {
        self.selected_zone()
            .and_then(|id| self.zones.get(id))
            .map(|g| g.info_lines())
            .unwrap_or_default()
    }

    pub fn vehicle_infos(&self) -> Vec<String> {
        self.vehicles
            .selected()
            .and_then(|id| self.vehicles.get(id))
            .map(|v| v.info_lines())
            .unwrap_or_default()
    }

    /// False if nothing changed
    pub fn rename_zone(&mut self, idx: usize, prompt: &mut dyn Prompt) -> bool {
        let (id, current) = match self
            .zones
            .id_at(idx)
            .and_then(|id| self.zones.get(id).map(|g| (id, g.name.clone())))
        {
            Some(pair) => pair,
            None => return false,
        };
        let name = match prompt.ask_name(&current) {
            Some(name) => name.trim().to_string(),
            None => return false,
        };
        if name.is_empty() || !self.zones.rename(&mut self.canvas, id, name) {
            return false;
        }
        self.mark_dirty();
        true
    }

    /// Only after the user confirms
    pub fn remove_zone(&mut self, idx: usize, prompt: &mut dyn Prompt) -> Option<Geofence> {
        let id = self.zones.id_at(idx)?;
        let question = format!("Delete zone \"{}\"?", self.zones.get(id)?.name);
        if !prompt.confirm(&question) {
            return None;
        }
        let geofence = self.zones.remove(&mut self.canvas, id)?;
        if self.session.mode == Mode::Selected(id) {
            self.session.mode = Mode::Idle;
        }
        info!("Removed zone {}", geofence.name);
        self.mark_dirty();
        Some(geofence)
    }

    /// Each drag event commits immediately; only saving reaches the host.
    pub fn drag_zone_center(&mut self, id: ZoneID, pos: LonLat) -> bool {
        if !self.zones.move_center(&mut self.canvas, id, pos) {
            return false;
        }
        self.mark_dirty();
        true
    }

    pub fn drag_zone_radius(&mut self, id: ZoneID, radius: Distance) -> bool {
        if !self.zones.resize(&mut self.canvas, id, radius) {
            return false;
        }
        self.mark_dirty();
        true
    }

    /// Names of the zones covering a spot, computed locally. The host's answer only arrives with
    /// the next vehicle refresh.
    pub fn zones_at(&self, pos: LonLat) -> Vec<String> {
        self.zones
            .iter()
            .filter(|(_, g)| g.contains(pos))
            .map(|(_, g)| g.name.clone())
            .collect()
    }

    /// Debug mode only. The caller forwards the new location to the host.
    pub fn drag_vehicle(&mut self, id: VehicleID, pos: LonLat) -> Option<(VehicleID, LonLat)> {
        if !self.options.debug {
            return None;
        }
        if !self.vehicles.set_location(&mut self.canvas, id, pos) {
            return None;
        }
        Some((id, pos))
    }

    /// None if there's nothing to save, or if the host's zones never loaded. Also None if a save
    /// is already in flight; one more will be requested when it finishes.
    pub fn request_save(&mut self) -> Option<SaveRequest> {
        if !self.zones_ready {
            warn!("Not saving, since the zones from the host never loaded");
            return None;
        }
        if !self.is_dirty() {
            return None;
        }
        let version = self.session.begin_save()?;
        Some(SaveRequest {
            version,
            geofences: self.zones.snapshot(),
        })
    }

    /// The caller reloads zones from the host afterwards; the reload resets the session. Returns
    /// false if there was nothing to throw away.
    pub fn discard(&mut self) -> bool {
        self.cancel_add();
        // A follow-up save would send the discarded edits
        self.session.cancel_queued_save();
        if !self.is_dirty() {
            return false;
        }
        info!("Discarding unsaved zone edits");
        true
    }

    /// Dirty is only cleared here, and only if nothing changed since the save was sent. Might
    /// return the queued follow-up save.
    pub fn save_finished(&mut self, version: u64, result: Result<()>) -> Option<SaveRequest> {
        let ok = match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Saving geofences failed: {}", err);
                false
            }
        };
        let (outcome, resend) = self.session.finish_save(version, ok);
        if outcome == SaveOutcome::Clean {
            info!("Geofences saved");
            self.recolor();
        }
        if resend {
            self.request_save()
        } else {
            None
        }
    }
}
