use std::time::Duration;

use anyhow::Result;
use geom::{Distance, LonLat};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::spawn_local;

use gateway::Gateway;
use model::{Editor, Geofence, MapCanvas, Prompt, SaveRequest, Vehicle};

use crate::commands::{Command, HELP};
use crate::legend;

pub enum Event {
    Command(Command),
    ZonesLoaded {
        result: Result<Vec<Geofence>>,
        initial: bool,
    },
    VehiclesLoaded(Result<Vec<Vehicle>>),
    VehiclesRefreshed(Result<Vec<Vehicle>>),
    PollDue,
    Saved {
        version: u64,
        result: Result<()>,
    },
    LocationSent(Result<()>),
}

/// Decides when to refresh vehicles next. A failure never stops polling; it just backs off.
pub struct Poller {
    interval: Duration,
    max_backoff: Duration,
    failures: u32,
}

impl Poller {
    pub fn new(interval: Duration, max_backoff: Duration) -> Self {
        Self {
            interval,
            max_backoff: max_backoff.max(interval),
            failures: 0,
        }
    }

    pub fn next_delay(&mut self, ok: bool) -> Duration {
        if ok {
            self.failures = 0;
            return self.interval;
        }
        self.failures = self.failures.saturating_add(1);
        let factor = 2u32.saturating_pow(self.failures.min(16));
        self.interval
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Where the lines printed for the user go
pub trait Output<C: MapCanvas> {
    fn show(&mut self, lines: Vec<String>);
    /// After anything on the map might have changed
    fn map_changed(&mut self, _editor: &Editor<C>) {}
}

/// Drives one editor on a single thread. Every network call runs as a local task that reports
/// back through the event channel, so state is only ever touched here, between awaits.
pub struct Runtime<G, C: MapCanvas, O> {
    gateway: G,
    editor: Editor<C>,
    output: O,
    poller: Poller,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    // Waiting for yes/no
    pending_removal: Option<usize>,
    // A discard arrived while a save was in flight. Reloading before it lands would show a copy
    // the save is about to overwrite.
    reload_after_save: bool,
}

impl<G, C, O> Runtime<G, C, O>
where
    G: Gateway + Clone + 'static,
    C: MapCanvas,
    O: Output<C>,
{
    pub fn new(gateway: G, editor: Editor<C>, output: O, poller: Poller) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            gateway,
            editor,
            output,
            poller,
            tx,
            rx,
            pending_removal: None,
            reload_after_save: false,
        }
    }

    /// For feeding in commands
    pub fn sender(&self) -> UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Must run inside a `LocalSet`. Returns the editor after `Command::Quit`.
    pub async fn run(mut self) -> (Editor<C>, O) {
        self.load_zones(true);

        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Command(Command::Quit) => {
                    if self.editor.is_dirty() {
                        warn!("Quitting with unsaved changes");
                    }
                    break;
                }
                Event::Command(cmd) => {
                    self.handle_command(cmd);
                }
                Event::ZonesLoaded { result, initial } => {
                    self.editor.zones_loaded(result);
                    self.pending_removal = None;
                    if initial {
                        self.load_vehicles();
                    }
                }
                Event::VehiclesLoaded(result) => {
                    let ok = result.is_ok();
                    self.editor.vehicles_loaded(result);
                    self.schedule_poll(ok);
                }
                Event::PollDue => {
                    self.refresh_vehicles();
                    continue;
                }
                Event::VehiclesRefreshed(result) => {
                    let ok = result.is_ok();
                    self.editor.vehicles_refreshed(result);
                    // Only now is the next refresh armed, so two are never in flight
                    self.schedule_poll(ok);
                }
                Event::Saved { version, result } => {
                    if let Some(req) = self.editor.save_finished(version, result) {
                        self.save(req);
                    } else if self.reload_after_save && !self.editor.save_in_flight() {
                        self.reload_after_save = false;
                        self.load_zones(false);
                    }
                }
                Event::LocationSent(result) => {
                    if let Err(err) = result {
                        warn!("Couldn't send the vehicle location: {}", err);
                    }
                    continue;
                }
            }
            self.output.map_changed(&self.editor);
        }

        (self.editor, self.output)
    }

    fn handle_command(&mut self, cmd: Command) {
        if let Some(idx) = self.pending_removal.take() {
            match cmd {
                Command::Yes => {
                    self.editor.remove_zone(idx, &mut Answer::yes());
                    return;
                }
                Command::No => {
                    return;
                }
                // Anything else means no
                _ => {}
            }
        }

        match cmd {
            Command::Add => {
                if !self.editor.press_add() {
                    self.output
                        .show(vec!["The zones haven't loaded, so none can be added".to_string()]);
                }
            }
            Command::Cancel => {
                self.editor.cancel_add();
            }
            Command::Click { lat, lon } => {
                self.editor.click_map(LonLat::new(lon, lat));
            }
            Command::Zone(idx) => {
                if self.editor.pick_zone(idx).is_none() {
                    self.output.show(vec![format!("There's no zone {}", idx + 1)]);
                    return;
                }
                self.output.show(self.editor.zone_infos());
            }
            Command::Vehicle(id) => {
                if self.editor.vehicles().get(id).is_none() {
                    self.output.show(vec![format!("There's no vehicle {}", id.0)]);
                    return;
                }
                self.editor.pick_vehicle(id);
                self.output.show(self.editor.vehicle_infos());
            }
            Command::Rename(idx, name) => {
                self.editor.rename_zone(
                    idx,
                    &mut Answer {
                        confirm: true,
                        name,
                    },
                );
            }
            Command::Remove(idx) => {
                let mut ask = Deferred::new();
                self.editor.remove_zone(idx, &mut ask);
                if let Some(question) = ask.asked {
                    self.output.show(vec![format!("{} (yes/no)", question)]);
                    self.pending_removal = Some(idx);
                } else {
                    self.output.show(vec![format!("There's no zone {}", idx + 1)]);
                }
            }
            Command::Yes | Command::No => {}
            Command::Drag { zone, lat, lon } => {
                if let Some(id) = self.editor.zones().id_at(zone) {
                    self.editor.drag_zone_center(id, LonLat::new(lon, lat));
                }
            }
            Command::Radius { zone, meters } => {
                if let Some(id) = self.editor.zones().id_at(zone) {
                    self.editor.drag_zone_radius(id, Distance::meters(meters));
                }
            }
            Command::MoveVehicle { id, lat, lon } => {
                match self.editor.drag_vehicle(id, LonLat::new(lon, lat)) {
                    Some((id, pos)) => {
                        let inside = self.editor.zones_at(pos);
                        self.output.show(vec![if inside.is_empty() {
                            format!("Vehicle {} is outside every zone", id.0)
                        } else {
                            format!("Vehicle {} is inside {}", id.0, inside.join(", "))
                        }]);
                        let gateway = self.gateway.clone();
                        let tx = self.tx.clone();
                        spawn_local(async move {
                            let result = gateway.set_vehicle_location(id, pos).await;
                            let _ = tx.send(Event::LocationSent(result));
                        });
                    }
                    None => {
                        self.output
                            .show(vec!["Vehicles can only be moved in debug mode".to_string()]);
                    }
                }
            }
            Command::Save => {
                if self.reload_after_save {
                    self.output
                        .show(vec!["Edits were discarded; waiting to reload".to_string()]);
                    return;
                }
                if !self.editor.zones_ready() {
                    self.output
                        .show(vec!["The zones haven't loaded, so nothing is saved".to_string()]);
                    return;
                }
                if let Some(req) = self.editor.request_save() {
                    self.save(req);
                }
            }
            Command::Discard => {
                self.editor.discard();
                if self.editor.save_in_flight() {
                    self.output
                        .show(vec!["Reloading once the save in flight finishes".to_string()]);
                    self.reload_after_save = true;
                } else {
                    self.load_zones(false);
                }
            }
            Command::Show => {
                self.output.show(legend::describe(&self.editor));
            }
            Command::Help => {
                self.output
                    .show(HELP.lines().map(|line| line.to_string()).collect());
            }
            // Handled by the loop
            Command::Quit => {}
        }
    }

    fn load_zones(&self, initial: bool) {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        spawn_local(async move {
            let result = gateway.get_geofences().await;
            let _ = tx.send(Event::ZonesLoaded { result, initial });
        });
    }

    fn load_vehicles(&self) {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        spawn_local(async move {
            let result = gateway.get_vehicles().await;
            let _ = tx.send(Event::VehiclesLoaded(result));
        });
    }

    fn refresh_vehicles(&self) {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        spawn_local(async move {
            let result = gateway.get_vehicles().await;
            let _ = tx.send(Event::VehiclesRefreshed(result));
        });
    }

    fn schedule_poll(&mut self, ok: bool) {
        let delay = self.poller.next_delay(ok);
        debug!("Next vehicle refresh in {:?}", delay);
        let tx = self.tx.clone();
        spawn_local(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::PollDue);
        });
    }

    fn save(&self, req: SaveRequest) {
        info!("Saving {} geofences", req.geofences.len());
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        spawn_local(async move {
            let result = gateway.set_geofences(&req.geofences).await;
            let _ = tx.send(Event::Saved {
                version: req.version,
                result,
            });
        });
    }
}

/// Answers prepared before asking
struct Answer {
    confirm: bool,
    name: Option<String>,
}

/// Declines, but remembers the question so it can be asked for real
struct Deferred {
    asked: Option<String>,
}

impl Answer {
    fn yes() -> Self {
        Self {
            confirm: true,
            name: None,
        }
    }
}

impl Deferred {
    fn new() -> Self {
        Self { asked: None }
    }
}

impl Prompt for Answer {
    fn confirm(&mut self, _: &str) -> bool {
        self.confirm
    }

    fn ask_name(&mut self, _: &str) -> Option<String> {
        self.name.take()
    }
}

impl Prompt for Deferred {
    fn confirm(&mut self, question: &str) -> bool {
        self.asked = Some(question.to_string());
        false
    }

    fn ask_name(&mut self, _: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tokio::task::LocalSet;

    use super::*;
    use crate::GeoJsonCanvas;
    use model::{EditorOptions, Fill, Location, VehicleID, VehicleStatus};

    #[derive(Default)]
    struct FakeHost {
        geofences: Vec<Geofence>,
        vehicles: Vec<Vehicle>,
        saves: Vec<Vec<Geofence>>,
        vehicle_calls: usize,
        fail_vehicle_calls: usize,
        vehicle_latency: Option<Duration>,
        in_flight: usize,
        max_in_flight: usize,
        locations: Vec<(VehicleID, f64, f64)>,
        fail_geofence_loads: usize,
        save_latency: Option<Duration>,
        // "load" and "save", in the order the host handled them
        calls: Vec<&'static str>,
    }

    #[derive(Clone, Default)]
    struct FakeGateway(Rc<RefCell<FakeHost>>);

    impl Gateway for FakeGateway {
        async fn get_geofences(&self) -> Result<Vec<Geofence>> {
            let mut host = self.0.borrow_mut();
            host.calls.push("load");
            if host.fail_geofence_loads > 0 {
                host.fail_geofence_loads -= 1;
                bail!("not an array");
            }
            Ok(host.geofences.clone())
        }

        async fn set_geofences(&self, geofences: &[Geofence]) -> Result<()> {
            let latency = self.0.borrow().save_latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let mut host = self.0.borrow_mut();
            host.calls.push("save");
            host.saves.push(geofences.to_vec());
            host.geofences = geofences.to_vec();
            Ok(())
        }

        async fn get_vehicles(&self) -> Result<Vec<Vehicle>> {
            let latency = {
                let mut host = self.0.borrow_mut();
                host.vehicle_calls += 1;
                host.in_flight += 1;
                host.max_in_flight = host.max_in_flight.max(host.in_flight);
                host.vehicle_latency
            };
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let mut host = self.0.borrow_mut();
            host.in_flight -= 1;
            if host.fail_vehicle_calls > 0 {
                host.fail_vehicle_calls -= 1;
                bail!("connection refused");
            }
            Ok(host.vehicles.clone())
        }

        async fn set_vehicle_location(&self, id: VehicleID, pos: LonLat) -> Result<()> {
            self.0.borrow_mut().locations.push((id, pos.y(), pos.x()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Captured {
        lines: Vec<String>,
        map_changes: usize,
    }

    impl Output<GeoJsonCanvas> for Captured {
        fn show(&mut self, lines: Vec<String>) {
            self.lines.extend(lines);
        }

        fn map_changed(&mut self, _: &Editor<GeoJsonCanvas>) {
            self.map_changes += 1;
        }
    }

    fn home() -> Geofence {
        Geofence {
            name: "Home".to_string(),
            latitude: 48.85,
            longitude: 2.35,
            radius: 500.0,
        }
    }

    fn vehicle(id: u64, zones_in: &str) -> Vehicle {
        Vehicle {
            id: VehicleID(id),
            name: format!("Car {}", id),
            status: VehicleStatus {
                location: Some(Location {
                    latitude: 48.85,
                    longitude: 2.35,
                }),
                zones_in: Some(zones_in.to_string()),
                distances: None,
            },
        }
    }

    fn runtime(
        gateway: FakeGateway,
        options: EditorOptions,
        interval_secs: u64,
        max_backoff_secs: u64,
    ) -> Runtime<FakeGateway, GeoJsonCanvas, Captured> {
        Runtime::new(
            gateway,
            Editor::new(GeoJsonCanvas::new(), options),
            Captured::default(),
            Poller::new(
                Duration::from_secs(interval_secs),
                Duration::from_secs(max_backoff_secs),
            ),
        )
    }

    /// Sends commands once everything already in motion has settled
    fn script(tx: UnboundedSender<Event>, after: Duration, commands: Vec<&str>) {
        let commands: Vec<Command> = commands
            .into_iter()
            .map(|line| Command::parse(line).unwrap())
            .collect();
        spawn_local(async move {
            tokio::time::sleep(after).await;
            for cmd in commands {
                let _ = tx.send(Event::Command(cmd));
            }
        });
    }

    #[test]
    fn backoff() {
        let mut poller = Poller::new(Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(poller.next_delay(true), Duration::from_secs(10));
        assert_eq!(poller.next_delay(false), Duration::from_secs(20));
        assert_eq!(poller.next_delay(false), Duration::from_secs(40));
        assert_eq!(poller.next_delay(false), Duration::from_secs(60));
        for _ in 0..100 {
            assert_eq!(poller.next_delay(false), Duration::from_secs(60));
        }
        assert_eq!(poller.next_delay(true), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn add_and_save() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().geofences = vec![home()];
        gateway.0.borrow_mut().vehicles = vec![vehicle(1, "Home"), vehicle(2, "")];

        let local = LocalSet::new();
        let (editor, output) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                let tx = rt.sender();
                script(
                    tx.clone(),
                    Duration::from_secs(1),
                    vec!["add", "click 48.86 2.36", "save", "show"],
                );
                script(tx, Duration::from_secs(2), vec!["quit"]);
                rt.run().await
            })
            .await;

        let host = gateway.0.borrow();
        assert_eq!(host.saves.len(), 1);
        assert_eq!(host.saves[0].len(), 2);
        assert_eq!(host.saves[0][0], home());
        assert_eq!(host.saves[0][1].latitude, 48.86);
        assert_eq!(host.saves[0][1].radius, 200.0);

        assert_eq!(editor.zones().len(), 2);
        assert!(!editor.is_dirty());
        assert_eq!(editor.zone_fills(), vec![Fill::Occupied, Fill::Free]);
        assert_eq!(editor.canvas().num_markers(), 2);
        assert!(output.map_changes > 0);
        // "show" ran before the save finished
        assert!(output.lines.contains(&"Unsaved changes".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_asks_first() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().geofences = vec![
            Geofence {
                name: "A".to_string(),
                ..home()
            },
            Geofence {
                name: "B".to_string(),
                ..home()
            },
            Geofence {
                name: "C".to_string(),
                ..home()
            },
        ];

        let local = LocalSet::new();
        let (editor, output) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                script(
                    rt.sender(),
                    Duration::from_secs(1),
                    vec!["remove 2", "no", "remove 1", "yes", "quit"],
                );
                rt.run().await
            })
            .await;

        assert_eq!(editor.zones().labels(), vec!["1. B", "2. C"]);
        assert!(editor.is_dirty());
        assert!(output
            .lines
            .contains(&"Delete zone \"B\"? (yes/no)".to_string()));
        assert!(gateway.0.borrow().saves.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn discard_reloads() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().geofences = vec![home()];

        let local = LocalSet::new();
        let (editor, _) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                let tx = rt.sender();
                script(
                    tx.clone(),
                    Duration::from_secs(1),
                    vec!["radius 1 900", "rename 1 Maison", "discard"],
                );
                script(tx, Duration::from_secs(2), vec!["quit"]);
                rt.run().await
            })
            .await;

        assert!(!editor.is_dirty());
        assert_eq!(editor.zones().snapshot(), vec![home()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_never_overwrites_the_host() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().geofences = vec![home()];
        gateway.0.borrow_mut().fail_geofence_loads = 1;

        let local = LocalSet::new();
        let (editor, output) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                let tx = rt.sender();
                script(
                    tx.clone(),
                    Duration::from_secs(1),
                    vec!["add", "click 48.86 2.36", "save"],
                );
                script(tx, Duration::from_secs(2), vec!["quit"]);
                rt.run().await
            })
            .await;

        let host = gateway.0.borrow();
        assert!(host.saves.is_empty());
        assert_eq!(host.geofences, vec![home()]);
        assert!(editor.zones().is_empty());
        assert!(!editor.is_dirty());
        assert!(output
            .lines
            .contains(&"The zones haven't loaded, so nothing is saved".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn discard_waits_for_the_save_in_flight() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().geofences = vec![home()];
        gateway.0.borrow_mut().save_latency = Some(Duration::from_secs(5));

        let local = LocalSet::new();
        let (editor, output) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                let tx = rt.sender();
                script(
                    tx.clone(),
                    Duration::from_secs(1),
                    vec!["radius 1 900", "save", "discard", "save"],
                );
                script(tx, Duration::from_secs(10), vec!["quit"]);
                rt.run().await
            })
            .await;

        let host = gateway.0.borrow();
        // The reload only happens once the save has landed, so the map shows what the host has
        assert_eq!(host.calls, vec!["load", "save", "load"]);
        assert_eq!(host.saves.len(), 1);
        assert!(!editor.is_dirty());
        assert!(!editor.save_in_flight());
        assert_eq!(editor.zones().snapshot(), host.geofences);
        assert_eq!(editor.zones().snapshot()[0].radius, 900.0);
        assert!(output
            .lines
            .contains(&"Reloading once the save in flight finishes".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_survives_failures() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().vehicles = vec![vehicle(1, "")];
        // The initial load and the first refresh fail
        gateway.0.borrow_mut().fail_vehicle_calls = 2;

        let local = LocalSet::new();
        let (editor, _) = local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 10);
                script(rt.sender(), Duration::from_secs(45), vec!["quit"]);
                rt.run().await
            })
            .await;

        // Calls at 0, 10, 20, 30, 40
        assert_eq!(gateway.0.borrow().vehicle_calls, 5);
        assert_eq!(editor.vehicles().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_never_overlap() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().vehicles = vec![vehicle(1, "")];
        gateway.0.borrow_mut().vehicle_latency = Some(Duration::from_secs(15));

        let local = LocalSet::new();
        local
            .run_until(async {
                let rt = runtime(gateway.clone(), EditorOptions::default(), 10, 300);
                script(rt.sender(), Duration::from_secs(95), vec!["quit"]);
                rt.run().await
            })
            .await;

        let host = gateway.0.borrow();
        assert_eq!(host.max_in_flight, 1);
        // Each cycle is the latency plus the interval: calls start at 0, 25, 50, 75
        assert_eq!(host.vehicle_calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn debug_vehicle_moves_reach_the_host() {
        let gateway = FakeGateway::default();
        gateway.0.borrow_mut().vehicles = vec![vehicle(3, "")];

        let local = LocalSet::new();
        local
            .run_until(async {
                let rt = runtime(
                    gateway.clone(),
                    EditorOptions {
                        debug: true,
                        ..Default::default()
                    },
                    10,
                    300,
                );
                let tx = rt.sender();
                script(
                    tx.clone(),
                    Duration::from_secs(1),
                    vec!["move-vehicle 3 48.5 2.5"],
                );
                script(tx, Duration::from_secs(2), vec!["quit"]);
                rt.run().await
            })
            .await;

        assert_eq!(
            gateway.0.borrow().locations,
            vec![(VehicleID(3), 48.5, 2.5)]
        );
    }
}
