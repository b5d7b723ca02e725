use anyhow::Result;

use model::VehicleID;

/// One line typed by the user. These stand in for clicks and drags on a real map. Zones are
/// numbered from 1, like the picker shows them.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Add,
    Cancel,
    Click { lat: f64, lon: f64 },
    Zone(usize),
    Vehicle(VehicleID),
    Rename(usize, Option<String>),
    Remove(usize),
    Yes,
    No,
    Drag { zone: usize, lat: f64, lon: f64 },
    Radius { zone: usize, meters: f64 },
    MoveVehicle { id: VehicleID, lat: f64, lon: f64 },
    Save,
    Discard,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
add                       start adding a zone; the next click places it
cancel                    stop adding
click LAT LON             click on the map
zone N                    pick zone N
vehicle ID                pick a vehicle
rename N [NAME]           rename zone N; without a name, cancels
remove N                  delete zone N, after confirming with yes/no
drag N LAT LON            move the center of zone N
radius N METERS           resize zone N
move-vehicle ID LAT LON   fake a vehicle location (debug only)
save                      send all zones to the host
discard                   throw away unsaved edits
show                      print the legend
quit";

impl Command {
    pub fn parse(line: &str) -> Result<Command> {
        let mut words = line.split_whitespace();
        let verb = match words.next() {
            Some(verb) => verb.to_lowercase(),
            None => bail!("Empty command"),
        };
        let rest: Vec<&str> = words.collect();

        let cmd = match verb.as_str() {
            "add" => Command::Add,
            "cancel" => Command::Cancel,
            "click" => {
                let (lat, lon) = coords(&rest, 0)?;
                Command::Click { lat, lon }
            }
            "zone" => Command::Zone(zone_number(&rest)?),
            "vehicle" => Command::Vehicle(VehicleID(number(&rest, 0, "vehicle ID")?)),
            "rename" => {
                let zone = zone_number(&rest)?;
                let name = rest[1..].join(" ");
                Command::Rename(zone, if name.is_empty() { None } else { Some(name) })
            }
            "remove" | "delete" => Command::Remove(zone_number(&rest)?),
            "yes" | "y" => Command::Yes,
            "no" | "n" => Command::No,
            "drag" => {
                let zone = zone_number(&rest)?;
                let (lat, lon) = coords(&rest, 1)?;
                Command::Drag { zone, lat, lon }
            }
            "radius" => {
                let zone = zone_number(&rest)?;
                let meters: f64 = number(&rest, 1, "radius")?;
                if !(meters > 0.0) {
                    bail!("The radius must be positive");
                }
                Command::Radius { zone, meters }
            }
            "move-vehicle" => {
                let id = VehicleID(number(&rest, 0, "vehicle ID")?);
                let (lat, lon) = coords(&rest, 1)?;
                Command::MoveVehicle { id, lat, lon }
            }
            "save" => Command::Save,
            "discard" => Command::Discard,
            "show" => Command::Show,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => bail!("Unknown command {}; try help", verb),
        };
        Ok(cmd)
    }
}

fn number<T: std::str::FromStr>(words: &[&str], idx: usize, what: &str) -> Result<T> {
    match words.get(idx) {
        Some(word) => word
            .parse()
            .map_err(|_| anyhow!("{} isn't a valid {}", word, what)),
        None => bail!("Missing {}", what),
    }
}

/// Converts the 1-based number to an index
fn zone_number(words: &[&str]) -> Result<usize> {
    let n: usize = number(words, 0, "zone number")?;
    if n == 0 {
        bail!("Zones are numbered from 1");
    }
    Ok(n - 1)
}

fn coords(words: &[&str], start: usize) -> Result<(f64, f64)> {
    let lat: f64 = number(words, start, "latitude")?;
    let lon: f64 = number(words, start + 1, "longitude")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("{},{} isn't a valid position", lat, lon);
    }
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gestures() {
        assert_eq!(
            Command::parse("click 48.86 2.36").unwrap(),
            Command::Click {
                lat: 48.86,
                lon: 2.36
            }
        );
        assert_eq!(Command::parse("zone 1").unwrap(), Command::Zone(0));
        assert_eq!(
            Command::parse("rename 2 Parking lot").unwrap(),
            Command::Rename(1, Some("Parking lot".to_string()))
        );
        assert_eq!(Command::parse("rename 2").unwrap(), Command::Rename(1, None));
        assert_eq!(
            Command::parse("radius 3 250").unwrap(),
            Command::Radius {
                zone: 2,
                meters: 250.0
            }
        );
        assert_eq!(
            Command::parse("move-vehicle 7 48.1 2.1").unwrap(),
            Command::MoveVehicle {
                id: VehicleID(7),
                lat: 48.1,
                lon: 2.1
            }
        );
        assert_eq!(Command::parse("  SAVE ").unwrap(), Command::Save);
    }

    #[test]
    fn mistakes() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("fly").is_err());
        assert!(Command::parse("zone 0").is_err());
        assert!(Command::parse("zone x").is_err());
        assert!(Command::parse("click 48.86").is_err());
        assert!(Command::parse("click 95 2").is_err());
        assert!(Command::parse("radius 1 -3").is_err());
        assert!(Command::parse("rename").is_err());
    }
}
