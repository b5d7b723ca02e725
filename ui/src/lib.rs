#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod canvas;
mod commands;
mod config;
mod legend;
mod runtime;

use std::time::Duration;

use anyhow::Result;
use geom::Distance;
use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::LocalSet;

use gateway::HttpGateway;
use model::{Editor, EditorOptions};

pub use self::canvas::GeoJsonCanvas;
pub use self::commands::Command;
pub use self::config::{Args, Config};
pub use self::legend::describe;
pub use self::runtime::{Event, Output, Poller, Runtime};

pub fn main() {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    if let Err(err) = run(args) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args)?;
    info!("Talking to {}", config.endpoint);
    let gateway = HttpGateway::new(&config.endpoint, &config.plugin_id, &config.vehicles_command)?;
    let editor = Editor::new(
        GeoJsonCanvas::new(),
        EditorOptions {
            default_radius: Distance::meters(config.default_radius_m),
            debug: config.debug,
        },
    );
    let poller = Poller::new(
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.max_backoff_secs),
    );
    let console = Console {
        geojson_output: config.geojson_output.clone(),
    };

    // Everything happens on this one thread
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    let editor = local.block_on(&rt, async move {
        let runtime = Runtime::new(gateway, editor, console, poller);
        tokio::task::spawn_local(read_commands(runtime.sender()));
        let (editor, _) = runtime.run().await;
        editor
    });
    if editor.is_dirty() {
        println!("Unsaved changes were dropped");
    }
    Ok(())
}

/// Each line of stdin is one gesture. The end of input quits.
async fn read_commands(tx: UnboundedSender<Event>) {
    println!("Type help for the list of commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(cmd) => {
                        if tx.send(Event::Command(cmd)).is_err() {
                            return;
                        }
                    }
                    Err(err) => println!("{}", err),
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!("Couldn't read stdin: {}", err);
                break;
            }
        }
    }
    let _ = tx.send(Event::Command(Command::Quit));
}

struct Console {
    geojson_output: Option<String>,
}

impl Output<GeoJsonCanvas> for Console {
    fn show(&mut self, lines: Vec<String>) {
        for line in lines {
            println!("{}", line);
        }
    }

    fn map_changed(&mut self, editor: &Editor<GeoJsonCanvas>) {
        if let Some(ref path) = self.geojson_output {
            if let Err(err) = write_geojson(path, editor) {
                warn!("Couldn't write {}: {}", path, err);
            }
        }
    }
}

fn write_geojson(path: &str, editor: &Editor<GeoJsonCanvas>) -> Result<()> {
    let fc = editor.canvas().to_geojson();
    fs_err::write(path, serde_json::to_string_pretty(&fc)?)?;
    Ok(())
}
