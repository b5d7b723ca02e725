use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use structopt::StructOpt;

const DEFAULT_CONFIG: &str = "map.toml";

#[derive(StructOpt)]
pub struct Args {
    /// A TOML file with settings. If absent, map.toml in the current directory is used when it
    /// exists.
    #[structopt(long)]
    config: Option<String>,
    /// The host's data request URL, like http://vera:3480/data_request
    #[structopt(long)]
    endpoint: Option<String>,
    /// Seconds between vehicle refreshes
    #[structopt(long)]
    poll_interval: Option<u64>,
    /// Vehicle markers can be dragged, sending fake locations to the host
    #[structopt(long)]
    debug: bool,
    /// After every change, write the map as GeoJSON here
    #[structopt(long)]
    geojson: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub plugin_id: String,
    pub poll_interval_secs: u64,
    /// Failed refreshes back off exponentially up to this
    pub max_backoff_secs: u64,
    pub default_radius_m: f64,
    /// getVehicles, or getCars for older plugin versions
    pub vehicles_command: String,
    pub debug: bool,
    pub geojson_output: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3480/data_request".to_string(),
            plugin_id: "lr_Xee".to_string(),
            poll_interval_secs: 10,
            max_backoff_secs: 300,
            default_radius_m: 200.0,
            vehicles_command: "getVehicles".to_string(),
            debug: false,
            geojson_output: None,
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Command line flags win over the file.
    pub fn load(args: Args) -> Result<Self> {
        let path = match args.config {
            Some(ref path) => Some(path.clone()),
            None if Path::new(DEFAULT_CONFIG).exists() => Some(DEFAULT_CONFIG.to_string()),
            None => None,
        };
        let mut config = match path {
            Some(path) => {
                info!("Reading settings from {}", path);
                Self::from_toml(&fs_err::read_to_string(path)?)?
            }
            None => Self::default(),
        };

        if let Some(endpoint) = args.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(secs) = args.poll_interval {
            config.poll_interval_secs = secs;
        }
        if args.debug {
            config.debug = true;
        }
        if args.geojson.is_some() {
            config.geojson_output = args.geojson;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.max_backoff_secs < self.poll_interval_secs {
            bail!(
                "max_backoff_secs ({}) can't be less than poll_interval_secs ({})",
                self.max_backoff_secs,
                self.poll_interval_secs
            );
        }
        if !(self.default_radius_m > 0.0) {
            bail!("default_radius_m must be positive");
        }
        Ok(())
    }
}
