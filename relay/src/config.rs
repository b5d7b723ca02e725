use anyhow::Result;
use serde::Deserialize;
use structopt::StructOpt;

#[derive(StructOpt)]
pub struct Args {
    /// A TOML file with the client credentials
    #[structopt(long, default_value = "relay.toml")]
    config: String,
    /// Overrides the address to listen on
    #[structopt(long)]
    bind: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    /// Used to check that a fresh access token works and who it belongs to
    pub profile_url: String,
    /// A CSV file; every call appends a row
    pub audit_log: String,
    /// How long to wait for the audit log before skipping the row
    pub lock_timeout_secs: u64,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: "https://cloud.xee.com/v3/auth/access_token".to_string(),
            profile_url: "https://cloud.xee.com/v3/users/me".to_string(),
            audit_log: "relay_audit.csv".to_string(),
            lock_timeout_secs: 30,
            bind: "0.0.0.0:3002".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            bail!("client_id and client_secret are both required");
        }
        Ok(config)
    }

    pub fn load(args: Args) -> Result<Self> {
        info!("Reading settings from {}", args.config);
        let mut config = Self::from_toml(&fs_err::read_to_string(&args.config)?)?;
        if let Some(bind) = args.bind {
            config.bind = bind;
        }
        Ok(config)
    }
}
