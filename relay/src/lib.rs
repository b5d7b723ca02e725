//! Trades an OAuth authorization code or refresh token for tokens, using client credentials
//! that must stay off the user's device. Every call is audited, without the tokens.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod audit;
mod config;
mod provider;
mod relay;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use structopt::StructOpt;
use tokio::net::TcpListener;

pub use self::audit::{Audit, AuditRow, AuditSink, CsvSink};
pub use self::config::{Args, Config};
pub use self::provider::{Grant, HttpProvider, Provider};
pub use self::relay::{filter_identity, grant_from, redact, Relay};

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
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    let provider = HttpProvider::new(
        config.token_url.clone(),
        config.profile_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    )?;
    let audit = Audit::new(
        Box::new(CsvSink::new(config.audit_log.clone())),
        Duration::from_secs(config.lock_timeout_secs),
    );
    let app = router(Relay::new(provider, audit));

    info!("Listening on {}", config.bind);
    let listener = TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router<P: Provider>(relay: Relay<P>) -> Router {
    Router::new()
        .route("/", get(exchange::<P>))
        .with_state(Arc::new(relay))
}

async fn exchange<P: Provider>(
    State(relay): State<Arc<Relay<P>>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<Value> {
    Json(relay.handle(params).await)
}
