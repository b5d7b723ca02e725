use anyhow::Result;
use geom::LonLat;
use url::Url;

use model::{Geofence, Vehicle, VehicleID};

use crate::{parse_array, parse_vehicles, Gateway};

/// The host exposes plugin commands as `GET {endpoint}?id=lr_Xee&command=...`.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: Url,
    plugin_id: String,
    // Older plugin versions only know getCars
    vehicles_command: String,
}

impl HttpGateway {
    pub fn new(endpoint: &str, plugin_id: &str, vehicles_command: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| anyhow!("Bad endpoint {}: {}", endpoint, err))?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            endpoint,
            plugin_id: plugin_id.to_string(),
            vehicles_command: vehicles_command.to_string(),
        })
    }

    pub fn command_url(&self, command: &str, params: &[(&str, String)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id", &self.plugin_id);
            query.append_pair("command", command);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("output_format", "json");
        }
        url
    }

    async fn call(&self, command: &str, params: &[(&str, String)]) -> Result<String> {
        let url = self.command_url(command, params);
        debug!("{} {}", command, url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("{} failed with {}", command, status);
        }
        Ok(resp.text().await?)
    }
}

impl Gateway for HttpGateway {
    async fn get_geofences(&self) -> Result<Vec<Geofence>> {
        let body = self.call("getGeofences", &[]).await?;
        parse_array("geofences", &body)
    }

    async fn set_geofences(&self, geofences: &[Geofence]) -> Result<()> {
        let json = serde_json::to_string(geofences)?;
        self.call("setGeofences", &[("newGeofences", json)]).await?;
        Ok(())
    }

    async fn get_vehicles(&self) -> Result<Vec<Vehicle>> {
        let body = self.call(&self.vehicles_command, &[]).await?;
        parse_vehicles(&body)
    }

    async fn set_vehicle_location(&self, id: VehicleID, pos: LonLat) -> Result<()> {
        self.call(
            "setCarLocation",
            &[
                ("carId", id.0.to_string()),
                ("latitude", format!("{:.6}", pos.y())),
                ("longitude", format!("{:.6}", pos.x())),
            ],
        )
        .await?;
        Ok(())
    }
}
