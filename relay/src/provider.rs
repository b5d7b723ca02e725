use std::future::Future;

use anyhow::Result;
use reqwest::header::ACCEPT;

/// What the caller is trading in
#[derive(Clone, Debug, PartialEq)]
pub enum Grant {
    Code(String),
    Refresh(String),
}

impl Grant {
    /// The form body for the token endpoint
    pub fn form(&self) -> [(&'static str, &str); 2] {
        match self {
            Grant::Code(code) => [("grant_type", "authorization_code"), ("code", code.as_str())],
            Grant::Refresh(token) => [
                ("grant_type", "refresh_token"),
                ("refresh_token", token.as_str()),
            ],
        }
    }
}

/// The OAuth provider. Both calls return the raw response body.
pub trait Provider: Send + Sync + 'static {
    fn exchange(&self, grant: &Grant) -> impl Future<Output = Result<String>> + Send;
    fn whoami(&self, access_token: &str) -> impl Future<Output = Result<String>> + Send;
}

pub struct HttpProvider {
    client: reqwest::Client,
    token_url: String,
    profile_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpProvider {
    pub fn new(
        token_url: String,
        profile_url: String,
        client_id: String,
        client_secret: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            token_url,
            profile_url,
            client_id,
            client_secret,
        })
    }
}

impl Provider for HttpProvider {
    // The provider's error bodies are JSON too, so they're passed along regardless of status.
    async fn exchange(&self, grant: &Grant) -> Result<String> {
        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(ACCEPT, "application/json")
            .form(&grant.form())
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!("The token endpoint answered {}", resp.status());
        }
        Ok(resp.text().await?)
    }

    async fn whoami(&self, access_token: &str) -> Result<String> {
        let resp = self
            .client
            .get(&self.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!("The profile endpoint answered {}", resp.status());
        }
        Ok(resp.text().await?)
    }
}
