use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::audit::{Audit, AuditRow};
use crate::provider::{Grant, Provider};

/// Never stored or logged
const SECRET_KEYS: [&str; 2] = ["access_token", "refresh_token"];
const SECRET_PARAMS: [&str; 1] = ["refreshToken"];
/// The only profile fields kept
const IDENTITY_KEYS: [&str; 3] = ["id", "firstName", "lastName"];

pub struct Relay<P> {
    provider: P,
    audit: Audit,
}

impl<P: Provider> Relay<P> {
    pub fn new(provider: P, audit: Audit) -> Self {
        Self { provider, audit }
    }

    /// Returns whatever the token endpoint said, or a list of errors. Internals never reach the
    /// caller.
    pub async fn handle(&self, params: BTreeMap<String, String>) -> Value {
        let mut internal_errors = Vec::new();
        let result = match grant_from(&params) {
            Some(grant) => match self.exchange(&grant).await {
                Ok(result) => result,
                Err(err) => {
                    error!("Token exchange failed: {:#}", err);
                    internal_errors.push(err.to_string());
                    error_list("INTERNAL_ERROR")
                }
            },
            None => error_list("PARAMETERS_ERROR"),
        };

        let identity = match result.get("access_token").and_then(|t| t.as_str()) {
            Some(token) => self.identity(token).await,
            None => json!({}),
        };

        let state = params.get("state").cloned().unwrap_or_default();
        info!("Relayed a call for state {:?}", state);
        self.audit
            .record(AuditRow {
                timestamp: chrono::Utc::now().to_rfc3339(),
                state,
                params: redact_params(&params).to_string(),
                result: redact(&result).to_string(),
                identity: identity.to_string(),
                internal_errors: json!(internal_errors).to_string(),
            })
            .await;

        result
    }

    async fn exchange(&self, grant: &Grant) -> Result<Value> {
        let body = self.provider.exchange(grant).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|err| anyhow!("The token endpoint didn't return JSON: {}", err))?;
        Ok(value)
    }

    /// Just who the token belongs to. A failure is recorded in place of the identity.
    async fn identity(&self, access_token: &str) -> Value {
        let profile = match self.provider.whoami(access_token).await {
            Ok(body) => serde_json::from_str::<Value>(&body)
                .map_err(|err| anyhow!("The profile isn't JSON: {}", err)),
            Err(err) => Err(err),
        };
        match profile {
            Ok(profile) => filter_identity(profile),
            Err(err) => {
                warn!("Couldn't check the new access token: {}", err);
                json!({ "error": err.to_string() })
            }
        }
    }
}

/// A code wins over a refresh token. Empty values count as missing.
pub fn grant_from(params: &BTreeMap<String, String>) -> Option<Grant> {
    let nonempty = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
    if let Some(code) = nonempty("code") {
        return Some(Grant::Code(code));
    }
    nonempty("refreshToken").map(Grant::Refresh)
}

fn error_list(kind: &str) -> Value {
    json!([{ "type": kind, "message": "", "tip": "" }])
}

/// Drops the tokens from a token endpoint response. Anything besides an object is kept as is.
pub fn redact(result: &Value) -> Value {
    match result {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(key, _)| !SECRET_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_params(params: &BTreeMap<String, String>) -> Value {
    let mut map = Map::new();
    for (key, value) in params {
        if SECRET_PARAMS.contains(&key.as_str()) {
            map.insert(key.clone(), json!("<redacted>"));
        } else {
            map.insert(key.clone(), json!(value));
        }
    }
    Value::Object(map)
}

/// Profiles without an ID, like error responses, are kept whole.
pub fn filter_identity(profile: Value) -> Value {
    if profile.get("id").map(|id| id.is_null()).unwrap_or(true) {
        return profile;
    }
    let mut map = Map::new();
    for key in IDENTITY_KEYS {
        if let Some(value) = profile.get(key) {
            map.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(map)
}
