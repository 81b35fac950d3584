//! ipinfo.io style provider: `GET {base_url}/{ip}/json[?token=...]`

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{GeoLookup, Location};
use crate::config::GeolocationConfig;
use crate::error::LookupError;

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    #[serde(flatten)]
    location: Location,
    /// Either a plain message or `{"title": ..., "message": ...}`
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct IpInfoClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl IpInfoClient {
    pub fn new(config: &GeolocationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured client; its timeout settings are used as is
    pub fn with_client(client: reqwest::Client, config: &GeolocationConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, ip: &str) -> String {
        match &self.api_token {
            Some(token) => format!("{}/{}/json?token={}", self.base_url, ip, token),
            None => format!("{}/{}/json", self.base_url, ip),
        }
    }
}

fn describe_error(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[async_trait]
impl GeoLookup for IpInfoClient {
    async fn lookup(&self, ip: &str) -> Result<Location, LookupError> {
        let response = self.client.get(self.url(ip)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body: IpInfoResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(LookupError::Provider(describe_error(&error)));
        }

        Ok(body.location)
    }
}
