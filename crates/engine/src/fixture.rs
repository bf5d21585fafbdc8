//! HTTP fixture client for backend seeding
//!
//! Seeding must be deterministic: a transport failure or non-2xx status is a
//! fatal `Setup` error for the case, never retried.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use testwright_common::{Error, Method, Result};

/// Response of a fixture request
#[derive(Debug, Clone)]
pub struct FixtureResponse {
    pub status: u16,
    pub body: Value,
}

/// Client for setup/teardown requests against the system under test
#[derive(Debug, Clone)]
pub struct FixtureClient {
    client: reqwest::Client,
    base_url: String,
}

impl FixtureClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Issue a seeding request. Mutates the backend's persisted state.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<FixtureResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "fixture request");

        let mut builder = self.client.request(method.into(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| Error::Setup(format!("{method} {path}: {err}")))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::Setup(format!("{method} {path}: reading body: {err}")))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if !status.is_success() {
            return Err(Error::Setup(format!(
                "{method} {path} returned {status}: {body}"
            )));
        }

        Ok(FixtureResponse {
            status: status.as_u16(),
            body,
        })
    }
}
