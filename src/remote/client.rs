//! HTTP client for the remote fleet API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::ApiRequest;
use crate::errors::{FleetError, FleetResult};

/// Transport the cache uses to reach the authoritative server.
///
/// Implementations return the unwrapped `data` payload on success.
#[async_trait]
pub trait FleetApi: Send + Sync + 'static {
    async fn execute(&self, request: ApiRequest) -> FleetResult<Value>;
}

/// Success envelope of every remote response.
#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Value,
}

/// Error body shape; the remote API is not consistent about the field name.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<Value>,
}

/// `reqwest`-backed fleet API client.
#[derive(Clone)]
pub struct HttpFleetApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFleetApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FleetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FleetError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl FleetApi for HttpFleetApi {
    async fn execute(&self, request: ApiRequest) -> FleetResult<Value> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("Remote request: {}", request);
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            tracing::warn!("Remote {} failed with {}: {}", request, status, message);
            return Err(FleetError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let envelope: DataEnvelope = serde_json::from_str(&text)?;
        Ok(envelope.data)
    }
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    if let Some(message) = parsed.message {
        return Some(message);
    }
    match parsed.error? {
        Value::String(message) => Some(message),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
