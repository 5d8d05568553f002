use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{NotifyError, NotifyResult};
use crate::types::{HttpMethod, WebhookRequest, WebhookResponse};

/// Delivers a webhook request and returns the raw response.
///
/// Implementations do not interpret the body; success and error-envelope
/// handling belongs to the caller.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &WebhookRequest) -> NotifyResult<WebhookResponse>;
}

/// HTTP transport over `reqwest`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::ConfigurationError(e.without_url().to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: &WebhookRequest) -> NotifyResult<WebhookResponse> {
        let builder = match request.method {
            HttpMethod::Get => self
                .client
                .get(&request.url)
                .query(&query_pairs(request)),
            HttpMethod::Post => self.client.post(&request.url).json(&request.payload),
        };

        // the URL may carry the password; keep it out of errors
        let response = builder
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        tracing::debug!(service = %request.service, status, "webhook responded");
        Ok(WebhookResponse {
            status,
            body: parse_body(&text),
        })
    }
}

fn query_pairs(request: &WebhookRequest) -> Vec<(String, String)> {
    request
        .payload
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// JSON when the body parses, the raw text otherwise, `Null` when empty.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
