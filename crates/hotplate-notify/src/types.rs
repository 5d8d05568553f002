use hotplate_core::{CoreResult, DocPath, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio::sync::oneshot;

use crate::error::NotifyError;

// ---------------------------------------------------------------------------
// ExternalService: the webhook-backed features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalService {
    /// Calendar writes (create/edit/delete events).
    CalendarEdit,
    /// Calendar reads.
    CalendarView,
    Mail,
}

impl ExternalService {
    pub const ALL: [ExternalService; 3] = [
        ExternalService::CalendarEdit,
        ExternalService::CalendarView,
        ExternalService::Mail,
    ];

    /// Id of the secret document under `configuration/`.
    pub fn secret_id(self) -> &'static str {
        match self {
            ExternalService::CalendarEdit => "calendar-edit",
            ExternalService::CalendarView => "calendar-view",
            ExternalService::Mail => "mail",
        }
    }

    pub fn secret_path(self) -> CoreResult<DocPath> {
        DocPath::parse(&format!("configuration/{}", self.secret_id()))
    }

    /// Settings field holding the endpoint URL.
    pub fn url_field(self) -> &'static str {
        match self {
            ExternalService::CalendarEdit | ExternalService::CalendarView => "calURL",
            ExternalService::Mail => "mailURL",
        }
    }

    pub fn method(self) -> HttpMethod {
        match self {
            ExternalService::CalendarView => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }
}

impl fmt::Display for ExternalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.secret_id())
    }
}

impl FromStr for ExternalService {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExternalService::ALL
            .into_iter()
            .find(|svc| svc.secret_id() == s)
            .ok_or_else(|| NotifyError::ConfigurationError(format!("unknown service '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Payload travels as query parameters.
    Get,
    /// Payload travels as a JSON body.
    Post,
}

// ---------------------------------------------------------------------------
// Request / response envelopes
// ---------------------------------------------------------------------------

/// Outbound webhook call. `payload` already carries the `password` field.
#[derive(Clone)]
pub struct WebhookRequest {
    pub service: ExternalService,
    pub method: HttpMethod,
    pub url: String,
    pub payload: Document,
}

impl WebhookRequest {
    pub fn password(&self) -> Option<&str> {
        self.payload.get("password").and_then(Value::as_str)
    }
}

impl fmt::Debug for WebhookRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&String> = self.payload.keys().collect();
        f.debug_struct("WebhookRequest")
            .field("service", &self.service)
            .field("method", &self.method)
            .field("fields", &fields)
            .finish_non_exhaustive()
    }
}

/// Raw transport-level response.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Value,
}

impl WebhookResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error carried in the body: an `error` field, or `success: false`
    /// with an optional `msg`.
    pub fn error_message(&self) -> Option<String> {
        let obj = self.body.as_object()?;
        if let Some(err) = obj.get("error").filter(|v| !v.is_null()) {
            return Some(match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        if obj.get("success") == Some(&Value::Bool(false)) {
            return Some(
                obj.get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("request was not successful")
                    .to_string(),
            );
        }
        None
    }
}

/// Successful webhook call.
///
/// `rotation` resolves when the rotation this call rolled has finished,
/// successfully or not. Dropping it does not cancel the rotation.
#[derive(Debug)]
pub struct WebhookReply {
    pub body: Value,
    pub rotation: Option<oneshot::Receiver<()>>,
}
