//! Calendar and mail payloads.
//!
//! The calendar endpoint returns provider events; `normalize_events`
//! flattens them into `CalendarEvent`s for display. Writes are tagged by a
//! `method` field that the endpoint dispatches on.

use hotplate_core::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NotifyError, NotifyResult};

// ---------------------------------------------------------------------------
// Provider events (read side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderEvent {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
}

/// An event as shown on a calendar widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub title: String,
    pub start: String,
    pub end: String,
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProviderEvent {
    fn normalize(self) -> Option<CalendarEvent> {
        let start = self.start?;
        let end = self.end.unwrap_or_default();
        // an all-day date wins over a timed one
        let (start, end, all_day) = if let Some(start) = start.date {
            let end = end.date.unwrap_or_else(|| start.clone());
            (start, end, true)
        } else {
            let start = start.date_time?;
            let end = end.date_time.unwrap_or_else(|| start.clone());
            (start, end, false)
        };
        Some(CalendarEvent {
            title: self.summary.unwrap_or_default(),
            start,
            end,
            all_day,
            location: self.location.filter(|s| !s.is_empty()),
            description: self.description.filter(|s| !s.is_empty()),
        })
    }
}

/// Flatten a calendar-view response into display events.
///
/// Accepts a bare array or an object with an `items` array. Events with
/// no start time are dropped; a missing end falls back to the start.
pub fn normalize_events(body: &Value) -> NotifyResult<Vec<CalendarEvent>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("items")
            .and_then(Value::as_array)
            .ok_or(NotifyError::InvalidResponse)?,
        _ => return Err(NotifyError::InvalidResponse),
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let event: ProviderEvent =
            serde_json::from_value(item.clone()).map_err(|_| NotifyError::InvalidResponse)?;
        match event.normalize() {
            Some(event) => events.push(event),
            None => tracing::debug!("dropping calendar event without a start time"),
        }
    }
    Ok(events)
}

// ---------------------------------------------------------------------------
// Calendar commands (write side)
// ---------------------------------------------------------------------------

/// Fields shared by event creation and editing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// Comma-separated guest addresses.
    #[serde(default)]
    pub guests: String,
    #[serde(default)]
    pub invite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum CalendarCommand {
    CreateEvent(EventDetails),
    CreateAllDayEvent(EventDetails),
    DeleteEvent {
        event: String,
    },
    EditEvent {
        event: String,
        #[serde(rename = "allDay")]
        all_day: bool,
        #[serde(flatten)]
        details: EventDetails,
    },
}

impl CalendarCommand {
    /// Payload for the calendar-edit endpoint, without the password.
    pub fn to_payload(&self) -> NotifyResult<Document> {
        to_document(self)
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Comma-separated recipients.
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl MailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            sender: None,
            reply: None,
        }
    }

    pub fn to_payload(&self) -> NotifyResult<Document> {
        if self.to.trim().is_empty() {
            return Err(NotifyError::ConfigurationError("mail has no recipients".into()));
        }
        to_document(self)
    }
}

fn to_document<T: Serialize>(value: &T) -> NotifyResult<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(NotifyError::ConfigurationError("payload is not an object".into())),
        Err(e) => Err(NotifyError::ConfigurationError(e.to_string())),
    }
}
