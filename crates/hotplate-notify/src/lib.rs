//! Hotplate Notify
//!
//! Calendar and mail features are served by external webhooks that
//! authenticate callers with a shared secret. The secret lives in a
//! policy-guarded document, so only actors in the feature's permission
//! group can read it and call the endpoint.
//!
//! After each successful call the secret is rotated with some probability
//! by a background task. A leaked secret therefore stops working soon after
//! normal use resumes.

pub mod calendar;
pub mod error;
pub mod secret;
pub mod transport;
pub mod types;
pub mod webhook;

pub use calendar::{normalize_events, CalendarCommand, CalendarEvent, EventDetails, MailMessage};
pub use error::{NotifyError, NotifyResult};
pub use secret::{
    verify_password, RotationPolicy, SharedSecret, DEFAULT_ROTATION_PROBABILITY,
    DEFAULT_SECRET_LENGTH, MIN_SECRET_LENGTH,
};
pub use transport::{HttpTransport, WebhookTransport};
pub use types::{ExternalService, HttpMethod, WebhookReply, WebhookRequest, WebhookResponse};
pub use webhook::{rotate_secret, WebhookClient};
