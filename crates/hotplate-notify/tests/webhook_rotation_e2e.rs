//! End-to-end webhook test: a site talking to its calendar and mail
//! endpoints while the shared secrets rotate underneath.
//!
//! 1. A member sends mail; the endpoint checks the password it was given
//! 2. A leaked password stops working once the secret rotates
//! 3. Over many calls the secret rotates about half the time
//! 4. Anonymous visitors read the public calendar
//! 5. Actors outside a feature's group never reach the endpoint
//!
//! The endpoint is an in-process transport that reads the secret from the
//! same store the site writes, like the hosted scripts do.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hotplate_core::{str_field, DocumentStore, InMemoryStore};
use hotplate_notify::{
    normalize_events, verify_password, ExternalService, HttpMethod, MailMessage, NotifyError,
    NotifyResult, RotationPolicy, WebhookClient, WebhookRequest, WebhookResponse,
    WebhookTransport,
};
use hotplate_policy::{Actor, AuthLevel, DenyReason, GuardedStore, InMemoryAuditSink, PolicyEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

/// Endpoint stand-in. Rejects any password that does not match the
/// stored secret with the scripts' error envelope.
struct ScriptEndpoint {
    store: Arc<InMemoryStore>,
    calls: AtomicUsize,
}

impl ScriptEndpoint {
    fn stored_secret(&self, service: ExternalService) -> String {
        self.store
            .get(&service.secret_path().unwrap())
            .unwrap()
            .and_then(|doc| str_field(&doc, "password").map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl WebhookTransport for ScriptEndpoint {
    async fn send(&self, request: &WebhookRequest) -> NotifyResult<WebhookResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let presented = request.password().unwrap_or_default();
        if !verify_password(&self.stored_secret(request.service), presented) {
            return Ok(WebhookResponse::ok(json!({"error": "Permission Denied!"})));
        }
        let body = match request.method {
            HttpMethod::Get => json!([
                {"summary": "Bake sale", "start": {"date": "2026-11-07"}},
                {"summary": "Vestry", "start": {"dateTime": "2026-11-09T19:00:00Z"},
                 "end": {"dateTime": "2026-11-09T20:00:00Z"}}
            ]),
            HttpMethod::Post => json!({"success": true}),
        };
        Ok(WebhookResponse::ok(body))
    }
}

struct Site {
    raw: Arc<InMemoryStore>,
    endpoint: Arc<ScriptEndpoint>,
    client: WebhookClient<Arc<InMemoryStore>>,
}

fn site(probability: f64, seed: u64) -> Site {
    let raw = Arc::new(
        InMemoryStore::from_snapshot(&json!({
            "configuration/settings": {
                "calURL": "https://script.example/calendar",
                "mailURL": "https://script.example/mail",
                "calView": "public",
                "calEdit": "webmasters",
                "email": "users"
            },
            "configuration/calendar-view": {"password": "firstViewSecret00000"},
            "configuration/calendar-edit": {"password": "firstEditSecret00000"},
            "configuration/mail": {"password": "firstMailSecret00000"}
        }))
        .unwrap(),
    );
    let guarded = Arc::new(GuardedStore::new(
        raw.clone(),
        PolicyEngine::default(),
        Arc::new(InMemoryAuditSink::new()),
    ));
    let endpoint = Arc::new(ScriptEndpoint {
        store: raw.clone(),
        calls: AtomicUsize::new(0),
    });
    let client = WebhookClient::new(
        guarded,
        endpoint.clone(),
        RotationPolicy::new(probability, 20).unwrap(),
    )
    .with_rng(StdRng::seed_from_u64(seed));
    Site {
        raw,
        endpoint,
        client,
    }
}

fn member() -> Actor {
    Actor::new("martha", AuthLevel::User)
}

fn mail() -> hotplate_core::Document {
    MailMessage::new("all@example.org", "Harvest supper", "Bring a dish.")
        .to_payload()
        .unwrap()
}

// ============================================================================
// Chapter 1: a member sends mail
// ============================================================================

#[tokio::test]
async fn test_chapter1_member_sends_mail() {
    let site = site(0.0, 1);
    let reply = site
        .client
        .invoke(&member(), ExternalService::Mail, mail())
        .await
        .unwrap();
    assert_eq!(reply.body, json!({"success": true}));
    assert!(reply.rotation.is_none());
    assert_eq!(site.endpoint.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Chapter 2: a leaked password goes stale
// ============================================================================

#[tokio::test]
async fn test_chapter2_leaked_password_goes_stale() {
    let site = site(1.0, 2);
    let leaked = site.endpoint.stored_secret(ExternalService::Mail);

    let reply = site
        .client
        .invoke(&member(), ExternalService::Mail, mail())
        .await
        .unwrap();
    reply.rotation.expect("rotation rolled").await.unwrap();

    let current = site.endpoint.stored_secret(ExternalService::Mail);
    assert_ne!(current, leaked);
    assert_eq!(current.len(), 20);

    // replaying the leaked password straight at the endpoint
    let mut payload = mail();
    payload.insert("password".into(), json!(leaked));
    let replay = WebhookRequest {
        service: ExternalService::Mail,
        method: HttpMethod::Post,
        url: "https://script.example/mail".into(),
        payload,
    };
    let response = site.endpoint.send(&replay).await.unwrap();
    assert_eq!(response.error_message().as_deref(), Some("Permission Denied!"));

    // the site itself keeps working with the new secret
    site.client
        .invoke(&member(), ExternalService::Mail, mail())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_chapter2_rejected_call_does_not_rotate() {
    let site = site(1.0, 3);
    // an empty secret never verifies
    let path = ExternalService::CalendarView.secret_path().unwrap();
    site.raw.set(&path, serde_json::Map::new()).unwrap();

    let err = site
        .client
        .invoke(&Actor::anonymous(), ExternalService::CalendarView, Default::default())
        .await
        .unwrap_err();
    assert_eq!(err, NotifyError::ExternalFailure("Permission Denied!".into()));
    assert_eq!(site.endpoint.calls.load(Ordering::SeqCst), 1);
    assert!(site.raw.get(&path).unwrap().unwrap().is_empty());
}

// ============================================================================
// Chapter 3: rotation frequency
// ============================================================================

#[tokio::test]
async fn test_chapter3_rotates_about_half_the_time() {
    let site = site(0.5, 2026);
    let mut rotations = 0;
    for _ in 0..1000 {
        let reply = site
            .client
            .invoke(&member(), ExternalService::Mail, mail())
            .await
            .unwrap();
        if let Some(handle) = reply.rotation {
            handle.await.unwrap();
            rotations += 1;
        }
    }
    assert!((400..600).contains(&rotations), "rotated {rotations} times");
    assert_eq!(site.endpoint.calls.load(Ordering::SeqCst), 1000);
}

// ============================================================================
// Chapter 4: the public calendar
// ============================================================================

#[tokio::test]
async fn test_chapter4_anonymous_reads_calendar() {
    let site = site(0.0, 4);
    let reply = site
        .client
        .invoke(&Actor::anonymous(), ExternalService::CalendarView, Default::default())
        .await
        .unwrap();
    let events = normalize_events(&reply.body).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].all_day);
    assert_eq!(events[0].end, "2026-11-07");
    assert!(!events[1].all_day);
    assert_eq!(events[1].end, "2026-11-09T20:00:00Z");
}

// ============================================================================
// Chapter 5: outside the group
// ============================================================================

#[tokio::test]
async fn test_chapter5_outsiders_never_reach_endpoint() {
    let site = site(1.0, 5);
    let err = site
        .client
        .invoke(&Actor::anonymous(), ExternalService::Mail, mail())
        .await
        .unwrap_err();
    assert_eq!(err, NotifyError::PermissionDenied(DenyReason::InsufficientGroup));

    let err = site
        .client
        .invoke(&member(), ExternalService::CalendarEdit, Default::default())
        .await
        .unwrap_err();
    assert_eq!(err, NotifyError::PermissionDenied(DenyReason::InsufficientGroup));

    assert_eq!(site.endpoint.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        site.endpoint.stored_secret(ExternalService::Mail),
        "firstMailSecret00000"
    );
}
