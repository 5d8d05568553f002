//! Webhook invocation with a rotating shared secret.
//!
//! Each call reads the service's secret through the policy-guarded store,
//! stamps it into the payload as `password`, and sends. After a successful
//! call a coin flip may spawn a background task that overwrites the secret.
//! Concurrent callers can race the rotation; a stale password then fails
//! at the endpoint like any other external error.
//!
//! Rotation tasks are owned by the client. `drain_rotations` waits for the
//! pending ones, and dropping the client aborts them.

use std::sync::{Arc, Mutex};

use hotplate_core::{str_field, DocPath, Document, DocumentStore};
use hotplate_policy::{Actor, GuardedStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::error::{NotifyError, NotifyResult};
use crate::secret::{RotationPolicy, SharedSecret};
use crate::transport::WebhookTransport;
use crate::types::{ExternalService, WebhookReply, WebhookRequest};

const SETTINGS_PATH: &str = "configuration/settings";

/// Calls the calendar and mail webhooks on behalf of an actor.
pub struct WebhookClient<S> {
    store: Arc<GuardedStore<S>>,
    transport: Arc<dyn WebhookTransport>,
    policy: RotationPolicy,
    rng: Mutex<StdRng>,
    rotations: Mutex<JoinSet<()>>,
}

impl<S: DocumentStore + 'static> WebhookClient<S> {
    pub fn new(
        store: Arc<GuardedStore<S>>,
        transport: Arc<dyn WebhookTransport>,
        policy: RotationPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
            rotations: Mutex::new(JoinSet::new()),
        }
    }

    /// Replace the rotation RNG, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Current secret for `service`, read with the actor's permissions.
    ///
    /// A missing document is an empty secret, not an error.
    pub fn fetch_secret(&self, actor: &Actor, service: ExternalService) -> NotifyResult<String> {
        let path = service.secret_path()?;
        let secret = self
            .store
            .get(actor, &path)?
            .and_then(|doc| str_field(&doc, "password").map(str::to_string))
            .unwrap_or_default();
        Ok(secret)
    }

    /// Endpoint URL for `service` from the public settings document.
    pub fn endpoint_url(&self, actor: &Actor, service: ExternalService) -> NotifyResult<String> {
        let path = DocPath::parse(SETTINGS_PATH)?;
        self.store
            .get(actor, &path)?
            .and_then(|settings| str_field(&settings, service.url_field()).map(str::to_string))
            .filter(|url| !url.trim().is_empty())
            .ok_or(NotifyError::EndpointNotConfigured(service))
    }

    /// Stamp the secret into `payload`, send it, and check the reply.
    ///
    /// The secret is read first, so an actor outside the service's group
    /// is denied before anything about the endpoint is revealed.
    ///
    /// Fails on a non-2xx status or an error envelope; neither rotates.
    pub async fn invoke(
        &self,
        actor: &Actor,
        service: ExternalService,
        mut payload: Document,
    ) -> NotifyResult<WebhookReply> {
        let password = self.fetch_secret(actor, service)?;
        let url = self.endpoint_url(actor, service)?;
        payload.insert("password".to_string(), Value::String(password));

        let request = WebhookRequest {
            service,
            method: service.method(),
            url,
            payload,
        };
        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            tracing::warn!(service = %service, status = response.status, "webhook call failed");
            let message = response
                .error_message()
                .unwrap_or_else(|| format!("the server responded with code {}", response.status));
            return Err(NotifyError::ExternalFailure(message));
        }
        if let Some(message) = response.error_message() {
            tracing::warn!(service = %service, error = %message, "webhook returned an error");
            return Err(NotifyError::ExternalFailure(message));
        }

        Ok(WebhookReply {
            body: response.body,
            rotation: self.maybe_rotate(actor, service),
        })
    }

    /// Flip the rotation coin; on heads spawn the rotation and return a
    /// receiver that resolves when it is done. The task's failures are
    /// logged and discarded.
    pub fn maybe_rotate(
        &self,
        actor: &Actor,
        service: ExternalService,
    ) -> Option<oneshot::Receiver<()>> {
        let secret = {
            let mut rng = match self.rng.lock() {
                Ok(rng) => rng,
                Err(_) => {
                    tracing::warn!(service = %service, "rotation rng poisoned, skipping rotation");
                    return None;
                }
            };
            if !self.policy.should_rotate(&mut *rng) {
                return None;
            }
            self.policy.next_secret(&mut *rng)
        };

        let mut rotations = match self.rotations.lock() {
            Ok(rotations) => rotations,
            Err(_) => {
                tracing::warn!(service = %service, "rotation set poisoned, skipping rotation");
                return None;
            }
        };
        // reap finished tasks
        while rotations.try_join_next().is_some() {}

        let (done, finished) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let actor = actor.clone();
        rotations.spawn(async move {
            match rotate_secret(store.as_ref(), &actor, service, &secret) {
                Ok(()) => tracing::info!(service = %service, "shared secret rotated"),
                Err(e) => tracing::warn!(service = %service, error = %e, "secret rotation failed"),
            }
            let _ = done.send(());
        });
        Some(finished)
    }

    /// Wait for every rotation spawned so far. Returns how many were pending.
    pub async fn drain_rotations(&self) -> usize {
        let mut pending = match self.rotations.lock() {
            Ok(mut rotations) => std::mem::take(&mut *rotations),
            Err(_) => return 0,
        };
        let count = pending.len();
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "rotation task did not finish");
            }
        }
        if count > 0 {
            tracing::debug!(count, "pending rotations drained");
        }
        count
    }

    /// Rotate now, awaiting nothing and propagating failure.
    pub fn rotate(&self, actor: &Actor, service: ExternalService) -> NotifyResult<SharedSecret> {
        let secret = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| NotifyError::ConfigurationError("rotation rng poisoned".into()))?;
            self.policy.next_secret(&mut *rng)
        };
        rotate_secret(self.store.as_ref(), actor, service, &secret)?;
        tracing::info!(service = %service, "shared secret rotated");
        Ok(secret)
    }
}

/// Overwrite the secret document.
///
/// If another rotation lands between the read and the write, this one
/// fails with a conflict and the other secret stands.
pub fn rotate_secret<S: DocumentStore>(
    store: &GuardedStore<S>,
    actor: &Actor,
    service: ExternalService,
    secret: &SharedSecret,
) -> NotifyResult<()> {
    let path = service.secret_path()?;
    let mut body = Document::new();
    body.insert(
        "password".to_string(),
        Value::String(secret.expose().to_string()),
    );
    store.set(actor, &path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WebhookResponse;
    use async_trait::async_trait;
    use hotplate_core::InMemoryStore;
    use hotplate_policy::{AuthLevel, DenyReason, InMemoryAuditSink, PolicyEngine};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Records requests and answers with a canned response.
    struct MockTransport {
        response: WebhookResponse,
        seen: StdMutex<Vec<WebhookRequest>>,
    }

    impl MockTransport {
        fn answering(response: WebhookResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn passwords(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.password().unwrap_or_default().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl WebhookTransport for MockTransport {
        async fn send(&self, request: &WebhookRequest) -> NotifyResult<WebhookResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn store(snapshot: serde_json::Value) -> Arc<GuardedStore<InMemoryStore>> {
        Arc::new(GuardedStore::new(
            InMemoryStore::from_snapshot(&snapshot).unwrap(),
            PolicyEngine::default(),
            Arc::new(InMemoryAuditSink::new()),
        ))
    }

    fn site() -> Arc<GuardedStore<InMemoryStore>> {
        store(json!({
            "configuration/settings": {
                "calURL": "https://cal.example/exec",
                "mailURL": "https://mail.example/exec",
                "calView": "public",
                "calEdit": "webmasters",
                "email": "users"
            },
            "configuration/calendar-view": {"password": "viewpass"},
            "configuration/mail": {"password": "mailpass"}
        }))
    }

    fn client(
        store: Arc<GuardedStore<InMemoryStore>>,
        transport: Arc<MockTransport>,
        probability: f64,
    ) -> WebhookClient<InMemoryStore> {
        WebhookClient::new(store, transport, RotationPolicy::new(probability, 20).unwrap())
            .with_rng(StdRng::seed_from_u64(42))
    }

    fn member() -> Actor {
        Actor::new("mia", AuthLevel::User)
    }

    #[tokio::test]
    async fn test_invoke_stamps_password() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!([])));
        let client = client(site(), transport.clone(), 0.0);
        let reply = client
            .invoke(&Actor::anonymous(), ExternalService::CalendarView, Document::new())
            .await
            .unwrap();
        assert!(reply.rotation.is_none());
        assert_eq!(transport.passwords(), vec!["viewpass".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_secret_sends_empty_password() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({"success": true})));
        let store = store(json!({
            "configuration/settings": {"mailURL": "https://mail.example/exec", "email": "users"}
        }));
        let client = client(store, transport.clone(), 0.0);
        assert_eq!(client.fetch_secret(&member(), ExternalService::Mail).unwrap(), "");
        client
            .invoke(&member(), ExternalService::Mail, Document::new())
            .await
            .unwrap();
        assert_eq!(transport.passwords(), vec![String::new()]);
    }

    #[tokio::test]
    async fn test_denied_secret_read() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({"success": true})));
        let client = client(site(), transport.clone(), 1.0);
        let err = client
            .invoke(&member(), ExternalService::CalendarEdit, Document::new())
            .await
            .unwrap_err();
        assert_eq!(err, NotifyError::PermissionDenied(DenyReason::InsufficientGroup));
        assert!(transport.passwords().is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({})));
        let store = store(json!({"configuration/settings": {"email": "users"}}));
        let client = client(store, transport, 0.0);
        let err = client
            .invoke(&member(), ExternalService::Mail, Document::new())
            .await
            .unwrap_err();
        assert_eq!(err, NotifyError::EndpointNotConfigured(ExternalService::Mail));
    }

    #[tokio::test]
    async fn test_error_envelope_fails_without_rotation() {
        let transport =
            MockTransport::answering(WebhookResponse::ok(json!({"error": "Permission Denied!"})));
        let store = site();
        let client = client(store.clone(), transport, 1.0);
        let err = client
            .invoke(&member(), ExternalService::Mail, Document::new())
            .await
            .unwrap_err();
        assert_eq!(err, NotifyError::ExternalFailure("Permission Denied!".into()));
        assert_eq!(client.fetch_secret(&member(), ExternalService::Mail).unwrap(), "mailpass");
    }

    #[tokio::test]
    async fn test_http_failure_status() {
        let transport = MockTransport::answering(WebhookResponse {
            status: 502,
            body: serde_json::Value::Null,
        });
        let client = client(site(), transport, 1.0);
        let err = client
            .invoke(&member(), ExternalService::Mail, Document::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NotifyError::ExternalFailure("the server responded with code 502".into())
        );
    }

    #[tokio::test]
    async fn test_successful_call_rotates_when_coin_lands() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({"success": true})));
        let client = client(site(), transport, 1.0);
        let reply = client
            .invoke(&member(), ExternalService::Mail, Document::new())
            .await
            .unwrap();
        reply.rotation.expect("rotation spawned").await.unwrap();
        let rotated = client.fetch_secret(&member(), ExternalService::Mail).unwrap();
        assert_ne!(rotated, "mailpass");
        assert_eq!(rotated.len(), 20);
        assert!(rotated.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_drain_waits_for_dropped_rotations() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({"success": true})));
        let client = client(site(), transport, 1.0);
        for _ in 0..3 {
            let reply = client
                .invoke(&member(), ExternalService::Mail, Document::new())
                .await
                .unwrap();
            drop(reply.rotation);
        }
        let drained = client.drain_rotations().await;
        assert!((1..=3).contains(&drained));
        assert_ne!(client.fetch_secret(&member(), ExternalService::Mail).unwrap(), "mailpass");
        assert_eq!(client.drain_rotations().await, 0);
    }

    #[tokio::test]
    async fn test_rotation_failure_is_swallowed() {
        // anonymous may read calendar-view but may not create its secret
        let transport = MockTransport::answering(WebhookResponse::ok(json!([])));
        let store = store(json!({
            "configuration/settings": {"calURL": "https://cal.example/exec", "calView": "public"}
        }));
        let client = client(store.clone(), transport, 1.0);
        let reply = client
            .invoke(&Actor::anonymous(), ExternalService::CalendarView, Document::new())
            .await
            .unwrap();
        reply.rotation.expect("rotation spawned").await.unwrap();
        let path = ExternalService::CalendarView.secret_path().unwrap();
        assert!(store.inner().get(&path).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forced_rotate() {
        let transport = MockTransport::answering(WebhookResponse::ok(json!({})));
        let client = client(site(), transport, 0.0);
        let admin = Actor::new("root", AuthLevel::Admin);
        let secret = client.rotate(&admin, ExternalService::CalendarEdit).unwrap();
        assert_eq!(
            client.fetch_secret(&admin, ExternalService::CalendarEdit).unwrap(),
            secret.expose()
        );
    }
}
