//! Hotplate Root Library
//!
//! Wires the policy engine and the webhook client to a document store and
//! exposes them to the `hotplate` binary.
//!
//! # Architecture
//!
//! The root crate is a thin orchestrator. `initialize_root` loads the JSON
//! snapshot behind the store, wraps it in a `GuardedStore` with the
//! configured `PolicyEngine`, and builds a `WebhookClient` over the same
//! guarded store, so secret rotation passes through the same rules as
//! every other write. `RootState` holds all of it.

pub mod config;
pub mod error;
pub mod http;

pub use config::{HotplateConfig, RotationConfig, ServerConfig, WebhookConfig};
pub use error::{RootError, RootResult};

use hotplate_core::{DocPath, Document, DocumentStore, InMemoryStore};
use hotplate_notify::{
    ExternalService, HttpTransport, SharedSecret, WebhookClient, WebhookTransport,
};
use hotplate_policy::{
    Actor, ActorContext, AuditSink, AuthLevel, Decision, DenyReason, GuardedStore, Operation,
    PolicyAuditEvent, PolicyEngine, WriteRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// uid recorded for maintenance writes made by the CLI.
pub const MAINTENANCE_UID: &str = "hotplate-cli";

// ---------------------------------------------------------------------------
// Decision requests
// ---------------------------------------------------------------------------

/// One request to the enforcement endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideRequest {
    /// Identity claims; absent for anonymous callers.
    #[serde(default)]
    pub actor: Option<ActorContext>,
    pub op: Operation,
    pub path: String,
    #[serde(default)]
    pub existing: Option<Document>,
    #[serde(default)]
    pub proposed: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideResponse {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl From<Decision> for DecideResponse {
    fn from(decision: Decision) -> Self {
        Self {
            allowed: decision.is_allowed(),
            reason: decision.reason(),
        }
    }
}

/// Evaluate one request against the store's current contents.
///
/// A malformed path or actor is an error, not a denial.
pub fn decide<S: DocumentStore>(
    store: &GuardedStore<S>,
    request: &DecideRequest,
) -> RootResult<DecideResponse> {
    let actor = Actor::from_context(request.actor.as_ref())?;
    let path = DocPath::parse(&request.path)?;
    let bodies = WriteRequest {
        existing: request.existing.as_ref(),
        proposed: request.proposed.as_ref(),
    };
    let decision = store.evaluate(&actor, request.op, &path, bodies)?;
    Ok(decision.into())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Writes every enforced decision to the `hotplate::audit` log target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &PolicyAuditEvent) -> Result<(), String> {
        info!(
            target: "hotplate::audit",
            path = %event.path,
            op = %event.op,
            uid = event.uid.as_ref().map(|u| u.as_str()).unwrap_or("-"),
            level = %event.level,
            decision = %event.decision_summary,
            "policy decision"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Root state
// ---------------------------------------------------------------------------

pub struct RootState {
    pub config: HotplateConfig,
    /// Unguarded handle, used only to persist the snapshot.
    pub documents: Arc<InMemoryStore>,
    pub store: Arc<GuardedStore<Arc<InMemoryStore>>>,
    pub webhooks: WebhookClient<Arc<InMemoryStore>>,
}

/// Load the snapshot named by `config.data_file` and wire everything up
/// with the HTTP webhook transport.
pub fn initialize_root(config: HotplateConfig) -> RootResult<RootState> {
    config.validate()?;
    let documents = InMemoryStore::load(&config.data_file)?;
    let transport = Arc::new(HttpTransport::new(config.webhook.timeout())?);
    info!(
        data_file = %config.data_file.display(),
        documents = documents.count(),
        "document snapshot loaded"
    );
    initialize_with(config, Arc::new(documents), transport, Arc::new(TracingAuditSink))
}

/// Wire up a root state over an explicit store, transport and audit sink.
pub fn initialize_with(
    config: HotplateConfig,
    documents: Arc<InMemoryStore>,
    transport: Arc<dyn WebhookTransport>,
    audit: Arc<dyn AuditSink>,
) -> RootResult<RootState> {
    let engine = PolicyEngine::new(config.policy.clone());
    let store = Arc::new(GuardedStore::new(documents.clone(), engine, audit));
    let webhooks = WebhookClient::new(store.clone(), transport, config.rotation.to_policy()?);
    Ok(RootState {
        config,
        documents,
        store,
        webhooks,
    })
}

impl RootState {
    /// Write the store back to `config.data_file`.
    pub fn persist(&self) -> RootResult<()> {
        self.documents.save(&self.config.data_file)?;
        info!(
            data_file = %self.config.data_file.display(),
            documents = self.documents.count(),
            "document snapshot saved"
        );
        Ok(())
    }

    /// Wait for in-flight secret rotations, then persist.
    pub async fn shutdown(&self) -> RootResult<()> {
        self.webhooks.drain_rotations().await;
        self.persist()
    }

    /// Replace a service's secret now, as an administrator.
    pub fn force_rotate(&self, service: ExternalService) -> RootResult<SharedSecret> {
        let admin = Actor::new(MAINTENANCE_UID, AuthLevel::Admin);
        Ok(self.webhooks.rotate(&admin, service)?)
    }
}
