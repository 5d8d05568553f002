use std::sync::{Arc, Mutex};

use hotplate_core::{
    merge_documents, str_field, CoreError, DocPath, Document, DocumentStore, Timestamp,
};

use crate::claims::Actor;
use crate::engine::{PolicyEngine, WriteRequest};
use crate::error::{PolicyError, PolicyResult};
use crate::path::{classify, PathKind};
use crate::tree::{ContentNode, ContentPath, Page, PageGate, Segment, SignupSheet, SubItem, Widget};
use crate::types::{secret_group_field, Decision, Operation, PermissionGroup, PolicyAuditEvent};

const SETTINGS_PATH: &str = "configuration/settings";

// ---------------------------------------------------------------------------
// AuditSink trait: enforcement decision recording
// ---------------------------------------------------------------------------

/// Receives one event per enforced decision, before the operation
/// is applied to the store.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &PolicyAuditEvent) -> Result<(), String>;
}

/// In-memory audit sink for testing.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<PolicyAuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PolicyAuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &PolicyAuditEvent) -> Result<(), String> {
        self.events
            .lock()
            .map_err(|_| "audit sink lock poisoned".to_string())?
            .push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GuardedStore: authoritative enforcement in front of a DocumentStore
// ---------------------------------------------------------------------------

/// Wraps a store so every operation passes the policy engine first.
///
/// Ancestors are loaded from the wrapped store to build the chain the
/// engine walks. A denial becomes `PolicyError::Denied` and the store is
/// left untouched.
pub struct GuardedStore<S> {
    inner: S,
    engine: PolicyEngine,
    audit: Arc<dyn AuditSink>,
}

impl<S: DocumentStore> GuardedStore<S> {
    pub fn new(inner: S, engine: PolicyEngine, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            inner,
            engine,
            audit,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Evaluate one request without applying it. The decision is audited
    /// and logged like an enforced one.
    ///
    /// For reads with no `existing` body the stored document is used to
    /// find the target's own hidden flag.
    pub fn evaluate(
        &self,
        actor: &Actor,
        op: Operation,
        path: &DocPath,
        request: WriteRequest<'_>,
    ) -> PolicyResult<Decision> {
        let stored = match (op, request.existing) {
            (Operation::Read, None) => self.inner.get(path)?,
            _ => None,
        };
        let target = request.existing.or(stored.as_ref());
        let node = self.resolve(path, target)?;
        let decision = self.engine.decide(actor, op, &node, request);
        self.record(actor, op, path, decision)?;
        Ok(decision)
    }

    pub fn get(&self, actor: &Actor, path: &DocPath) -> PolicyResult<Option<Document>> {
        let stored = self.inner.get(path)?;
        let request = WriteRequest {
            existing: stored.as_ref(),
            proposed: None,
        };
        enforce(self.evaluate(actor, Operation::Read, path, request)?)?;
        Ok(stored)
    }

    /// Replace the document at `path`. Create or Update is chosen by
    /// whether a document already exists.
    ///
    /// The write only lands if the stored body is still the one the
    /// decision saw; otherwise it fails with `CoreError::Conflict`.
    pub fn set(&self, actor: &Actor, path: &DocPath, body: Document) -> PolicyResult<()> {
        let existing = self.inner.get(path)?;
        self.write(actor, path, existing.as_ref(), body)
    }

    /// Merge `patch` over the stored document and write the result.
    pub fn update(&self, actor: &Actor, path: &DocPath, patch: &Document) -> PolicyResult<Document> {
        let existing = self.inner.get(path)?;
        let empty = Document::new();
        let merged = merge_documents(existing.as_ref().unwrap_or(&empty), patch);
        self.write(actor, path, existing.as_ref(), merged.clone())?;
        Ok(merged)
    }

    /// Remove the document at `path`. Returns false if nothing was stored.
    ///
    /// Delete is evaluated even when nothing is stored; absence is only
    /// reported after an Allow.
    pub fn delete(&self, actor: &Actor, path: &DocPath) -> PolicyResult<bool> {
        let existing = self.inner.get(path)?;
        let request = match existing.as_ref() {
            Some(body) => WriteRequest::delete(body),
            None => WriteRequest::none(),
        };
        enforce(self.evaluate(actor, Operation::Delete, path, request)?)?;
        if !self.inner.compare_and_delete(path, existing.as_ref())? {
            return Err(conflict(path));
        }
        Ok(existing.is_some())
    }

    fn write(
        &self,
        actor: &Actor,
        path: &DocPath,
        existing: Option<&Document>,
        body: Document,
    ) -> PolicyResult<()> {
        let op = if existing.is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        let request = WriteRequest {
            existing,
            proposed: Some(&body),
        };
        enforce(self.evaluate(actor, op, path, request)?)?;
        if !self.inner.compare_and_swap(path, existing, body)? {
            return Err(conflict(path));
        }
        Ok(())
    }

    /// Build the decision target for `path`, loading ancestors from the
    /// wrapped store. `target` is the node's own body, if any.
    pub fn resolve(&self, path: &DocPath, target: Option<&Document>) -> PolicyResult<ContentNode> {
        let node = match classify(path)? {
            PathKind::Page => {
                let gate = target
                    .map(|body| PageGate::from(&Page::from_document(last_id(path), body)))
                    .unwrap_or_else(PageGate::missing);
                ContentNode::Page(gate)
            }
            PathKind::Widget => ContentNode::Widget(self.content_path(path, target)?),
            PathKind::SubItem => ContentNode::SubItem(self.content_path(path, target)?),
            PathKind::MessageEntry => ContentNode::MessageEntry(self.content_path(path, None)?),
            PathKind::SignupSheet => ContentNode::SignupSheet(self.content_path(path, target)?),
            PathKind::SignupEntry => ContentNode::SignupEntry(self.content_path(path, None)?),
            PathKind::Settings => ContentNode::Settings,
            PathKind::PrivateSettings => ContentNode::PrivateSettings,
            PathKind::Theme => ContentNode::Theme,
            PathKind::Documentation => ContentNode::Documentation,
            PathKind::Secret(id) => {
                let group = self.secret_group(&id)?;
                ContentNode::Secret { id, group }
            }
            PathKind::AdminRoster(_) => ContentNode::AdminRoster,
            PathKind::WebmasterRoster(_) => ContentNode::WebmasterRoster,
            PathKind::Profile(owner) => ContentNode::Profile { owner },
        };
        Ok(node)
    }

    /// Walk from the owning page down to `path`.
    ///
    /// A missing ancestor counts as hidden; a missing page as `Unset`.
    /// The target contributes its own flag only when its body is known.
    fn content_path(&self, path: &DocPath, target: Option<&Document>) -> PolicyResult<ContentPath> {
        let invalid = || PolicyError::InvalidPath(path.to_string());
        let page_path = path.prefix(2).ok_or_else(invalid)?;
        let gate = self
            .inner
            .get(&page_path)?
            .map(|body| PageGate::from(&Page::from_document(last_id(&page_path), &body)))
            .unwrap_or_else(PageGate::missing);
        let mut chain = ContentPath::new(gate);

        for len in (4..=path.len()).step_by(2) {
            let node_path = path.prefix(len).ok_or_else(invalid)?;
            let is_target = len == path.len();
            let body = if is_target {
                target.cloned()
            } else {
                self.inner.get(&node_path)?
            };
            let id = last_id(&node_path);

            match (classify(&node_path)?, body) {
                (PathKind::Widget, Some(body)) => {
                    let widget = Widget::from_document(id, &body);
                    if let Some(collection) = path.segments().get(len) {
                        if !widget.kind.accepts(collection) {
                            return Err(PolicyError::InvalidPath(format!(
                                "{}: widget '{}' holds {}, not {}",
                                path,
                                id,
                                widget.kind.child_collection(),
                                collection
                            )));
                        }
                    }
                    chain.push(Segment::from(&widget));
                }
                (PathKind::SubItem, Some(body)) => {
                    chain.push(Segment::from(&SubItem::from_document(id, &body)))
                }
                (PathKind::SignupSheet, Some(body)) => {
                    chain.push(Segment::from(&SignupSheet::from_document(id, &body)))
                }
                (PathKind::Widget, None) if !is_target => {
                    chain.push(Segment::Widget { hidden: true })
                }
                (PathKind::SubItem, None) if !is_target => {
                    chain.push(Segment::Item { hidden: true })
                }
                (PathKind::SignupSheet, None) if !is_target => chain.push(Segment::Sheet {
                    hidden: true,
                    enabled: false,
                }),
                _ => {}
            }
        }
        Ok(chain)
    }

    fn secret_group(&self, secret_id: &str) -> PolicyResult<PermissionGroup> {
        let Some(field) = secret_group_field(secret_id) else {
            return Ok(PermissionGroup::Unset);
        };
        let settings_path = DocPath::parse(SETTINGS_PATH)?;
        let group = self
            .inner
            .get(&settings_path)?
            .and_then(|settings| str_field(&settings, field).map(PermissionGroup::parse))
            .unwrap_or(PermissionGroup::Unset);
        Ok(group)
    }

    fn record(
        &self,
        actor: &Actor,
        op: Operation,
        path: &DocPath,
        decision: Decision,
    ) -> PolicyResult<()> {
        match decision {
            Decision::Allow => tracing::debug!(
                path = %path,
                op = %op,
                level = %actor.level,
                "policy allowed"
            ),
            Decision::Deny(reason) => tracing::warn!(
                path = %path,
                op = %op,
                level = %actor.level,
                reason = %reason,
                "policy denied"
            ),
        }

        let event = PolicyAuditEvent {
            timestamp: Timestamp::now(),
            path: path.to_string(),
            op,
            uid: actor.uid.clone(),
            level: actor.level,
            decision,
            decision_summary: decision.summary(),
        };
        self.audit.emit(&event).map_err(|e| {
            PolicyError::AuditSinkError(format!("failed to emit decision audit: {}", e))
        })
    }
}

fn enforce(decision: Decision) -> PolicyResult<()> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(PolicyError::Denied(reason)),
    }
}

fn conflict(path: &DocPath) -> PolicyError {
    tracing::warn!(path = %path, "document changed during a guarded write");
    PolicyError::Store(CoreError::Conflict(path.to_string()))
}

fn last_id(path: &DocPath) -> &str {
    path.segments().last().map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::AuthLevel;
    use crate::types::DenyReason;
    use hotplate_core::InMemoryStore;
    use serde_json::json;

    fn p(raw: &str) -> DocPath {
        DocPath::parse(raw).unwrap()
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn guarded(snapshot: serde_json::Value) -> (GuardedStore<InMemoryStore>, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let store = InMemoryStore::from_snapshot(&snapshot).unwrap();
        let guarded = GuardedStore::new(store, PolicyEngine::default(), sink.clone());
        (guarded, sink)
    }

    fn user(uid: &str) -> Actor {
        Actor::new(uid, AuthLevel::User)
    }

    #[test]
    fn test_get_allowed_and_denied() {
        let (store, sink) = guarded(json!({
            "pages/p1": {"permissions": "webmasters"},
            "pages/p1/widgets/w": {"hidden": false},
            "pages/p2": {"permissions": "users"},
            "pages/p2/widgets/w": {"hidden": false},
        }));
        let err = store
            .get(&Actor::anonymous(), &p("pages/p1/widgets/w"))
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::InsufficientGroup));
        assert!(store.get(&user("u"), &p("pages/p2/widgets/w")).unwrap().is_some());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].decision_summary, "DENY: insufficient-group");
        assert!(events[1].decision.is_allowed());
    }

    #[test]
    fn test_target_hidden_flag_read_from_store() {
        let (store, _) = guarded(json!({
            "pages/p3": {"permissions": "public"},
            "pages/p3/widgets/w": {"hidden": true},
        }));
        let err = store.get(&user("u"), &p("pages/p3/widgets/w")).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::Hidden));
        let webmaster = Actor::new("w", AuthLevel::Webmaster);
        assert!(store.get(&webmaster, &p("pages/p3/widgets/w")).is_ok());
    }

    #[test]
    fn test_missing_ancestor_fails_closed() {
        let (store, _) = guarded(json!({
            "pages/p": {"permissions": "public"},
        }));
        let err = store
            .get(&user("u"), &p("pages/p/widgets/gone/items/i"))
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::Hidden));

        let (store, _) = guarded(json!({}));
        let err = store.get(&user("u"), &p("pages/nowhere/widgets/w")).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::InsufficientGroup));
    }

    #[test]
    fn test_widget_kind_mismatch_is_invalid_path() {
        let (store, _) = guarded(json!({
            "pages/p": {"permissions": "public"},
            "pages/p/widgets/w": {"kind": "signup-sheet"},
        }));
        let err = store
            .get(&user("u"), &p("pages/p/widgets/w/messages/m"))
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPath(_)));
    }

    #[test]
    fn test_set_create_then_comment_update() {
        let (store, _) = guarded(json!({
            "pages/p": {"permissions": "users"},
            "pages/p/widgets/w": {"kind": "message-stream"},
        }));
        let path = p("pages/p/widgets/w/messages/m1");
        store
            .set(&user("alice"), &path, doc(json!({"uid": "alice", "content": "hi"})))
            .unwrap();

        let merged = store
            .update(&user("bob"), &path, &doc(json!({"comments": ["welcome"]})))
            .unwrap();
        assert_eq!(merged.get("content"), Some(&json!("hi")));

        let err = store
            .update(&user("bob"), &path, &doc(json!({"content": "mine now"})))
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotOwner));
        let stored = store.inner().get(&path).unwrap().unwrap();
        assert_eq!(stored.get("content"), Some(&json!("hi")));
    }

    #[test]
    fn test_delete_enforced() {
        let (store, _) = guarded(json!({
            "pages/p": {"permissions": "users"},
            "pages/p/widgets/w": {"kind": "message-stream"},
            "pages/p/widgets/w/messages/m1": {"uid": "alice", "content": "hi"},
        }));
        let path = p("pages/p/widgets/w/messages/m1");
        assert!(store.delete(&user("bob"), &path).is_err());
        assert!(store.inner().exists(&path).unwrap());
        assert!(store.delete(&user("alice"), &path).unwrap());
        // gone: the owner can no longer be established
        let err = store.delete(&user("alice"), &path).unwrap_err();
        assert_eq!(err.deny_reason(), Some(DenyReason::NotOwner));
        let webmaster = Actor::new("w", AuthLevel::Webmaster);
        assert!(!store.delete(&webmaster, &path).unwrap());
    }

    #[test]
    fn test_delete_of_absent_document_is_still_gated() {
        let (store, sink) = guarded(json!({
            "admins/alice": {"email": "alice@example.org"},
        }));
        let present = store.delete(&Actor::anonymous(), &p("admins/alice")).unwrap_err();
        let absent = store.delete(&Actor::anonymous(), &p("admins/bob")).unwrap_err();
        assert_eq!(present.deny_reason(), Some(DenyReason::NotPrivileged));
        assert_eq!(absent.deny_reason(), Some(DenyReason::NotPrivileged));
        assert!(store.inner().exists(&p("admins/alice")).unwrap());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.op == Operation::Delete));
        assert_eq!(events[1].path, "admins/bob");

        let admin = Actor::new("root", AuthLevel::Admin);
        assert!(!store.delete(&admin, &p("admins/bob")).unwrap());
        assert_eq!(sink.events().len(), 3);
    }

    /// Applies a competing write right after the guarded store reads the
    /// target, before its own write reaches the store.
    struct Interleaving {
        inner: InMemoryStore,
        target: DocPath,
        competing: Mutex<Option<Document>>,
    }

    impl DocumentStore for Interleaving {
        fn get(&self, path: &DocPath) -> hotplate_core::CoreResult<Option<Document>> {
            let current = self.inner.get(path)?;
            if *path == self.target {
                if let Some(body) = self.competing.lock().unwrap().take() {
                    self.inner.set(path, body)?;
                }
            }
            Ok(current)
        }

        fn set(&self, path: &DocPath, body: Document) -> hotplate_core::CoreResult<()> {
            self.inner.set(path, body)
        }

        fn delete(&self, path: &DocPath) -> hotplate_core::CoreResult<bool> {
            self.inner.delete(path)
        }

        fn compare_and_swap(
            &self,
            path: &DocPath,
            expected: Option<&Document>,
            body: Document,
        ) -> hotplate_core::CoreResult<bool> {
            self.inner.compare_and_swap(path, expected, body)
        }

        fn compare_and_delete(
            &self,
            path: &DocPath,
            expected: Option<&Document>,
        ) -> hotplate_core::CoreResult<bool> {
            self.inner.compare_and_delete(path, expected)
        }
    }

    #[test]
    fn test_write_against_stale_body_conflicts() {
        let path = p("pages/p/widgets/w/messages/m1");
        let inner = InMemoryStore::from_snapshot(&json!({
            "pages/p": {"permissions": "users"},
            "pages/p/widgets/w": {"kind": "message-stream"},
            "pages/p/widgets/w/messages/m1": {"uid": "alice", "content": "hi"},
        }))
        .unwrap();
        let store = GuardedStore::new(
            Interleaving {
                inner,
                target: path.clone(),
                competing: Mutex::new(Some(doc(
                    json!({"uid": "alice", "content": "alice edited"}),
                ))),
            },
            PolicyEngine::default(),
            Arc::new(InMemoryAuditSink::new()),
        );

        // bob's comment passes against the body he read, but alice got there first
        let err = store
            .set(
                &user("bob"),
                &path,
                doc(json!({"uid": "alice", "content": "hi", "comments": ["nice"]})),
            )
            .unwrap_err();
        assert!(matches!(err, PolicyError::Store(CoreError::Conflict(_))));
        let stored = store.inner().get(&path).unwrap().unwrap();
        assert_eq!(stored.get("content"), Some(&json!("alice edited")));
        assert_eq!(stored.get("comments"), None);

        // a delete decided against an older body is refused the same way
        store
            .inner()
            .competing
            .lock()
            .unwrap()
            .replace(doc(json!({"uid": "alice", "content": "third draft"})));
        let err = store.delete(&user("alice"), &path).unwrap_err();
        assert!(matches!(err, PolicyError::Store(CoreError::Conflict(_))));
        assert!(store.inner().exists(&path).unwrap());
    }

    #[test]
    fn test_secret_group_comes_from_settings() {
        let (store, _) = guarded(json!({
            "configuration/settings": {"calView": "public", "email": "users"},
            "configuration/calendar-view": {"password": "abc"},
            "configuration/mail": {"password": "def"},
            "configuration/calendar-edit": {"password": "ghi"},
        }));
        assert!(store
            .get(&Actor::anonymous(), &p("configuration/calendar-view"))
            .is_ok());
        assert!(store
            .get(&Actor::anonymous(), &p("configuration/mail"))
            .is_err());
        assert!(store.get(&user("u"), &p("configuration/mail")).is_ok());
        // no calEdit field: unset, webmasters only
        assert!(store
            .get(&user("u"), &p("configuration/calendar-edit"))
            .is_err());
    }

    #[test]
    fn test_evaluate_does_not_write() {
        let (store, sink) = guarded(json!({}));
        let body = doc(json!({"light": {}, "dark": {}}));
        let decision = store
            .evaluate(
                &Actor::new("w", AuthLevel::Webmaster),
                Operation::Create,
                &p("configuration/theme"),
                WriteRequest::create(&body),
            )
            .unwrap();
        assert!(decision.is_allowed());
        assert_eq!(store.inner().count(), 0);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_invalid_path_is_error_not_denial() {
        let (store, sink) = guarded(json!({}));
        let err = store
            .get(&Actor::anonymous(), &p("scratch/anything"))
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPath(_)));
        assert!(sink.events().is_empty());
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn emit(&self, _event: &PolicyAuditEvent) -> Result<(), String> {
            Err("disk full".to_string())
        }
    }

    #[test]
    fn test_audit_failure_blocks_write() {
        let store = GuardedStore::new(
            InMemoryStore::new(),
            PolicyEngine::default(),
            Arc::new(FailingSink),
        );
        let admin = Actor::new("a", AuthLevel::Admin);
        let err = store
            .set(&admin, &p("configuration/theme"), doc(json!({"light": {}})))
            .unwrap_err();
        assert!(matches!(err, PolicyError::AuditSinkError(_)));
        assert_eq!(store.inner().count(), 0);
    }
}
