use hotplate_core::{changed_fields, str_field, Document};
use serde::{Deserialize, Serialize};

use crate::claims::{Actor, AuthLevel};
use crate::schema::{fields_within, touches_restricted_profile_fields, validate_shape};
use crate::tree::{ContentNode, ContentPath};
use crate::types::{Decision, DenyReason, NodeKind, Operation, PermissionGroup};

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

/// Tunable parts of the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Settings fields a webmaster (not admin) may change.
    pub webmaster_settings_fields: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            webmaster_settings_fields: vec!["defaultPage".to_string(), "footerTxt".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// WriteRequest: bodies accompanying a write
// ---------------------------------------------------------------------------

/// Bodies accompanying a decision. `proposed` is always the complete
/// post-write document; reads carry neither.
///
/// Field-level rules (comment-only edits, restricted profile fields,
/// webmaster settings) compare the two bodies, so callers must pass the
/// stored document as `existing` rather than a patch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteRequest<'a> {
    /// The document as currently stored, if any.
    pub existing: Option<&'a Document>,
    /// The full document as it would be after the write.
    pub proposed: Option<&'a Document>,
}

impl<'a> WriteRequest<'a> {
    /// No bodies: reads, and deletes of a document that is not stored.
    pub fn none() -> Self {
        Self::default()
    }

    /// A new document with nothing stored before it.
    pub fn create(proposed: &'a Document) -> Self {
        Self {
            existing: None,
            proposed: Some(proposed),
        }
    }

    /// Replacing `existing` with `proposed`.
    pub fn update(existing: &'a Document, proposed: &'a Document) -> Self {
        Self {
            existing: Some(existing),
            proposed: Some(proposed),
        }
    }

    /// Removing `existing`. Ownership checks read its `uid`.
    pub fn delete(existing: &'a Document) -> Self {
        Self {
            existing: Some(existing),
            proposed: None,
        }
    }

    /// Top-level fields that differ between the two bodies.
    fn changed(&self) -> std::collections::BTreeSet<String> {
        let empty = Document::new();
        let existing = self.existing.unwrap_or(&empty);
        let proposed = self.proposed.unwrap_or(&empty);
        changed_fields(existing, proposed)
    }
}

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// The access decision function.
///
/// Pure: no I/O, no shared state. The UI gate and the store enforcement
/// hook both call `decide` and must see identical verdicts.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    /// Build an engine with explicit tunables.
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decide whether `actor` may perform `op` on `node`.
    ///
    /// Reads ignore `request`. Writes use it for ownership, shape and
    /// field-level checks; a missing body where one is needed denies.
    pub fn decide(
        &self,
        actor: &Actor,
        op: Operation,
        node: &ContentNode,
        request: WriteRequest<'_>,
    ) -> Decision {
        match op {
            Operation::Read => self.read(actor, node),
            _ => self.write(actor, op, node, request),
        }
    }

    // -- reads --------------------------------------------------------------

    fn read(&self, actor: &Actor, node: &ContentNode) -> Decision {
        match node {
            // profiles and rosters are not covered by the webmaster bypass
            ContentNode::Profile { owner } => Decision::check(
                actor.is(owner.as_str()) || actor.at_least(AuthLevel::Admin),
                DenyReason::NotOwner,
            ),
            ContentNode::AdminRoster | ContentNode::WebmasterRoster => {
                require(actor, AuthLevel::Admin)
            }
            ContentNode::Documentation => require(actor, AuthLevel::Webmaster),
            _ if actor.at_least(AuthLevel::Webmaster) => Decision::Allow,
            ContentNode::Page(_) | ContentNode::Settings | ContentNode::Theme => Decision::Allow,
            ContentNode::PrivateSettings => require(actor, AuthLevel::User),
            ContentNode::Secret { group, .. } => group_gate(*group, actor),
            ContentNode::Widget(path)
            | ContentNode::SubItem(path)
            | ContentNode::MessageEntry(path)
            | ContentNode::SignupSheet(path)
            | ContentNode::SignupEntry(path) => content_gate(path, actor),
        }
    }

    // -- writes -------------------------------------------------------------

    fn write(
        &self,
        actor: &Actor,
        op: Operation,
        node: &ContentNode,
        request: WriteRequest<'_>,
    ) -> Decision {
        let kind = node.kind();
        let shape = || check_shape(kind, op, &request);

        match node {
            ContentNode::MessageEntry(path) | ContentNode::SignupEntry(path) => {
                self.owned_leaf(actor, op, kind, path, &request)
            }
            ContentNode::Page(_)
            | ContentNode::Widget(_)
            | ContentNode::SubItem(_)
            | ContentNode::SignupSheet(_)
            | ContentNode::Theme => require(actor, AuthLevel::Webmaster).then(shape),
            ContentNode::Settings => self.settings(actor, op, &request),
            ContentNode::PrivateSettings => match op {
                Operation::Update => require(actor, AuthLevel::Webmaster),
                _ => require(actor, AuthLevel::Admin),
            }
            .then(shape),
            ContentNode::Documentation => Decision::Deny(DenyReason::NotPrivileged),
            ContentNode::AdminRoster | ContentNode::WebmasterRoster => {
                require(actor, AuthLevel::Admin).then(shape)
            }
            ContentNode::Profile { owner } => {
                self.profile(actor, op, owner.as_str(), &request)
            }
            // rotation writes come from whoever may read the secret
            ContentNode::Secret { group, .. } => match op {
                Operation::Update => group_gate(*group, actor),
                _ => require(actor, AuthLevel::Admin),
            }
            .then(shape),
        }
    }

    /// Message and signup entries: owner writes, member comments, and
    /// signups only while the sheet is open.
    fn owned_leaf(
        &self,
        actor: &Actor,
        op: Operation,
        kind: NodeKind,
        parent: &ContentPath,
        request: &WriteRequest<'_>,
    ) -> Decision {
        if actor.at_least(AuthLevel::Webmaster) {
            return check_shape(kind, op, request);
        }

        // nothing may be written below what the actor cannot see
        content_gate(parent, actor)
            .then(|| require(actor, AuthLevel::User))
            .then(|| match op {
                Operation::Read => Decision::Allow,
                Operation::Create => {
                    let stamped = request.proposed.and_then(|b| str_field(b, "uid"));
                    Decision::check(stamped.is_some_and(|uid| actor.is(uid)), DenyReason::NotOwner)
                        .then(|| check_shape(kind, op, request))
                        .then(|| {
                            if kind != NodeKind::SignupEntry {
                                return Decision::Allow;
                            }
                            let open = matches!(parent.parent_sheet(), Some((false, true)));
                            Decision::check(open, DenyReason::NotPrivileged)
                        })
                }
                Operation::Update => {
                    let Some(owner) = request.existing.and_then(|b| str_field(b, "uid")) else {
                        return Decision::Deny(DenyReason::NotOwner);
                    };
                    if actor.is(owner) {
                        let kept = request.proposed.and_then(|b| str_field(b, "uid")) == Some(owner);
                        check_shape(kind, op, request)
                            .then(|| Decision::check(kept, DenyReason::NotOwner))
                    } else {
                        let comment_only = fields_within(&request.changed(), &["comments"]);
                        check_shape(kind, op, request)
                            .then(|| Decision::check(comment_only, DenyReason::NotOwner))
                    }
                }
                Operation::Delete => {
                    let owner = request.existing.and_then(|b| str_field(b, "uid"));
                    Decision::check(owner.is_some_and(|uid| actor.is(uid)), DenyReason::NotOwner)
                }
            })
    }

    /// Admins change any field, webmasters only the configured ones.
    fn settings(&self, actor: &Actor, op: Operation, request: &WriteRequest<'_>) -> Decision {
        let shape = || check_shape(NodeKind::Settings, op, request);
        match op {
            Operation::Update if actor.at_least(AuthLevel::Admin) => shape(),
            Operation::Update if actor.at_least(AuthLevel::Webmaster) => shape().then(|| {
                Decision::check(
                    fields_within(
                        &request.changed(),
                        self.config.webmaster_settings_fields.as_slice(),
                    ),
                    DenyReason::BadShape,
                )
            }),
            Operation::Update => Decision::Deny(DenyReason::NotPrivileged),
            _ => require(actor, AuthLevel::Admin).then(shape),
        }
    }

    fn profile(
        &self,
        actor: &Actor,
        op: Operation,
        owner: &str,
        request: &WriteRequest<'_>,
    ) -> Decision {
        let shape = || check_shape(NodeKind::Profile, op, request);
        match op {
            Operation::Create => require(actor, AuthLevel::Admin).then(shape),
            // removed only by account deletion, outside this engine
            Operation::Delete => Decision::Deny(DenyReason::NotPrivileged),
            _ if actor.at_least(AuthLevel::Admin) => shape(),
            _ if actor.is(owner) => require(actor, AuthLevel::User).then(shape).then(|| {
                Decision::check(
                    !touches_restricted_profile_fields(&request.changed()),
                    DenyReason::NotPrivileged,
                )
            }),
            _ => Decision::Deny(DenyReason::NotOwner),
        }
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

fn require(actor: &Actor, level: AuthLevel) -> Decision {
    Decision::check(actor.at_least(level), DenyReason::NotPrivileged)
}

fn group_gate(group: PermissionGroup, actor: &Actor) -> Decision {
    Decision::check(group.admits(actor.level), DenyReason::InsufficientGroup)
}

/// Hidden anywhere on the chain denies, then the page group decides.
fn content_gate(path: &ContentPath, actor: &Actor) -> Decision {
    if path.any_hidden() {
        return Decision::Deny(DenyReason::Hidden);
    }
    group_gate(path.group(), actor)
}

fn check_shape(kind: NodeKind, op: Operation, request: &WriteRequest<'_>) -> Decision {
    if !matches!(op, Operation::Create | Operation::Update) {
        return Decision::Allow;
    }
    let valid = request
        .proposed
        .is_some_and(|body| validate_shape(kind, body));
    Decision::check(valid, DenyReason::BadShape)
}
