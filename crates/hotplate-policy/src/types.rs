use hotplate_core::{Timestamp, Uid};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::claims::AuthLevel;

// ---------------------------------------------------------------------------
// Operation: what the actor attempts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn is_write(self) -> bool {
        !matches!(self, Operation::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// DenyReason / Decision
// ---------------------------------------------------------------------------

/// Reason tag attached to every denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    /// A hidden node on the ancestor chain, seen by a non-webmaster.
    Hidden,
    /// The effective permission group does not admit the actor.
    InsufficientGroup,
    /// The write touches someone else's document beyond what is permitted.
    NotOwner,
    /// The proposed body carries keys outside the kind's allow-list.
    BadShape,
    /// The actor's level is too low for this operation.
    NotPrivileged,
}

impl DenyReason {
    pub fn tag(self) -> &'static str {
        match self {
            DenyReason::Hidden => "hidden",
            DenyReason::InsufficientGroup => "insufficient-group",
            DenyReason::NotOwner => "not-owner",
            DenyReason::BadShape => "bad-shape",
            DenyReason::NotPrivileged => "not-privileged",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Binary verdict. A denial is a normal value, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }

    /// `Allow` if `condition` holds, otherwise `Deny(reason)`.
    pub fn check(condition: bool, reason: DenyReason) -> Self {
        if condition {
            Decision::Allow
        } else {
            Decision::Deny(reason)
        }
    }

    /// Evaluate `next` only if this decision allows.
    pub fn then(self, next: impl FnOnce() -> Decision) -> Self {
        match self {
            Decision::Allow => next(),
            deny => deny,
        }
    }

    pub fn summary(self) -> String {
        match self {
            Decision::Allow => "ALLOW".to_string(),
            Decision::Deny(reason) => format!("DENY: {}", reason),
        }
    }
}

// ---------------------------------------------------------------------------
// PermissionGroup: declared minimum level for a page or secret
// ---------------------------------------------------------------------------

/// Declared read group of a page or secret document.
///
/// Stored as a string; anything unrecognised is `Unset`, which admits
/// only webmasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionGroup {
    Public,
    Users,
    Webmasters,
    Unset,
}

impl PermissionGroup {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => PermissionGroup::Public,
            "users" => PermissionGroup::Users,
            "webmasters" => PermissionGroup::Webmasters,
            _ => PermissionGroup::Unset,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionGroup::Public => "public",
            PermissionGroup::Users => "users",
            PermissionGroup::Webmasters => "webmasters",
            PermissionGroup::Unset => "",
        }
    }

    /// Lowest level this group admits.
    pub fn minimum_level(self) -> AuthLevel {
        match self {
            PermissionGroup::Public => AuthLevel::None,
            PermissionGroup::Users => AuthLevel::User,
            PermissionGroup::Webmasters | PermissionGroup::Unset => AuthLevel::Webmaster,
        }
    }

    pub fn admits(self, level: AuthLevel) -> bool {
        level >= self.minimum_level()
    }
}

impl From<String> for PermissionGroup {
    fn from(raw: String) -> Self {
        PermissionGroup::parse(&raw)
    }
}

impl From<PermissionGroup> for String {
    fn from(group: PermissionGroup) -> Self {
        group.as_str().to_string()
    }
}

impl fmt::Display for PermissionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionGroup::Unset => write!(f, "unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Page,
    Widget,
    SubItem,
    MessageEntry,
    SignupSheet,
    SignupEntry,
    Settings,
    PrivateSettings,
    Theme,
    Documentation,
    Secret,
    AdminRoster,
    WebmasterRoster,
    Profile,
}

impl NodeKind {
    pub const ALL: [NodeKind; 14] = [
        NodeKind::Page,
        NodeKind::Widget,
        NodeKind::SubItem,
        NodeKind::MessageEntry,
        NodeKind::SignupSheet,
        NodeKind::SignupEntry,
        NodeKind::Settings,
        NodeKind::PrivateSettings,
        NodeKind::Theme,
        NodeKind::Documentation,
        NodeKind::Secret,
        NodeKind::AdminRoster,
        NodeKind::WebmasterRoster,
        NodeKind::Profile,
    ];

    /// Leaves that carry an owner uid.
    pub fn is_owned(self) -> bool {
        matches!(self, NodeKind::MessageEntry | NodeKind::SignupEntry)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Secret documents
// ---------------------------------------------------------------------------

/// Ids of the per-service secret documents under `configuration/`.
pub const SECRET_DOCUMENT_IDS: [&str; 3] = ["calendar-edit", "calendar-view", "mail"];

/// Settings field holding the read group of a secret document.
pub fn secret_group_field(secret_id: &str) -> Option<&'static str> {
    match secret_id {
        "calendar-edit" => Some("calEdit"),
        "calendar-view" => Some("calView"),
        "mail" => Some("email"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PolicyAuditEvent
// ---------------------------------------------------------------------------

/// One enforcement decision, as recorded by an `AuditSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAuditEvent {
    pub timestamp: Timestamp,
    pub path: String,
    pub op: Operation,
    pub uid: Option<Uid>,
    pub level: AuthLevel,
    pub decision: Decision,
    pub decision_summary: String,
}
