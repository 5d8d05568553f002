//! Hotplate Policy Engine
//!
//! Decides every read and write against the content tree. An actor's raw
//! identity claims collapse to a four-level `AuthLevel`; the engine then
//! evaluates the request against the node's ancestor chain and the
//! schema allow-lists and returns `Allow` or `Deny(reason)`.
//!
//! - Claims resolution (`claims`) is the only place raw claims are read
//! - Visibility is a top-down walk over the page gate and `hidden` flags
//! - Ownership and comment-only edits for message and signup entries
//! - Field allow-lists checked for every write, ADMIN included
//! - One decision function shared by the UI gate (`gate`) and the store
//!   enforcement hook (`enforce`)

pub mod claims;
pub mod engine;
pub mod enforce;
pub mod error;
pub mod gate;
pub mod path;
pub mod schema;
pub mod tree;
pub mod types;

pub use claims::{resolve_auth_level, Actor, ActorContext, AuthLevel};
pub use engine::{PolicyConfig, PolicyEngine, WriteRequest};
pub use enforce::{AuditSink, GuardedStore, InMemoryAuditSink};
pub use error::{PolicyError, PolicyResult};
pub use gate::UiGate;
pub use path::{classify, PathKind};
pub use schema::{allowed_fields, validate_shape, PROFILE_RESTRICTED_FIELDS};
pub use tree::{
    ContentNode, ContentPath, MessageEntry, Page, PageGate, Segment, SignupEntry, SignupSheet,
    SubItem, Widget, WidgetKind,
};
pub use types::{
    secret_group_field, Decision, DenyReason, NodeKind, Operation, PermissionGroup,
    PolicyAuditEvent, SECRET_DOCUMENT_IDS,
};
