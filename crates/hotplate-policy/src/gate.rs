use hotplate_core::Document;

use crate::claims::{Actor, ActorContext, AuthLevel};
use crate::engine::{PolicyEngine, WriteRequest};
use crate::error::PolicyResult;
use crate::tree::ContentNode;
use crate::types::{Operation, PermissionGroup};

/// Advisory gating for rendering: what to show and which controls to
/// enable. Answers come from the same `decide` the store enforces, so
/// the UI never offers something the store would reject.
pub struct UiGate<'a> {
    engine: &'a PolicyEngine,
    actor: Actor,
}

impl<'a> UiGate<'a> {
    pub fn new(engine: &'a PolicyEngine, context: Option<&ActorContext>) -> PolicyResult<Self> {
        Ok(Self {
            engine,
            actor: Actor::from_context(context)?,
        })
    }

    pub fn for_actor(engine: &'a PolicyEngine, actor: Actor) -> Self {
        Self { engine, actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn level(&self) -> AuthLevel {
        self.actor.level
    }

    pub fn can_read(&self, node: &ContentNode) -> bool {
        self.allowed(Operation::Read, node, WriteRequest::none())
    }

    pub fn can_create(&self, node: &ContentNode, proposed: &Document) -> bool {
        self.allowed(Operation::Create, node, WriteRequest::create(proposed))
    }

    pub fn can_edit(&self, node: &ContentNode, existing: &Document, proposed: &Document) -> bool {
        self.allowed(
            Operation::Update,
            node,
            WriteRequest::update(existing, proposed),
        )
    }

    pub fn can_delete(&self, node: &ContentNode, existing: &Document) -> bool {
        self.allowed(Operation::Delete, node, WriteRequest::delete(existing))
    }

    /// Whether the actor may use a webhook-backed feature (calendar,
    /// mail) whose secret is gated by `group`.
    pub fn can_use_service(&self, group: PermissionGroup) -> bool {
        group.admits(self.actor.level)
    }

    fn allowed(&self, op: Operation, node: &ContentNode, request: WriteRequest<'_>) -> bool {
        self.engine.decide(&self.actor, op, node, request).is_allowed()
    }
}
