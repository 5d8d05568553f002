//! Axum HTTP handlers for the Hotplate server.
//!
//! `POST /decide` answers policy questions for the store in front of it,
//! `POST /services/{service}` calls a calendar or mail webhook on behalf
//! of the caller, and `GET /health` reports liveness.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hotplate_core::{CoreError, Document};
use hotplate_notify::{normalize_events, ExternalService, NotifyError};
use hotplate_policy::{Actor, ActorContext, PolicyError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{decide, DecideRequest, RootError, RootState};

/// Shared application state for Axum handlers.
pub struct AppState {
    pub root: RootState,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/decide", post(handle_decide))
        .route("/services/{service}", post(handle_service))
        .with_state(state)
}

/// GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "documents": state.root.documents.count(),
    }))
}

/// POST /decide -- evaluate one request; denials are 200 with `allowed: false`
async fn handle_decide(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecideRequest>,
) -> Response {
    match decide(state.root.store.as_ref(), &request) {
        Ok(verdict) => (StatusCode::OK, Json(verdict)).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ServiceRequest {
    #[serde(default)]
    actor: Option<ActorContext>,
    #[serde(default)]
    payload: Document,
}

/// POST /services/{service} -- call a webhook with the stored secret
async fn handle_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Json(request): Json<ServiceRequest>,
) -> Response {
    let result = async {
        let service: ExternalService = service.parse()?;
        let actor = Actor::from_context(request.actor.as_ref())?;
        let reply = state
            .root
            .webhooks
            .invoke(&actor, service, request.payload)
            .await?;
        // the rotation task keeps running after its handle is dropped
        let rotated = reply.rotation.is_some();
        let body = match service {
            ExternalService::CalendarView => {
                let events = normalize_events(&reply.body)?;
                json!({ "events": events })
            }
            _ => reply.body,
        };
        Ok::<_, RootError>(json!({ "result": body, "rotated": rotated }))
    }
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(&e),
    }
}

fn status_for(err: &RootError) -> StatusCode {
    match err {
        RootError::Policy(PolicyError::Denied(_)) => StatusCode::FORBIDDEN,
        RootError::Policy(PolicyError::InvalidPath(_) | PolicyError::MalformedActor(_)) => {
            StatusCode::BAD_REQUEST
        }
        RootError::Core(CoreError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
        RootError::Core(CoreError::Conflict(_))
        | RootError::Policy(PolicyError::Store(CoreError::Conflict(_))) => StatusCode::CONFLICT,
        RootError::Notify(NotifyError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        RootError::Notify(NotifyError::ConfigurationError(_)) => StatusCode::BAD_REQUEST,
        RootError::Notify(NotifyError::EndpointNotConfigured(_)) => StatusCode::NOT_FOUND,
        RootError::Notify(
            NotifyError::ExternalFailure(_) | NotifyError::Transport(_) | NotifyError::InvalidResponse,
        ) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &RootError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
