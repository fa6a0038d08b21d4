//! REST endpoints for sessions, flows, and catalog administration.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::catalog::store::{CatalogStore, CheckBank};
use crate::error::Error;
use crate::pipeline::PipelineEngine;
use crate::session::SessionStore;
use crate::session::model::{MicroCheckRequest, SessionEvent, StartSessionRequest};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PipelineEngine>,
    pub sessions: Arc<SessionStore>,
    pub catalog: Arc<CatalogStore>,
    pub checks: Arc<CheckBank>,
}

/// Build the Axum router with all REST routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/flows", get(list_flows))
        .route("/api/catalog/reload", post(reload_catalog))
        .route("/api/session/start", post(start_session))
        .route("/api/session/{id}", get(get_session))
        .route("/api/session/{id}/event", post(apply_event))
        .route("/api/session/{id}/micro-check", post(apply_micro_check))
        .route("/api/session/{id}/packet", post(build_packet))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a service error to its HTTP status and a JSON error body.
fn error_response(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        Error::Store(_) => StatusCode::NOT_FOUND,
        Error::Pipeline(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

// ── Health / catalog ─────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "visaflow",
        "flows": state.catalog.snapshot().len(),
        "sessions": state.sessions.len().await,
    }))
}

async fn list_flows(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.catalog.snapshot();
    let flows: Vec<serde_json::Value> = snapshot
        .list()
        .iter()
        .map(|pack| {
            serde_json::json!({
                "flow_id": pack.flow_id,
                "title": pack.title,
                "description": pack.description,
                "required_entities": pack.required_entities,
                "steps": pack.step_nodes.len(),
            })
        })
        .collect();
    Json(serde_json::json!({ "flows": flows }))
}

async fn reload_catalog(State(state): State<AppState>) -> impl IntoResponse {
    let flows = match state.catalog.reload() {
        Ok(count) => count,
        Err(e) => return error_response(e.into()).into_response(),
    };
    let checks = match state.checks.reload() {
        Ok(count) => count,
        Err(e) => return error_response(e.into()).into_response(),
    };
    info!(flows, checks, "Catalog reloaded via API");
    Json(serde_json::json!({ "flows": flows, "checks": checks })).into_response()
}

// ── Sessions ─────────────────────────────────────────────────────────

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let (session, mutation) = match state.engine.start_session(request) {
        Ok(started) => started,
        Err(e) => return error_response(e).into_response(),
    };
    let mut body = serde_json::to_value(&session).unwrap_or_default();
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "ui".into(),
            serde_json::to_value(&mutation).unwrap_or_default(),
        );
    }
    state.sessions.create(session).await;
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.sessions.get(id).await {
        Ok(handle) => {
            let session = handle.lock().await;
            Json(serde_json::to_value(&*session).unwrap_or_default()).into_response()
        }
        Err(e) => error_response(e.into()).into_response(),
    }
}

async fn apply_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<SessionEvent>,
) -> impl IntoResponse {
    let handle = match state.sessions.get(id).await {
        Ok(handle) => handle,
        Err(e) => return error_response(e.into()).into_response(),
    };
    let mut session = handle.lock().await;
    match state.engine.apply_event(&mut session, event) {
        Ok(mutation) => Json(serde_json::json!({
            "ui": mutation,
            "session": &*session,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn apply_micro_check(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MicroCheckRequest>,
) -> impl IntoResponse {
    let handle = match state.sessions.get(id).await {
        Ok(handle) => handle,
        Err(e) => return error_response(e.into()).into_response(),
    };
    let mut session = handle.lock().await;
    match state.engine.apply_micro_check(&mut session, &request) {
        Ok(result) => Json(serde_json::json!({
            "result": result,
            "scores": session.scores,
            "current_mode": session.current_mode,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn build_packet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let handle = match state.sessions.get(id).await {
        Ok(handle) => handle,
        Err(e) => return error_response(e.into()).into_response(),
    };
    let mut session = handle.lock().await;
    match state.engine.build_packet(&mut session) {
        Ok(packet) => Json(serde_json::json!({ "packet_markdown": packet })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
