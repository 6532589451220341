// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  The dashboard is a read-mostly
// surface: the only mutation is the user's selection.
//
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::selection::{ChangeKind, Selection, SelectionUpdate};
use crate::view_state::{OptionsView, SharedViewState, ViewSnapshot};

type ApiError = (StatusCode, Json<serde_json::Value>);

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<SharedViewState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/options", get(options))
        .route("/api/v1/selection", get(current_selection))
        .route("/api/v1/selection", post(update_selection))
        // ── WebSocket (handled in the ws module but mounted here) ───
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<SharedViewState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full view snapshot
// =============================================================================

async fn full_state(
    State(state): State<Arc<SharedViewState>>,
) -> Result<Json<ViewSnapshot>, ApiError> {
    state.build_snapshot().map(Json).map_err(|e| {
        warn!(error = %e, "failed to build view snapshot");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })
}

// =============================================================================
// Options
// =============================================================================

async fn options(State(state): State<Arc<SharedViewState>>) -> Json<OptionsView> {
    Json(OptionsView::from_config(state.config()))
}

// =============================================================================
// Selection
// =============================================================================

async fn current_selection(State(state): State<Arc<SharedViewState>>) -> Json<Selection> {
    Json(state.selection())
}

#[derive(Serialize)]
struct SelectionResponse {
    selection: Selection,
    kind: ChangeKind,
    changes: Vec<String>,
    state_version: u64,
}

async fn update_selection(
    State(state): State<Arc<SharedViewState>>,
    Json(update): Json<SelectionUpdate>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let applied = state.apply_selection(&update).map_err(|e| {
        warn!(error = %e, "selection update rejected");
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;

    if applied.kind != ChangeKind::None {
        info!(kind = ?applied.kind, "selection updated via API");
    }

    Ok(Json(SelectionResponse {
        selection: applied.selection,
        kind: applied.kind,
        changes: applied.changes,
        state_version: state.current_state_version(),
    }))
}
