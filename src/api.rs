// src/api.rs
// Trigger surface: a thin HTTP layer over the driver. Sync stays a
// background job; the API only starts runs and reports status.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::driver::SyncDriver;
use crate::error::SyncError;
use crate::store::EventStore;
use crate::types::SessionStatus;

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<SyncDriver>,
    pub store: Arc<dyn EventStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sync", post(trigger_sync))
        .route("/status", get(session_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    processed_count: usize,
    needs_relink: bool,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.driver.run().await {
        Ok(report) => Ok(Json(SyncResponse {
            processed_count: report.processed_count(),
            needs_relink: report.needs_relink,
        })),
        Err(SyncError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "sync already running".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(error = %e, "sync trigger failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

async fn session_status(
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.load_session_status() {
        Ok(status) => Ok(Json(status)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
