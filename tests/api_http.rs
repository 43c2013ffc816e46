// tests/api_http.rs
// Exercises the trigger surface with in-process requests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use http::{Request, StatusCode};
use tower::ServiceExt;

use quizsync::api::{create_router, AppState};
use quizsync::config::SyncConfig;
use quizsync::driver::SyncDriver;
use quizsync::extractor::{Extractor, OpenAiExtractor};
use quizsync::store::{EventStore, JsonFileStore};
use quizsync::types::SessionStatus;

fn state(dir: &std::path::Path) -> AppState {
    let store: Arc<dyn EventStore> = Arc::new(JsonFileStore::new(dir).unwrap());
    let extractor: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(None));
    // No sources configured: a run is a cheap no-op.
    let driver = SyncDriver::new(SyncConfig::default(), store.clone(), extractor);
    AppState {
        driver: Arc::new(driver),
        store,
    }
}

#[tokio::test]
async fn health_answers_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state(dir.path()));

    let res = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn sync_trigger_reports_processed_count() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(state(dir.path()));

    let res = app
        .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["processedCount"], 0);
    assert_eq!(json["needsRelink"], false);
}

#[tokio::test]
async fn sync_trigger_conflicts_while_a_run_is_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let _guard = state.driver.lease().try_acquire().expect("lease free");
    let app = create_router(state);

    let res = app
        .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "sync already running");
}

#[tokio::test]
async fn status_reflects_the_persisted_session_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    state
        .store
        .save_session_status(&SessionStatus {
            connected: false,
            logged_out: true,
            last_sync: None,
            error: Some("logged out".into()),
        })
        .unwrap();
    let app = create_router(state);

    let res = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["loggedOut"], true);
    assert_eq!(json["error"], "logged out");
}
