// tests/metrics_http.rs
// One test only: the recorder can be installed once per process.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use http::Request;
use tower::ServiceExt;

use quizsync::config::SyncConfig;
use quizsync::driver::SyncDriver;
use quizsync::extractor::OpenAiExtractor;
use quizsync::metrics::Metrics;
use quizsync::store::{EventStore, JsonFileStore};

#[tokio::test]
async fn exposition_includes_the_configured_threshold() {
    let metrics = Metrics::init();

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(JsonFileStore::new(dir.path()).unwrap());
    // Construction registers the threshold gauge.
    let _driver = SyncDriver::new(SyncConfig::default(), store, Arc::new(OpenAiExtractor::new(None)));

    let res = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("sync_confidence_threshold"), "{text}");
}
