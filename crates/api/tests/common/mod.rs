#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vimax_api::config::ServerConfig;
use vimax_api::engine::GenerationService;
use vimax_api::router::build_app_router;
use vimax_api::state::AppState;
use vimax_core::generation::PipelineKind;
use vimax_db::DbPool;
use vimax_pipeline::{Artifact, PipelineAdapter, PipelineError, PipelineRegistry, PipelineRequest};

// ---------------------------------------------------------------------------
// Fake pipelines
// ---------------------------------------------------------------------------

/// Writes a small video file into the job's output directory and counts
/// invocations and peak concurrency.
#[derive(Default)]
pub struct FakePipeline {
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePipeline {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineAdapter for FakePipeline {
    fn name(&self) -> &str {
        "fake"
    }

    async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let path = request
            .output_dir
            .join(format!("render.{}", request.request.format.extension()));
        let written = tokio::fs::write(&path, b"not really a video").await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        written?;
        Ok(Artifact::new(path))
    }
}

/// Always fails.
pub struct BrokenPipeline;

#[async_trait]
impl PipelineAdapter for BrokenPipeline {
    fn name(&self) -> &str {
        "broken"
    }

    async fn invoke(&self, _request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        Err(PipelineError::Failed("boom".to_string()))
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub app: Router,
    pub pool: DbPool,
    pub service: Arc<GenerationService>,
    pub config: ServerConfig,
    /// Keeps the output and cache directories alive for the test.
    pub dir: TempDir,
}

/// Build a test `ServerConfig` with output directories under `dir`.
pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        database_url: "sqlite::memory:".to_string(),
        videos_dir: dir.path().join("videos"),
        cache_dir: dir.path().join("cache"),
        cache_sweep_interval_secs: 0,
        ..ServerConfig::default()
    }
}

/// Build the full application with `adapter` serving every pipeline kind.
pub async fn build_test_app(adapter: Arc<dyn PipelineAdapter>) -> TestApp {
    build_test_app_with(adapter, |_| {}).await
}

/// Like [`build_test_app`], with a hook to adjust the configuration.
pub async fn build_test_app_with(
    adapter: Arc<dyn PipelineAdapter>,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&dir);
    configure(&mut config);

    let pool = vimax_db::memory_pool().await.expect("memory pool");
    let pipelines = PipelineRegistry::new()
        .with(PipelineKind::Idea2Video, Arc::clone(&adapter))
        .with(PipelineKind::Script2Video, adapter);

    let service = Arc::new(GenerationService::new(
        pool.clone(),
        pipelines,
        config.engine_settings(),
    ));
    service.start().await.expect("engine start");

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        service: Arc::clone(&service),
    };
    let app = build_app_router(state, &config);

    TestApp {
        app,
        pool,
        service,
        config,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    )
    .await
    .expect("response")
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
    )
    .await
    .expect("response")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Poll `GET /api/v1/jobs/{job_id}` until the job is terminal.
pub async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    let uri = format!("/api/v1/jobs/{job_id}");
    for _ in 0..250 {
        let response = get(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] != "processing" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not finish");
}

/// Poll `GET /api/v1/batches/{batch_id}` until the batch is completed.
pub async fn wait_for_batch(app: &Router, batch_id: &str) -> Value {
    let uri = format!("/api/v1/batches/{batch_id}");
    for _ in 0..500 {
        let response = get(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] == "completed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("batch {batch_id} did not complete");
}
