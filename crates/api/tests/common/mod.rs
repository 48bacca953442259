#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use catalog_core::config::{EngineConfig, ExecutionMode};
use catalog_core::job::Job;
use catalog_core::types::DbId;
use catalog_events::{
    DeliveryPolicy, HttpWebhookSender, InProcessBus, ProgressObserver, WebhookNotifier,
};
use catalog_pipeline::{JobCoordinator, MemoryCatalogStore, MemoryJobStore, MemoryWebhookStore};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use catalog_api::config::ServerConfig;
use catalog_api::routes;
use catalog_api::state::AppState;
use catalog_api::ws::WsManager;

pub const MULTIPART_BOUNDARY: &str = "catalog-test-boundary";

/// Router plus direct handles on the in-memory stores behind it.
pub struct TestApp {
    pub router: Router,
    pub coordinator: Arc<JobCoordinator>,
    pub jobs: Arc<MemoryJobStore>,
    pub catalog: Arc<MemoryCatalogStore>,
    pub webhooks: Arc<MemoryWebhookStore>,
    pub notifier: WebhookNotifier,
    /// Keeps the upload directory alive for the test's duration.
    pub upload_dir: TempDir,
}

impl TestApp {
    /// Files currently stored in the upload directory.
    pub fn stored_uploads(&self) -> Vec<String> {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn wait_for_terminal(&self, job_id: DbId) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.coordinator.get_status(job_id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} still {} after 5s",
                job.status
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Engine config with small thresholds and fast retries.
///
/// Tsync 10, Ttruncate 100, Dbatch 4, imports inline.
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        import_execution: ExecutionMode::Inline,
        delete_sync_threshold: 10,
        delete_truncate_threshold: 100,
        delete_batch_size: 4,
        batch_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(1),
        worker_count: 2,
        ..EngineConfig::default()
    }
}

pub fn test_config(upload_dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        upload_dir: upload_dir.path().to_path_buf(),
        max_upload_bytes: 1024 * 1024,
        ws_heartbeat_secs: 30,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_engine_config(), |_| {})
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses, over in-memory
/// stores.
pub fn build_test_app_with(
    engine_config: EngineConfig,
    tweak: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&upload_dir);
    tweak(&mut config);

    let webhooks = Arc::new(MemoryWebhookStore::new());
    let sender = HttpWebhookSender::with_timeout(Duration::from_secs(2)).unwrap();
    let notifier = WebhookNotifier::new(
        webhooks.clone(),
        Arc::new(sender),
        DeliveryPolicy {
            base_backoff: Duration::from_millis(1),
        },
    );
    let observer: Arc<dyn ProgressObserver> = Arc::new(notifier.clone());

    let jobs = Arc::new(MemoryJobStore::new());
    let catalog = Arc::new(MemoryCatalogStore::new());
    let coordinator = Arc::new(
        JobCoordinator::with_observer(
            engine_config,
            jobs.clone(),
            catalog.clone(),
            Arc::new(InProcessBus::new()),
            Some(observer),
        )
        .unwrap(),
    );

    let state = AppState {
        config: Arc::new(config),
        coordinator: Arc::clone(&coordinator),
        catalog: catalog.clone(),
        webhooks: webhooks.clone(),
        notifier: notifier.clone(),
        ws_manager: Arc::new(WsManager::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        coordinator,
        jobs,
        catalog,
        webhooks,
        notifier,
        upload_dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &TestApp, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post(app: &TestApp, uri: &str) -> Response {
    send(app, Request::post(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn patch_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::patch(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::delete(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a multipart form. `file` is `(filename, contents)`.
pub async fn post_multipart(
    app: &TestApp,
    uri: &str,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> Response {
    let request = Request::post(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(multipart_body(file, fields)))
        .unwrap();
    send(app, request).await
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, contents)) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

/// A CSV with `rows` valid products `SKU-0..`.
pub fn products_csv(rows: usize) -> String {
    let mut csv = String::from("sku,name,price,active\n");
    for i in 0..rows {
        csv.push_str(&format!("SKU-{i},Product {i},{i}.50,yes\n"));
    }
    csv
}
