use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use opentelemetry_sdk::Resource;
use tempfile::TempDir;
use tower::ServiceExt;

use wiki_api::config::{TelemetryConfig, TracerStrategy};
use wiki_api::observability::lifecycle::{DialedLifecycle, DisabledLifecycle};
use wiki_api::observability::{
    InMemoryRequestCounter, LifecycleState, Observability, PrometheusRequestMetrics,
    RequestRecorder, TracerLifecycle, TracerManager,
};
use wiki_api::routing::Action;
use wiki_api::storage::{FilePageStore, Page, PageStore};
use wiki_api::{AppServices, create_router};

struct TestApp {
    router: Router,
    store: Arc<dyn PageStore>,
    manager: Arc<TracerManager>,
    _dir: TempDir,
}

async fn build_app(
    lifecycle: Box<dyn TracerLifecycle>,
    recorder: Arc<dyn RequestRecorder>,
    prometheus: Option<Arc<PrometheusRequestMetrics>>,
) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn PageStore> = Arc::new(FilePageStore::new(dir.path()));
    let manager = Arc::new(TracerManager::new(lifecycle, Duration::from_secs(2)));
    let tracer = manager.initialize(Resource::empty()).await;

    let services = AppServices {
        store: store.clone(),
        observability: Observability::new(tracer, recorder),
        tracer_manager: manager.clone(),
        prometheus,
    };

    TestApp {
        router: create_router(&services),
        store,
        manager,
        _dir: dir,
    }
}

async fn counting_app() -> (TestApp, Arc<InMemoryRequestCounter>) {
    let counter = Arc::new(InMemoryRequestCounter::new());
    let app = build_app(Box::new(DisabledLifecycle), counter.clone(), None).await;
    (app, counter)
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_view_existing_and_missing_pages() {
    let (app, _) = counting_app().await;
    app.store.save(&Page::new("Test", "hello")).await.unwrap();

    let response = send(&app, get("/view/Test")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("hello"));

    let response = send(&app, get("/view/Missing")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/edit/Missing");
}

#[tokio::test]
async fn test_save_then_view_shows_new_body() {
    let (app, _) = counting_app().await;
    app.store.save(&Page::new("Test", "hello")).await.unwrap();

    let response = send(&app, post_form("/save/Test", "body=world")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/view/Test");

    let html = body_string(send(&app, get("/view/Test")).await).await;
    assert!(html.contains("world"));
    assert!(!html.contains("hello"));
}

#[tokio::test]
async fn test_edit_accepts_get_and_post() {
    let (app, counter) = counting_app().await;

    let response = send(&app, get("/edit/Fresh")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("action=\"/save/Fresh\""));

    let response = send(&app, post_form("/edit/Fresh", "")).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(counter.count(Action::Edit), 2);
}

#[tokio::test]
async fn test_request_counts_per_action() {
    let (app, counter) = counting_app().await;
    app.store.save(&Page::new("Test", "hello")).await.unwrap();

    for _ in 0..3 {
        send(&app, get("/view/Test")).await;
    }
    for _ in 0..2 {
        send(&app, post_form("/save/Test", "body=again")).await;
    }

    let counts = counter.snapshot();
    assert_eq!(counts.get(&Action::View), Some(&3));
    assert_eq!(counts.get(&Action::Save), Some(&2));
    assert_eq!(counts.get(&Action::Edit), None);
}

#[tokio::test]
async fn test_unmatched_paths_are_not_counted() {
    let (app, counter) = counting_app().await;

    for uri in ["/", "/view/", "/view/not-valid", "/view/a/b", "/delete/Test", "/views/Test"] {
        let response = send(&app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body_string(response).await, "404 page not found");
    }

    let response = send(&app, get("/save/Test")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    assert!(counter.snapshot().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint_reports_counters() {
    let metrics = Arc::new(PrometheusRequestMetrics::new(&[("service", "gowiki")]));
    let app = build_app(Box::new(DisabledLifecycle), metrics.clone(), Some(metrics)).await;

    for _ in 0..3 {
        send(&app, get("/view/Test")).await;
    }
    for _ in 0..2 {
        send(&app, post_form("/save/Test", "body=x")).await;
    }

    let response = send(&app, get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("# TYPE wiki_pages_total counter"));
    assert!(
        body.lines()
            .any(|l| l.starts_with("wiki_pages_total") && l.contains("handler=\"view\"") && l.ends_with(" 3"))
    );
    assert!(
        body.lines()
            .any(|l| l.starts_with("wiki_pages_total") && l.contains("handler=\"save\"") && l.ends_with(" 2"))
    );
}

#[tokio::test]
async fn test_metrics_disabled_returns_unavailable() {
    let (app, _) = counting_app().await;

    let response = send(&app, get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unreachable_collector_does_not_block_pages() {
    let config = TelemetryConfig {
        strategy: TracerStrategy::Dialed,
        otlp_endpoint: "127.0.0.1:1".to_string(),
        insecure: true,
        connect_timeout_secs: 1,
        ..TelemetryConfig::default()
    };
    let counter = Arc::new(InMemoryRequestCounter::new());
    let app = build_app(Box::new(DialedLifecycle::new(&config)), counter.clone(), None).await;
    assert!(app.manager.is_degraded());

    app.store.save(&Page::new("Test", "hello")).await.unwrap();
    let response = send(&app, get("/view/Test")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("hello"));
    assert_eq!(counter.count(Action::View), 1);

    let response = send(&app, get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"status\":\"degraded\""));

    app.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_twice_does_not_hang() {
    let (app, _) = counting_app().await;
    send(&app, get("/view/Test")).await;

    app.manager.shutdown().await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), app.manager.shutdown()).await;
    assert!(matches!(second, Ok(Ok(()))));
    assert_eq!(app.manager.state(), LifecycleState::Closed);

    // requests after shutdown are still answered
    let response = send(&app, get("/view/Test")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _) = counting_app().await;

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    let response = send(&app, get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("\"tracer\":\"ready\""));
}
