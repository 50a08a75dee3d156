use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use termscout_core::{
    BackendSettings, CrewTemplates, LlmBackend, LlmError, OfflineBackend, SharedBackend,
};
use termscout_gui::config::AppConfig;
use termscout_gui::routes::build_router;
use termscout_gui::state::AppState;
use tokio::sync::Semaphore;
use tokio::time::{Duration, sleep, timeout};

/// Holds every generation until the test adds permits to `gate`.
struct GatedBackend {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl LlmBackend for GatedBackend {
    async fn generate(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| LlmError::Api(err.to_string()))?;
        Ok(format!("Summary: {}", user.lines().next().unwrap_or_default()))
    }

    fn model_name(&self) -> &str {
        "gated"
    }
}

struct RefusingBackend;

#[async_trait]
impl LlmBackend for RefusingBackend {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Err(LlmError::Api("connection refused".into()))
    }

    fn model_name(&self) -> &str {
        "refusing"
    }
}

fn repo_config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

fn base_config(assets_dir: PathBuf) -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_concurrency: 2,
        assets_dir,
        auth_token: None,
        config_dir: repo_config_dir(),
        backend: BackendSettings::offline(),
    }
}

fn assets() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<h1>Terms &amp; Conditions Assistant</h1>",
    )
    .unwrap();
    dir
}

fn server_for(config: &AppConfig) -> (TestServer, AppState) {
    server_with_backend(config, Arc::new(OfflineBackend::new()))
}

fn server_with_backend(config: &AppConfig, backend: SharedBackend) -> (TestServer, AppState) {
    let templates = CrewTemplates::load(&config.config_dir).expect("bundled templates");
    let state = AppState::with_backend(config, templates, backend);
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (server, state)
}

async fn start_report(server: &TestServer, entity_name: &str) -> String {
    let response = server
        .post("/api/reports")
        .json(&json!({ "entity_name": entity_name }))
        .await;
    assert_eq!(response.status_code(), 202);
    response.json::<serde_json::Value>()["report_id"]
        .as_str()
        .expect("report id missing")
        .to_string()
}

async fn wait_until_finished(server: &TestServer, report_id: &str) -> serde_json::Value {
    let status_path = format!("/api/reports/{report_id}");
    timeout(Duration::from_secs(5), async {
        loop {
            let payload = server.get(&status_path).await.json::<serde_json::Value>();
            if payload["state"] != "running" {
                return payload;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("report did not finish in time")
}

#[tokio::test]
async fn health_endpoints_report_capacity() {
    let assets = assets();
    let (server, _) = server_for(&base_config(assets.path().to_path_buf()));

    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["metrics"]["max_concurrency"], 2);
}

#[tokio::test]
async fn try_new_uses_configured_backend() {
    let assets = assets();
    let state = AppState::try_new(&base_config(assets.path().to_path_buf()))
        .expect("offline state should build");
    assert_eq!(state.metrics().total_reports, 0);
}

#[tokio::test]
async fn api_requires_bearer_token_when_configured() {
    let assets = assets();
    let mut config = base_config(assets.path().to_path_buf());
    config.auth_token = Some("secret".into());
    let (server, _) = server_for(&config);

    let response = server.get("/api/reports").await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/api/reports")
        .add_header("authorization", "Bearer secret")
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<serde_json::Value>();
    assert!(body["reports"].is_array());
}

#[tokio::test]
async fn readiness_degrades_when_all_permits_are_taken() {
    let assets = assets();
    let mut config = base_config(assets.path().to_path_buf());
    config.max_concurrency = 1;
    let gate = Arc::new(Semaphore::new(0));
    let (server, state) = server_with_backend(
        &config,
        Arc::new(GatedBackend { gate: gate.clone() }),
    );

    let report_id = start_report(&server, "Netflix").await;

    timeout(Duration::from_secs(5), async {
        while state.metrics().available_permits > 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("crew never took the permit");

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 503);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["metrics"]["running_reports"], 1);

    gate.add_permits(4);
    let status = wait_until_finished(&server, &report_id).await;
    assert_eq!(status["state"], "completed", "{status}");
    assert_eq!(server.get("/health/ready").await.status_code(), 200);
}

#[tokio::test]
async fn backend_failure_marks_report_failed() {
    let assets = assets();
    let (server, state) = server_with_backend(
        &base_config(assets.path().to_path_buf()),
        Arc::new(RefusingBackend),
    );

    let report_id = start_report(&server, "Netflix").await;
    let status = wait_until_finished(&server, &report_id).await;

    assert_eq!(status["state"], "failed", "{status}");
    assert!(
        status["error"]
            .as_str()
            .is_some_and(|error| error.contains("connection refused")),
        "error missing from status: {status}"
    );
    assert!(status.get("summary").is_none());
    assert!(state.report_service().outcome(&report_id).is_none());

    let body = server
        .get(&format!("/api/reports/{report_id}/stream"))
        .await
        .text();
    assert!(body.contains("event: error"), "{body}");
    assert!(body.contains("\"kind\":\"error\""), "{body}");
    assert!(body.contains("connection refused"), "{body}");
}

#[tokio::test]
async fn running_report_stream_replays_started_event() {
    let assets = assets();
    let gate = Arc::new(Semaphore::new(0));
    let (server, _) = server_with_backend(
        &base_config(assets.path().to_path_buf()),
        Arc::new(GatedBackend { gate: gate.clone() }),
    );

    let report_id = start_report(&server, "Spotify").await;
    let stream_path = format!("/api/reports/{report_id}/stream");

    let release = async {
        sleep(Duration::from_millis(200)).await;
        gate.add_permits(4);
    };
    let (response, ()) = timeout(
        Duration::from_secs(5),
        async { tokio::join!(server.get(&stream_path).into_future(), release) },
    )
    .await
    .expect("stream did not finish in time");

    assert_eq!(response.status_code(), 200);
    let body = response.text();
    let started = body.find("event: started").expect(&body);
    let completed = body.find("event: completed").expect(&body);
    assert!(started < completed, "{body}");
    assert!(
        body.contains("Finding terms and conditions for: Spotify"),
        "{body}"
    );
}

#[tokio::test]
async fn access_token_query_parameter_is_accepted() {
    let assets = assets();
    let mut config = base_config(assets.path().to_path_buf());
    config.auth_token = Some("secret".into());
    let (server, _) = server_for(&config);

    let response = server.get("/api/reports?access_token=secret").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/api/reports?access_token=wrong").await;
    assert_eq!(response.status_code(), 401);

    let response = server.get("/api/reports/missing/stream?access_token=secret").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn blank_entity_is_rejected() {
    let assets = assets();
    let (server, state) = server_for(&base_config(assets.path().to_path_buf()));

    let response = server
        .post("/api/reports")
        .json(&json!({ "entity_name": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body = response.json::<serde_json::Value>();
    assert_eq!(
        body["error"],
        "Please enter a company, product, or service name."
    );
    assert_eq!(state.metrics().total_reports, 0);
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let assets = assets();
    let (server, _) = server_for(&base_config(assets.path().to_path_buf()));

    assert_eq!(server.get("/api/reports/missing").await.status_code(), 404);
    assert_eq!(
        server.get("/api/reports/missing/stream").await.status_code(),
        404
    );
}

#[tokio::test]
async fn report_stream_reports_completion() {
    let assets = assets();
    let (server, state) = server_for(&base_config(assets.path().to_path_buf()));

    let response = server
        .post("/api/reports")
        .json(&json!({ "entity_name": " Spotify " }))
        .await;
    assert_eq!(response.status_code(), 202);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["entity_name"], "Spotify");
    let report_id = body["report_id"]
        .as_str()
        .expect("report id missing")
        .to_string();

    let status_path = format!("/api/reports/{report_id}");
    let status = timeout(Duration::from_secs(5), async {
        loop {
            let response = server.get(&status_path).await;
            assert_eq!(response.status_code(), 200);
            let payload = response.json::<serde_json::Value>();
            if payload["state"] != "running" {
                return payload;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("report did not complete in time");

    assert_eq!(status["state"], "completed", "{status}");
    assert!(
        status["summary"]
            .as_str()
            .is_some_and(|summary| summary.contains("Spotify")),
        "summary should mention the entity: {status}"
    );
    assert!(
        status["markdown"]
            .as_str()
            .is_some_and(|md| md.starts_with("# Summary of Terms and Conditions for Spotify")),
        "markdown heading missing: {status}"
    );

    let outcome = state
        .report_service()
        .outcome(&report_id)
        .expect("report outcome missing");
    assert_eq!(outcome.session_id, report_id);

    let stream_response = server.get(&format!("/api/reports/{report_id}/stream")).await;
    assert_eq!(stream_response.status_code(), 200);
    let body = stream_response.text();
    assert!(
        body.contains("event: completed"),
        "stream did not include completed event: {body}"
    );
    assert!(
        body.contains("\"kind\":\"completed\""),
        "stream payload missing completed kind: {body}"
    );

    let listing = server.get("/api/reports").await.json::<serde_json::Value>();
    assert_eq!(listing["reports"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["capacity"]["total_reports"], 1);
}

#[tokio::test]
async fn static_assets_are_served_from_assets_dir() {
    let assets = assets();
    std::fs::write(assets.path().join("app.css"), "body {}").unwrap();
    let (server, _) = server_for(&base_config(assets.path().to_path_buf()));

    let index = server.get("/").await;
    assert_eq!(index.status_code(), 200);
    assert!(index.text().contains("Terms &amp; Conditions Assistant"));

    let css = server.get("/app.css").await;
    assert_eq!(css.status_code(), 200);
    assert_eq!(css.header("content-type"), "text/css");

    let unknown = server.get("/reports/latest").await;
    assert_eq!(unknown.status_code(), 200);
    assert!(unknown.text().contains("Conditions Assistant"));
}
