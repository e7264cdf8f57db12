// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::RecordingRunner;
use netthrottle::command::CommandOutput;
use netthrottle::config::AppConfig;
use netthrottle::models::ThroughputEvent;
use netthrottle::orchestrator::Orchestrator;
use netthrottle::platform::Capabilities;
use netthrottle::routes::{self, AppState};
use netthrottle::settings::SettingsStore;
use netthrottle::status::StatusInspector;
use netthrottle::sysinfo_repo::SysinfoRepo;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, watch};

const TEST_CONFIG: &str = r#"
[server]
port = 8090
host = "127.0.0.1"

[sampler]
sample_interval_ms = 1000
broadcast_capacity = 10
stats_log_interval_secs = 60
"#;

struct TestApp {
    app: axum::Router,
    tx: broadcast::Sender<ThroughputEvent>,
    settings: Arc<SettingsStore>,
    _dir: tempfile::TempDir,
}

fn test_app_with(runner: RecordingRunner, capabilities: Capabilities) -> TestApp {
    let config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let runner = Arc::new(runner);
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
    let (tx, _) = broadcast::channel(config.sampler.broadcast_capacity);
    let (selected_tx, _) = watch::channel(None);
    let app = routes::app(AppState {
        orchestrator: Arc::new(Orchestrator::new(
            runner.clone(),
            capabilities,
            config.shaping.redirect_device.clone(),
        )),
        inspector: Arc::new(StatusInspector::new(runner, capabilities)),
        sysinfo_repo: Arc::new(SysinfoRepo::new()),
        throughput_tx: tx.clone(),
        selected_tx: Arc::new(selected_tx),
        settings: settings.clone(),
        ws_throughput_connections: Arc::new(AtomicUsize::new(0)),
    });
    TestApp {
        app,
        tx,
        settings,
        _dir: dir,
    }
}

fn test_app() -> TestApp {
    test_app_with(RecordingRunner::new(), Capabilities::supported())
}

#[tokio::test]
async fn test_root_endpoint() {
    let t = test_app();
    let server = TestServer::new(t.app);
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("NetThrottle: traffic shaping daemon");
}

#[tokio::test]
async fn test_version_endpoint() {
    let t = test_app();
    let server = TestServer::new(t.app);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["name"], "netthrottle");
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn test_capabilities_endpoint() {
    let t = test_app_with(RecordingRunner::new(), Capabilities::unsupported());
    let server = TestServer::new(t.app);
    let json: Value = server.get("/api/capabilities").await.json();
    assert_eq!(json, json!({ "supportsShaping": false }));
}

#[tokio::test]
async fn test_set_and_get_limits() {
    let t = test_app();
    let server = TestServer::new(t.app);

    let response = server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "2", "unit": "mbps" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["interface"], "eth0");
    assert_eq!(body["download"]["kbps"], 2000);
    assert_eq!(body["upload"], Value::Null);

    // Numeric values are accepted as well.
    server
        .put("/api/interfaces/eth0/limits/upload")
        .json(&json!({ "value": 750, "unit": "kbps" }))
        .await
        .assert_status_ok();

    let body: Value = server.get("/api/interfaces/eth0/limits").await.json();
    assert_eq!(body["download"]["kbps"], 2000);
    assert_eq!(body["upload"]["kbps"], 750);
    assert_eq!(body["redirectHolder"], "eth0");
}

#[tokio::test]
async fn test_invalid_rate_is_bad_request() {
    let t = test_app();
    let server = TestServer::new(t.app);
    let response = server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "-1", "unit": "kbps" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("invalid rate"));
}

#[tokio::test]
async fn test_unknown_direction_is_bad_request() {
    let t = test_app();
    let server = TestServer::new(t.app);
    server
        .put("/api/interfaces/eth0/limits/sideways")
        .json(&json!({ "value": "1", "unit": "kbps" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsupported_platform_is_not_implemented() {
    let t = test_app_with(RecordingRunner::new(), Capabilities::unsupported());
    let server = TestServer::new(t.app);
    server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "1", "unit": "mbps" }))
        .await
        .assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_command_failure_is_bad_gateway() {
    let runner = RecordingRunner::new().respond(
        "class add",
        CommandOutput::failure(2, "RTNETLINK answers: Invalid argument"),
    );
    let t = test_app_with(runner, Capabilities::supported());
    let server = TestServer::new(t.app);
    let response = server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "1", "unit": "mbps" }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Invalid argument"));

    let limits: Value = server.get("/api/interfaces/eth0/limits").await.json();
    assert_eq!(limits["download"], Value::Null);
}

#[tokio::test]
async fn test_second_upload_interface_conflicts() {
    let t = test_app();
    let server = TestServer::new(t.app);
    server
        .put("/api/interfaces/eth0/limits/upload")
        .json(&json!({ "value": "1", "unit": "mbps" }))
        .await
        .assert_status_ok();
    server
        .put("/api/interfaces/wlan0/limits/upload")
        .json(&json!({ "value": "1", "unit": "mbps" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_remove_all_twice() {
    let t = test_app();
    let server = TestServer::new(t.app);
    server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "1", "unit": "mbps" }))
        .await
        .assert_status_ok();

    for _ in 0..2 {
        let response = server.delete("/api/interfaces/eth0/limits").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["download"], Value::Null);
        assert_eq!(body["upload"], Value::Null);
    }
}

#[tokio::test]
async fn test_selection_is_persisted() {
    let t = test_app();
    let settings = t.settings.clone();
    let server = TestServer::new(t.app);

    let body: Value = server.get("/api/selection").await.json();
    assert_eq!(body["interface"], Value::Null);

    server
        .put("/api/selection")
        .json(&json!({ "interface": "eth0" }))
        .await
        .assert_status_ok();
    let body: Value = server.get("/api/selection").await.json();
    assert_eq!(body["interface"], "eth0");

    server
        .put("/api/interfaces/eth0/limits/download")
        .json(&json!({ "value": "3", "unit": "mbps" }))
        .await
        .assert_status_ok();

    let saved = settings.load().unwrap();
    assert_eq!(saved.interface.as_deref(), Some("eth0"));
    assert_eq!(saved.download_limit_kbps, Some(3000));
}

#[tokio::test]
async fn test_selection_rejects_bad_name() {
    let t = test_app();
    let server = TestServer::new(t.app);
    server
        .put("/api/selection")
        .json(&json!({ "interface": "eth0 && reboot" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_includes_tc_output() {
    let runner = RecordingRunner::new().respond(
        "qdisc show dev eth0",
        CommandOutput {
            code: Some(0),
            stdout: "qdisc htb 1: root refcnt 2 r2q 10 default 0x10\n".into(),
            stderr: String::new(),
        },
    );
    let t = test_app_with(runner, Capabilities::supported());
    let server = TestServer::new(t.app);

    let response = server.get("/api/interfaces/eth0/status").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["qdiscs"],
        "qdisc htb 1: root refcnt 2 r2q 10 default 0x10"
    );
    assert!(body["diagnostics"].as_array().unwrap().is_empty());
}

// --- WebSocket tests (require http_transport + ws feature) ---
// Receive until we get valid JSON (server may send Ping first).

async fn receive_first_json_text<T: serde::de::DeserializeOwned>(
    ws: &mut axum_test::TestWebSocket,
) -> T {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<T>(&text) {
            return v;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for JSON"
        );
    }
}

#[tokio::test]
async fn test_ws_throughput_welcome_then_events() {
    let t = test_app();
    let tx = t.tx.clone();
    let server = TestServer::builder().http_transport().build(t.app);
    let mut ws = server
        .get_websocket("/ws/throughput")
        .await
        .into_websocket()
        .await;

    let welcome: Value = receive_first_json_text(&mut ws).await;
    assert_eq!(welcome["type"], "info");
    assert_eq!(welcome["capabilities"]["supportsShaping"], true);

    let event = ThroughputEvent {
        interface: "eth0".into(),
        timestamp_ms: 42,
        download_rate: 1024.0,
        upload_rate: 512.0,
    };
    let event_clone = event.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        let _ = tx.send(event_clone);
    });
    let received: ThroughputEvent = receive_first_json_text(&mut ws).await;
    assert_eq!(received, event);
}
