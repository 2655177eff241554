//! Full-stack IPC tests: spin up the WebSocket server on a random port and
//! drive it like the panel UI would — auth challenge, RPC dispatch, the
//! health endpoint, and error-code mapping.

use async_trait::async_trait;
use coachd::capture::Capturer;
use coachd::config::DaemonConfig;
use coachd::error::CoachError;
use coachd::gemini::model::{AnalysisResult, ChatTurn};
use coachd::gemini::Provider;
use coachd::ipc;
use coachd::ipc::event::EventBroadcaster;
use coachd::panel::PanelManager;
use coachd::settings::SettingsStore;
use coachd::storage::Storage;
use coachd::tabs::TabTracker;
use coachd::AppContext;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct NullProvider;

#[async_trait]
impl Provider for NullProvider {
    async fn analyze_image(
        &self,
        _api_key: &str,
        _model: &str,
        _image_base64: &str,
    ) -> Result<AnalysisResult, CoachError> {
        Err(CoachError::Provider("no provider in tests".to_string()))
    }

    async fn chat(
        &self,
        _api_key: &str,
        _model: &str,
        _history: &[ChatTurn],
        _last_analysis: Option<&AnalysisResult>,
    ) -> Result<String, CoachError> {
        Err(CoachError::Provider("no provider in tests".to_string()))
    }

    async fn probe(&self, _api_key: &str) -> Result<bool, CoachError> {
        Ok(true)
    }
}

struct NullCapturer;

#[async_trait]
impl Capturer for NullCapturer {
    async fn capture(&self, _url: &str) -> Result<String, CoachError> {
        Err(CoachError::CaptureFailure("no capturer in tests".to_string()))
    }
}

/// Find a free local port by binding to port 0.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Build a minimal AppContext on a random port for testing.
async fn make_test_ctx(dir: &TempDir, port: u16, auth_token: &str) -> Arc<AppContext> {
    let data_dir = dir.path().to_path_buf();
    let config = Arc::new(DaemonConfig::new(
        Some(port),
        Some(data_dir),
        Some("error".to_string()),
        None,
    ));
    let storage = Arc::new(Storage::new(&config.data_dir).await.unwrap());
    let broadcaster = Arc::new(EventBroadcaster::new());
    let settings = Arc::new(SettingsStore::new(storage.clone(), broadcaster.clone()));
    let tabs = Arc::new(TabTracker::new());
    let provider: Arc<dyn Provider> = Arc::new(NullProvider);
    let panel = Arc::new(PanelManager::new(
        settings.clone(),
        tabs.clone(),
        provider.clone(),
        Arc::new(NullCapturer),
        broadcaster.clone(),
    ));

    Arc::new(AppContext {
        config,
        storage,
        broadcaster,
        settings,
        tabs,
        provider,
        panel,
        started_at: std::time::Instant::now(),
        auth_token: auth_token.to_string(),
    })
}

/// Start the server and wait until the port accepts connections.
async fn start_server(ctx: Arc<AppContext>) -> u16 {
    let port = ctx.config.port;
    tokio::spawn(async move {
        let _ = ipc::run(ctx).await;
    });
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return port;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("server did not start on port {port}");
}

async fn connect(port: u16) -> WsClient {
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .expect("websocket connect");
    ws
}

/// Send one request and read frames until the response with a matching id
/// arrives — broadcast notifications interleave and are skipped.
async fn rpc(ws: &mut WsClient, id: u64, method: &str, params: Value) -> Value {
    let req = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
    ws.send(Message::Text(req.to_string())).await.unwrap();
    loop {
        match ws.next().await.expect("connection open").unwrap() {
            Message::Text(text) => {
                let v: Value = serde_json::from_str(&text).unwrap();
                if v["id"] == json!(id) {
                    return v;
                }
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "").await;
    let port = start_server(ctx).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"status\":\"ok\""));
    assert!(response.contains("\"panelState\":\"idle\""));
}

#[tokio::test]
async fn ping_roundtrip_without_auth() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;
    let resp = rpc(&mut ws, 1, "daemon.ping", Value::Null).await;
    assert_eq!(resp["result"]["pong"], json!(true));
}

#[tokio::test]
async fn first_message_must_be_auth_when_a_token_is_set() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "secret").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;
    let req = json!({ "jsonrpc": "2.0", "id": 1, "method": "daemon.ping" });
    ws.send(Message::Text(req.to_string())).await.unwrap();
    let resp: Value = match ws.next().await.unwrap().unwrap() {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(resp["error"]["code"], json!(-32004));
}

#[tokio::test]
async fn auth_then_settings_get() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "secret").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;
    let resp = rpc(&mut ws, 1, "daemon.auth", json!({ "token": "secret" })).await;
    assert_eq!(resp["result"]["authenticated"], json!(true));

    let resp = rpc(&mut ws, 2, "settings.get", Value::Null).await;
    assert_eq!(resp["result"]["apiKey"], Value::Null);
    assert_eq!(resp["result"]["model"], json!("gemini-2.5-flash"));
    assert_eq!(
        resp["result"]["supportedModels"].as_array().unwrap().len(),
        3
    );
}

#[tokio::test]
async fn unknown_method_maps_to_method_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;
    let resp = rpc(&mut ws, 7, "panel.nope", Value::Null).await;
    assert_eq!(resp["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn missing_params_map_to_invalid_params() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;
    let resp = rpc(&mut ws, 3, "panel.chat", Value::Null).await;
    assert_eq!(resp["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn panel_flow_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let ctx = make_test_ctx(&dir, find_free_port(), "").await;
    let port = start_server(ctx).await;

    let mut ws = connect(port).await;

    // Navigating into a multiplayer route disables the trigger.
    let resp = rpc(
        &mut ws,
        1,
        "tab.navigated",
        json!({ "url": "https://www.geoguessr.com/multiplayer/abc" }),
    )
    .await;
    assert_eq!(resp["result"]["analyzeEnabled"], json!(false));
    assert_eq!(resp["result"]["hint"], json!("multiplayer"));

    // The panel opens idle, mirroring the disabled affordance.
    let resp = rpc(&mut ws, 2, "panel.open", Value::Null).await;
    assert_eq!(resp["result"]["view"]["state"], json!("idle"));
    assert_eq!(resp["result"]["view"]["analyzeEnabled"], json!(false));

    // Leaving multiplayer restores the trigger.
    let resp = rpc(
        &mut ws,
        3,
        "tab.navigated",
        json!({ "url": "https://www.geoguessr.com/game/xyz" }),
    )
    .await;
    assert_eq!(resp["result"]["analyzeEnabled"], json!(true));

    // Analyze with no key configured: straight to the error state, with the
    // settings affordance, as a view — not as an RPC error.
    let resp = rpc(&mut ws, 4, "panel.analyze", Value::Null).await;
    assert_eq!(resp["result"]["view"]["state"], json!("error"));
    assert_eq!(resp["result"]["view"]["settingsLink"], json!(true));
    assert_eq!(
        resp["result"]["view"]["errorMessage"],
        json!("Please set your API key in settings")
    );

    // Whitespace-only chat input is silently ignored.
    let resp = rpc(&mut ws, 5, "panel.chat", json!({ "text": "   " })).await;
    assert_eq!(resp["result"]["view"]["chat"], json!([]));
    assert_eq!(resp["result"]["view"]["chatEnabled"], json!(true));
}
