mod common;
use common::{spawn_stub, StubResponse};

use async_trait::async_trait;
use callsign::app::App;
use callsign::bridge::{BridgeClient, Host};
use callsign::errors::{BridgeError, CommandError};
use callsign::models::{HttpMethod, PinnedRoute, RouteRef};
use callsign::services::codegen::{CodeGenConfig, CodeGenResult, CodeGenerator};
use callsign::services::logger::Logger;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

struct SlowGenerator(Duration);

#[async_trait]
impl CodeGenerator for SlowGenerator {
    async fn generate(&self, _config: &CodeGenConfig) -> Result<CodeGenResult, CommandError> {
        tokio::time::sleep(self.0).await;
        Ok(CodeGenResult {
            success: true,
            files: Some(vec!["index.ts".to_string()]),
            ..CodeGenResult::default()
        })
    }
}

fn session(app: App) -> (BridgeClient, JoinHandle<Result<(), CommandError>>) {
    let (client_io, host_io) = tokio::io::duplex(64 * 1024);
    let (host_read, host_write) = tokio::io::split(host_io);
    let (client_read, client_write) = tokio::io::split(client_io);
    let host = Host::new(Arc::new(app));
    let host_task = tokio::spawn(async move { host.run(host_read, host_write).await });
    let (client, _pump) = BridgeClient::connect(Logger::new("test"), client_read, client_write);
    (client, host_task)
}

fn codegen_config() -> CodeGenConfig {
    serde_json::from_value(json!({
        "generator": "openapi-typescript-codegen",
        "language": "ts",
        "input": "openapi.json",
        "output": "generated",
        "client": "fetch"
    }))
    .expect("config")
}

#[tokio::test]
async fn credentials_round_trip_over_the_channel() {
    let (client, _host) = session(App::in_memory(Logger::new("test")));

    let id = client
        .store_auth("staging", "Authorization", "Bearer abc", Some("staging token"))
        .await
        .expect("store");
    let listed = client.get_all_credentials().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].header_key, "Authorization");

    let stored = client
        .get_credential_by_id(&id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.secret_value, "Bearer abc");
    assert!(stored.metadata.last_used.is_some());

    let header = client.get_auth_header(&id).await.expect("header").expect("present");
    assert_eq!((header.key.as_str(), header.value.as_str()), ("Authorization", "Bearer abc"));

    assert!(client.get_credential_by_id("missing").await.expect("get").is_none());
    let report = client.clear_all_creds().await.expect("clear");
    assert!(report.success);
    assert_eq!(report.removed, vec![id]);
    assert!(client.get_all_credentials().await.expect("list").is_empty());
}

#[tokio::test]
async fn invalid_payload_is_rejected_with_a_remote_error() {
    let (client, _host) = session(App::in_memory(Logger::new("test")));
    let err = client
        .call("storeAuth", json!({"name": "x", "key": "K"}))
        .await
        .expect_err("value missing");
    match err {
        BridgeError::Remote(message) => {
            assert!(message.contains("storeAuth"));
            assert!(message.contains("value"));
        }
        other => panic!("unexpected {:?}", other),
    }
    let err = client.call("storeAuth", json!({"name": " ", "key": "K", "value": "v"})).await;
    assert!(matches!(err, Err(BridgeError::Remote(_))));
}

#[tokio::test]
async fn send_request_records_history_and_build_curl_uses_base() {
    let (base, _seen) = spawn_stub(|_| StubResponse::json(200, json!([{"id": 1}]))).await;
    let (client, _host) = session(App::in_memory(Logger::new("test")));
    let route: RouteRef = serde_json::from_value(json!({"method": "get", "path": "/pets"})).expect("route");

    let record = client
        .send_request(&route, &BTreeMap::new(), &BTreeMap::new(), None, None, Some(&base))
        .await
        .expect("send");
    assert_eq!(record.status, 200);
    assert_eq!(record.body, json!([{"id": 1}]));

    let mut history = Vec::new();
    for _ in 0..100 {
        history = client.load_request_history().await.expect("history");
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].full_url, format!("{}/pets", base));

    client.clear_request_history().await.expect("clear");
    assert!(client.load_request_history().await.expect("history").is_empty());

    let curl = client
        .build_curl(&route, json!({"params": {"limit": "5"}}), Some(&base))
        .await
        .expect("curl");
    assert_eq!(curl, format!("curl -X GET \"{}/pets?limit=5\"", base));
}

#[tokio::test]
async fn spec_urls_pins_and_base_url() {
    let (client, _host) = session(App::in_memory(Logger::new("test")));

    let saved = client
        .save_spec_url("Petstore", "https://petstore3.swagger.io/api/v3/openapi.json")
        .await
        .expect("save");
    assert_eq!(client.get_all_spec_urls().await.expect("list"), vec![saved.clone()]);
    client.save_last_selected_spec_url(&saved.id).await.expect("select");
    assert_eq!(
        client.get_last_selected_spec_url().await.expect("selected"),
        Some(saved.id.clone())
    );
    assert!(client.delete_spec_url(&saved.id).await.expect("delete"));
    assert!(!client.delete_spec_url(&saved.id).await.expect("delete again"));

    let pin = PinnedRoute {
        method: HttpMethod::Get,
        path: "/pets".into(),
    };
    assert!(client.toggle_pin(&pin).await.expect("pin"));
    assert_eq!(client.get_pinned_routes().await.expect("pins"), vec![pin.clone()]);
    assert!(!client.toggle_pin(&pin).await.expect("unpin"));
    assert!(client.get_pinned_routes().await.expect("pins").is_empty());

    let spec = json!({"swagger": "2.0", "host": "api.example.com", "basePath": "/v1", "schemes": ["https"]});
    assert_eq!(
        client
            .get_api_base_url_from_spec(&spec, "https://docs.example.com/swagger.json")
            .await
            .expect("base"),
        "https://api.example.com/v1"
    );
}

#[tokio::test]
async fn load_json_file_then_default_feeds_base_url_resolution() {
    let (client, _host) = session(App::in_memory(Logger::new("test")));
    let spec = json!({"openapi": "3.0.0", "servers": [{"url": "/v2"}], "paths": {"/pets": {"get": {"summary": "List"}}}});

    let loaded = client
        .load_json(json!({
            "type": "file",
            "content": spec.to_string(),
            "path": "https://api.example.com/openapi.json"
        }))
        .await
        .expect("load file");
    assert_eq!(loaded["path"], "https://api.example.com/openapi.json");
    assert_eq!(client.load_json(json!({"type": "default"})).await.expect("default"), loaded);

    let route: RouteRef = serde_json::from_value(json!({"method": "post", "path": "/pets"})).expect("route");
    let curl = client.build_curl(&route, json!({"body": {"a": 1}}), None).await.expect("curl");
    assert!(curl.starts_with("curl -X POST \"https://api.example.com/v2/pets\""));
    assert!(curl.contains("--data '{\n  \"a\": 1\n}'"));
}

#[tokio::test]
async fn long_running_call_outlives_short_timeout_and_late_reply_is_ignored() {
    let app = App::in_memory(Logger::new("test"))
        .with_code_generator(Arc::new(SlowGenerator(Duration::from_millis(200))));
    let (client, _host) = session(app);
    let payload = serde_json::to_value(codegen_config()).expect("payload");

    let err = client
        .call_with_timeout("generateCode", payload, Duration::from_millis(30))
        .await
        .expect_err("should time out");
    assert!(err.is_timeout());
    assert_eq!(client.pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.pending_count(), 0);

    let result = client.generate_code(&codegen_config()).await.expect("generate");
    assert!(result.success);
    assert_eq!(result.files, Some(vec!["index.ts".to_string()]));
}

#[tokio::test]
async fn closed_channel_fails_pending_calls() {
    let (client_io, host_io) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (client, pump) = BridgeClient::connect(Logger::new("test"), client_read, client_write);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.generate_code(&codegen_config()).await }
    });
    while client.pending_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(host_io);

    let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("settled before timeout")
        .expect("join");
    assert!(matches!(outcome, Err(BridgeError::ChannelClosed)));
    pump.await.expect("pump exits");
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn every_request_id_gets_exactly_one_reply() {
    let (mut renderer, host_io) = tokio::io::duplex(64 * 1024);
    let (host_read, host_write) = tokio::io::split(host_io);
    let host = Host::new(Arc::new(App::in_memory(Logger::new("test"))));
    let host_task = tokio::spawn(async move { host.run(host_read, host_write).await });

    let messages = [
        r#"{"command":"getCredentialById","requestId":"bad","payload":{}}"#,
        r#"{"command":"noSuchThing","requestId":"unknown"}"#,
        r#"{"command":"getAllSpecUrls","requestId":"ok"}"#,
        r#"{"command":"getPinnedRoutes"}"#,
        "not json",
    ];
    for message in messages {
        renderer.write_all(message.as_bytes()).await.expect("write");
        renderer.write_all(b"\n").await.expect("write");
    }

    let (read_half, mut write_half) = tokio::io::split(renderer);
    write_half.shutdown().await.expect("shutdown");
    let mut lines = BufReader::new(read_half).lines();
    let mut replies: Vec<Value> = Vec::new();
    while let Some(line) = lines.next_line().await.expect("read") {
        replies.push(serde_json::from_str(&line).expect("reply json"));
    }
    host_task.await.expect("join").expect("host run");

    assert_eq!(replies.len(), messages.len());
    let by_id = |id: &str| -> Vec<&Value> {
        replies.iter().filter(|r| r["requestId"] == id).collect()
    };
    let bad = by_id("bad");
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0]["command"], "response");
    assert_eq!(bad[0]["data"], Value::Null);
    assert!(bad[0]["error"].as_str().expect("error").contains("id"));

    assert_eq!(by_id("unknown").len(), 1);
    assert!(by_id("unknown")[0]["error"].as_str().expect("error").contains("Unknown command"));

    let ok = by_id("ok");
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0]["data"], json!([]));
    assert_eq!(ok[0]["error"], Value::Null);

    assert!(replies.iter().any(|r| r["command"] == "getPinnedRoutesResponse"));
    assert!(replies
        .iter()
        .any(|r| r["command"] == "error" && r["error"] == "Parse error"));
}

#[tokio::test]
async fn invalid_utf8_line_is_answered_and_the_session_continues() {
    let (mut renderer, host_io) = tokio::io::duplex(64 * 1024);
    let (host_read, host_write) = tokio::io::split(host_io);
    let app = Arc::new(App::in_memory(Logger::new("test")));
    let host = Host::new(app.clone());
    let host_task = tokio::spawn(async move { host.run(host_read, host_write).await });

    renderer
        .write_all(b"{\"command\":\"getPinnedRoutes\",\"requestId\":\"a\"}\n")
        .await
        .expect("write");
    renderer.write_all(b"\xff\xfe\n").await.expect("write");
    renderer
        .write_all(b"{\"command\":\"getPinnedRoutes\",\"requestId\":\"b\"}\n")
        .await
        .expect("write");

    let (read_half, mut write_half) = tokio::io::split(renderer);
    write_half.shutdown().await.expect("shutdown");
    let mut lines = BufReader::new(read_half).lines();
    let mut replies: Vec<Value> = Vec::new();
    while let Some(line) = lines.next_line().await.expect("read") {
        replies.push(serde_json::from_str(&line).expect("reply json"));
    }
    host_task.await.expect("join").expect("host run");

    assert_eq!(replies.len(), 3);
    for id in ["a", "b"] {
        let reply = replies
            .iter()
            .find(|r| r["requestId"] == id)
            .unwrap_or_else(|| panic!("no reply for {}", id));
        assert_eq!(reply["data"], json!([]));
    }
    assert!(replies
        .iter()
        .any(|r| r["command"] == "error" && r["error"] == "Parse error"));
    assert!(app.panel.active().is_none());
}

#[tokio::test]
async fn routes_are_listed_from_the_loaded_spec() {
    let (client, _host) = session(App::in_memory(Logger::new("test")));
    assert!(matches!(client.get_routes().await, Err(BridgeError::Remote(_))));

    let spec = json!({
        "openapi": "3.0.0",
        "paths": {
            "/pets": {"get": {"summary": "List", "tags": ["pets"]}, "post": {"summary": "Add", "tags": ["pets"]}},
            "/health": {"get": {"summary": "Health"}}
        }
    });
    client
        .load_json(json!({"type": "file", "content": spec.to_string()}))
        .await
        .expect("load");

    let routes = client.get_routes().await.expect("routes");
    assert_eq!(routes.len(), 3);
    assert!(routes.iter().any(|r| r.method == HttpMethod::Post && r.path == "/pets"));

    let grouped = client.get_routes_by_tag().await.expect("grouped");
    assert_eq!(grouped["pets"].len(), 2);
    assert_eq!(grouped["_untagged"][0].path, "/health");
}
