#![allow(clippy::unwrap_used)]
// End-to-end: provisioning (wiremock) + hub session (in-process WebSocket)
// driving a cloud gateway with remote registry commands and telemetry.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ruuvigate_core::{
    CloudConfig, CloudPublisher, DeviceRegistry, Gateway, ShutdownReason, SimulatedReader,
};

const WAIT: Duration = Duration::from_secs(10);

type Hub = WebSocketStream<TcpStream>;

async fn start_hub() -> (String, oneshot::Receiver<Hub>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = tx.send(ws);
    });
    (format!("ws://{addr}"), rx)
}

async fn start_provisioning(hub: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/0ne000/registrations/gw-01/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operationId": "op-1",
            "status": "assigned",
            "registrationState": { "assignedHub": hub, "deviceId": "gw-01" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    server
}

async fn next_frame(hub: &mut Hub, kind: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, hub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            if frame["type"] == kind {
                return frame;
            }
        }
    }
}

/// Invoke a method, retrying while listeners are still being registered.
async fn call(hub: &mut Hub, id: &str, name: &str, payload: Value) -> Value {
    loop {
        hub.send(Message::text(
            json!({
                "type": "methodRequest",
                "requestId": id,
                "methodName": name,
                "payload": payload
            })
            .to_string(),
        ))
        .await
        .unwrap();
        let response = next_frame(hub, "methodResponse").await;
        assert_eq!(response["requestId"], id);
        if response["status"] != 404 {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cloud_gateway_serves_commands_and_publishes() {
    let (hub_url, hub) = start_hub().await;
    let provisioning = start_provisioning(&hub_url).await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("ruuvitags");
    let registry = DeviceRegistry::open(&store).await.unwrap();
    let config = CloudConfig::new(
        SecretString::from("device-secret".to_string()),
        "gw-01",
        "0ne000",
        provisioning.uri(),
        "dtmi:ruuvigate:gateway;1",
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let gateway = Gateway::new(registry, CloudPublisher::new(), SimulatedReader, Duration::from_secs(1));
    let running = tokio::spawn(async move {
        gateway
            .run_until(&config, async move {
                let _ = stop_rx.await;
                "SIGINT".to_string()
            })
            .await
    });

    let mut hub = tokio::time::timeout(WAIT, hub).await.unwrap().unwrap();

    let added = call(&mut hub, "1", "RuuviGate_250*AddRuuviTag", json!("12:34:56:78:90:AB")).await;
    assert_eq!(added["status"], 200);
    assert_eq!(
        added["payload"],
        json!({"result": true, "data": "RuuviTag 12:34:56:78:90:AB added"})
    );

    let bad = call(&mut hub, "2", "RuuviGate_250*RemoveRuuviTag", json!("nope")).await;
    assert_eq!(bad["status"], 400);
    assert_eq!(bad["payload"]["data"], "Not a valid MAC address");

    let listed = call(&mut hub, "3", "RuuviGate_250*GetRuuviTags", Value::Null).await;
    assert_eq!(listed["payload"]["data"], json!(["12:34:56:78:90:AB"]));

    let telemetry = next_frame(&mut hub, "telemetry").await;
    assert_eq!(telemetry["contentType"], "application/json");
    let body = telemetry["body"].as_object().unwrap();
    assert_eq!(body.len(), 5);
    assert!(body["Sequence1"].is_u64());

    stop_tx.send(()).unwrap();
    let reason = tokio::time::timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(reason, ShutdownReason::Signal("SIGINT".into()));

    assert_eq!(std::fs::read_to_string(&store).unwrap(), "12:34:56:78:90:AB\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hub_closing_the_session_stops_the_gateway() {
    let (hub_url, hub) = start_hub().await;
    let provisioning = start_provisioning(&hub_url).await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("ruuvitags");
    std::fs::write(&store, "12:34:56:78:90:AB\n").unwrap();
    let registry = DeviceRegistry::open(&store).await.unwrap();
    let config = CloudConfig::new(
        SecretString::from("device-secret".to_string()),
        "gw-01",
        "0ne000",
        provisioning.uri(),
        "dtmi:ruuvigate:gateway;1",
    );

    let gateway = Gateway::new(registry, CloudPublisher::new(), SimulatedReader, Duration::from_secs(1));
    let running = tokio::spawn(async move {
        gateway.run_until(&config, std::future::pending()).await
    });

    let mut hub = tokio::time::timeout(WAIT, hub).await.unwrap().unwrap();
    next_frame(&mut hub, "telemetry").await;
    hub.close(None).await.unwrap();

    let reason = tokio::time::timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert!(
        matches!(reason, ShutdownReason::Disconnected(ref msg) if msg.contains("closed")),
        "got {reason:?}"
    );
}

#[tokio::test]
async fn failed_provisioning_spawns_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let registry = DeviceRegistry::open(dir.path().join("ruuvitags")).await.unwrap();
    let config = CloudConfig::new(
        SecretString::from("wrong".to_string()),
        "gw-01",
        "0ne000",
        server.uri(),
        "dtmi:ruuvigate:gateway;1",
    );

    let gateway = Gateway::new(registry, CloudPublisher::new(), SimulatedReader, Duration::from_secs(1));
    let err = gateway
        .run_until(&config, std::future::pending())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ruuvigate_core::CoreError::AuthenticationFailed { .. }),
        "got {err:?}"
    );
}
