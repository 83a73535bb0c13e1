#![allow(clippy::unwrap_used)]
// Integration tests for `ProvisioningClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ruuvigate_api::{Assignment, Error, ProvisioningClient, Registration};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ProvisioningClient) {
    let server = MockServer::start().await;
    let client = ProvisioningClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
    )
    .with_poll_interval(Duration::ZERO)
    .with_max_polls(3);
    (server, client)
}

fn registration() -> Registration {
    Registration {
        id_scope: "0ne0001".into(),
        registration_id: "gw-01".into(),
        device_key: "device-secret".to_string().into(),
        model_id: "dtmi:ruuvigate:gateway;1".into(),
    }
}

const REGISTER_PATH: &str = "/0ne0001/registrations/gw-01/register";

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_assigned_immediately() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .and(header("Authorization", "SharedAccessKey device-secret"))
        .and(body_partial_json(json!({
            "registrationId": "gw-01",
            "payload": { "modelId": "dtmi:ruuvigate:gateway;1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operationId": "op-1",
            "status": "assigned",
            "registrationState": {
                "assignedHub": "hub-7.example.net",
                "deviceId": "gw-01"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assignment = client.register(&registration()).await.unwrap();
    assert_eq!(
        assignment,
        Assignment {
            assigned_hub: "hub-7.example.net".into(),
            device_id: "gw-01".into(),
        }
    );
}

#[tokio::test]
async fn test_register_polls_until_assigned() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({ "operationId": "op-2", "status": "assigning" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/0ne0001/registrations/gw-01/operations/op-2"))
        .and(header("Authorization", "SharedAccessKey device-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "operationId": "op-2",
            "status": "assigned",
            "registrationState": { "assignedHub": "hub-2.example.net" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assignment = client.register(&registration()).await.unwrap();
    assert_eq!(assignment.assigned_hub, "hub-2.example.net");
    // Falls back to the registration id when the service omits deviceId.
    assert_eq!(assignment.device_id, "gw-01");
}

#[tokio::test]
async fn test_register_gives_up_after_max_polls() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({ "operationId": "op-3", "status": "assigning" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/0ne0001/registrations/gw-01/operations/op-3"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({ "operationId": "op-3", "status": "assigning" })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(Error::ProvisioningTimeout { attempts: 3 })),
        "expected ProvisioningTimeout, got: {result:?}"
    );
}

#[tokio::test]
async fn test_register_not_assigned() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "disabled" })),
        )
        .mount(&server)
        .await;

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(Error::NotAssigned { ref status }) if status == "disabled"),
        "expected NotAssigned, got: {result:?}"
    );
}

#[tokio::test]
async fn test_register_rejected_key() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(ref e) if e.is_auth()),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_register_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(Error::Provisioning { status: 500, ref message }) if message == "boom"),
        "expected Provisioning error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_register_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body == "not json"),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_register_unreachable_endpoint() {
    let client = ProvisioningClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
    );

    let result = client.register(&registration()).await;
    assert!(
        matches!(result, Err(Error::Transport(ref e)) if e.is_connect()),
        "expected a connect error, got: {result:?}"
    );
}
