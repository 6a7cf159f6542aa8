#![allow(clippy::unwrap_used)]
// Integration tests for `BackupClient` using wiremock.

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use espgrow_api::{BackupClient, ConfigBundle, Error};

async fn setup() -> (MockServer, BackupClient) {
    let server = MockServer::start().await;
    let client = BackupClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_backup_returns_bundle() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/config/backup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "id": "fan_exhaust", "name": "Exhaust Fan" }],
            "rules": [],
            "sensors": [{ "id": "sht4x_temp", "name": "Temperature" }]
        })))
        .mount(&server)
        .await;

    let bundle = client.backup().await.unwrap();
    assert_eq!(bundle.devices.len(), 1);
    assert!(bundle.rules.is_empty());
    assert_eq!(bundle.sensors[0]["id"], "sht4x_temp");
}

#[tokio::test]
async fn test_restore_posts_bundle() {
    let (server, client) = setup().await;

    let bundle = ConfigBundle {
        devices: vec![json!({ "id": "humidifier" })],
        rules: vec![],
        sensors: vec![],
    };

    Mock::given(method("POST"))
        .and(path("/api/config/restore"))
        .and(body_json(json!({
            "devices": [{ "id": "humidifier" }],
            "rules": [],
            "sensors": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    client.restore(&bundle).await.unwrap();
}

#[tokio::test]
async fn test_restore_rejection_surfaces_error_message() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/config/restore"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "Missing or invalid required keys" })),
        )
        .mount(&server)
        .await;

    let err = client.restore(&ConfigBundle::default()).await.unwrap_err();
    match err {
        Error::Http { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Missing or invalid required keys");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}
