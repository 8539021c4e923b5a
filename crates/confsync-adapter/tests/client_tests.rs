//! Integration tests for the REST API client using wiremock.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use confsync_adapter::client::{ApiClient, HttpMethod, RestApiClient};
use confsync_adapter::config::{AuthConfig, ClientConfig};
use confsync_adapter::deployment::deploy_error_message;
use confsync_adapter::AdapterError;
use confsync_elements::ids::ElemId;

// =============================================================================
// Test Helpers
// =============================================================================

fn client_for(server: &MockServer) -> RestApiClient {
    RestApiClient::new(&ClientConfig::new(server.uri())).unwrap()
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn test_get_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"groups": [{"id": 1}]})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server).get("/api/v2/groups").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({"groups": [{"id": 1}]}));
}

#[tokio::test]
async fn test_get_not_found_is_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/brands"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "missing"})))
        .mount(&server)
        .await;

    let response = client_for(&server).get("/api/v2/brands").await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.data, json!([]));
}

#[tokio::test]
async fn test_post_sends_body_and_returns_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/groups"))
        .and(body_json(json!({"group": {"name": "Support"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"group": {"id": 42}})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .post("/api/v2/groups", json!({"group": {"name": "Support"}}))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.data["group"]["id"], 42);
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/groups/7"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"error": "RecordInvalid"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .request(HttpMethod::Put, "/api/v2/groups/7", Some(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.status, Some(422));
    assert_eq!(err.data, Some(json!({"error": "RecordInvalid"})));
    assert!(!err.is_transient());

    let message = deploy_error_message(
        &ElemId::instance_id("zendesk", "group", "support"),
        &AdapterError::from(err),
    );
    assert!(message.starts_with(
        "Deployment of zendesk.group.instance.support failed: Request failed with status code 422"
    ));
    assert!(message.contains("\"error\": \"RecordInvalid\""), "{message}");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/groups/7"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server).delete("/api/v2/groups/7").await.unwrap_err();
    assert_eq!(err.status, Some(503));
    assert!(err.is_transient());
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_bearer_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/users/me"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(server.uri()).with_auth(AuthConfig::Bearer {
        token: "secret-token".into(),
    });
    let client = RestApiClient::new(&config).unwrap();
    let response = client.get("/api/v2/users/me").await.unwrap();
    assert_eq!(response.data["user"]["id"], 1);
}

#[tokio::test]
async fn test_basic_auth_header() {
    let server = MockServer::start().await;
    // "agent@acme.com/token:abc" base64-encoded
    Mock::given(method("GET"))
        .and(path("/api/v2/groups"))
        .and(header(
            "authorization",
            "Basic YWdlbnRAYWNtZS5jb20vdG9rZW46YWJj",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"groups": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(server.uri()).with_auth(AuthConfig::Basic {
        username: "agent@acme.com/token".into(),
        password: Some("abc".into()),
    });
    let client = RestApiClient::new(&config).unwrap();
    assert!(client.get("/api/v2/groups").await.is_ok());
}
