//! Integration tests for the HTTP extraction backend against a stub server.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use opsmail_core::{ExtractionPrompt, StructuredExtractor};
use opsmail_extract::HttpExtractorBackend;

fn prompt() -> ExtractionPrompt {
    ExtractionPrompt {
        subject: "Booking confirmation BK-4411".to_string(),
        body: "Pickup in Hamburg, delivery to Rotterdam.".to_string(),
        from_addr: "ops@carrier.example".to_string(),
        ..Default::default()
    }
}

async fn backend_for(server: &MockServer) -> HttpExtractorBackend {
    HttpExtractorBackend::with_config(server.uri(), 5).unwrap()
}

#[tokio::test]
async fn test_extract_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/extract"))
        .and(body_string_contains("BK-4411"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "operation_type": "import",
                "shipping_mode": "sea",
                "client_name": "Acme Forwarding",
                "client_email": "logistics@acme.example",
                "pickup_address": "Hamburg",
                "delivery_address": "Rotterdam"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    let data = backend.extract(&prompt()).await.unwrap();

    assert_eq!(data.operation_type.as_deref(), Some("import"));
    assert_eq!(data.shipping_mode.as_deref(), Some("sea"));
    assert_eq!(data.client_email.as_deref(), Some("logistics@acme.example"));
    assert!(data.missing_required_fields().is_empty());
}

#[tokio::test]
async fn test_extract_rejects_malformed_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    let err = backend.extract(&prompt()).await.unwrap_err().to_string();
    assert!(err.contains("malformed"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_extract_rejects_unknown_fields() {
    let server = MockServer::start().await;

    // The payload schema is strict: extra keys are a contract violation.
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "operation_type": "import",
                "surprise_field": "nope"
            }
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    assert!(backend.extract(&prompt()).await.is_err());
}

#[tokio::test]
async fn test_extract_rejects_schema_violation() {
    let server = MockServer::start().await;

    // Present-but-empty strings violate the schema.
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "operation_type": "",
                "client_email": "not-an-address"
            }
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    let err = backend.extract(&prompt()).await.unwrap_err().to_string();
    assert!(err.contains("schema violation"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_extract_surfaces_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    let err = backend.extract(&prompt()).await.unwrap_err().to_string();
    assert!(err.contains("500"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = backend_for(&server).await;
    assert!(backend.health_check().await.unwrap());
}

#[tokio::test]
async fn test_health_check_unreachable_is_false() {
    let backend = HttpExtractorBackend::with_config("http://127.0.0.1:1".into(), 1).unwrap();
    assert!(!backend.health_check().await.unwrap());
}
