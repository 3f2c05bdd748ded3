use super::*;
use crate::config::ProviderKind;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(endpoint: &str, dimension: u32) -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Gemini,
        endpoint: Some(endpoint.to_string()),
        api_key: Some("test-key".to_string()),
        dimension,
        ..ProviderConfig::default()
    }
}

fn test_client(server: &MockServer, dimension: u32) -> GeminiClient {
    GeminiClient::new(&provider_config(&server.uri(), dimension))
        .expect("should create client")
        .with_retry_attempts(2)
        .with_backoff(Duration::from_millis(5))
}

#[test]
fn requires_api_key() {
    let config = ProviderConfig {
        api_key: None,
        ..provider_config("https://example.com", 3)
    };

    let err = GeminiClient::new(&config).expect_err("api key is required");
    assert!(err.to_string().contains("GOOGLE_API_KEY"));
}

#[test]
fn client_configuration() {
    let config = ProviderConfig {
        model: Some("models/text-embedding-004".to_string()),
        ..provider_config("https://example.com/", 768)
    };
    let client = GeminiClient::new(&config).expect("should create client");

    assert_eq!(client.model, "text-embedding-004");
    assert_eq!(client.dimension(), 768);
    assert_eq!(client.name(), "gemini");
    assert_eq!(
        client.embed_url().expect("url builds").as_str(),
        "https://example.com/v1beta/models/text-embedding-004:embedContent"
    );
}

#[tokio::test]
async fn embeds_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-embedding-001:embedContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "model": "models/gemini-embedding-001",
            "content": { "parts": [{ "text": "hello world" }] },
            "outputDimensionality": 3
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "embedding": { "values": [0.1, 0.2, 0.3] } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let embedding = test_client(&server, 3)
        .embed("hello world")
        .await
        .expect("embedding should succeed");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn surfaces_provider_error_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server, 3)
        .embed("hello")
        .await
        .expect_err("400 should fail");

    match err {
        ProviderError::Rejected {
            provider,
            status,
            detail,
        } => {
            assert_eq!(provider, "gemini");
            assert_eq!(status, 400);
            assert_eq!(
                detail,
                "INVALID_ARGUMENT: API key not valid. Please pass a valid API key."
            );
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn rejects_wrong_dimension() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": { "values": [1.0, 0.0] } })),
        )
        .mount(&server)
        .await;

    let err = test_client(&server, 3)
        .embed("hello")
        .await
        .expect_err("dimension mismatch");

    assert!(matches!(
        err,
        ProviderError::UnexpectedDimension {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_embedding_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = test_client(&server, 3)
        .embed("hello")
        .await
        .expect_err("empty response");

    assert!(matches!(err, ProviderError::EmptyResponse { .. }));
}
