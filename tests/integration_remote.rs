#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Gemini embeddings and an Astra DB collection, both served by wiremock

use docs_retriever::RetrieverError;
use docs_retriever::config::{ProviderConfig, StoreConfig, StoreKind};
use docs_retriever::embeddings::{EmbeddingProvider, GeminiClient};
use docs_retriever::indexer::{DocumentSource, Indexer};
use docs_retriever::retrieval::{RetrievalOptions, Retriever};
use docs_retriever::store::{AstraStore, VectorStore};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EMBED_PATH: &str = "/v1beta/models/gemini-embedding-001:embedContent";
const COLLECTION_PATH: &str = "/api/json/v1/default_keyspace/support_docs";

fn gemini(server: &MockServer) -> Arc<dyn EmbeddingProvider> {
    let config = ProviderConfig {
        endpoint: Some(server.uri()),
        api_key: Some("test-key".to_string()),
        dimension: 2,
        ..ProviderConfig::default()
    };
    Arc::new(
        GeminiClient::new(&config)
            .expect("should build gemini client")
            .with_retry_attempts(1),
    )
}

fn astra(server: &MockServer) -> Arc<dyn VectorStore> {
    let config = StoreConfig {
        kind: StoreKind::Astra,
        endpoint: Some(server.uri()),
        token: Some("AstraCS:test".to_string()),
        collection: Some("support_docs".to_string()),
        ..StoreConfig::default()
    };
    Arc::new(
        AstraStore::new(&config)
            .expect("should build astra store")
            .with_retry_attempts(2)
            .with_backoff(Duration::from_millis(5)),
    )
}

async fn mock_gemini(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(|request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).expect("json request");
            let text = body["content"]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_lowercase();
            if text.contains("quota") {
                return ResponseTemplate::new(429).set_body_json(json!({
                    "error": {
                        "code": 429,
                        "message": "Resource has been exhausted",
                        "status": "RESOURCE_EXHAUSTED"
                    }
                }));
            }
            let values = if text.contains("refund") {
                vec![0.0, 1.0]
            } else {
                vec![1.0, 0.1]
            };
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": { "values": values } }))
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn indexes_directory_into_astra() {
    let server = MockServer::start().await;
    mock_gemini(&server).await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(body_partial_json(json!({ "insertMany": { "options": { "ordered": false } } })))
        .respond_with(|request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).expect("json request");
            let ids: Vec<Value> = body["insertMany"]["documents"]
                .as_array()
                .expect("documents")
                .iter()
                .map(|doc| doc["_id"].clone())
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "status": { "insertedIds": ids } }))
        })
        .expect(1)
        .mount(&server)
        .await;

    let docs = TempDir::new().expect("should create temp dir");
    std::fs::write(docs.path().join("a.txt"), "Payments settle overnight.").expect("write");
    std::fs::write(docs.path().join("b.txt"), "This one hits the quota.").expect("write");
    std::fs::write(docs.path().join("c.txt"), "Refund requests take a week.").expect("write");

    let documents = DocumentSource::read_dir(docs.path())
        .await
        .expect("should read documents");
    let report = Indexer::new(gemini(&server), astra(&server))
        .index(documents)
        .await
        .expect("should index");

    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, "b.txt");
    assert!(
        report.failures[0]
            .error
            .to_string()
            .contains("RESOURCE_EXHAUSTED")
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let insert: Value = requests
        .iter()
        .filter(|r| r.url.path() == COLLECTION_PATH)
        .map(|r| serde_json::from_slice(&r.body).expect("json"))
        .next()
        .expect("one insert request");
    let filenames: Vec<&Value> = insert["insertMany"]["documents"]
        .as_array()
        .expect("documents")
        .iter()
        .map(|doc| &doc["metadata"]["filename"])
        .collect();
    assert_eq!(filenames, vec![&json!("a.txt"), &json!("c.txt")]);
}

#[tokio::test]
async fn queries_rescore_astra_candidates() {
    let server = MockServer::start().await;
    mock_gemini(&server).await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(body_partial_json(json!({ "find": { "options": { "limit": 5 } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "documents": [
                    {
                        "_id": "refund-doc",
                        "content": "Refund requests take a week.",
                        "metadata": { "filename": "c.txt" },
                        "$vector": [0.0, 1.0]
                    },
                    {
                        "_id": "payment-doc",
                        "content": "Payments settle overnight.",
                        "metadata": { "filename": "a.txt" },
                        "$vector": [1.0, 0.1]
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = Retriever::new(gemini(&server), astra(&server))
        .query("Transfer completed but payment has not arrived")
        .await
        .expect("query should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, "payment-doc");
    assert_eq!(results[0].similarity, 1.0);
}

#[tokio::test]
async fn wrong_length_candidate_fails_query() {
    let server = MockServer::start().await;
    mock_gemini(&server).await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "documents": [{
                    "_id": "legacy",
                    "content": "Embedded with an older model",
                    "$vector": [1.0, 0.0, 0.0, 0.0]
                }]
            }
        })))
        .mount(&server)
        .await;

    let err = Retriever::new(gemini(&server), astra(&server))
        .with_options(RetrievalOptions {
            threshold: -1.0,
            top_k: None,
        })
        .query("payment")
        .await
        .expect_err("mismatch is fatal");

    match err {
        RetrieverError::DimensionMismatch(mismatch) => {
            assert_eq!(mismatch.record_id, "legacy");
            assert_eq!(mismatch.expected, 2);
            assert_eq!(mismatch.actual, 4);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn store_outage_fails_query() {
    let server = MockServer::start().await;
    mock_gemini(&server).await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(2)
        .mount(&server)
        .await;

    let err = Retriever::new(gemini(&server), astra(&server))
        .query("payment")
        .await
        .expect_err("store failure is fatal");

    assert!(matches!(err, RetrieverError::Store(_)));
    assert!(err.to_string().contains("upstream unavailable"));
}
