use super::*;
use crate::config::StoreKind;
use crate::store::Document;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const COLLECTION_PATH: &str = "/api/json/v1/default_keyspace/documents";

fn store_config(endpoint: &str) -> StoreConfig {
    StoreConfig {
        kind: StoreKind::Astra,
        endpoint: Some(endpoint.to_string()),
        token: Some("AstraCS:test".to_string()),
        collection: Some("documents".to_string()),
        ..StoreConfig::default()
    }
}

fn test_store(server: &MockServer) -> AstraStore {
    AstraStore::new(&store_config(&server.uri()))
        .expect("should create store")
        .with_retry_attempts(1)
        .with_backoff(Duration::from_millis(5))
}

fn record(name: &str, embedding: Vec<f32>) -> NewRecord {
    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), json!(name));
    NewRecord {
        document: Document::new(format!("content of {}", name), metadata),
        embedding,
    }
}

fn document_count(request: &Request) -> usize {
    let body: Value = serde_json::from_slice(&request.body).expect("request body is json");
    body["insertMany"]["documents"]
        .as_array()
        .map_or(0, Vec::len)
}

#[test]
fn collection_url_layout() {
    let store = AstraStore::new(&store_config(
        "https://0123-us-east1.apps.astra.datastax.com",
    ))
    .expect("should create store");

    assert_eq!(
        store.collection_url().as_str(),
        "https://0123-us-east1.apps.astra.datastax.com/api/json/v1/default_keyspace/documents"
    );
}

#[test]
fn requires_token_and_collection() {
    let mut config = store_config("https://example.com");
    config.token = None;
    assert!(AstraStore::new(&config).is_err());

    let mut config = store_config("https://example.com");
    config.collection = None;
    let err = AstraStore::new(&config).expect_err("collection required");
    assert!(err.to_string().contains("store.collection"));
}

#[tokio::test]
async fn insert_many_sends_documents_with_vectors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(header("Token", "AstraCS:test"))
        .and(body_partial_json(json!({
            "insertMany": {
                "documents": [
                    {
                        "content": "content of a.txt",
                        "metadata": { "filename": "a.txt" },
                        "$vector": [1.0, 0.0]
                    },
                    {
                        "content": "content of b.txt",
                        "metadata": { "filename": "b.txt" },
                        "$vector": [0.0, 1.0]
                    }
                ],
                "options": { "ordered": false }
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": { "insertedIds": ["id-1", "id-2"] } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let inserted = test_store(&server)
        .insert_many(vec![
            record("a.txt", vec![1.0, 0.0]),
            record("b.txt", vec![0.0, 1.0]),
        ])
        .await
        .expect("insert should succeed");

    assert_eq!(inserted, 2);

    let requests = server.received_requests().await.expect("recording enabled");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let ids: Vec<&str> = body["insertMany"]["documents"]
        .as_array()
        .expect("documents array")
        .iter()
        .map(|doc| doc["_id"].as_str().expect("string id"))
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(Uuid::parse_str(ids[0]).is_ok());
}

#[tokio::test]
async fn insert_many_splits_into_chunks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(|request: &Request| {
            let ids: Vec<String> = (0..document_count(request)).map(|i| i.to_string()).collect();
            ResponseTemplate::new(200).set_body_json(json!({ "status": { "insertedIds": ids } }))
        })
        .expect(3)
        .mount(&server)
        .await;

    let records = (0..5)
        .map(|i| record(&format!("{}.txt", i), vec![1.0, i as f32]))
        .collect();

    let inserted = test_store(&server)
        .with_insert_chunk_size(2)
        .insert_many(records)
        .await
        .expect("insert should succeed");

    assert_eq!(inserted, 5);
}

#[tokio::test]
async fn empty_insert_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let inserted = test_store(&server)
        .insert_many(Vec::new())
        .await
        .expect("nothing to do");
    assert_eq!(inserted, 0);
}

#[tokio::test]
async fn insert_errors_are_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": { "insertedIds": ["id-1"] },
            "errors": [{
                "message": "Length of vector parameter different from declared '$vector' dimension",
                "errorCode": "VECTOR_SIZE_MISMATCH"
            }]
        })))
        .mount(&server)
        .await;

    let err = test_store(&server)
        .insert_many(vec![record("a.txt", vec![1.0]), record("b.txt", vec![1.0, 0.0])])
        .await
        .expect_err("api errors fail the insert");

    let message = err.to_string();
    assert!(message.contains("VECTOR_SIZE_MISMATCH"), "got: {}", message);
    assert!(message.contains("1 documents inserted"), "got: {}", message);
}

#[tokio::test]
async fn unauthorized_is_an_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "message": "UNAUTHENTICATED: Invalid token" }]
        })))
        .mount(&server)
        .await;

    let err = test_store(&server)
        .nearest_neighbors(&[1.0, 0.0], 3)
        .await
        .expect_err("401 fails");

    match err {
        StoreError::Api { operation, detail } => {
            assert_eq!(operation, "find");
            assert_eq!(detail, "HTTP 401: UNAUTHENTICATED: Invalid token");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn nearest_neighbors_requests_vectors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .and(body_partial_json(json!({
            "find": {
                "sort": { "$vector": [1.0, 0.0] },
                "projection": { "$vector": 1 },
                "options": { "limit": 2 }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "documents": [
                    {
                        "_id": "doc-1",
                        "content": "payments",
                        "metadata": { "filename": "payments.txt" },
                        "$vector": [0.9, 0.1]
                    },
                    {
                        "_id": 42,
                        "content": "no vector"
                    }
                ],
                "nextPageState": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = test_store(&server)
        .nearest_neighbors(&[1.0, 0.0], 2)
        .await
        .expect("find should succeed");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "doc-1");
    assert_eq!(records[0].metadata["filename"], json!("payments.txt"));
    assert_eq!(records[0].embedding, Some(vec![0.9, 0.1]));
    assert_eq!(records[1].id, "42");
    assert_eq!(records[1].embedding, None);
    assert!(records[1].metadata.is_empty());
}

#[tokio::test]
async fn zero_limit_skips_the_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let records = test_store(&server)
        .nearest_neighbors(&[1.0], 0)
        .await
        .expect("nothing to fetch");
    assert!(records.is_empty());
}
