use std::sync::Arc;
use std::time::Duration;

use folio_core::{Chunk, ChunkKind, Embedder, RetryPolicy, ServiceError, Stage};
use folio_embed::{http, EmbedPool, OpenAiEmbedder};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedder(server: &MockServer) -> OpenAiEmbedder {
    let client = http::default_client(Duration::from_secs(5)).unwrap();
    OpenAiEmbedder::new(client, server.uri(), "sk-test", "text-embedding-3-small", 3)
}

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "text-embedding-3-small", "input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]
        })))
        .mount(&server)
        .await;

    let e = embedder(&server);
    let out = e.embed_batch(&["a".to_string(), "b".to_string()]).await.unwrap();
    assert_eq!(out, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    assert_eq!(e.model_id(), "openai:text-embedding-3-small");
}

#[tokio::test]
async fn status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["limited"]})))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["denied"]})))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let e = embedder(&server);
    assert_eq!(e.embed_batch(&["limited".to_string()]).await, Err(ServiceError::RateLimited));
    assert_eq!(e.embed_batch(&["denied".to_string()]).await, Err(ServiceError::Auth(401)));
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    let err = embedder(&server).embed_batch(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, ServiceError::Malformed(_)));
}

#[tokio::test]
async fn pool_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.2, 0.3, 0.4]}]
        })))
        .mount(&server)
        .await;

    let pool = EmbedPool::new(Arc::new(embedder(&server)), 4, 1, RetryPolicy::immediate(3, Duration::from_secs(5)));
    let chunk = Chunk::new("hello", "a.md", 0, ChunkKind::HeaderSection).unwrap();
    let (entries, report) = pool.embed_chunks(vec![chunk]).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].vector, vec![0.2, 0.3, 0.4]);
    assert_eq!(report.failed(Stage::Embed), 0);
}
