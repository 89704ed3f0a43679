#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end chat flow: HTTP router -> RAG engine -> Azure OpenAI (mocked)
// with an in-memory document retriever standing in for the vector store.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use mongodb::bson::Bson;
use mongodb::bson::oid::ObjectId;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use maplebond::Result;
use maplebond::config::OpenAiConfig;
use maplebond::database::{Document, SearchHit};
use maplebond::openai::OpenAiClient;
use maplebond::rag::{DocumentRetriever, RagEngine};
use maplebond::server::router;

struct InMemoryRetriever {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl DocumentRetriever for InMemoryRetriever {
    async fn nearest(&self, _query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

fn study_permit_hit() -> SearchHit {
    SearchHit {
        similarity_score: 0.94,
        document: Document {
            id: Bson::ObjectId(ObjectId::new()),
            title: "Study Permits".to_string(),
            desc: "Apply via IRCC portal before your program starts.".to_string(),
            content_vector: Some(vec![0.1, 0.2, 0.3]),
        },
    }
}

fn openai_config(endpoint: &str) -> OpenAiConfig {
    OpenAiConfig {
        endpoint: endpoint.to_string(),
        api_key: "test-key".to_string(),
        ..OpenAiConfig::default()
    }
}

fn app_for(server_uri: &str, hits: Vec<SearchHit>) -> axum::Router {
    let client =
        Arc::new(OpenAiClient::new(&openai_config(server_uri)).expect("can create client"));
    let retriever = Arc::new(InMemoryRetriever { hits });
    let engine = RagEngine::new(Arc::<OpenAiClient>::clone(&client), retriever, client);
    router(Arc::new(engine))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("can build request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("can read body");
    serde_json::from_slice(&bytes).expect("body is json")
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_round_trip_grounds_the_completion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/openai/deployments/text-embedding-ada-002/embeddings",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The system message forwarded to the model must carry the retrieved
    // title and desc, prefixed by the persona instructions.
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .and(body_string_contains("You are MapleBond"))
        .and(body_string_contains("Study Permits"))
        .and(body_string_contains("Apply via IRCC portal"))
        .and(body_string_contains("How do I apply for a study permit?"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Apply online via the IRCC portal." } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server.uri(), vec![study_permit_hit()]);

    let response = app
        .oneshot(chat_request(
            json!({ "input": "How do I apply for a study permit?" }),
        ))
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "message": "Apply online via the IRCC portal." }));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_makes_no_upstream_calls() {
    let server = MockServer::start().await;

    let app = app_for(&server.uri(), vec![study_permit_hit()]);

    let response = app
        .oneshot(chat_request(json!({ "input": "" })))
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "error": "No input provided" }));

    let received = server
        .received_requests()
        .await
        .expect("request recording enabled");
    assert!(received.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_completion_failure_is_reported_as_internal_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/openai/deployments/text-embedding-ada-002/embeddings",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4o/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let app = app_for(&server.uri(), vec![study_permit_hit()]);

    let response = app
        .oneshot(chat_request(json!({ "input": "a question" })))
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .expect("error message present");
    assert!(error.contains("Completion error"));
}
