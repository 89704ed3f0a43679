
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::rag::{DEFAULT_ANSWER_RESULTS, RagEngine};
use crate::{RagError, Result};

/// Answer-generation seam between the HTTP layer and the engine.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, question: &str, num_results: usize) -> Result<String>;
}

#[async_trait]
impl AnswerGenerator for RagEngine {
    async fn answer(&self, question: &str, num_results: usize) -> Result<String> {
        RagEngine::answer(self, question, num_results).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    input: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError(RagError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

/// Build the application router around an injected answer generator.
#[inline]
pub fn router(generator: Arc<dyn AnswerGenerator>) -> Router {
    Router::new()
        .route("/", get(get_routes))
        .route("/chat", post(start_chat))
        .layer(TraceLayer::new_for_http())
        .with_state(generator)
}

async fn get_routes() -> Json<Vec<&'static str>> {
    Json(vec!["/chat"])
}

async fn start_chat(
    State(generator): State<Arc<dyn AnswerGenerator>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let input = request.input.unwrap_or_default();

    let message = generator
        .answer(&input, DEFAULT_ANSWER_RESULTS)
        .await
        .map_err(ApiError)?;

    Ok(Json(ChatResponse { message }))
}

/// Bind to the configured address and serve until shutdown.
#[inline]
pub async fn serve(config: &ServerConfig, generator: Arc<dyn AnswerGenerator>) -> Result<()> {
    let app = router(generator);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    axum::serve(listener, app).await?;
    Ok(())
}
