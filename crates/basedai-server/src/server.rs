//! HTTP front end: `POST /query` with `{"question": ...}` returns `{"answer": ...}`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use basedai::LLMClient;

use crate::error::{Result, ServerError};
use crate::service::QueryService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::EmptyQuestion => StatusCode::BAD_REQUEST,
            Self::Core(e) if e.is_port_error() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(status = %status, "Query failed: {self}");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip_all)]
async fn query<C: LLMClient + 'static>(
    State(service): State<Arc<QueryService<C>>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let answer = service.answer(&request.question).await?;
    Ok(Json(QueryResponse { answer }))
}

/// Builds the application router.
pub fn router<C: LLMClient + 'static>(service: Arc<QueryService<C>>) -> Router {
    Router::new()
        .route("/query", post(query::<C>))
        .with_state(service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<C, F>(
    service: Arc<QueryService<C>>,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    C: LLMClient + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use basedai::{
        ChatRequest, ChatResponse, ClientError, Config, Core, Message, RetryConfig, ToolRegistry,
    };
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;

    /// Returns canned replies, or a non-retryable failure once they run out.
    struct CannedClient {
        config: Config,
        replies: Mutex<VecDeque<&'static str>>,
    }

    impl CannedClient {
        fn new(replies: &[&'static str]) -> Self {
            let retry = RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            };
            Self {
                config: Config::new("mock", "mock-model").with_retry_config(retry),
                replies: Mutex::new(replies.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl LLMClient for CannedClient {
        fn config(&self) -> &Config {
            &self.config
        }

        async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
            let reply = self.replies.lock().unwrap().pop_front();
            let Some(reply) = reply else {
                return Err(ClientError::AuthenticationError("bad key".into()).into());
            };
            Ok(ChatResponse {
                message: Message::assistant(request.messages[0].conversation_id, reply),
                model: "mock-model".to_string(),
                usage: None,
                finish_reason: None,
                created_at: chrono::Utc::now(),
                response_id: None,
            })
        }

        fn supports_tools(&self) -> bool {
            true
        }
    }

    async fn spawn_server(replies: &[&'static str]) -> (String, oneshot::Sender<()>) {
        let core = Core::new(CannedClient::new(replies), ToolRegistry::new());
        let service = Arc::new(QueryService::new(core));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let (tx, rx) = oneshot::channel();
        tokio::spawn(serve(service, listener, async {
            let _ = rx.await;
        }));
        (url, tx)
    }

    #[tokio::test]
    async fn test_query_returns_answer() {
        let (url, _shutdown) = spawn_server(&["Paris."]).await;

        let response = reqwest::Client::new()
            .post(format!("{url}/query"))
            .json(&json!({"question": "What is the capital of France?"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: QueryResponse = response.json().await.unwrap();
        assert_eq!(body.answer, "Paris.");
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let (url, _shutdown) = spawn_server(&[]).await;

        let response = reqwest::Client::new()
            .post(format!("{url}/query"))
            .json(&json!({"question": "  "}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: ErrorBody = response.json().await.unwrap();
        assert_eq!(body.error, "Question must not be empty");
    }

    #[tokio::test]
    async fn test_model_failure_is_bad_gateway() {
        let (url, _shutdown) = spawn_server(&[]).await;

        let response = reqwest::Client::new()
            .post(format!("{url}/query"))
            .json(&json!({"question": "hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 502);
        let body: ErrorBody = response.json().await.unwrap();
        assert!(body.error.starts_with("Language model request failed"));
    }

    #[tokio::test]
    async fn test_missing_question_field_is_rejected() {
        let (url, _shutdown) = spawn_server(&[]).await;

        let response = reqwest::Client::new()
            .post(format!("{url}/query"))
            .json(&json!({"prompt": "hello"}))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let core = Core::new(CannedClient::new(&[]), ToolRegistry::new());
        let service = Arc::new(QueryService::new(core));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(service, listener, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        assert!(handle.await.unwrap().is_ok());
    }
}
