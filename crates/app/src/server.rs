use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sinhala_rag_core::{GeminiGenerator, QdrantStore, RagService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

const EMPTY_QUESTION_MESSAGE: &str = "ප්‍රශ්නයක් ලබා දෙන්න";
const HEALTHY_MESSAGE: &str = "සේවාව ක්‍රියාත්මකයි";

pub type SharedService = Arc<RagService<QdrantStore, GeminiGenerator>>;

pub fn router(service: SharedService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .route("/suggest", get(handle_suggest))
        .route("/mappings", post(handle_add_mapping))
        .layer(cors)
        .with_state(service)
}

pub async fn run_server(service: SharedService, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %bind, "http server listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: &'static str,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
            status: "error",
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    status: &'static str,
}

async fn handle_ask(
    State(service): State<SharedService>,
    Json(request): Json<AskRequest>,
) -> Response {
    let question = request.question.trim();
    if question.is_empty() {
        return bad_request(EMPTY_QUESTION_MESSAGE);
    }

    info!(question = %question, "processing question");
    let answer = service.answer(question).await;
    Json(AskResponse {
        answer,
        status: "success",
    })
    .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: HEALTHY_MESSAGE,
    })
}

#[derive(Deserialize)]
struct SuggestParams {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct SuggestResponse {
    suggestions: Vec<String>,
}

async fn handle_suggest(
    State(service): State<SharedService>,
    Query(params): Query<SuggestParams>,
) -> Json<SuggestResponse> {
    Json(SuggestResponse {
        suggestions: service.suggest(&params.q),
    })
}

#[derive(Deserialize)]
struct MappingRequest {
    latin: String,
    native: String,
}

#[derive(Serialize)]
struct MappingResponse {
    status: &'static str,
}

async fn handle_add_mapping(
    State(service): State<SharedService>,
    Json(request): Json<MappingRequest>,
) -> Response {
    if request.latin.trim().is_empty() || request.native.trim().is_empty() {
        return bad_request("latin and native must not be empty");
    }

    service.add_mapping(request.latin.trim(), request.native.trim());
    Json(MappingResponse { status: "success" }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use sinhala_rag_core::{DEFAULT_GENERATION_MODEL, DEFAULT_LOCAL_DIMENSIONS};
    use tower::ServiceExt;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    // Nothing listens on the discard port; these routes never reach the index.
    fn offline_service() -> SharedService {
        let index = QdrantStore::new("http://127.0.0.1:9", "unused", DEFAULT_LOCAL_DIMENSIONS);
        let generator = GeminiGenerator::new("", DEFAULT_GENERATION_MODEL);
        Arc::new(RagService::new(index, generator))
    }

    fn post_json(uri: &str, body: &'static str) -> Result<Request<Body>, axum::http::Error> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
    }

    async fn json_body(response: Response) -> Result<Value, Box<dyn std::error::Error>> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn blank_question_is_a_bad_request() -> TestResult {
        for body in [r#"{"question":"   "}"#, "{}"] {
            let response = router(offline_service())
                .oneshot(post_json("/ask", body)?)
                .await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = json_body(response).await?;
            assert_eq!(body["error"], EMPTY_QUESTION_MESSAGE);
            assert_eq!(body["status"], "error");
        }
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_fixed_body() -> TestResult {
        let request = Request::builder().uri("/health").body(Body::empty())?;
        let response = router(offline_service()).oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await?;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["message"], HEALTHY_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn added_mapping_shows_up_in_suggestions() -> TestResult {
        let service = offline_service();

        let response = router(service.clone())
            .oneshot(post_json(
                "/mappings",
                r#"{"latin":"Custom","native":"විශේෂ"}"#,
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?["status"], "success");

        let request = Request::builder()
            .uri("/suggest?q=custo")
            .body(Body::empty())?;
        let response = router(service).oneshot(request).await?;
        let body = json_body(response).await?;
        let suggestions = body["suggestions"].as_array().cloned().unwrap_or_default();
        assert!(suggestions.contains(&Value::from("විශේෂ")));
        Ok(())
    }

    #[tokio::test]
    async fn empty_mapping_is_rejected() -> TestResult {
        let response = router(offline_service())
            .oneshot(post_json("/mappings", r#"{"latin":" ","native":"විශේෂ"}"#)?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
