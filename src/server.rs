//! HTTP API
//!
//! `POST /api/query/` takes `{"question": "..."}` and answers with the
//! executed SQL and its rows, or a 400 with `{"error": "..."}`.

use crate::pipeline::{Pipeline, Question};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/api/query/", post(query))
        .route("/api/query", post(query))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() }))).into_response()
}

async fn query(
    State(pipeline): State<Arc<Pipeline>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let question = match Question::new(request.question.unwrap_or_default()) {
        Ok(question) => question,
        Err(_) => return bad_request("Question is required"),
    };

    match pipeline.run(&question).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(failure) => {
            warn!(stage = %failure.stage, "query failed: {}", failure);
            bad_request(failure.to_string())
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "text2sql" }))
}
