//! Router assembly: generation API, wizard WebSocket, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - wizard sessions over WebSocket at `/ws`
/// - the generation API under `/api/...`
/// - the front-end from `STATIC_DIR` (default `./static`) with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{}/index.html", static_dir.trim_end_matches('/'))));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/health", get(http::http_health))
        .route("/api/suggest-title", post(http::http_suggest_title))
        .route("/api/generate", post(http::http_generate))
        .route("/api/regenerate-one", post(http::http_regenerate_one))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Prompts;
    use crate::openai::tests::{client_for, completion_body};

    fn offline_router() -> Router {
        build_router(Arc::new(AppState::from_parts(None, Prompts::default())))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = router.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let (status, body) = send(offline_router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn suggest_title_falls_back_with_200() {
        let req = post_json("/api/suggest-title", json!({"grade": "小学3年", "subject": "理科", "theme": "こん虫"}));
        let (status, body) = send(offline_router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"titles": ["こん虫 ワークシート"]}));
    }

    #[tokio::test]
    async fn generate_without_ai_is_an_error_envelope() {
        let (status, body) = send(offline_router(), post_json("/api/generate", json!({"theme": "分数"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("生成中にエラーが発生しました: "));

        let (status, body) = send(offline_router(), post_json("/api/regenerate-one", json!({"problemNumber": 2}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("再生成中にエラーが発生しました: "));
    }

    #[tokio::test]
    async fn generate_returns_numbered_problems() {
        let mut server = mockito::Server::new_async().await;
        let reply = json!({
            "title": "たし算れんしゅう",
            "problems": [
                {"number": 7, "type": "一問一答", "question": "3+4は？", "answer": 7},
                {"type": "○×クイズ", "question": "5+5は10", "choices": ["○", "×"], "answer": true}
            ]
        })
        .to_string();
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body(&reply))
            .create_async()
            .await;

        let router = build_router(Arc::new(AppState::from_parts(Some(client_for(&server)), Prompts::default())));
        let (status, body) = send(router, post_json("/api/generate", json!({"theme": "たし算", "count": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "たし算れんしゅう");
        assert_eq!(body["problems"][0]["number"], 1);
        assert_eq!(body["problems"][0]["answer"], "7");
        assert_eq!(body["problems"][1]["type"], "○×クイズ");
        assert_eq!(body["problems"][1]["answer"], "○");
    }
}
