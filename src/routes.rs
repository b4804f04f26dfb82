//! HTTP surface: router assembly, CORS, and the request handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::fetch::{self, FetchError, FetchOutcome};
use crate::models::{ConversationResponse, HtmlResponse, ShareRequest};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub launcher: Arc<dyn BrowserLauncher>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(banner))
        .route(
            "/api/fetch-chatgpt",
            get(banner).post(fetch_endpoint).options(preflight),
        )
        .layer(cors)
        .with_state(state)
}

/// Usage banner served on `GET /` and `GET /api/fetch-chatgpt`.
async fn banner() -> Json<serde_json::Value> {
    Json(json!({
        "message": "ChatGPT share conversation fetch API",
        "status": "running",
        "usage": "POST /api/fetch-chatgpt with { \"shareUrl\": \"https://chatgpt.com/share/...\" }",
    }))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn fetch_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<ShareRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON body" })),
            )
                .into_response();
        }
    };

    let share_url = match request.share_url {
        Some(share_url) => share_url,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "shareUrl is required" })),
            )
                .into_response();
        }
    };

    // A client disconnect drops this handler future; the pipeline runs on
    // its own task so the browser close still happens.
    let launcher = Arc::clone(&state.launcher);
    let config = state.config.clone();
    let task_url = share_url.clone();
    let outcome = tokio::spawn(async move {
        fetch::fetch_share(launcher.as_ref(), &config, &task_url).await
    })
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("fetch task failed for {}: {}", share_url, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch the page",
                    "message": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    match outcome {
        Ok(FetchOutcome::Conversation(extraction)) => (
            StatusCode::OK,
            Json(ConversationResponse {
                success: true,
                messages: extraction.messages,
                title: extraction.title,
                debug: extraction.stats,
                share_url,
            }),
        )
            .into_response(),
        Ok(FetchOutcome::Html(html)) => (
            StatusCode::OK,
            Json(HtmlResponse {
                success: true,
                html,
                share_url,
            }),
        )
            .into_response(),
        Err(FetchError::InvalidShareUrl(message)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        Err(e) => {
            error!("fetch failed for {}: {}", share_url, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch the page",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
