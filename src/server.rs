use crate::config::{ProxyConfig, Route, DEFAULT_MODEL_KEY};
use crate::error::Result;
use crate::keys::KeyPool;
use crate::proxy::{self, TransportAdapter};
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};
use crate::translate::TranscoderRegistry;
use crate::wrapper;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub registry: TranscoderRegistry,
    pub keys: KeyPool,
    pub base_url: String,
}

impl AppState {
    /// Resolve the provider endpoint and keys up front so a bad config fails at startup.
    pub fn new(config: ProxyConfig, client: reqwest::Client) -> Result<Self> {
        let base_url = config.effective_base_url()?;
        let keys = KeyPool::new(config.provider.name.clone(), config.resolve_api_keys()?);
        let registry = TranscoderRegistry::with_defaults();

        if let Route::Transcode { transcoder, .. } = config.resolve_route("")? {
            registry.get(&transcoder)?;
        }

        Ok(Self {
            config,
            client,
            registry,
            keys,
            base_url,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Just enough of the request body to pick a route.
#[derive(Deserialize)]
struct RequestedModel {
    model: String,
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let requested: RequestedModel = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return invalid_request(e),
    };

    let route = match state.config.resolve_route(&requested.model) {
        Ok(route) => route,
        Err(e) => return e.into_response(),
    };

    match route {
        Route::Passthrough => handle_passthrough(&state, &headers, body)
            .await
            .unwrap_or_else(IntoResponse::into_response),
        Route::Transcode { transcoder, model } => {
            let req: MessagesRequest = match serde_json::from_slice(&body) {
                Ok(r) => r,
                Err(e) => return invalid_request(e),
            };
            handle_transcode(&state, &req, &transcoder, &model)
                .await
                .unwrap_or_else(IntoResponse::into_response)
        }
    }
}

async fn handle_transcode(
    state: &AppState,
    req: &MessagesRequest,
    transcoder: &str,
    target_model: &str,
) -> Result<Response> {
    info!(
        model = %req.model,
        target_model = %target_model,
        streaming = req.is_streaming(),
        messages = req.messages.len(),
        "Request"
    );

    let transcoder = state.registry.get(transcoder)?;
    let api_key = state.keys.next_key()?;
    let adapter = TransportAdapter::new(
        state.client.clone(),
        transcoder,
        state.base_url.clone(),
        api_key,
    );

    Ok(wrapper::transcoded_response(
        adapter.call(req, target_model).await,
    ))
}

async fn handle_passthrough(state: &AppState, headers: &HeaderMap, body: Bytes) -> Result<Response> {
    let api_key = state.keys.next_key()?;
    let upstream = proxy::passthrough(&state.client, &state.base_url, &api_key, body, headers).await?;
    Ok(wrapper::passthrough_response(upstream))
}

fn invalid_request(e: serde_json::Error) -> Response {
    tracing::warn!(error = %e, "Failed to parse request");
    wrapper::error_response(
        StatusCode::BAD_REQUEST,
        ErrorResponse::invalid_request(format!("Invalid request body: {e}")),
    )
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.config.provider.name,
        "format": state.config.wire_format().as_str(),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut names: Vec<&String> = state
        .config
        .models
        .keys()
        .filter(|name| name.as_str() != DEFAULT_MODEL_KEY)
        .collect();
    names.sort();

    let models: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": state.config.provider.name,
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}
