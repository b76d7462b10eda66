//! HTTP framing for gateway results.
//!
//! A message becomes a JSON body, an event stream becomes `text/event-stream`
//! frames, and errors become the Messages API error envelope. A failed stream
//! aborts the connection after the frames already written.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use tracing::error;

use crate::error::{GatewayError, Result};
use crate::proxy::Transcoded;
use crate::translate::anthropic_types::{ErrorResponse, MessagesResponse};
use crate::translate::streaming::EventStream;

pub fn message_response(message: MessagesResponse) -> Response {
    (StatusCode::OK, Json(message)).into_response()
}

pub fn event_stream_response(events: EventStream) -> Response {
    let frames = events.map(|item| {
        item.and_then(|event| Ok(Bytes::from(event.to_sse_frame()?)))
            .map_err(|e| {
                error!(error = %e, "Aborting event stream");
                e
            })
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub fn transcoded_response(result: Result<Transcoded>) -> Response {
    match result {
        Ok(Transcoded::Message(message)) => message_response(message),
        Ok(Transcoded::Stream(events)) => event_stream_response(events),
        Err(e) => e.into_response(),
    }
}

/// Relay a pass-through upstream response, streaming its body.
pub fn passthrough_response(upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, &content_type);
    if content_type.contains("text/event-stream") {
        builder = builder
            .header(header::CACHE_CONTROL, "no-cache")
            .header("x-accel-buffering", "no");
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub fn error_response(status: StatusCode, error: ErrorResponse) -> Response {
    (status, Json(error)).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Upstream { status, error } => error_response(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                error,
            ),
            GatewayError::Config { .. } => {
                error!(error = %self, "Gateway misconfigured");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::api_error(self.to_string()),
                )
            }
            other => {
                error!(error = %other, "Proxy error");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::api_error(format!("Proxy error: {other}")),
                )
            }
        }
    }
}
