use crate::error::{GatewayError, Result};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse};
use crate::translate::response::truncate;
use crate::translate::streaming::{ChunkStream, EventStream};
use crate::translate::Transcoder;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client headers forwarded untouched in pass-through mode.
const PASSTHROUGH_HEADERS: &[&str] = &["anthropic-version", "anthropic-beta"];

/// What the adapter hands back for a transcoded call.
pub enum Transcoded {
    Message(MessagesResponse),
    Stream(EventStream),
}

impl std::fmt::Debug for Transcoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transcoded::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Transcoded::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One outbound call through a transcoder, with an already-resolved key.
pub struct TransportAdapter {
    client: reqwest::Client,
    transcoder: Arc<dyn Transcoder>,
    base_url: String,
    api_key: String,
}

impl TransportAdapter {
    pub fn new(
        client: reqwest::Client,
        transcoder: Arc<dyn Transcoder>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            transcoder,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Send `req` to the provider as `target_model`.
    ///
    /// Non-success statuses come back as [`GatewayError::Upstream`] with the
    /// provider's error already mapped. Streaming requests return as soon as
    /// the upstream headers arrive; the body is consumed lazily.
    pub async fn call(&self, req: &MessagesRequest, target_model: &str) -> Result<Transcoded> {
        let url = self.transcoder.endpoint(&self.base_url);
        let body = self.transcoder.convert_request(req, target_model)?;
        let streaming = req.is_streaming();

        info!(
            url = %url,
            model = %req.model,
            target_model = %target_model,
            streaming,
            transcoder = self.transcoder.name(),
            "Forwarding request"
        );

        let response = self
            .transcoder
            .authorize(self.client.post(&url), &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %truncate(&body, 300), "Provider error");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                error: self.transcoder.convert_error(status.as_u16(), &body),
            });
        }

        if streaming {
            let chunks: ChunkStream = Box::pin(response.bytes_stream().eventsource().map(
                |event| match event {
                    Ok(event) => Ok(event.data),
                    Err(e) => Err(GatewayError::stream(e.to_string())),
                },
            ));
            return Ok(Transcoded::Stream(
                self.transcoder.convert_stream(chunks, &req.model),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::provider(format!("Failed to read response body: {e}")))?;
        debug!(status = status.as_u16(), body_len = bytes.len(), "Provider response");

        let message = self.transcoder.convert_response(&bytes, &req.model)?;

        info!(
            input_tokens = ?message.usage.input_tokens,
            output_tokens = ?message.usage.output_tokens,
            "Completed"
        );

        Ok(Transcoded::Message(message))
    }
}

/// Forward a Messages API request body unchanged.
///
/// The upstream response is returned as-is (any status) so its body can be
/// streamed back to the caller.
pub async fn passthrough(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    body: Bytes,
    headers: &HeaderMap,
) -> Result<reqwest::Response> {
    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));

    info!(url = %url, body_len = body.len(), "Passthrough request");

    let mut builder = client
        .post(&url)
        .header("x-api-key", api_key)
        .header("content-type", "application/json");

    for name in PASSTHROUGH_HEADERS {
        if let Some(value) = headers.get(*name) {
            builder = builder.header(*name, value);
        }
    }

    let response = builder
        .body(body)
        .send()
        .await
        .map_err(|e| GatewayError::provider(format!("Passthrough request failed: {e}")))?;

    info!(status = response.status().as_u16(), "Passthrough response");

    Ok(response)
}
