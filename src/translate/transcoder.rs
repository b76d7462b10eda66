//! Pluggable target vocabularies.
//!
//! A [`Transcoder`] owns everything that differs per target API: where to send
//! the request, how to authenticate it, and how to convert requests, responses,
//! errors and streams. The [`TranscoderRegistry`] maps a provider key to one
//! implementation; adding a target means adding one impl and one entry.

use std::collections::HashMap;
use std::sync::Arc;

use super::anthropic_types::{ErrorResponse, MessagesRequest, MessagesResponse};
use super::openai_types::{ChatCompletionResponse, ChatErrorResponse};
use super::request::anthropic_to_openai;
use super::response::{
    openai_error_to_anthropic, openai_to_anthropic, status_to_anthropic_error, truncate,
};
use super::streaming::{transcode_stream, ChunkStream, EventStream};
use crate::error::{GatewayError, Result};

pub trait Transcoder: Send + Sync {
    /// Registry key, e.g. `claude-to-openai`.
    fn name(&self) -> &'static str;

    /// Full URL of the completion endpoint under `base_url`.
    fn endpoint(&self, base_url: &str) -> String;

    fn authorize(&self, builder: reqwest::RequestBuilder, api_key: &str)
        -> reqwest::RequestBuilder;

    fn convert_request(&self, req: &MessagesRequest, target_model: &str)
        -> Result<serde_json::Value>;

    /// Convert a successful upstream body. `original_model` is echoed back.
    fn convert_response(&self, body: &[u8], original_model: &str) -> Result<MessagesResponse>;

    /// Map a non-success upstream body into the Messages API error envelope.
    fn convert_error(&self, status: u16, body: &str) -> ErrorResponse;

    fn convert_stream(&self, chunks: ChunkStream, original_model: &str) -> EventStream;
}

/// Messages API in, Chat Completions out.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiTranscoder;

impl OpenAiTranscoder {
    pub const NAME: &'static str = "claude-to-openai";
}

impl Transcoder for OpenAiTranscoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn endpoint(&self, base_url: &str) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }

    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        builder.bearer_auth(api_key)
    }

    fn convert_request(
        &self,
        req: &MessagesRequest,
        target_model: &str,
    ) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(anthropic_to_openai(req, target_model))?)
    }

    fn convert_response(&self, body: &[u8], original_model: &str) -> Result<MessagesResponse> {
        let resp: ChatCompletionResponse = serde_json::from_slice(body).map_err(|e| {
            GatewayError::translation(format!(
                "Failed to parse provider response: {e}. Body: {}",
                truncate(&String::from_utf8_lossy(body), 300)
            ))
        })?;
        openai_to_anthropic(&resp, original_model)
    }

    fn convert_error(&self, status: u16, body: &str) -> ErrorResponse {
        match serde_json::from_str::<ChatErrorResponse>(body) {
            Ok(err) => openai_error_to_anthropic(&err),
            Err(_) => status_to_anthropic_error(status, body),
        }
    }

    fn convert_stream(&self, chunks: ChunkStream, original_model: &str) -> EventStream {
        transcode_stream(chunks, original_model.to_string())
    }
}

/// Lookup table from provider key to transcoder.
#[derive(Clone, Default)]
pub struct TranscoderRegistry {
    transcoders: HashMap<String, Arc<dyn Transcoder>>,
}

impl TranscoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in transcoder.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiTranscoder));
        registry
    }

    pub fn register(&mut self, transcoder: Arc<dyn Transcoder>) {
        self.transcoders
            .insert(transcoder.name().to_string(), transcoder);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Transcoder>> {
        self.transcoders.get(key).cloned().ok_or_else(|| {
            GatewayError::config(format!(
                "No transcoder registered for '{key}'. Known: {}",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transcoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TranscoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscoderRegistry")
            .field("transcoders", &self.names())
            .finish()
    }
}
