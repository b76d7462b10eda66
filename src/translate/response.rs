use super::anthropic_types::{ErrorResponse, MessagesResponse, ResponseContentBlock};
use super::blocks;
use super::openai_types::{ChatCompletionResponse, ChatErrorResponse};
use super::usage::{map_finish_reason, map_usage, UsageFields};
use crate::error::{GatewayError, Result};

/// Translate an OpenAI Chat Completion response into an Anthropic Messages response.
/// Pure function: `original_model` is the model the client asked for, never the
/// provider's own model name.
pub fn openai_to_anthropic(
    resp: &ChatCompletionResponse,
    original_model: &str,
) -> Result<MessagesResponse> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| GatewayError::translation("Provider response contained no choices"))?;

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(ref text) = choice.message.content {
        if !text.is_empty() {
            content.push(ResponseContentBlock::text(text.clone()));
        }
    }

    if let Some(ref tool_calls) = choice.message.tool_calls {
        content.extend(tool_calls.iter().map(blocks::tool_call_to_block));
    }

    Ok(MessagesResponse {
        id: message_id(&resp.id),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: original_model.to_string(),
        stop_reason: Some(map_finish_reason(choice.finish_reason)),
        stop_sequence: None,
        usage: map_usage(resp.usage.as_ref(), UsageFields::ALL),
    })
}

/// Prefix a provider id so it reads like a Messages API id. Providers that
/// send no id get a fresh one.
pub fn message_id(id: &str) -> String {
    if id.is_empty() {
        format!("msg_{}", uuid::Uuid::new_v4().simple())
    } else if id.starts_with("msg_") {
        id.to_string()
    } else {
        format!("msg_{id}")
    }
}

/// Translate an OpenAI error into an Anthropic error response
pub fn openai_error_to_anthropic(err: &ChatErrorResponse) -> ErrorResponse {
    let error_type = match err.error.error_type.as_str() {
        "invalid_request_error" => "invalid_request_error",
        "authentication_error" => "authentication_error",
        "permission_error" => "permission_error",
        "not_found_error" => "not_found_error",
        "rate_limit_error" | "rate_limit_exceeded" | "insufficient_quota" => "rate_limit_error",
        _ => "api_error",
    };

    ErrorResponse::new(error_type, &err.error.message)
}

/// Map an upstream error status with an unparseable body.
pub fn status_to_anthropic_error(status: u16, body: &str) -> ErrorResponse {
    let error_type = match status {
        400 | 413 | 422 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        529 => "overloaded_error",
        _ => "api_error",
    };

    ErrorResponse::new(
        error_type,
        format!("Provider returned status {status}: {}", truncate(body, 500)),
    )
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
