//! Finish-reason and token-usage mapping from Chat Completions to Messages.

use super::anthropic_types::{StopReason, Usage};
use super::openai_types::{ChatUsage, FinishReason};

/// Which usage sides are known at the point of mapping. A side that is not
/// known is reported as `null` instead of `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageFields {
    pub input: bool,
    pub output: bool,
}

impl UsageFields {
    pub const ALL: Self = Self {
        input: true,
        output: true,
    };

    /// Used by the closing `message_delta`: input was reported at message start.
    pub const OUTPUT_ONLY: Self = Self {
        input: false,
        output: true,
    };
}

/// Total mapping; anything unrecognised (or absent) ends the turn normally.
pub fn map_finish_reason(reason: Option<FinishReason>) -> StopReason {
    match reason {
        Some(FinishReason::Stop) => StopReason::EndTurn,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::ToolCalls | FinishReason::FunctionCall) => StopReason::ToolUse,
        Some(FinishReason::ContentFilter) => StopReason::StopSequence,
        Some(FinishReason::Other) | None => StopReason::EndTurn,
    }
}

pub fn map_usage(usage: Option<&ChatUsage>, fields: UsageFields) -> Usage {
    let prompt = usage.and_then(|u| u.prompt_tokens).unwrap_or(0);
    let completion = usage.and_then(|u| u.completion_tokens).unwrap_or(0);

    Usage {
        input_tokens: fields.input.then_some(prompt),
        output_tokens: fields.output.then_some(completion),
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
        server_tool_use: None,
        service_tier: None,
    }
}
