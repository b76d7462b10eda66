//! Per-block conversions between the two vocabularies.
//!
//! Each function maps one content unit and never fails: kinds with no
//! counterpart degrade to a placeholder or are dropped by the caller.

use super::anthropic_types::{
    ContentBlock, DocumentSource, ImageSource, ResponseContentBlock, Tool, ToolChoice,
    ToolResultContent,
};
use super::openai_types::{
    ChatFunction, ChatTool, ChatToolCall, ChatToolCallFunction, ChatToolChoice,
    ChatToolChoiceFunction, ChatToolChoiceSpecific, ContentPart, ImageUrlDetail,
};

pub const IMAGE_PLACEHOLDER: &str = "[Image]";

pub fn text_part(text: &str) -> ContentPart {
    ContentPart::Text {
        text: text.to_string(),
    }
}

/// Base64 sources become inline data URIs; URL sources pass through.
pub fn image_part(source: &ImageSource) -> ContentPart {
    let url = match source {
        ImageSource::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        ImageSource::Url { url } => url.clone(),
    };
    ContentPart::ImageUrl {
        image_url: ImageUrlDetail { url, detail: None },
    }
}

/// Chat Completions has no document part, so a document becomes a text marker.
pub fn document_part(source: &DocumentSource) -> ContentPart {
    let media_type = source.media_type.as_deref().unwrap_or("unknown");
    ContentPart::Text {
        text: format!("[Document: {media_type}]"),
    }
}

pub fn tool_use_to_call(id: &str, name: &str, input: &serde_json::Value) -> ChatToolCall {
    ChatToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: ChatToolCallFunction {
            name: name.to_string(),
            arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
        },
    }
}

/// Flatten tool_result content into the single string a `tool` message carries.
pub fn tool_result_text(content: Option<&ToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
                _ => IMAGE_PLACEHOLDER,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Only tools with an input schema translate; server tools are skipped.
pub fn tool_definition(tool: &Tool) -> Option<ChatTool> {
    let schema = tool.input_schema.as_ref()?;
    Some(ChatTool {
        tool_type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: schema.clone(),
        },
    })
}

/// `any` deliberately relaxes to `auto`; `none` is left for the provider default.
pub fn tool_choice(choice: &ToolChoice) -> Option<ChatToolChoice> {
    match choice {
        ToolChoice::Tool { name, .. } => Some(ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        })),
        ToolChoice::Auto { .. } | ToolChoice::Any { .. } => {
            Some(ChatToolChoice::String("auto".to_string()))
        }
        ToolChoice::None => None,
    }
}

/// Parse a tool call's argument string. Malformed JSON is kept as a raw
/// string value rather than rejected.
pub fn parse_tool_arguments(arguments: &str) -> serde_json::Value {
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

pub fn tool_call_to_block(call: &ChatToolCall) -> ResponseContentBlock {
    ResponseContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input: parse_tool_arguments(&call.function.arguments),
    }
}
