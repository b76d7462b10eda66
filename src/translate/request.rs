//! Translate Anthropic Messages API requests into `OpenAI` Chat Completions requests.
//!
//! Handles system prompts, multi-part content (text, images, documents), tool use,
//! tool results, and tool choice mapping. A single Anthropic message can expand into
//! multiple `OpenAI` messages (a user message with `tool_result` blocks produces
//! separate `tool`-role messages).

use super::anthropic_types::{
    ContentBlock, Message, MessageContent, MessagesRequest, Role, SystemBlock, SystemContent,
};
use super::blocks;
use super::openai_types::{ChatCompletionRequest, ChatContent, ChatMessage, ContentPart};

/// Translate an Anthropic Messages API request into an `OpenAI` Chat Completions request.
/// Pure function: `target_model` is the already-resolved provider model.
pub fn anthropic_to_openai(req: &MessagesRequest, target_model: &str) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(ref system) = req.system {
        messages.push(ChatMessage::new("system", Some(translate_system(system))));
    }

    for msg in &req.messages {
        messages.append(&mut translate_message(msg));
    }

    let tools = req
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .filter_map(blocks::tool_definition)
                .collect::<Vec<_>>()
        })
        .filter(|tools| !tools.is_empty());

    ChatCompletionRequest {
        model: target_model.to_string(),
        messages,
        max_completion_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools,
        tool_choice: req.tool_choice.as_ref().and_then(blocks::tool_choice),
        stop: req.stop_sequences.clone(),
    }
}

fn translate_system(system: &SystemContent) -> ChatContent {
    match system {
        SystemContent::Text(text) => ChatContent::Text(text.clone()),
        SystemContent::Blocks(system_blocks) => ChatContent::Parts(
            system_blocks
                .iter()
                .filter_map(|b| match b {
                    SystemBlock::Text { text } => Some(blocks::text_part(text)),
                    SystemBlock::Other => None,
                })
                .collect(),
        ),
    }
}

/// Plain string content maps 1:1; block content is split by role.
fn translate_message(msg: &Message) -> Vec<ChatMessage> {
    match &msg.content {
        MessageContent::Text(text) => vec![ChatMessage::new(
            msg.role.as_str(),
            Some(ChatContent::Text(text.clone())),
        )],
        MessageContent::Blocks(content) => match msg.role {
            Role::User => translate_user_message(content),
            Role::Assistant => translate_assistant_message(content),
        },
    }
}

fn translate_user_message(content: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut parts: Vec<ContentPart> = Vec::new();

    for block in content {
        match block {
            ContentBlock::Text { text } => parts.push(blocks::text_part(text)),
            ContentBlock::Image { source } => parts.push(blocks::image_part(source)),
            ContentBlock::Document { source } => parts.push(blocks::document_part(source)),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                messages.push(ChatMessage::tool(
                    tool_use_id.clone(),
                    blocks::tool_result_text(content.as_ref()),
                ));
            }
            ContentBlock::ToolUse { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. }
            | ContentBlock::Unknown => {}
        }
    }

    if !parts.is_empty() {
        messages.push(ChatMessage::new("user", Some(collapse_parts(parts))));
    }

    messages
}

fn translate_assistant_message(content: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut text_parts: Vec<ContentPart> = Vec::new();
    let mut tool_calls = Vec::new();

    for block in content {
        match block {
            ContentBlock::Text { text } => text_parts.push(blocks::text_part(text)),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(blocks::tool_use_to_call(id, name, input));
            }
            // Assistant messages carry text only; thinking never leaves the gateway.
            ContentBlock::Image { .. }
            | ContentBlock::Document { .. }
            | ContentBlock::ToolResult { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. }
            | ContentBlock::Unknown => {}
        }
    }

    if text_parts.is_empty() && tool_calls.is_empty() {
        return Vec::new();
    }

    let content = (!text_parts.is_empty()).then(|| collapse_parts(text_parts));

    vec![ChatMessage {
        role: "assistant".to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }]
}

/// A lone text part is sent as a plain string.
fn collapse_parts(mut parts: Vec<ContentPart>) -> ChatContent {
    if parts.len() == 1 {
        if let ContentPart::Text { text } = &mut parts[0] {
            return ChatContent::Text(std::mem::take(text));
        }
    }
    ChatContent::Parts(parts)
}
