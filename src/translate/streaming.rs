//! State machine for translating OpenAI streaming chunks into Anthropic SSE events.
//!
//! The [`StreamConverter`] processes `ChatCompletionChunk`s one at a time,
//! tracking which content block is open, and emits the corresponding Anthropic
//! stream events (`message_start`, `content_block_delta`, ...).
//! [`transcode_stream`] drives one converter over an upstream chunk stream and
//! turns a missing finish reason into an error instead of a clean ending.

use std::collections::BTreeMap;
use std::pin::Pin;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use super::anthropic_types::{
    Delta, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent,
};
use super::openai_types::{ChatCompletionChunk, ChunkToolCall};
use super::response::message_id;
use super::usage::{map_finish_reason, map_usage, UsageFields};
use crate::error::{GatewayError, Result};

/// Raw `data:` payloads from the upstream SSE stream, one JSON chunk each.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Events ready to be framed and written to the client.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Translates one upstream message into Anthropic stream events.
///
/// Usage:
///   let mut converter = StreamConverter::new("claude-sonnet-4-20250514");
///   for chunk in openai_chunks {
///       let events = converter.process_chunk(&chunk);
///       // send each event as SSE
///   }
///
/// An instance belongs to a single request. State resets after `message_stop`.
#[derive(Debug)]
pub struct StreamConverter {
    model: String,
    message_started: bool,
    /// Number of blocks started so far; the open block, if any, is `content_index - 1`.
    content_index: usize,
    /// Accumulated argument text per upstream tool-call slot.
    tool_call_buffer: BTreeMap<u64, String>,
}

impl StreamConverter {
    /// `model` is the client-visible model name echoed in `message_start`,
    /// not the provider model the request was sent to.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            message_started: false,
            content_index: 0,
            tool_call_buffer: BTreeMap::new(),
        }
    }

    pub fn message_started(&self) -> bool {
        self.message_started
    }

    pub fn content_index(&self) -> usize {
        self.content_index
    }

    /// Arguments received so far for a tool-call slot of the current message.
    pub fn tool_arguments(&self, slot: u64) -> Option<&str> {
        self.tool_call_buffer.get(&slot).map(String::as_str)
    }

    /// Process a single OpenAI streaming chunk, returning zero or more Anthropic SSE events.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.message_started {
            self.message_started = true;
            events.push(self.message_start(&chunk.id));
        }

        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        if let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) {
            self.push_text(text, &mut events);
        }

        if let Some(tool_calls) = choice.delta.tool_calls.as_deref().filter(|c| !c.is_empty()) {
            self.push_tool_calls(tool_calls, &mut events);
        }

        if let Some(reason) = choice.finish_reason {
            if self.content_index > 0 {
                events.push(StreamEvent::ContentBlockStop {
                    index: self.content_index - 1,
                });
            }

            events.push(StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(map_finish_reason(Some(reason))),
                    stop_sequence: None,
                },
                usage: map_usage(chunk.usage.as_ref(), UsageFields::OUTPUT_ONLY),
            });
            events.push(StreamEvent::MessageStop);

            self.reset();
        }

        events
    }

    fn push_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        if self.content_index == 0 {
            events.push(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ResponseContentBlock::text(""),
            });
            self.content_index = 1;
        }

        events.push(StreamEvent::ContentBlockDelta {
            index: self.content_index - 1,
            delta: Delta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    fn push_tool_calls(&mut self, tool_calls: &[ChunkToolCall], events: &mut Vec<StreamEvent>) {
        // A text block is open; close it before the first tool block.
        if self.content_index > 0 && self.tool_call_buffer.is_empty() {
            events.push(StreamEvent::ContentBlockStop {
                index: self.content_index - 1,
            });
        }

        for tc in tool_calls {
            if !self.tool_call_buffer.contains_key(&tc.index) {
                // Only one block may be open: close the previous tool block.
                if !self.tool_call_buffer.is_empty() {
                    events.push(StreamEvent::ContentBlockStop {
                        index: self.content_index - 1,
                    });
                }

                let name = tc
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default();

                events.push(StreamEvent::ContentBlockStart {
                    index: self.content_index,
                    content_block: ResponseContentBlock::ToolUse {
                        id: tc.id.clone().unwrap_or_default(),
                        name,
                        input: serde_json::Value::Object(serde_json::Map::new()),
                    },
                });
                self.content_index += 1;
                self.tool_call_buffer.insert(tc.index, String::new());
            }

            let fragment = tc
                .function
                .as_ref()
                .and_then(|f| f.arguments.as_deref())
                .filter(|a| !a.is_empty());

            if let Some(fragment) = fragment {
                if let Some(buffer) = self.tool_call_buffer.get_mut(&tc.index) {
                    buffer.push_str(fragment);
                }
                // Deltas go to the most recently opened block.
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.content_index - 1,
                    delta: Delta::InputJsonDelta {
                        partial_json: fragment.to_string(),
                    },
                });
            }
        }
    }

    fn message_start(&self, chunk_id: &str) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: message_id(chunk_id),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: map_usage(None, UsageFields::ALL),
            },
        }
    }

    fn reset(&mut self) {
        self.message_started = false;
        self.content_index = 0;
        self.tool_call_buffer.clear();
    }
}

/// Drive a fresh [`StreamConverter`] over upstream chunk payloads.
///
/// The returned stream is lazy and single-pass. It ends right after
/// `message_stop`; if the upstream ends first (or sends `[DONE]` early) the
/// last item is [`GatewayError::StreamTruncated`].
pub fn transcode_stream(mut chunks: ChunkStream, model: String) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut converter = StreamConverter::new(&model);

        while let Some(item) = chunks.next().await {
            let data = match item {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Upstream stream failed");
                    yield Err(e);
                    return;
                }
            };

            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Unparseable upstream chunk");
                    yield Err(GatewayError::stream(format!("Invalid upstream chunk: {e}")));
                    return;
                }
            };

            for event in converter.process_chunk(&chunk) {
                let finished = matches!(event, StreamEvent::MessageStop);
                yield Ok(event);
                if finished {
                    debug!(model = %model, "Stream completed");
                    return;
                }
            }
        }

        warn!(model = %model, "Upstream ended without a finish reason");
        yield Err(GatewayError::StreamTruncated);
    })
}
