//! API translation between Anthropic and `OpenAI` formats.
//!
//! The core of the gateway: converts requests, responses, and streaming events
//! between the two API formats. Everything here except the stream driver is
//! pure (no I/O).

pub mod anthropic_types;
pub mod blocks;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
pub mod transcoder;
pub mod usage;

pub use transcoder::{OpenAiTranscoder, Transcoder, TranscoderRegistry};
