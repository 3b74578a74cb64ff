//! Council Module - concurrent persona fan-out
//!
//! - `multiplex`: merges N per-persona upstream streams into one event stream
//! - `fanout`: builds per-persona messages and starts every stream at once
//! - `synthesis`: one extra completion that merges the collected answers

pub mod fanout;
pub mod multiplex;
pub mod synthesis;

pub use fanout::{FanoutOrchestrator, FanoutRequest, build_user_content};
pub use multiplex::{
    CombinedStream, DEFAULT_UPSTREAM_TIMEOUT, MultiplexConfig, Multiplexer,
};
pub use synthesis::{SynthesisRequest, Synthesizer, build_synthesis_prompt};

use serde::{Serialize, Serializer};

use crate::llm::UpstreamEvent;

/// Unit of the combined stream.
///
/// For a given persona id at most one terminal event (`Done` or `Error`) is
/// emitted and no `Token` follows it. `AllDone` is emitted exactly once, last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token { bot: String, text: String },
    Done { bot: String },
    Error { bot: String, message: String },
    AllDone,
}

impl StreamEvent {
    /// Tag an upstream event with its persona id
    pub fn from_upstream(bot: &str, event: UpstreamEvent) -> Self {
        let bot = bot.to_string();
        match event {
            UpstreamEvent::Token(text) => StreamEvent::Token { bot, text },
            UpstreamEvent::Done => StreamEvent::Done { bot },
            UpstreamEvent::Error(message) => StreamEvent::Error { bot, message },
        }
    }

    pub fn bot(&self) -> Option<&str> {
        match self {
            StreamEvent::Token { bot, .. }
            | StreamEvent::Done { bot }
            | StreamEvent::Error { bot, .. } => Some(bot),
            StreamEvent::AllDone => None,
        }
    }

    /// Persona id whose stream this event terminates, if any
    pub fn terminal_bot(&self) -> Option<&str> {
        match self {
            StreamEvent::Done { bot } | StreamEvent::Error { bot, .. } => Some(bot),
            _ => None,
        }
    }
}

/// Wire shape: `{bot, text?, done?, error?}` or `{all_done: true}`
#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    bot: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    all_done: Option<bool>,
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = WireRecord {
            bot: self.bot(),
            text: None,
            done: None,
            error: None,
            all_done: None,
        };
        match self {
            StreamEvent::Token { text, .. } => record.text = Some(text),
            StreamEvent::Done { .. } => record.done = Some(true),
            StreamEvent::Error { message, .. } => record.error = Some(message),
            StreamEvent::AllDone => record.all_done = Some(true),
        }
        record.serialize(serializer)
    }
}
