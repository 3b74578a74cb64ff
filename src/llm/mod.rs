//! Upstream model clients
//!
//! A client turns one persona + message pair into either a stream of
//! incremental text (fan-out) or a single completion (synthesis).

pub mod openrouter;

pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::Serialize;
use std::pin::Pin;

use crate::error::Result;
use crate::persona::PersonaConfig;

/// Event yielded by a single persona's upstream stream.
///
/// A well-formed stream yields any number of `Token`s and then exactly one
/// terminal event. The multiplexer tags these with the persona id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Incremental text fragment
    Token(String),
    /// Stream complete
    Done,
    /// Stream failed; human-readable reason
    Error(String),
}

impl UpstreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpstreamEvent::Done | UpstreamEvent::Error(_))
    }
}

/// Single-pass upstream event source. Dropping it releases the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = UpstreamEvent> + Send + 'static>>;

/// Chat message in OpenAI-compatible format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Upstream LLM provider seam.
///
/// Implementations must never let a failure escape a started stream: network,
/// status and framing problems all end the stream with `UpstreamEvent::Error`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name for logging/identification
    fn name(&self) -> &'static str;

    /// Begin a streaming completion. The returned stream is lazy; the network
    /// request is issued when it is first polled. `Err` means the request could
    /// not even be constructed.
    fn start_stream(
        &self,
        persona: &PersonaConfig,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<EventStream>;

    /// Non-streaming completion, returns the full answer text
    async fn complete(
        &self,
        persona: &PersonaConfig,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(!UpstreamEvent::Token("x".into()).is_terminal());
        assert!(UpstreamEvent::Done.is_terminal());
        assert!(UpstreamEvent::Error("boom".into()).is_terminal());
    }

    #[test]
    fn test_chat_message_serializes_openai_shape() {
        let msg = ChatMessage::system("be terse");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"role": "system", "content": "be terse"})
        );
        assert_eq!(ChatMessage::user("hi").role, "user");
    }
}
