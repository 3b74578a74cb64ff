//! OpenRouter chat-completions client
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol. Streaming uses
//! server-sent events via `reqwest-eventsource`; the SSE reader is closed on
//! every terminal path so the transport never reconnects on its own.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ChatMessage, EventStream, ModelClient, UpstreamEvent};
use crate::error::{PentadError, Result};
use crate::persona::PersonaConfig;

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default timeout for non-streaming completions
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Attribution headers OpenRouter uses for app rankings
const APP_REFERER: &str = "https://github.com/pentad-chat/pentad";
const APP_TITLE: &str = "Pentad Chat";

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
    request_timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENROUTER_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Point the client at a different OpenAI-compatible endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn build_request(
        &self,
        persona: &PersonaConfig,
        system_prompt: &str,
        user_content: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let body = CompletionRequest {
            model: &persona.model,
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_content),
            ],
            stream,
        };

        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ProviderError>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
    error: Option<ProviderError>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ProviderError {
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

/// What one SSE data payload contributed to the stream
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    /// Text fragments, plus whether the provider signalled a finish reason
    Tokens { tokens: Vec<String>, finished: bool },
    /// Provider reported an error mid-stream
    ProviderError(String),
}

fn parse_chunk(data: &str) -> Result<ChunkOutcome> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| PentadError::UpstreamProtocol(format!("malformed stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Ok(ChunkOutcome::ProviderError(error.message));
    }

    let mut tokens = Vec::new();
    let mut finished = false;
    for choice in chunk.choices {
        if let Some(content) = choice.delta.and_then(|d| d.content) {
            if !content.is_empty() {
                tokens.push(content);
            }
        }
        finished |= choice.finish_reason.is_some();
    }

    Ok(ChunkOutcome::Tokens { tokens, finished })
}

/// Pull a readable message out of an error response body
fn provider_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

/// Map an SSE transport failure to the relay's taxonomy
async fn classify_stream_error(err: reqwest_eventsource::Error) -> PentadError {
    use reqwest_eventsource::Error as EsError;

    match err {
        EsError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            PentadError::UpstreamConnection(format!(
                "provider returned {}: {}",
                status,
                provider_error_message(&body)
            ))
        }
        EsError::InvalidContentType(content_type, _) => PentadError::UpstreamProtocol(format!(
            "unexpected content type: {}",
            content_type.to_str().unwrap_or("<binary>")
        )),
        EsError::Transport(e) => PentadError::UpstreamConnection(e.to_string()),
        EsError::StreamEnded => {
            PentadError::UpstreamProtocol("stream closed before completion".to_string())
        }
        other => PentadError::UpstreamProtocol(other.to_string()),
    }
}

// ============================================================================
// Client Implementation
// ============================================================================

#[async_trait]
impl ModelClient for OpenRouterClient {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn start_stream(
        &self,
        persona: &PersonaConfig,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<EventStream> {
        let request = self.build_request(persona, system_prompt, user_content, true);
        let mut es = EventSource::new(request).map_err(|e| {
            PentadError::UpstreamConnection(format!("cannot open event stream: {}", e))
        })?;

        let persona_id = persona.id.clone();
        let model = persona.model.clone();

        let stream = async_stream::stream! {
            let start_time = Instant::now();
            let mut chunk_count = 0u32;
            let mut finished = false;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        debug!(persona = %persona_id, model = %model, "upstream stream opened");
                    }
                    Ok(Event::Message(msg)) => {
                        if msg.data == "[DONE]" {
                            debug!(
                                persona = %persona_id,
                                chunks = chunk_count,
                                duration_ms = start_time.elapsed().as_millis() as u64,
                                "upstream stream complete"
                            );
                            es.close();
                            yield UpstreamEvent::Done;
                            return;
                        }

                        chunk_count += 1;
                        match parse_chunk(&msg.data) {
                            Ok(ChunkOutcome::Tokens { tokens, finished: f }) => {
                                finished |= f;
                                for token in tokens {
                                    yield UpstreamEvent::Token(token);
                                }
                            }
                            Ok(ChunkOutcome::ProviderError(message)) => {
                                warn!(
                                    persona = %persona_id,
                                    error = %message,
                                    "provider reported error mid-stream"
                                );
                                es.close();
                                yield UpstreamEvent::Error(message);
                                return;
                            }
                            Err(e) => {
                                warn!(
                                    persona = %persona_id,
                                    error = %e,
                                    chunk = chunk_count,
                                    "failed to parse chunk"
                                );
                                es.close();
                                yield UpstreamEvent::Error(e.to_string());
                                return;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) if finished => {
                        // Some providers finish without the [DONE] sentinel
                        es.close();
                        yield UpstreamEvent::Done;
                        return;
                    }
                    Err(e) => {
                        es.close();
                        let err = classify_stream_error(e).await;
                        warn!(persona = %persona_id, error = %err, "upstream stream failed");
                        yield UpstreamEvent::Error(err.to_string());
                        return;
                    }
                }
            }

            // EventSource yields nothing further once closed; treat as a clean end
            // only if the provider already signalled a finish reason.
            if finished {
                yield UpstreamEvent::Done;
            } else {
                yield UpstreamEvent::Error("stream closed before completion".to_string());
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete(
        &self,
        persona: &PersonaConfig,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<String> {
        let start_time = Instant::now();

        let response = self
            .build_request(persona, system_prompt, user_content, false)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| PentadError::UpstreamConnection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PentadError::UpstreamConnection(format!(
                "provider returned {}: {}",
                status,
                provider_error_message(&body)
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| PentadError::UpstreamProtocol(format!("malformed completion: {}", e)))?;

        if let Some(error) = body.error {
            return Err(PentadError::UpstreamConnection(error.message));
        }

        let text = body
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PentadError::UpstreamProtocol("completion contained no message".to_string())
            })?;

        debug!(
            persona = %persona.id,
            chars = text.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "completion received"
        );

        Ok(text)
    }
}
