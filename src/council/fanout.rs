//! Prompt fan-out
//!
//! Builds the per-persona message pair and starts one upstream stream per
//! persona, then hands the whole set to the multiplexer.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use super::multiplex::{CombinedStream, MultiplexConfig, Multiplexer};
use super::StreamEvent;
use crate::documents::DocumentBlock;
use crate::llm::{EventStream, ModelClient, UpstreamEvent};
use crate::persona::PersonaRoster;
use crate::usage::UsageLedger;

/// One incoming chat request
#[derive(Debug, Clone, Default)]
pub struct FanoutRequest {
    pub prompt: String,
    /// Attached document text, in upload order
    pub documents: Vec<DocumentBlock>,
}

impl FanoutRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            documents: Vec::new(),
        }
    }

    pub fn with_documents(mut self, documents: Vec<DocumentBlock>) -> Self {
        self.documents = documents;
        self
    }
}

/// Prompt followed by each attached document under its filename label
pub fn build_user_content(prompt: &str, documents: &[DocumentBlock]) -> String {
    let mut content = prompt.to_string();
    for doc in documents {
        content.push_str(&format!(
            "\n\n--- Attached file: {} ---\n{}",
            doc.label, doc.text
        ));
    }
    content
}

pub struct FanoutOrchestrator {
    client: Arc<dyn ModelClient>,
    roster: Arc<PersonaRoster>,
    ledger: Arc<UsageLedger>,
    multiplexer: Multiplexer,
}

impl FanoutOrchestrator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        roster: Arc<PersonaRoster>,
        ledger: Arc<UsageLedger>,
        config: MultiplexConfig,
    ) -> Self {
        Self {
            client,
            roster,
            ledger,
            multiplexer: Multiplexer::new(config),
        }
    }

    /// Start every persona's stream and return the combined event stream.
    ///
    /// A persona whose stream cannot be started shows up as an immediate
    /// `Error` for that persona; the rest of the fan-out is unaffected.
    pub fn fanout(&self, request: &FanoutRequest) -> CombinedStream {
        let user_content = build_user_content(&request.prompt, &request.documents);

        info!(
            client = self.client.name(),
            personas = self.roster.len(),
            documents = request.documents.len(),
            prompt_chars = request.prompt.len(),
            "fanning out prompt"
        );

        let sources: Vec<(String, EventStream)> = self
            .roster
            .personas()
            .iter()
            .map(|persona| {
                self.ledger.record_text(&persona.system_prompt);
                self.ledger.record_text(&user_content);

                let source = match self
                    .client
                    .start_stream(persona, &persona.system_prompt, &user_content)
                {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(persona = %persona.id, error = %e, "failed to start upstream stream");
                        failed_start(e.to_string())
                    }
                };
                (persona.id.clone(), source)
            })
            .collect();

        let ledger = self.ledger.clone();
        let combined = self.multiplexer.multiplex(sources).inspect(move |event| {
            if let StreamEvent::Token { text, .. } = event {
                ledger.record_text(text);
            }
        });

        Box::pin(combined)
    }
}

fn failed_start(message: String) -> EventStream {
    Box::pin(stream::once(async move { UpstreamEvent::Error(message) }))
}
