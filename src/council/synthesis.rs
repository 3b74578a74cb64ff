//! Synthesis Module - merge persona answers into one
//!
//! A single non-streaming call to the roster's synthesis persona.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{PentadError, Result};
use crate::llm::ModelClient;
use crate::persona::PersonaRoster;
use crate::usage::UsageLedger;

/// Collected answers to synthesize
#[derive(Debug, Clone, Default)]
pub struct SynthesisRequest {
    /// The original question
    pub prompt: String,
    /// Persona id -> final answer text
    pub answers: HashMap<String, String>,
}

/// Build the synthesizer's user message.
///
/// Answers are listed in roster order; ids the roster does not know follow,
/// sorted, under their raw id. Blank answers are skipped.
pub fn build_synthesis_prompt(
    roster: &PersonaRoster,
    question: &str,
    answers: &HashMap<String, String>,
) -> String {
    let mut ordered: Vec<(&str, &str)> = Vec::with_capacity(answers.len());

    for persona in roster.personas() {
        if let Some(answer) = answers.get(&persona.id) {
            ordered.push((persona.name.as_str(), answer.as_str()));
        }
    }

    let mut unknown: Vec<&String> = answers
        .keys()
        .filter(|id| roster.get(id).is_none())
        .collect();
    unknown.sort();
    for id in unknown {
        ordered.push((id.as_str(), answers[id].as_str()));
    }

    let mut prompt = format!(
        "The user asked: {}\n\nThe following assistants answered:\n\n",
        question.trim()
    );
    for (label, answer) in ordered.into_iter().filter(|(_, a)| !a.trim().is_empty()) {
        prompt.push_str(&format!("## {}\n{}\n\n", label, answer.trim()));
    }
    prompt.push_str(
        "Compare these answers and write the single best answer to the user's question.",
    );
    prompt
}

pub struct Synthesizer {
    client: Arc<dyn ModelClient>,
    roster: Arc<PersonaRoster>,
    ledger: Arc<UsageLedger>,
}

impl Synthesizer {
    pub fn new(
        client: Arc<dyn ModelClient>,
        roster: Arc<PersonaRoster>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            client,
            roster,
            ledger,
        }
    }

    /// Merge the supplied answers with exactly one upstream call.
    ///
    /// Fails with `InvalidInput`, without calling upstream, when no non-blank
    /// answer is supplied.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<String> {
        let usable = request
            .answers
            .values()
            .filter(|answer| !answer.trim().is_empty())
            .count();
        if usable == 0 {
            return Err(PentadError::InvalidInput(
                "answers must contain at least one persona answer".to_string(),
            ));
        }

        let synthesizer = self.roster.synthesizer();
        let user_content = build_synthesis_prompt(&self.roster, &request.prompt, &request.answers);

        info!(
            persona = %synthesizer.id,
            answers = usable,
            "synthesizing answers"
        );

        self.ledger.record_text(&synthesizer.system_prompt);
        self.ledger.record_text(&user_content);

        let best = self
            .client
            .complete(synthesizer, &synthesizer.system_prompt, &user_content)
            .await?;

        self.ledger.record_text(&best);
        Ok(best.trim().to_string())
    }
}
