// src/persona/mod.rs
// Persona roster: the fixed set of voices a prompt is fanned out to.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{PentadError, Result};

/// Default upstream model for every built-in persona
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3.1:free";

/// Identifier of the built-in synthesis persona
pub const SYNTHESIZER_ID: &str = "asklurk";

/// One configured personality answering the same prompt independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Unique key, used to tag every stream event (e.g. "logic")
    pub id: String,
    /// Display name
    pub name: String,
    /// Short style summary shown to clients
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    /// Upstream model identifier
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl PersonaConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            model: model.into(),
        }
    }
}

/// On-disk roster layout (TOML)
#[derive(Debug, Deserialize)]
struct RosterFile {
    synthesizer: PersonaConfig,
    #[serde(rename = "persona")]
    personas: Vec<PersonaConfig>,
}

/// Immutable set of fan-out personas plus the synthesis persona.
///
/// Loaded once at startup. Order is significant: it is the order personas are
/// listed to clients and the order answers are presented to the synthesizer.
#[derive(Debug, Clone)]
pub struct PersonaRoster {
    personas: Vec<PersonaConfig>,
    synthesizer: PersonaConfig,
}

impl PersonaRoster {
    /// Build a roster, rejecting empty sets, blank ids and duplicate ids.
    pub fn new(personas: Vec<PersonaConfig>, synthesizer: PersonaConfig) -> Result<Self> {
        if personas.is_empty() {
            return Err(PentadError::Config(
                "persona roster must contain at least one fan-out persona".into(),
            ));
        }

        let mut seen = HashSet::new();
        for persona in personas.iter().chain(std::iter::once(&synthesizer)) {
            if persona.id.trim().is_empty() {
                return Err(PentadError::Config("persona id must not be empty".into()));
            }
            if !seen.insert(persona.id.as_str()) {
                return Err(PentadError::Config(format!(
                    "duplicate persona id: {}",
                    persona.id
                )));
            }
        }

        Ok(Self {
            personas,
            synthesizer,
        })
    }

    /// The reference roster: five voices and one synthesizer.
    pub fn builtin() -> Self {
        let persona = |id: &str, name: &str, description: &str, prompt: &str| {
            PersonaConfig::new(id, name, description, prompt, DEFAULT_MODEL)
        };

        Self {
            personas: vec![
                persona(
                    "logic",
                    "Logic AI",
                    "analytical, structured, step-by-step",
                    "You are Logic AI: analytical, structured and step-by-step. \
                     Break every problem into clear premises, reason through them in order \
                     and state your conclusion explicitly.",
                ),
                persona(
                    "creative",
                    "Creative AI",
                    "poetic, metaphorical, emotional",
                    "You are Creative AI: poetic, metaphorical and emotional. \
                     Answer with vivid imagery and surprising connections while staying \
                     faithful to the question.",
                ),
                persona(
                    "technical",
                    "Technical AI",
                    "precise, technical, detail-oriented",
                    "You are Technical AI: precise, technical and detail-oriented. \
                     Prefer exact terminology, concrete numbers and worked examples.",
                ),
                persona(
                    "philosophical",
                    "Philosophical AI",
                    "deep, reflective, abstract",
                    "You are Philosophical AI: deep, reflective and abstract. \
                     Explore the assumptions behind the question and what it reveals.",
                ),
                persona(
                    "humorous",
                    "Humorous AI",
                    "witty, lighthearted, engaging",
                    "You are Humorous AI: witty, lighthearted and engaging. \
                     Keep the answer correct, but make it fun to read.",
                ),
            ],
            synthesizer: persona(
                SYNTHESIZER_ID,
                "AskLurk",
                "compares and merges the other answers",
                "You are AskLurk, an impartial editor. You receive one question and several \
                 answers written in different styles. Compare them, keep what is correct and \
                 useful from each, drop contradictions and filler, and write the single best \
                 answer to the question. Reply with the answer only.",
            ),
        }
    }

    /// Parse a roster from TOML (`[synthesizer]` table plus `[[persona]]` entries).
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: RosterFile = toml::from_str(contents)
            .map_err(|e| PentadError::Config(format!("invalid persona roster: {}", e)))?;
        Self::new(file.personas, file.synthesizer)
    }

    /// Load a roster file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PentadError::Config(format!("cannot read persona roster {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn personas(&self) -> &[PersonaConfig] {
        &self.personas
    }

    pub fn synthesizer(&self) -> &PersonaConfig {
        &self.synthesizer
    }

    pub fn get(&self, id: &str) -> Option<&PersonaConfig> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
