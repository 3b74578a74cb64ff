// src/server/state.rs
// Shared application state

use std::sync::Arc;

use crate::config::PentadConfig;
use crate::council::{FanoutOrchestrator, MultiplexConfig, Synthesizer};
use crate::documents::UploadStore;
use crate::error::Result;
use crate::llm::ModelClient;
use crate::persona::PersonaRoster;
use crate::usage::UsageLedger;

/// Shared application state, built once in `main`
#[derive(Clone)]
pub struct AppState {
    /// Prompt fan-out over the persona roster
    pub orchestrator: Arc<FanoutOrchestrator>,

    /// Single-call merge of persona answers
    pub synthesizer: Arc<Synthesizer>,

    pub roster: Arc<PersonaRoster>,

    /// Process-wide token usage
    pub ledger: Arc<UsageLedger>,

    pub uploads: Arc<UploadStore>,

    /// Credential accepted by the auth gate
    pub session_secret: Arc<String>,

    /// Reported by /health
    pub api_key_configured: bool,
}

impl AppState {
    /// Create new application state around one upstream client
    pub fn new(
        client: Arc<dyn ModelClient>,
        roster: PersonaRoster,
        ledger: UsageLedger,
        uploads: UploadStore,
        session_secret: impl Into<String>,
        multiplex: MultiplexConfig,
    ) -> Self {
        let roster = Arc::new(roster);
        let ledger = Arc::new(ledger);

        let orchestrator = FanoutOrchestrator::new(
            client.clone(),
            roster.clone(),
            ledger.clone(),
            multiplex,
        );
        let synthesizer = Synthesizer::new(client, roster.clone(), ledger.clone());

        Self {
            orchestrator: Arc::new(orchestrator),
            synthesizer: Arc::new(synthesizer),
            roster,
            ledger,
            uploads: Arc::new(uploads),
            session_secret: Arc::new(session_secret.into()),
            api_key_configured: true,
        }
    }

    /// Build state from loaded configuration
    pub fn from_config(config: &PentadConfig, client: Arc<dyn ModelClient>) -> Result<Self> {
        let roster = config.load_roster()?;
        let multiplex = MultiplexConfig {
            upstream_timeout: Some(config.upstream_timeout),
            ..MultiplexConfig::default()
        };

        let state = Self::new(
            client,
            roster,
            UsageLedger::new(config.token_limit),
            UploadStore::new(config.upload_dir.clone()),
            config.session_secret.clone(),
            multiplex,
        )
        .with_api_key_configured(!config.api_key.is_empty());

        Ok(state)
    }

    pub fn with_api_key_configured(mut self, configured: bool) -> Self {
        self.api_key_configured = configured;
        self
    }
}
