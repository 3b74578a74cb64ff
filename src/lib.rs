// src/lib.rs
// Pentad - one prompt, five personas, streamed side by side

pub mod config;
pub mod council;
pub mod documents;
pub mod error;
pub mod llm;
pub mod persona;
pub mod server;
pub mod usage;

pub use config::PentadConfig;
pub use council::{FanoutOrchestrator, Multiplexer, StreamEvent, Synthesizer};
pub use error::{PentadError, Result};
pub use llm::{EventStream, ModelClient, OpenRouterClient, UpstreamEvent};
pub use persona::{PersonaConfig, PersonaRoster};
pub use usage::UsageLedger;

/// Crate version, reported by /health
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
