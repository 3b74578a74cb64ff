// src/config/mod.rs
// Environment-based configuration, read once at startup

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PentadError, Result};
use crate::llm::openrouter::OPENROUTER_API_URL;
use crate::persona::PersonaRoster;
use crate::usage::DEFAULT_TOKEN_LIMIT;

#[derive(Debug, Clone)]
pub struct PentadConfig {
    // ── Upstream provider
    /// OPENROUTER_API_KEY (required)
    pub api_key: String,
    /// OPENROUTER_BASE_URL: full chat-completions endpoint
    pub upstream_url: String,
    /// PENTAD_UPSTREAM_TIMEOUT_SECS: per-persona stream timeout
    pub upstream_timeout: Duration,

    // ── Auth
    /// SESSION_SECRET (required): credential the auth gate accepts
    pub session_secret: String,

    // ── Collaborators
    /// PENTAD_UPLOAD_DIR
    pub upload_dir: PathBuf,
    /// PENTAD_TOKEN_LIMIT
    pub token_limit: u64,
    /// PENTAD_PERSONAS: optional roster TOML overriding the built-in one
    pub personas_path: Option<PathBuf>,

    // ── Server
    pub host: String,
    pub port: u16,
}

/// Parse `key` through `lookup`, tolerating trailing `# comments` and
/// surrounding whitespace; unparsable values fall back to `default`.
fn env_var_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => {
                    debug!(key, value = clean_val, "config from environment");
                    parsed
                }
                Err(_) => {
                    warn!(key, value = %val, "config value failed to parse, using default");
                    default
                }
            }
        }
        None => default,
    }
}

/// Required, non-blank value
fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PentadError::Config(format!("{} is not set", key)))
}

impl PentadConfig {
    /// Load from the process environment (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, "OPENROUTER_API_KEY")?;
        let session_secret = required(&lookup, "SESSION_SECRET")?;

        let timeout_secs: u64 = env_var_or(&lookup, "PENTAD_UPSTREAM_TIMEOUT_SECS", 60);
        if timeout_secs == 0 {
            return Err(PentadError::Config(
                "PENTAD_UPSTREAM_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let personas_path = lookup("PENTAD_PERSONAS")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_key,
            upstream_url: env_var_or(
                &lookup,
                "OPENROUTER_BASE_URL",
                OPENROUTER_API_URL.to_string(),
            ),
            upstream_timeout: Duration::from_secs(timeout_secs),
            session_secret,
            upload_dir: PathBuf::from(env_var_or(
                &lookup,
                "PENTAD_UPLOAD_DIR",
                "static/uploads".to_string(),
            )),
            token_limit: env_var_or(&lookup, "PENTAD_TOKEN_LIMIT", DEFAULT_TOKEN_LIMIT),
            personas_path,
            host: env_var_or(&lookup, "HOST", "0.0.0.0".to_string()),
            port: env_var_or(&lookup, "PORT", 5000),
        })
    }

    /// The configured roster, or the built-in one
    pub fn load_roster(&self) -> Result<PersonaRoster> {
        match &self.personas_path {
            Some(path) => PersonaRoster::load(path),
            None => Ok(PersonaRoster::builtin()),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
