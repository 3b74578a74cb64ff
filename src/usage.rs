//! Token usage ledger
//!
//! Process-scoped estimate of tokens sent to and received from the provider.
//! Counts are approximate (about four characters per token); the ledger exists
//! to give operators a coarse budget, not billing-grade accounting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default budget before chat requests are refused
pub const DEFAULT_TOKEN_LIMIT: u64 = 300_000;

const CHARS_PER_TOKEN: u64 = 4;

/// Rough token estimate for a piece of text (never zero for non-empty text)
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Point-in-time view of the ledger, also the `/tokens` response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub tokens_used: u64,
    pub token_limit: u64,
    pub remaining: u64,
}

/// Shared usage counter
pub struct UsageLedger {
    tokens_used: AtomicU64,
    token_limit: u64,
}

impl UsageLedger {
    pub fn new(token_limit: u64) -> Self {
        Self {
            tokens_used: AtomicU64::new(0),
            token_limit,
        }
    }

    /// Add estimated tokens
    pub fn record(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Add the estimate for a piece of text
    pub fn record_text(&self, text: &str) {
        self.record(estimate_tokens(text));
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    pub fn is_exhausted(&self) -> bool {
        self.tokens_used() >= self.token_limit
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let tokens_used = self.tokens_used();
        UsageSnapshot {
            tokens_used,
            token_limit: self.token_limit,
            remaining: self.token_limit.saturating_sub(tokens_used),
        }
    }

    /// Zero the counter, returning the post-reset snapshot
    pub fn reset(&self) -> UsageSnapshot {
        self.tokens_used.store(0, Ordering::Relaxed);
        self.snapshot()
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}
