// src/server/api.rs
// Status, roster and usage endpoints

use axum::extract::{Json, State};
use serde::Serialize;
use tracing::info;

use super::state::AppState;
use crate::usage::UsageSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub api_key_configured: bool,
    pub personas: usize,
    pub version: &'static str,
    pub timestamp: String,
}

/// Fan-out persona as shown to clients
#[derive(Debug, Serialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        api_key_configured: state.api_key_configured,
        personas: state.roster.len(),
        version: crate::VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn list_personas(State(state): State<AppState>) -> Json<Vec<PersonaSummary>> {
    let personas = state
        .roster
        .personas()
        .iter()
        .map(|p| PersonaSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
        })
        .collect();
    Json(personas)
}

pub async fn tokens(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.ledger.snapshot())
}

pub async fn reset_tokens(State(state): State<AppState>) -> Json<UsageSnapshot> {
    let snapshot = state.ledger.reset();
    info!(token_limit = snapshot.token_limit, "token usage reset");
    Json(snapshot)
}
