//! Chat and synthesis handlers
//!
//! `/chat` streams the combined persona events as SSE, one JSON record per
//! event; `/asklurk` merges collected answers into one.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{info, warn};

use super::state::AppState;
use crate::council::{FanoutRequest, StreamEvent, SynthesisRequest};
use crate::documents::load_attachments;
use crate::error::PentadError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    /// URLs returned by /upload
    #[serde(rename = "fileUrls", default)]
    pub file_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsklurkRequest {
    #[serde(default)]
    pub prompt: String,
    /// Persona id -> final answer
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AsklurkResponse {
    pub best: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fan the prompt out to every persona and stream the combined events
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, PentadError> {
    if req.prompt.trim().is_empty() && req.file_urls.is_empty() {
        return Err(PentadError::InvalidInput(
            "prompt or fileUrls is required".to_string(),
        ));
    }
    if state.ledger.is_exhausted() {
        return Err(PentadError::BudgetExhausted);
    }

    let documents = load_attachments(&state.uploads, &req.file_urls).await;
    let request = FanoutRequest::new(req.prompt).with_documents(documents);

    let stream = state
        .orchestrator
        .fanout(&request)
        .map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// One `data: <json>` record
pub fn sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            warn!(error = %e, "failed to encode stream event");
            Event::default().data(serde_json::json!({ "error": e.to_string() }).to_string())
        }
    }
}

/// Merge persona answers into a single best answer
pub async fn asklurk(
    State(state): State<AppState>,
    Json(req): Json<AsklurkRequest>,
) -> (StatusCode, Json<AsklurkResponse>) {
    let request = SynthesisRequest {
        prompt: req.prompt,
        answers: req.answers,
    };

    match state.synthesizer.synthesize(&request).await {
        Ok(best) => {
            info!(chars = best.len(), "synthesis complete");
            (StatusCode::OK, Json(AsklurkResponse { best, error: None }))
        }
        Err(e) => {
            let status = e.status_code();
            warn!(error = %e, status = %status, "synthesis failed");
            (
                status,
                Json(AsklurkResponse {
                    best: String::new(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_accepts_camel_case_file_urls() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"prompt":"hi","fileUrls":["/static/uploads/a.txt"]}"#)
                .unwrap();
        assert_eq!(req.prompt, "hi");
        assert_eq!(req.file_urls, vec!["/static/uploads/a.txt"]);

        let req: ChatRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert!(req.file_urls.is_empty());
    }

    #[test]
    fn test_asklurk_response_omits_error_on_success() {
        let ok = AsklurkResponse {
            best: "42".into(),
            error: None,
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({"best": "42"}));
    }
}
