//! Authentication gate
//!
//! A request passes when it carries the configured session secret, either as
//! `Authorization: Bearer <secret>` or as the `pentad_session` cookie. The
//! identity provider that hands browsers that cookie lives outside this
//! service.

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap, Method, StatusCode,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;

use super::state::AppState;

/// Cookie carrying the session credential
pub const SESSION_COOKIE: &str = "pentad_session";

/// Middleware for routes that require a logged-in caller
pub async fn require_session(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // CORS preflight carries no credentials
    if req.method() == Method::OPTIONS || is_authenticated(req.headers(), &state.session_secret) {
        return next.run(req).await;
    }

    warn!(path = %req.uri().path(), "rejected unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "authentication required" })),
    )
        .into_response()
}

pub fn is_authenticated(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    bearer_token(headers).is_some_and(|token| secure_eq(token, secret))
        || session_cookie(headers).is_some_and(|value| secure_eq(value, secret))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
}

/// Length-checked comparison that does not stop at the first mismatch
fn secure_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
