// src/server/mod.rs
// HTTP layer for Pentad

pub mod api;
pub mod auth;
pub mod chat;
pub mod state;
pub mod uploads;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create the web server router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Reverse proxies must not buffer the event stream
    let no_buffering = SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    // Routes behind the session gate
    let protected = Router::new()
        .route("/chat", post(chat::chat_stream).layer(no_buffering))
        .route("/asklurk", post(chat::asklurk))
        .route(
            "/upload",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::UPLOAD_BODY_LIMIT)),
        )
        .route("/personas", get(api::list_personas))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(api::health))
        .route("/tokens", get(api::tokens))
        .route("/reset-tokens", post(api::reset_tokens))
        .route("/static/uploads/{name}", get(uploads::serve_upload))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
