// tests/openrouter_test.rs
// OpenRouter client against a local fake provider

use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use futures::StreamExt;

use pentad::{ModelClient, OpenRouterClient, PersonaRoster, UpstreamEvent};

const SSE_OK: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Rec\"}}]}\n\n",
    ": OPENROUTER PROCESSING\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"ursion\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

const SSE_PROVIDER_ERROR: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hal\"}}]}\n\n",
    "data: {\"error\":{\"message\":\"rate limited\",\"code\":429}}\n\n",
);

const SSE_TRUNCATED: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hal\"}}]}\n\n";

fn event_stream(body: &'static str) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

/// Serve a fake provider on an ephemeral port, returning its base URL
async fn spawn_provider() -> String {
    let app = Router::new()
        .route("/ok", post(|| async { event_stream(SSE_OK) }))
        .route("/provider-error", post(|| async { event_stream(SSE_PROVIDER_ERROR) }))
        .route("/truncated", post(|| async { event_stream(SSE_TRUNCATED) }))
        .route(
            "/unauthorized",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({
                        "error": {"message": "No auth credentials found"}
                    })),
                )
            }),
        )
        .route(
            "/complete",
            post(|| async {
                axum::Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "  merged  "}}]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn collect(base: &str, path: &str) -> Vec<UpstreamEvent> {
    let client = OpenRouterClient::new("sk-or-test")
        .unwrap()
        .with_endpoint(format!("{}{}", base, path));
    let roster = PersonaRoster::builtin();
    let persona = &roster.personas()[0];

    client
        .start_stream(persona, &persona.system_prompt, "Explain recursion")
        .unwrap()
        .collect()
        .await
}

#[tokio::test]
async fn test_stream_tokens_then_done() {
    let base = spawn_provider().await;
    assert_eq!(
        collect(&base, "/ok").await,
        vec![
            UpstreamEvent::Token("Rec".into()),
            UpstreamEvent::Token("ursion".into()),
            UpstreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn test_provider_error_mid_stream() {
    let base = spawn_provider().await;
    assert_eq!(
        collect(&base, "/provider-error").await,
        vec![
            UpstreamEvent::Token("Hal".into()),
            UpstreamEvent::Error("rate limited".into()),
        ]
    );
}

#[tokio::test]
async fn test_stream_closed_without_finish_is_error() {
    let base = spawn_provider().await;
    let events = collect(&base, "/truncated").await;
    assert_eq!(events[0], UpstreamEvent::Token("Hal".into()));
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], UpstreamEvent::Error(_)));
}

#[tokio::test]
async fn test_bad_status_becomes_error_event() {
    let base = spawn_provider().await;
    let events = collect(&base, "/unauthorized").await;
    match events.as_slice() {
        [UpstreamEvent::Error(message)] => {
            assert!(message.contains("401"));
            assert!(message.contains("No auth credentials found"));
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_returns_message_content() {
    let base = spawn_provider().await;
    let client = OpenRouterClient::new("sk-or-test")
        .unwrap()
        .with_endpoint(format!("{}/complete", base));
    let roster = PersonaRoster::builtin();
    let synth = roster.synthesizer();

    let answer = client
        .complete(synth, &synth.system_prompt, "merge these")
        .await
        .unwrap();
    assert_eq!(answer.trim(), "merged");
}

#[tokio::test]
async fn test_complete_reports_unreachable_provider() {
    let client = OpenRouterClient::new("sk-or-test")
        .unwrap()
        .with_endpoint("http://127.0.0.1:9/unreachable");
    let roster = PersonaRoster::builtin();
    let synth = roster.synthesizer();

    let err = client
        .complete(synth, &synth.system_prompt, "merge these")
        .await
        .unwrap_err();
    assert!(err.is_upstream());
}
