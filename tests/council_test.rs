// tests/council_test.rs


use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pentad::{
    EventStream, FanoutOrchestrator, Multiplexer, PentadError, PersonaRoster, StreamEvent,
    Synthesizer, UpstreamEvent, UsageLedger,
    council::{FanoutRequest, MultiplexConfig, SynthesisRequest},
};
use test_helpers::{StubClient, builtin_ids, tokens_then_done};

fn orchestrator(client: Arc<StubClient>, config: MultiplexConfig) -> FanoutOrchestrator {
    FanoutOrchestrator::new(
        client,
        Arc::new(PersonaRoster::builtin()),
        Arc::new(UsageLedger::default()),
        config,
    )
}

/// Per-bot event sequences, plus sanity checks every combined stream must pass
fn check_well_formed(events: &[StreamEvent], bots: &[String]) -> HashMap<String, Vec<StreamEvent>> {
    assert_eq!(events.last(), Some(&StreamEvent::AllDone), "AllDone must be last");
    assert_eq!(
        events.iter().filter(|e| **e == StreamEvent::AllDone).count(),
        1,
        "exactly one AllDone"
    );

    let mut per_bot: HashMap<String, Vec<StreamEvent>> = HashMap::new();
    let mut finished: HashSet<String> = HashSet::new();

    for event in events {
        let Some(bot) = event.bot() else { continue };
        assert!(!finished.contains(bot), "event after terminal for {}: {:?}", bot, event);
        if event.terminal_bot().is_some() {
            finished.insert(bot.to_string());
        }
        per_bot.entry(bot.to_string()).or_default().push(event.clone());
    }

    for bot in bots {
        assert!(finished.contains(bot), "{} never reached a terminal event", bot);
    }
    per_bot
}

#[tokio::test]
async fn test_n_sources_k_tokens_each() {
    let ids = builtin_ids();
    let mut client = StubClient::new();
    for id in &ids {
        client = client.script(id, tokens_then_done(&["one", "two", "three"]));
    }
    let client = Arc::new(client);

    let events: Vec<StreamEvent> = orchestrator(client.clone(), MultiplexConfig::default())
        .fanout(&FanoutRequest::new("Count to three"))
        .collect()
        .await;

    let tokens = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Token { .. }))
        .count();
    let dones = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Done { .. }))
        .count();
    assert_eq!(tokens, ids.len() * 3);
    assert_eq!(dones, ids.len());

    let per_bot = check_well_formed(&events, &ids);
    for id in &ids {
        let texts: Vec<&str> = per_bot[id]
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"], "order for {}", id);
    }

    assert_eq!(client.streams_started(), ids.len());
    assert_eq!(client.wait_for_release().await, 0);
}

#[tokio::test]
async fn test_one_failing_persona_does_not_stop_the_rest() {
    let ids = builtin_ids();
    let client = Arc::new(
        StubClient::new().script(
            "creative",
            vec![
                UpstreamEvent::Token("Once".into()),
                UpstreamEvent::Error("rate limited".into()),
            ],
        ),
    );

    let events: Vec<StreamEvent> = orchestrator(client, MultiplexConfig::default())
        .fanout(&FanoutRequest::new("Tell me a story"))
        .collect()
        .await;

    let per_bot = check_well_formed(&events, &ids);
    let errors: Vec<&StreamEvent> = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Error { .. }))
        .collect();
    assert_eq!(
        errors,
        vec![&StreamEvent::Error {
            bot: "creative".into(),
            message: "rate limited".into()
        }]
    );
    for id in ids.iter().filter(|id| *id != "creative") {
        assert_eq!(
            per_bot[id].last(),
            Some(&StreamEvent::Done { bot: id.clone() })
        );
    }
}

#[tokio::test]
async fn test_failed_start_becomes_persona_error() {
    let ids = builtin_ids();
    let client = Arc::new(StubClient::new().fail_start("technical", "connection refused"));

    let events: Vec<StreamEvent> = orchestrator(client.clone(), MultiplexConfig::default())
        .fanout(&FanoutRequest::new("hi"))
        .collect()
        .await;

    let per_bot = check_well_formed(&events, &ids);
    match per_bot["technical"].as_slice() {
        [StreamEvent::Error { message, .. }] => assert!(message.contains("connection refused")),
        other => panic!("unexpected events for technical: {:?}", other),
    }
    assert_eq!(client.streams_started(), ids.len() - 1);
}

#[tokio::test]
async fn test_randomized_interleavings_never_forward_past_terminal() {
    let ids = builtin_ids();

    for round in 0..20 {
        let mut client = StubClient::new().with_jitter(3);
        for (i, id) in ids.iter().enumerate() {
            let events = if (i + round) % 3 == 0 {
                vec![
                    UpstreamEvent::Token("partial".into()),
                    UpstreamEvent::Error("overloaded".into()),
                    UpstreamEvent::Token("late".into()),
                ]
            } else {
                let mut events = tokens_then_done(&["a", "b", "c", "d"]);
                events.push(UpstreamEvent::Token("after done".into()));
                events
            };
            client = client.script(id, events);
        }
        let client = Arc::new(client);

        let events: Vec<StreamEvent> = orchestrator(client.clone(), MultiplexConfig::default())
            .fanout(&FanoutRequest::new("race"))
            .collect()
            .await;

        check_well_formed(&events, &ids);
        assert!(
            !events.iter().any(|e| matches!(
                e,
                StreamEvent::Token { text, .. } if text == "late" || text == "after done"
            )),
            "round {}: token forwarded past a terminal event",
            round
        );
        assert_eq!(client.wait_for_release().await, 0);
    }
}

#[tokio::test]
async fn test_explain_recursion_scenario() {
    let a: EventStream = Box::pin(futures::stream::iter(tokens_then_done(&["Rec", "ursion"])));
    let b: EventStream = Box::pin(futures::stream::iter(vec![UpstreamEvent::Error(
        "rate limited".into(),
    )]));

    let events: Vec<StreamEvent> = Multiplexer::default()
        .multiplex(vec![("A".to_string(), a), ("B".to_string(), b)])
        .collect()
        .await;

    let expected_a = vec![
        StreamEvent::Token {
            bot: "A".into(),
            text: "Rec".into(),
        },
        StreamEvent::Token {
            bot: "A".into(),
            text: "ursion".into(),
        },
        StreamEvent::Done { bot: "A".into() },
    ];
    let expected_b = vec![StreamEvent::Error {
        bot: "B".into(),
        message: "rate limited".into(),
    }];

    let per_bot = check_well_formed(&events, &["A".to_string(), "B".to_string()]);
    assert_eq!(per_bot["A"], expected_a);
    assert_eq!(per_bot["B"], expected_b);
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn test_dropping_combined_stream_releases_connections() {
    let ids = builtin_ids();
    let mut client = StubClient::new();
    for id in &ids {
        client = client.hang(id, vec![UpstreamEvent::Token("thinking".into())]);
    }
    let client = Arc::new(client);

    let mut combined = orchestrator(client.clone(), MultiplexConfig::default())
        .fanout(&FanoutRequest::new("never finishes"));

    let first = combined.next().await;
    assert!(matches!(first, Some(StreamEvent::Token { .. })));
    assert_eq!(client.open_connections(), ids.len());

    drop(combined);
    assert_eq!(client.wait_for_release().await, 0);
}

#[tokio::test]
async fn test_hanging_upstream_times_out() {
    let ids = builtin_ids();
    let client = Arc::new(
        StubClient::new().hang("philosophical", vec![UpstreamEvent::Token("Hmm".into())]),
    );
    let config = MultiplexConfig {
        upstream_timeout: Some(Duration::from_millis(100)),
        ..MultiplexConfig::default()
    };

    let events: Vec<StreamEvent> = orchestrator(client.clone(), config)
        .fanout(&FanoutRequest::new("What is time?"))
        .collect()
        .await;

    let per_bot = check_well_formed(&events, &ids);
    match per_bot["philosophical"].last() {
        Some(StreamEvent::Error { message, .. }) => assert!(message.contains("timed out")),
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert_eq!(client.wait_for_release().await, 0);
}

#[tokio::test]
async fn test_fanout_records_usage() {
    let client = Arc::new(StubClient::new());
    let ledger = Arc::new(UsageLedger::default());
    let orchestrator = FanoutOrchestrator::new(
        client.clone(),
        Arc::new(PersonaRoster::builtin()),
        ledger.clone(),
        MultiplexConfig::default(),
    );

    let _: Vec<StreamEvent> = orchestrator
        .fanout(&FanoutRequest::new("Explain recursion"))
        .collect()
        .await;

    assert!(ledger.tokens_used() > 0);
    assert_eq!(client.user_contents(), vec!["Explain recursion"; 5]);
}

#[tokio::test]
async fn test_synthesis_with_no_answers_makes_no_upstream_call() {
    let client = Arc::new(StubClient::new());
    let synthesizer = Synthesizer::new(
        client.clone(),
        Arc::new(PersonaRoster::builtin()),
        Arc::new(UsageLedger::default()),
    );

    let empty = SynthesisRequest {
        prompt: "Explain recursion".into(),
        answers: HashMap::new(),
    };
    assert!(matches!(
        synthesizer.synthesize(&empty).await,
        Err(PentadError::InvalidInput(_))
    ));

    let blank = SynthesisRequest {
        prompt: "Explain recursion".into(),
        answers: HashMap::from([("logic".to_string(), "   ".to_string())]),
    };
    assert!(synthesizer.synthesize(&blank).await.is_err());
    assert_eq!(client.completions(), 0);
}

#[tokio::test]
async fn test_synthesis_makes_exactly_one_call() {
    let client = Arc::new(StubClient::new().with_completion(Ok("  merged answer \n")));
    let synthesizer = Synthesizer::new(
        client.clone(),
        Arc::new(PersonaRoster::builtin()),
        Arc::new(UsageLedger::default()),
    );

    let request = SynthesisRequest {
        prompt: "Explain recursion".into(),
        answers: HashMap::from([
            ("technical".to_string(), "A function calling itself.".to_string()),
            ("logic".to_string(), "Defined in terms of itself.".to_string()),
        ]),
    };

    let best = synthesizer.synthesize(&request).await.unwrap();
    assert_eq!(best, "merged answer");
    assert_eq!(client.completions(), 1);

    let prompt = &client.user_contents()[0];
    assert!(prompt.contains("Explain recursion"));
    assert!(prompt.contains("A function calling itself."));
    assert!(prompt.contains("Defined in terms of itself."));
}

#[tokio::test]
async fn test_synthesis_upstream_failure_is_reported() {
    let client = Arc::new(StubClient::new().with_completion(Err("provider returned 503")));
    let synthesizer = Synthesizer::new(
        client,
        Arc::new(PersonaRoster::builtin()),
        Arc::new(UsageLedger::default()),
    );

    let request = SynthesisRequest {
        prompt: "q".into(),
        answers: HashMap::from([("logic".to_string(), "a".to_string())]),
    };
    let err = synthesizer.synthesize(&request).await.unwrap_err();
    assert!(err.is_upstream());
}
