//! Stream multiplexer
//!
//! Each persona's upstream stream is drained by its own pump task into a
//! shared bounded queue, so a slow persona never holds up a fast one. The
//! session on the receiving side tracks which personas are still open and
//! emits `AllDone` once every one of them has reached a terminal event.
//!
//! Dropping the combined stream is the single teardown point: it cancels every
//! pump, which drops the upstream streams and their connections.

use futures::FutureExt;
use futures::stream::{Stream, StreamExt};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::StreamEvent;
use crate::llm::{EventStream, UpstreamEvent};

/// Default per-persona upstream timeout (60 seconds)
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Combined, persona-tagged event stream ending in `AllDone`
pub type CombinedStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;

#[derive(Debug, Clone)]
pub struct MultiplexConfig {
    /// Bound on each persona stream's lifetime; `None` waits forever
    pub upstream_timeout: Option<Duration>,
    /// Capacity of the fan-in queue
    pub queue_capacity: usize,
}

impl Default for MultiplexConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Some(DEFAULT_UPSTREAM_TIMEOUT),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Multiplexer {
    config: MultiplexConfig,
}

impl Multiplexer {
    pub fn new(config: MultiplexConfig) -> Self {
        Self { config }
    }

    /// Merge per-persona sources into one stream.
    ///
    /// Every pump is spawned before this returns, so all upstream requests are
    /// in flight before the caller awaits the first event. Must be called from
    /// within a tokio runtime. Duplicate persona ids keep the first source.
    pub fn multiplex<I>(&self, sources: I) -> CombinedStream
    where
        I: IntoIterator<Item = (String, EventStream)>,
    {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let mut pumps = JoinSet::new();
        let mut active = HashSet::new();

        for (persona_id, source) in sources {
            if !active.insert(persona_id.clone()) {
                warn!(persona = %persona_id, "duplicate persona source ignored");
                continue;
            }
            pumps.spawn(pump(
                persona_id,
                source,
                tx.clone(),
                cancel.child_token(),
                self.config.upstream_timeout,
            ));
        }
        // Only pumps hold senders now; the queue closes when the last one exits
        drop(tx);

        info!(personas = active.len(), "multiplex session started");

        let session = MultiplexSession {
            active,
            pumps,
            _teardown: cancel.drop_guard(),
            started: Instant::now(),
        };
        Box::pin(session.run(rx))
    }
}

/// Runtime state of one fan-out. Owned by exactly one combined stream.
struct MultiplexSession {
    /// Persona ids that have not yet emitted a terminal event
    active: HashSet<String>,
    /// Aborted on drop
    pumps: JoinSet<()>,
    /// Cancels every pump on drop
    _teardown: DropGuard,
    started: Instant,
}

impl MultiplexSession {
    fn run(
        mut self,
        mut rx: mpsc::Receiver<StreamEvent>,
    ) -> impl Stream<Item = StreamEvent> + Send {
        async_stream::stream! {
            // The guard must live inside the stream; pumps are cancelled when it drops
            let _teardown = self._teardown;

            while !self.active.is_empty() {
                match rx.recv().await {
                    Some(event) => {
                        let Some(bot) = event.bot() else { continue };
                        if !self.active.contains(bot) {
                            // Already terminal; never forward past that point
                            continue;
                        }
                        if let Some(bot) = event.terminal_bot() {
                            self.active.remove(bot);
                        }
                        yield event;
                    }
                    None => {
                        // Every pump has exited; close out anyone still open
                        let mut orphaned: Vec<String> = self.active.drain().collect();
                        orphaned.sort();
                        for bot in orphaned {
                            warn!(persona = %bot, "pump exited without a terminal event");
                            yield StreamEvent::Error {
                                bot,
                                message: "upstream task ended without a terminal event".to_string(),
                            };
                        }
                    }
                }
            }

            debug!(
                duration_ms = self.started.elapsed().as_millis() as u64,
                leftover_pumps = self.pumps.len(),
                "multiplex session complete"
            );
            yield StreamEvent::AllDone;
        }
    }
}

/// Drain one upstream source into the fan-in queue.
///
/// Stops at the first terminal event, on timeout, on cancellation, or when the
/// consumer is gone. Returning drops `source`, releasing its connection.
async fn pump(
    persona_id: String,
    mut source: EventStream,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut tokens = 0usize;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(persona = %persona_id, tokens, "pump cancelled");
                return;
            }
            _ = &mut deadline => {
                let limit = timeout.unwrap_or_default();
                warn!(persona = %persona_id, timeout = ?limit, "upstream timed out");
                UpstreamEvent::Error(format!("upstream timed out after {:?}", limit))
            }
            next = AssertUnwindSafe(source.next()).catch_unwind() => match next {
                Ok(Some(event)) => event,
                Ok(None) => UpstreamEvent::Error("stream ended unexpectedly".to_string()),
                Err(_) => {
                    warn!(persona = %persona_id, "upstream stream panicked");
                    UpstreamEvent::Error("upstream task failed".to_string())
                }
            },
        };

        let terminal = event.is_terminal();
        if matches!(event, UpstreamEvent::Token(_)) {
            tokens += 1;
        }

        if tx.send(StreamEvent::from_upstream(&persona_id, event)).await.is_err() {
            debug!(persona = %persona_id, "consumer gone, stopping pump");
            return;
        }

        if terminal {
            debug!(persona = %persona_id, tokens, "persona stream finished");
            return;
        }
    }
}
