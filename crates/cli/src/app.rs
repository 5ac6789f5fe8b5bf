//! The ingest loop.

use std::future::Future;

use aggregator::AggregationEngine;
use anyhow::{Context, Result};
use events::EventSource;
use tracing::{info, warn};

/// Why the ingest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// The source reached end of input.
    EndOfInput,
    /// The shutdown future completed.
    Shutdown,
}

/// Feeds events from `source` into `engine` until the input ends or
/// `shutdown` completes.
///
/// Malformed input is logged and skipped. An unrecoverable read error ends
/// the loop with an error.
pub async fn pump<S, F>(engine: &AggregationEngine, source: &mut S, shutdown: F) -> Result<Stopped>
where
    S: EventSource + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ingested: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(ingested, "shutdown requested");
                return Ok(Stopped::Shutdown);
            }
            next = source.next_event() => match next {
                Ok(Some(event)) => {
                    engine.ingest(event).await;
                    ingested += 1;
                }
                Ok(None) => {
                    info!(ingested, "event stream ended");
                    return Ok(Stopped::EndOfInput);
                }
                Err(error) if error.is_recoverable() => {
                    warn!(%error, "skipping malformed event");
                }
                Err(error) => return Err(error).context("event source failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use aggregator::{AggregatorConfig, Collaborators};
    use async_trait::async_trait;
    use events::{
        Actor, AggregationKey, ChangeEvent, DeliveryError, EventKind, EventSourceError,
        MarkdownDigestRenderer, NotificationSender, Recipient,
    };
    use listener::JsonLinesEventSource;
    use staging::InMemoryStagingStore;

    use super::*;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, Vec<Recipient>)>>,
    }

    #[async_trait]
    impl NotificationSender for Recording {
        async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((body.to_string(), recipients.to_vec()));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl EventSource for Broken {
        async fn next_event(&mut self) -> Result<Option<ChangeEvent>, EventSourceError> {
            Err(EventSourceError::Read {
                message: "stream reset".into(),
            })
        }
    }

    fn engine(sender: Arc<Recording>) -> AggregationEngine {
        AggregationEngine::new(
            AggregatorConfig::default(),
            Collaborators {
                store: Arc::new(InMemoryStagingStore::new()),
                sender,
                renderer: Arc::new(MarkdownDigestRenderer::new(None)),
                audit: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ingests_until_end_of_input_then_flushes_on_shutdown() {
        let sender = Arc::new(Recording::default());
        let engine = engine(Arc::clone(&sender));
        let mut source = JsonLinesEventSource::new(
            concat!(
                r#"{"subject":"T-1","actor":"alice","summary":"a","transition":{"kind":"created"},"recipients":["+1555"]}"#,
                "\n{broken\n",
                r#"{"subject":"T-2","actor":"alice","summary":"b","transition":{"kind":"created"}}"#,
                "\n",
            )
            .as_bytes(),
        );

        let stopped = pump(&engine, &mut source, std::future::pending())
            .await
            .unwrap();
        assert_eq!(stopped, Stopped::EndOfInput);

        let key = AggregationKey::new(EventKind::Created, Actor::new("alice").unwrap());
        assert_eq!(engine.pending_keys(), vec![key]);
        assert!(sender.sent.lock().unwrap().is_empty());

        assert_eq!(engine.flush_pending().await, 1);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("T-1 a"));
        assert!(sent[0].0.contains("T-2 b"));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let engine = engine(Arc::new(Recording::default()));
        let (tx, rx) = tokio::io::duplex(64);
        let mut source = JsonLinesEventSource::new(tokio::io::BufReader::new(rx));

        let stopped = pump(&engine, &mut source, async {}).await.unwrap();
        assert_eq!(stopped, Stopped::Shutdown);
        drop(tx);
    }

    #[tokio::test]
    async fn read_errors_end_the_loop() {
        let engine = engine(Arc::new(Recording::default()));
        let err = pump(&engine, &mut Broken, std::future::pending())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("stream reset"));
    }
}
