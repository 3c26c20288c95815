//! Listener - the live polling loop.
//!
//! One event is fully classified and dispatched before the next one is
//! looked at; the loop sleeps for the poll interval after every read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::classifier::{Classification, Classifier};
use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::channel::traits::EventSource;
use crate::channel::types::RawEvent;

#[cfg(not(test))]
const READ_ERROR_DELAY: Duration = Duration::from_secs(5);
#[cfg(test)]
const READ_ERROR_DELAY: Duration = Duration::from_millis(10);

/// Counters reported when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub events: usize,
    pub discarded: usize,
    pub responded: usize,
    pub offloaded: usize,
    pub failed: usize,
}

pub struct Listener {
    source: Arc<dyn EventSource>,
    classifier: Arc<Classifier>,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
}

impl Listener {
    pub fn new(
        source: Arc<dyn EventSource>,
        classifier: Arc<Classifier>,
        dispatcher: Arc<Dispatcher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            classifier,
            dispatcher,
            poll_interval,
        }
    }

    /// Classify and dispatch one raw event. `None` when it was discarded.
    pub async fn handle_event(&self, raw: RawEvent) -> Option<DispatchOutcome> {
        let interaction = match self.classifier.classify(raw).await {
            Classification::Interaction(interaction) => interaction,
            Classification::Discard(_) => return None,
        };

        match self.dispatcher.handle(interaction).await {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Dispatched event");
                Some(outcome)
            }
            Err(e) => {
                error!("Failed to handle event: {}", e);
                None
            }
        }
    }

    /// Poll until the event source closes or `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> ListenerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = ListenerStats::default();
        info!(poll_interval = ?self.poll_interval, "Listener started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                polled = self.source.poll_events() => polled,
            };
            let delay = match polled {
                Ok(Some(batch)) => {
                    for raw in batch {
                        stats.events += 1;
                        match self.handle_event(raw).await {
                            None => stats.discarded += 1,
                            Some(DispatchOutcome::Responded) => stats.responded += 1,
                            Some(DispatchOutcome::Offloaded { .. }) => stats.offloaded += 1,
                            Some(DispatchOutcome::OffloadFailed) => stats.failed += 1,
                            Some(_) => {}
                        }
                    }
                    self.poll_interval
                }
                Ok(None) => {
                    info!("Event stream closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read events: {:#}", e);
                    READ_ERROR_DELAY
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(delay) => {}
            }
        }

        info!(
            events = stats.events,
            responded = stats.responded,
            offloaded = stats.offloaded,
            "Listener stopped"
        );
        stats
    }
}
