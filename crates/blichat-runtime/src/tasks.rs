//! Long-running relay tasks
//!
//! - `StreamIngressTask`: live-stream events into the messaging channel
//! - `OperatorIngressTask`: operator messages into the outbound gate, plus
//!   reporting how each queued request ended
//! - `EvictionTask`: periodic correlation store sweep
//! - `HealthTask`: periodic status log line
//!
//! Every task stops when the shutdown signal flips to `true`. The two ingress
//! tasks also stop when their feed ends.

use blichat_core::{EventFeed, InboundFeed, InboundMessage, RawEvent};
use std::sync::Arc;
use tokio::{
    sync::{watch, Semaphore},
    task::{JoinError, JoinSet},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::engine::{ForwardOutcome, RelayEngine, ReverseOutcome};

/// Receiving side of the shutdown signal
pub type ShutdownSignal = watch::Receiver<bool>;

/// Resolves once shutdown was requested or the signal's sender is gone
async fn shutdown_requested(signal: &mut ShutdownSignal) {
    let _ = signal.wait_for(|stop| *stop).await;
}

// ----------------------------------------------------------------------------
// Task Identity
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    StreamIngress,
    OperatorIngress,
    Eviction,
    Health,
}

impl TaskId {
    pub fn name(&self) -> &'static str {
        match self {
            TaskId::StreamIngress => "stream-ingress",
            TaskId::OperatorIngress => "operator-ingress",
            TaskId::Eviction => "eviction",
            TaskId::Health => "health",
        }
    }
}

/// Counters reported by an ingress task when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressSummary {
    pub received: u64,
    pub relayed: u64,
    pub discarded: u64,
    pub failed: u64,
}

// ----------------------------------------------------------------------------
// Stream Ingress Task
// ----------------------------------------------------------------------------

/// Reads live-stream events in arrival order and relays them concurrently
///
/// Each event is forwarded in its own task so a slow messaging send only
/// holds up its own comment. At most `max_concurrent_forwards` sends are in
/// flight; beyond that, reading the feed waits for a free slot.
pub struct StreamIngressTask {
    engine: Arc<RelayEngine>,
    feed: EventFeed,
    shutdown: ShutdownSignal,
    slots: Arc<Semaphore>,
    in_flight: JoinSet<ForwardOutcome>,
    summary: IngressSummary,
}

impl StreamIngressTask {
    pub fn new(engine: Arc<RelayEngine>, feed: EventFeed, shutdown: ShutdownSignal) -> Self {
        let slots = Arc::new(Semaphore::new(engine.config().max_concurrent_forwards.max(1)));
        Self {
            engine,
            feed,
            shutdown,
            slots,
            in_flight: JoinSet::new(),
            summary: IngressSummary::default(),
        }
    }

    pub async fn run(mut self) -> IngressSummary {
        info!("Stream ingress task starting");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!("Stream ingress task received shutdown");
                    break;
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.record(joined);
                }
                event = self.feed.recv() => {
                    let Some(event) = event else {
                        info!("Live-stream feed closed");
                        break;
                    };
                    self.summary.received += 1;
                    self.spawn_forward(event).await;
                }
            }
        }

        if !self.in_flight.is_empty() {
            debug!("Waiting for {} relayed comments in flight", self.in_flight.len());
        }
        while let Some(joined) = self.in_flight.join_next().await {
            self.record(joined);
        }

        info!(
            "Stream ingress task stopped ({} received, {} relayed)",
            self.summary.received, self.summary.relayed
        );
        self.summary
    }

    async fn spawn_forward(&mut self, event: RawEvent) {
        let permit = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!("Dropping {} event received during shutdown", event.kind);
            self.summary.failed += 1;
            return;
        };
        let engine = Arc::clone(&self.engine);
        self.in_flight.spawn(async move {
            let _permit = permit;
            engine.forward(&event).await
        });
    }

    fn record(&mut self, joined: Result<ForwardOutcome, JoinError>) {
        match joined {
            Ok(ForwardOutcome::Relayed { .. }) => self.summary.relayed += 1,
            Ok(ForwardOutcome::Discarded(_)) => self.summary.discarded += 1,
            Ok(ForwardOutcome::Failed(_)) => self.summary.failed += 1,
            Err(e) => {
                error!("Forward task failed: {}", e);
                self.summary.failed += 1;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Operator Ingress Task
// ----------------------------------------------------------------------------

/// Hands operator messages to the gate without waiting for the live room
///
/// Each queued request gets a small reporting task that awaits its ticket.
/// On shutdown the task stops reading input, then waits for those reports,
/// which resolve once the gate drains or is abandoned.
pub struct OperatorIngressTask {
    engine: Arc<RelayEngine>,
    feed: InboundFeed,
    shutdown: ShutdownSignal,
    pending: JoinSet<()>,
    summary: IngressSummary,
}

impl OperatorIngressTask {
    pub fn new(engine: Arc<RelayEngine>, feed: InboundFeed, shutdown: ShutdownSignal) -> Self {
        Self {
            engine,
            feed,
            shutdown,
            pending: JoinSet::new(),
            summary: IngressSummary::default(),
        }
    }

    pub async fn run(mut self) -> IngressSummary {
        info!("Operator ingress task starting");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!("Operator ingress task received shutdown");
                    break;
                }
                Some(joined) = self.pending.join_next(), if !self.pending.is_empty() => {
                    if let Err(e) = joined {
                        error!("Delivery report task failed: {}", e);
                    }
                }
                message = self.feed.recv() => {
                    let Some(message) = message else {
                        info!("Operator feed closed");
                        break;
                    };
                    self.handle(message).await;
                }
            }
        }

        while let Some(joined) = self.pending.join_next().await {
            if let Err(e) = joined {
                error!("Delivery report task failed: {}", e);
            }
        }

        info!(
            "Operator ingress task stopped ({} received, {} queued)",
            self.summary.received, self.summary.relayed
        );
        self.summary
    }

    async fn handle(&mut self, message: InboundMessage) {
        self.summary.received += 1;
        match self.engine.reverse(&message).await {
            ReverseOutcome::Queued { ticket, .. } => {
                self.summary.relayed += 1;
                let engine = Arc::clone(&self.engine);
                let chat_id = message.chat_id;
                self.pending.spawn(async move {
                    let outcome = ticket.outcome().await;
                    engine.report(chat_id, &outcome).await;
                });
            }
            ReverseOutcome::Ignored(_) | ReverseOutcome::Unauthorized => {
                self.summary.discarded += 1;
            }
            ReverseOutcome::Refused(_) => self.summary.failed += 1,
        }
    }
}

// ----------------------------------------------------------------------------
// Eviction Task
// ----------------------------------------------------------------------------

/// Sweeps expired correlation entries on a fixed interval
pub struct EvictionTask {
    engine: Arc<RelayEngine>,
    every: Duration,
    shutdown: ShutdownSignal,
}

impl EvictionTask {
    pub fn new(engine: Arc<RelayEngine>, every: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            engine,
            every,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                _ = ticker.tick() => {
                    let removed = self.engine.store().evict();
                    if removed > 0 {
                        debug!("Evicted {} expired correlation entries", removed);
                    }
                }
            }
        }
        debug!("Eviction task stopped");
    }
}

// ----------------------------------------------------------------------------
// Health Task
// ----------------------------------------------------------------------------

/// Logs store size and gate counters on a fixed interval
pub struct HealthTask {
    engine: Arc<RelayEngine>,
    every: Duration,
    shutdown: ShutdownSignal,
}

impl HealthTask {
    pub fn new(engine: Arc<RelayEngine>, every: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            engine,
            every,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                _ = ticker.tick() => {
                    let store = self.engine.store().stats();
                    let gate = self.engine.gate().stats();
                    let rate = self.engine.gate().rate_state();
                    info!(
                        "Relay status: {} correlations ({} hits, {} misses), gate sent {} failed {} retried {} backpressured {}, {} queued",
                        store.entries,
                        store.hits,
                        store.misses,
                        gate.sent,
                        gate.failed,
                        gate.retries,
                        gate.rejected_backpressure,
                        rate.queue_depth
                    );
                }
            }
        }
        debug!("Health task stopped");
    }
}
