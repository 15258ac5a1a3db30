//! Outbound Gate for the live room
//!
//! The only path for text headed into the live room. A single worker task
//! owns the sending side: requests are queued FIFO in a bounded channel,
//! released no faster than the configured spacing, and retried on transient
//! failures. Callers get a `SendTicket` back immediately and may await it or
//! drop it.

use blichat_core::{
    EndpointError, GateConfig, OutboundRequest, RetryPolicy, RoomId, StreamEndpoint,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::retry::{GiveUpReason, RetryDecision, RetryState};

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The queue is full; the newest request is turned away
    #[error("Outbound queue full ({capacity} pending)")]
    Backpressure { capacity: usize },
    #[error("Send failed after {attempts} attempts: {last_error}")]
    PermanentSendFailure {
        attempts: u32,
        last_error: EndpointError,
    },
    /// The live room refused the text; retrying would not help
    #[error("Rejected by live room: {error}")]
    Rejected { error: EndpointError },
    #[error("Outbound gate closed")]
    Closed,
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

/// Rate-limiting state of the live room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    /// When the last attempt to the live room finished
    pub last_send_at: Option<Instant>,
    /// Requests accepted but not yet picked up by the worker
    pub queue_depth: usize,
}

/// Gate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStatistics {
    pub submitted: u64,
    pub sent: u64,
    pub failed: u64,
    pub rejected_backpressure: u64,
    pub retries: u64,
}

/// A completed live-room send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Text as posted, attribution included
    pub text: String,
    pub attempts: u32,
    pub sent_at: Instant,
}

/// Pending outcome of a submitted request
#[derive(Debug)]
pub struct SendTicket {
    receiver: oneshot::Receiver<Result<SendReceipt, GateError>>,
}

impl SendTicket {
    /// Wait for the request to be sent or fail
    ///
    /// Resolves to `GateError::Closed` when the gate stops before the request
    /// was handled.
    pub async fn outcome(self) -> Result<SendReceipt, GateError> {
        self.receiver.await.unwrap_or(Err(GateError::Closed))
    }
}

// ----------------------------------------------------------------------------
// Outbound Gate
// ----------------------------------------------------------------------------

struct GateJob {
    request: OutboundRequest,
    reply: oneshot::Sender<Result<SendReceipt, GateError>>,
}

#[derive(Default)]
struct GateShared {
    rate: Mutex<RateState>,
    stats: Mutex<GateStatistics>,
}

pub struct OutboundGate {
    room_id: RoomId,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<GateJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<GateShared>,
}

impl OutboundGate {
    /// Start the gate worker for a room
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        stream: Arc<dyn StreamEndpoint>,
        room_id: RoomId,
        config: &GateConfig,
        retry: RetryPolicy,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let shared = Arc::new(GateShared::default());

        let worker = GateWorker {
            stream,
            room_id,
            spacing: config.min_send_spacing(),
            retry,
            shared: Arc::clone(&shared),
        };
        let handle = tokio::spawn(worker.run(receiver));

        debug!(
            "Outbound gate for room {} started (spacing {:?}, capacity {})",
            room_id,
            config.min_send_spacing(),
            capacity
        );

        Self {
            room_id,
            capacity,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            shared,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a request without waiting for it to be sent
    pub fn submit(&self, request: OutboundRequest) -> Result<SendTicket, GateError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(GateError::Closed)?;

        let (reply, receiver) = oneshot::channel();
        self.shared.rate.lock().queue_depth += 1;

        match sender.try_send(GateJob { request, reply }) {
            Ok(()) => {
                self.shared.stats.lock().submitted += 1;
                Ok(SendTicket { receiver })
            }
            Err(err) => {
                {
                    let mut rate = self.shared.rate.lock();
                    rate.queue_depth = rate.queue_depth.saturating_sub(1);
                }
                match err {
                    mpsc::error::TrySendError::Full(job) => {
                        self.shared.stats.lock().rejected_backpressure += 1;
                        warn!(
                            "Outbound queue full, rejecting {:?}",
                            job.request.render()
                        );
                        Err(GateError::Backpressure {
                            capacity: self.capacity,
                        })
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(GateError::Closed),
                }
            }
        }
    }

    /// Queue a request and wait until it is sent or fails
    pub async fn send(&self, request: OutboundRequest) -> Result<SendReceipt, GateError> {
        self.submit(request)?.outcome().await
    }

    pub fn stats(&self) -> GateStatistics {
        *self.shared.stats.lock()
    }

    pub fn rate_state(&self) -> RateState {
        *self.shared.rate.lock()
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stop accepting requests and drain the queue
    ///
    /// Queued requests keep their spacing. Whatever is still pending when
    /// `grace` runs out is dropped and its ticket resolves to
    /// `GateError::Closed`. Returns whether the queue drained in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.sender.lock().take();
        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            return true;
        };

        let pending = self.shared.rate.lock().queue_depth;
        info!(
            "Draining outbound gate for room {} ({} queued, grace {:?})",
            self.room_id, pending, grace
        );

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {
                debug!("Outbound gate drained");
                true
            }
            Err(_) => {
                handle.abort();
                let abandoned = self.shared.rate.lock().queue_depth;
                warn!(
                    "Outbound gate did not drain within {:?}, abandoning {} queued requests",
                    grace, abandoned
                );
                false
            }
        }
    }
}

impl Drop for OutboundGate {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

struct GateWorker {
    stream: Arc<dyn StreamEndpoint>,
    room_id: RoomId,
    spacing: Duration,
    retry: RetryPolicy,
    shared: Arc<GateShared>,
}

impl GateWorker {
    async fn run(self, mut receiver: mpsc::Receiver<GateJob>) {
        while let Some(job) = receiver.recv().await {
            {
                let mut rate = self.shared.rate.lock();
                rate.queue_depth = rate.queue_depth.saturating_sub(1);
            }

            let waited = job.request.enqueued_at.elapsed();
            let result = self.deliver(&job.request).await;

            {
                let mut stats = self.shared.stats.lock();
                match &result {
                    Ok(_) => stats.sent += 1,
                    Err(_) => stats.failed += 1,
                }
            }
            match &result {
                Ok(receipt) => debug!(
                    "Sent to room {} after {:?} ({} attempts): {}",
                    self.room_id, waited, receipt.attempts, receipt.text
                ),
                Err(err) => error!("Live room send failed: {}", err),
            }

            // The submitter may have dropped its ticket
            let _ = job.reply.send(result);
        }
        debug!("Outbound gate worker for room {} stopped", self.room_id);
    }

    async fn deliver(&self, request: &OutboundRequest) -> Result<SendReceipt, GateError> {
        let text = request.render();
        let mut state = RetryState::new(self.retry.clone());

        loop {
            self.wait_for_slot().await;
            let result = self.stream.send_comment(self.room_id, &text).await;
            let finished_at = Instant::now();
            self.shared.rate.lock().last_send_at = Some(finished_at);

            let error = match result {
                Ok(()) => {
                    return Ok(SendReceipt {
                        attempts: state.record_success(),
                        sent_at: finished_at,
                        text,
                    })
                }
                Err(error) => error,
            };

            match state.record_failure(&error) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(
                        "Attempt {} to room {} failed ({}), retrying in {:?}",
                        attempt, self.room_id, error, delay
                    );
                    self.shared.stats.lock().retries += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp {
                    attempts,
                    reason: GiveUpReason::Exhausted,
                } => {
                    return Err(GateError::PermanentSendFailure {
                        attempts,
                        last_error: error,
                    })
                }
                RetryDecision::GiveUp {
                    reason: GiveUpReason::NotRetryable,
                    ..
                } => return Err(GateError::Rejected { error }),
            }
        }
    }

    /// Sleep until the spacing since the last attempt has passed
    async fn wait_for_slot(&self) {
        let last = self.shared.rate.lock().last_send_at;
        if let Some(last) = last {
            tokio::time::sleep_until(last + self.spacing).await;
        }
    }
}
