//! In-memory live-stream endpoint

use async_trait::async_trait;
use blichat_core::{EndpointError, EventFeed, RawEvent, RoomId, StreamEndpoint};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::faults::FaultPlan;

/// A comment the relay posted into the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentComment {
    pub room_id: RoomId,
    pub text: String,
    pub sent_at: Instant,
}

/// Live room backed by channels and a vector of sent comments
pub struct MemoryStream {
    event_tx: Mutex<Option<mpsc::Sender<RawEvent>>>,
    event_rx: Mutex<Option<mpsc::Receiver<RawEvent>>>,
    sent: Mutex<Vec<SentComment>>,
    attempts: Mutex<u64>,
    faults: Mutex<FaultPlan>,
    latency: Mutex<Option<Duration>>,
    notify: Notify,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::with_buffer(1024)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            event_tx: Mutex::new(Some(tx)),
            event_rx: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
            faults: Mutex::new(FaultPlan::default()),
            latency: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Deliver an event to the subscriber
    pub async fn push(&self, event: RawEvent) -> Result<(), EndpointError> {
        let tx = self.event_tx.lock().clone().ok_or(EndpointError::Closed)?;
        tx.send(event).await.map_err(|_| EndpointError::Closed)
    }

    /// End the event feed
    pub fn close(&self) {
        self.event_tx.lock().take();
    }

    pub fn faults(&self) -> parking_lot::MutexGuard<'_, FaultPlan> {
        self.faults.lock()
    }

    /// Delay every `send_comment` call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn sent_comments(&self) -> Vec<SentComment> {
        self.sent.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|c| c.text.clone()).collect()
    }

    /// Calls to `send_comment`, failed ones included
    pub fn attempt_count(&self) -> u64 {
        *self.attempts.lock()
    }

    /// Wait until at least `count` comments were posted
    pub async fn wait_for_comments(&self, count: usize, within: Duration) -> Option<Vec<SentComment>> {
        let deadline = Instant::now() + within;
        loop {
            let notified = self.notify.notified();
            {
                let sent = self.sent.lock();
                if sent.len() >= count {
                    return Some(sent.clone());
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamEndpoint for MemoryStream {
    async fn subscribe(&self, room_id: RoomId) -> Result<EventFeed, EndpointError> {
        debug!("Memory stream subscribed to room {}", room_id);
        self.event_rx.lock().take().ok_or(EndpointError::Closed)
    }

    async fn send_comment(&self, room_id: RoomId, text: &str) -> Result<(), EndpointError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        *self.attempts.lock() += 1;
        if let Some(error) = self.faults.lock().next_failure() {
            return Err(error);
        }

        self.sent.lock().push(SentComment {
            room_id,
            text: text.to_string(),
            sent_at: Instant::now(),
        });
        self.notify.notify_waiters();
        Ok(())
    }
}
