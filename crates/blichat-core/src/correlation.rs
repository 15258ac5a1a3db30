//! Correlation Store
//!
//! Remembers which live-stream commenter each relayed messaging-channel
//! message belongs to, so a reply to that message can be addressed back to
//! the commenter. Entries expire after a retention window and the store is
//! capped; both bounds evict oldest insertion first.
//!
//! Shared by both relay directions. Every operation takes the lock briefly
//! and never across an await point.

use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CorrelationConfig;
use crate::outbound::ReplyTarget;
use crate::types::{MessageId, SenderId, Timestamp};

// ----------------------------------------------------------------------------
// Stored Entry
// ----------------------------------------------------------------------------

/// A comment that was relayed to the messaging channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedMessage {
    pub messaging_message_id: MessageId,
    pub sender_id: SenderId,
    pub display_name: String,
    pub relayed_at: Timestamp,
}

#[derive(Debug)]
struct Slot {
    message: RelayedMessage,
    inserted_at: Instant,
    generation: u64,
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub entries: usize,
    pub inserted: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted_for_capacity: u64,
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    slots: HashMap<MessageId, Slot>,
    /// Insertion order; entries whose generation no longer matches the slot are stale
    order: VecDeque<(MessageId, u64)>,
    next_generation: u64,
    stats: CorrelationStats,
}

impl Inner {
    fn is_live(&self, id: &MessageId, generation: u64) -> bool {
        self.slots
            .get(id)
            .map(|slot| slot.generation == generation)
            .unwrap_or(false)
    }

    /// Drop queue entries that no longer point at a live slot
    fn skip_stale_front(&mut self) {
        while let Some(&(id, generation)) = self.order.front() {
            if self.is_live(&id, generation) {
                break;
            }
            self.order.pop_front();
        }
    }

    fn compact_order(&mut self) {
        let slots = &self.slots;
        self.order
            .retain(|(id, generation)| slots.get(id).map(|s| s.generation) == Some(*generation));
    }
}

/// Bounded, time-expiring map from relayed message id to commenter
#[derive(Debug)]
pub struct CorrelationStore {
    retention: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl CorrelationStore {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            retention,
            capacity,
            inner: Mutex::new(Inner {
                slots: HashMap::with_capacity(capacity.min(4096)),
                order: VecDeque::new(),
                next_generation: 0,
                stats: CorrelationStats::default(),
            }),
        }
    }

    pub fn from_config(config: &CorrelationConfig) -> Self {
        Self::new(config.retention(), config.capacity)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remember the commenter behind a relayed message
    ///
    /// Putting an existing id replaces the entry and moves it to the back of
    /// the eviction order.
    pub fn put(&self, id: MessageId, sender_id: SenderId, display_name: impl Into<String>) {
        let message = RelayedMessage {
            messaging_message_id: id,
            sender_id,
            display_name: display_name.into(),
            relayed_at: Timestamp::now(),
        };

        let mut inner = self.inner.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;

        inner.slots.insert(
            id,
            Slot {
                message,
                inserted_at: Instant::now(),
                generation,
            },
        );
        inner.order.push_back((id, generation));
        inner.stats.inserted += 1;

        while inner.slots.len() > self.capacity {
            inner.skip_stale_front();
            match inner.order.pop_front() {
                Some((oldest, _)) => {
                    if let Some(slot) = inner.slots.remove(&oldest) {
                        inner.stats.evicted_for_capacity += 1;
                        debug!(
                            "Evicted correlation {} -> {} (capacity {})",
                            oldest, slot.message.display_name, self.capacity
                        );
                    }
                }
                None => break,
            }
        }

        // Repeated puts of the same ids leave stale order entries behind
        if inner.order.len() > self.capacity.saturating_mul(2) {
            inner.compact_order();
        }
    }

    /// Look up the commenter behind a relayed message
    ///
    /// Unknown and expired ids both return `None`.
    pub fn get(&self, id: MessageId) -> Option<ReplyTarget> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = inner
            .slots
            .get(&id)
            .map(|slot| now.duration_since(slot.inserted_at) >= self.retention);

        match expired {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(true) => {
                inner.slots.remove(&id);
                inner.stats.expired += 1;
                inner.stats.misses += 1;
                return None;
            }
            Some(false) => {}
        }

        inner.stats.hits += 1;
        inner.slots.get(&id).map(|slot| ReplyTarget {
            sender_id: slot.message.sender_id.clone(),
            display_name: slot.message.display_name.clone(),
        })
    }

    /// Full stored entry for an id, if still live
    pub fn entry(&self, id: MessageId) -> Option<RelayedMessage> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .slots
            .get(&id)
            .filter(|slot| now.duration_since(slot.inserted_at) < self.retention)
            .map(|slot| slot.message.clone())
    }

    /// Remove every entry older than the retention window
    ///
    /// Returns the number of entries removed.
    pub fn evict(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut removed = 0;

        loop {
            inner.skip_stale_front();
            let Some(&(id, _)) = inner.order.front() else {
                break;
            };
            let expired = inner
                .slots
                .get(&id)
                .map(|slot| now.duration_since(slot.inserted_at) >= self.retention)
                .unwrap_or(true);
            if !expired {
                break;
            }
            inner.order.pop_front();
            if inner.slots.remove(&id).is_some() {
                removed += 1;
            }
        }

        inner.stats.expired += removed as u64;
        if removed > 0 {
            debug!("Expired {} correlation entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CorrelationStats {
        let inner = self.inner.lock();
        CorrelationStats {
            entries: inner.slots.len(),
            ..inner.stats
        }
    }
}
