//! Tests for correlation store bounds and cleanup
//!
//! These tests drive the store the way the relay does: normalize a raw event,
//! record the comment under the id the messaging channel handed out, then
//! answer replies until the entry ages out or is pushed out by newer ones.

use std::time::Duration;

use blichat_core::*;
use serde_json::json;

fn raw(kind: EventKind, uid: u64, name: &str, text: &str) -> RawEvent {
    RawEvent::new(kind, json!({ "uid": uid, "uname": name, "msg": text }))
}

/// Normalize and record under `id`, as the forward path does after a send
fn relay(store: &CorrelationStore, id: i64, event: &RawEvent) -> bool {
    match normalize(event) {
        Ok(comment) => {
            store.put(MessageId(id), comment.sender_id, comment.display_name);
            true
        }
        Err(_) => false,
    }
}

// ----------------------------------------------------------------------------
// Forward Path Recording
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_only_comments_are_recorded() {
    let store = CorrelationStore::from_config(&CorrelationConfig::default());

    let events = [
        raw(EventKind::Comment, 1, "A***", "hi"),
        raw(EventKind::RoomEnter, 2, "B***", ""),
        raw(EventKind::Gift, 3, "C***", ""),
        raw(EventKind::SuperChat, 4, "D***", "thanks"),
        raw(EventKind::Other("DANMU_AGGREGATION".into()), 5, "E***", "x"),
    ];
    let recorded = events
        .iter()
        .enumerate()
        .filter(|(i, event)| relay(&store, *i as i64 + 1, event))
        .count();

    assert_eq!(recorded, 2);
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(MessageId(1)).unwrap().display_name, "A***");
    assert_eq!(store.get(MessageId(2)), None);
    assert_eq!(store.get(MessageId(4)).unwrap().display_name, "D***");
}

// ----------------------------------------------------------------------------
// Bounds
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_busy_room_stays_within_capacity() {
    let config = CorrelationConfig {
        capacity: 50,
        ..CorrelationConfig::default()
    };
    let store = CorrelationStore::from_config(&config);

    for i in 0..1_000 {
        relay(&store, i, &raw(EventKind::Comment, i as u64 + 1, "viewer", "spam"));
    }

    assert_eq!(store.len(), 50);
    assert_eq!(store.get(MessageId(949)), None);
    assert!(store.get(MessageId(950)).is_some());
    assert!(store.get(MessageId(999)).is_some());
    assert_eq!(store.stats().evicted_for_capacity, 950);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_follows_insertion_age() {
    let config = CorrelationConfig {
        retention_secs: 30,
        ..CorrelationConfig::default()
    };
    let store = CorrelationStore::from_config(&config);

    for i in 0..6 {
        relay(&store, i, &raw(EventKind::Comment, 7, "A***", "tick"));
        tokio::time::advance(Duration::from_secs(10)).await;
    }

    // Inserted at 0, 10, ..., 50; now is 60
    assert_eq!(store.evict(), 4);
    assert_eq!(store.len(), 2);
    assert!(store.get(MessageId(4)).is_some());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(store.evict(), 2);
    assert!(store.is_empty());
    assert_eq!(store.stats().expired, 6);
}

#[tokio::test(start_paused = true)]
async fn test_clear_forgets_everything() {
    let store = CorrelationStore::new(Duration::from_secs(60), 10);
    relay(&store, 1, &raw(EventKind::Comment, 1, "A***", "hi"));
    relay(&store, 2, &raw(EventKind::Comment, 2, "B***", "yo"));

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.get(MessageId(1)), None);
    assert_eq!(store.evict(), 0);
}
