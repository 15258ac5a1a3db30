//! End-to-end relay scenarios over the in-memory endpoints

use blichat_core::{
    ChatId, EndpointError, EventKind, MessageId, RawEvent, RelayConfig, RoomId,
};
use blichat_harness::{MemoryMessaging, MemoryStream};
use blichat_runtime::{RelayBuilder, RelayHandle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ROOM: RoomId = RoomId(21452505);
const CHAT: ChatId = ChatId(10);

struct Relay {
    stream: Arc<MemoryStream>,
    messaging: Arc<MemoryMessaging>,
    handle: RelayHandle,
}

async fn start(config: RelayConfig) -> Relay {
    let stream = Arc::new(MemoryStream::new());
    let messaging = Arc::new(MemoryMessaging::new(CHAT));
    let handle = RelayBuilder::new(config)
        .with_stream(stream.clone())
        .with_messaging(messaging.clone())
        .build_and_start()
        .await
        .expect("relay starts");
    Relay {
        stream,
        messaging,
        handle,
    }
}

fn comment(uid: u64, name: &str, text: &str) -> RawEvent {
    RawEvent::new(
        EventKind::Comment,
        json!({ "uid": uid, "uname": name, "msg": text }),
    )
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

async fn relay_one_comment(relay: &Relay) -> MessageId {
    relay.stream.push(comment(42, "A***", "hi")).await.unwrap();
    let sent = relay
        .messaging
        .wait_for_messages(1, secs(1))
        .await
        .expect("comment relayed");
    sent[0].message_id
}

#[tokio::test(start_paused = true)]
async fn test_comment_relayed_and_reply_attributed() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;

    let m1 = relay_one_comment(&relay).await;
    let sent = relay.messaging.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "A***: hi");
    assert_eq!(sent[0].chat_id, CHAT);

    let target = relay.handle.store().get(m1).expect("correlation recorded");
    assert_eq!(target.display_name, "A***");

    let reply = relay.messaging.operator_replies(m1, "welcome!");
    relay.messaging.push(reply).await.unwrap();

    let comments = relay.stream.wait_for_comments(1, secs(1)).await.unwrap();
    assert_eq!(comments[0].text, "@A***: welcome!");
    assert_eq!(comments[0].room_id, ROOM);

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reply_to_unknown_message_sent_plain() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;

    let reply = relay.messaging.operator_replies(MessageId(9_999), "hi");
    relay.messaging.push(reply).await.unwrap();

    let comments = relay.stream.wait_for_comments(1, secs(1)).await.unwrap();
    assert_eq!(comments[0].text, "hi");
    assert!(relay.messaging.notices().is_empty());

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_retention_sent_plain() {
    let config = RelayConfig::for_testing(ROOM, CHAT);
    let retention = config.correlation.retention();
    let relay = start(config).await;

    let m1 = relay_one_comment(&relay).await;
    tokio::time::sleep(retention + Duration::from_millis(1)).await;

    let reply = relay.messaging.operator_replies(m1, "late");
    relay.messaging.push(reply).await.unwrap();

    let comments = relay.stream.wait_for_comments(1, secs(1)).await.unwrap();
    assert_eq!(comments[0].text, "late");

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_direct_messages_spaced_in_order() {
    let config = RelayConfig::for_testing(ROOM, CHAT);
    let spacing = config.gate.min_send_spacing();
    let relay = start(config).await;

    for i in 0..10 {
        let message = relay.messaging.operator_says(&format!("msg {i}"));
        relay.messaging.push(message).await.unwrap();
    }

    let comments = relay.stream.wait_for_comments(10, secs(5)).await.unwrap();
    let texts: Vec<_> = comments.iter().map(|c| c.text.clone()).collect();
    let expected: Vec<_> = (0..10).map(|i| format!("msg {i}")).collect();
    assert_eq!(texts, expected);
    for pair in comments.windows(2) {
        assert!(pair[1].sent_at - pair[0].sent_at >= spacing);
    }

    let summary = relay.handle.shutdown().await;
    assert_eq!(summary.gate.sent, 10);
    assert!(summary.drained);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_rejects_newest_and_notifies() {
    let mut config = RelayConfig::for_testing(ROOM, CHAT);
    config.gate.queue_capacity = 2;
    let relay = start(config).await;

    for i in 0..5 {
        let message = relay.messaging.operator_says(&format!("msg {i}"));
        relay.messaging.push(message).await.unwrap();
    }

    let notices = relay.messaging.wait_for_notices(3, secs(1)).await.unwrap();
    assert!(notices.iter().all(|n| n.chat_id == CHAT));

    let comments = relay.stream.wait_for_comments(2, secs(1)).await.unwrap();
    tokio::time::sleep(secs(1)).await;
    assert_eq!(relay.stream.sent_texts(), vec!["msg 0", "msg 1"]);
    assert_eq!(comments.len(), 2);
    assert_eq!(relay.handle.gate_stats().rejected_backpressure, 3);

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_reported_to_operator() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;
    relay.stream.faults().fail_next_n(
        3,
        EndpointError::Network {
            reason: "connection reset".into(),
        },
    );

    let message = relay.messaging.operator_says("hello room");
    relay.messaging.push(message).await.unwrap();

    let notices = relay.messaging.wait_for_notices(1, secs(5)).await.unwrap();
    assert!(notices[0].text.contains("3 attempts"));
    assert_eq!(relay.stream.attempt_count(), 3);
    assert!(relay.stream.sent_texts().is_empty());

    // Later messages still go through
    let message = relay.messaging.operator_says("second try");
    relay.messaging.push(message).await.unwrap();
    let comments = relay.stream.wait_for_comments(1, secs(5)).await.unwrap();
    assert_eq!(comments[0].text, "second try");

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retried_transparently() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;
    relay.stream.faults().fail_next(EndpointError::Throttled {
        retry_after: Some(Duration::from_millis(150)),
    });

    let message = relay.messaging.operator_says("eventually");
    relay.messaging.push(message).await.unwrap();

    let comments = relay.stream.wait_for_comments(1, secs(5)).await.unwrap();
    assert_eq!(comments[0].text, "eventually");
    assert_eq!(relay.stream.attempt_count(), 2);
    assert!(relay.messaging.notices().is_empty());

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_system_events_never_relayed() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;

    for kind in [EventKind::RoomEnter, EventKind::Gift, EventKind::Follow] {
        relay
            .stream
            .push(RawEvent::new(kind, json!({ "uid": 7, "uname": "B" })))
            .await
            .unwrap();
    }
    relay.stream.push(comment(42, "A***", "hi")).await.unwrap();

    let sent = relay.messaging.wait_for_messages(1, secs(1)).await.unwrap();
    tokio::time::sleep(secs(1)).await;
    assert_eq!(sent[0].text, "A***: hi");
    assert_eq!(relay.messaging.sent_messages().len(), 1);
    assert_eq!(relay.handle.store().len(), 1);

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_forward_failure_does_not_stop_relay() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;
    relay.messaging.faults().fail_next(EndpointError::Network {
        reason: "bot api down".into(),
    });

    relay.stream.push(comment(1, "first", "lost")).await.unwrap();
    relay.stream.push(comment(2, "second", "kept")).await.unwrap();

    let sent = relay.messaging.wait_for_messages(1, secs(1)).await.unwrap();
    assert_eq!(sent[0].text, "second: kept");
    assert_eq!(relay.handle.store().len(), 1);

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_forward_does_not_hold_later_comments() {
    let mut config = RelayConfig::for_testing(ROOM, CHAT);
    config.messaging_send_timeout_ms = 10_000;
    let relay = start(config).await;
    relay.messaging.stall_next_send(secs(3_600));

    let started = tokio::time::Instant::now();
    for (uid, text) in [(1, "c0"), (2, "c1"), (3, "c2")] {
        relay.stream.push(comment(uid, "A", text)).await.unwrap();
    }

    let sent = relay
        .messaging
        .wait_for_messages(2, secs(1))
        .await
        .expect("independent comments relayed");
    assert!(started.elapsed() < secs(1));
    let texts: Vec<_> = sent.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["A: c1", "A: c2"]);
    assert_eq!(relay.handle.store().len(), 2);

    // The stalled send runs into its own timeout and is counted as failed
    tokio::time::sleep(secs(10)).await;
    let summary = relay.handle.shutdown().await;
    assert_eq!(summary.forward.received, 3);
    assert_eq!(summary.forward.relayed, 2);
    assert_eq!(summary.forward.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_forward_concurrency_is_capped() {
    let mut config = RelayConfig::for_testing(ROOM, CHAT);
    config.max_concurrent_forwards = 1;
    config.messaging_send_timeout_ms = 10_000;
    let relay = start(config).await;
    relay.messaging.stall_next_send(secs(5));

    relay.stream.push(comment(1, "A", "c0")).await.unwrap();
    relay.stream.push(comment(2, "B", "c1")).await.unwrap();

    // With a single slot the second comment waits for the first
    tokio::time::sleep(secs(1)).await;
    assert!(relay.messaging.sent_messages().is_empty());

    let sent = relay.messaging.wait_for_messages(2, secs(10)).await.unwrap();
    let texts: Vec<_> = sent.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["A: c0", "B: c1"]);

    relay.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_queued_sends() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;

    for i in 0..3 {
        let message = relay.messaging.operator_says(&format!("msg {i}"));
        relay.messaging.push(message).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let stream = relay.stream.clone();
    let summary = relay.handle.shutdown().await;
    assert!(summary.drained);
    assert_eq!(summary.reverse.received, 3);
    assert_eq!(stream.sent_texts(), vec!["msg 0", "msg 1", "msg 2"]);
}

#[tokio::test(start_paused = true)]
async fn test_relay_stops_when_feeds_end() {
    let relay = start(RelayConfig::for_testing(ROOM, CHAT)).await;

    relay.stream.push(comment(42, "A***", "hi")).await.unwrap();
    let message = relay.messaging.operator_says("bye");
    relay.messaging.push(message).await.unwrap();
    relay.stream.close();
    relay.messaging.close();

    let summary = relay.handle.wait().await;
    assert_eq!(summary.forward.received, 1);
    assert_eq!(summary.forward.relayed, 1);
    assert_eq!(summary.reverse.relayed, 1);
    assert_eq!(summary.gate.sent, 1);
    assert_eq!(relay.stream.sent_texts(), vec!["bye"]);
}
