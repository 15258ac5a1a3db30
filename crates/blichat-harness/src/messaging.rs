//! In-memory messaging endpoint

use async_trait::async_trait;
use blichat_core::{
    ChatId, EndpointError, InboundFeed, InboundMessage, MessageId, MessagingEndpoint, UserId,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::faults::FaultPlan;

/// A message the relay posted on the messaging channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub text: String,
}

/// A notice the relay posted for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub chat_id: ChatId,
    pub text: String,
}

/// Messaging channel backed by channels and recorded output
///
/// Message ids are handed out sequentially, shared between messages the relay
/// sends and operator messages built with `operator_says`/`operator_replies`.
pub struct MemoryMessaging {
    inbound_tx: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    operator: UserId,
    chat_id: ChatId,
    next_id: Mutex<i64>,
    sent: Mutex<Vec<SentMessage>>,
    notices: Mutex<Vec<Notice>>,
    faults: Mutex<FaultPlan>,
    latency: Mutex<Option<Duration>>,
    /// One-off delays for the next `send_message` calls, in order
    stalls: Mutex<VecDeque<Duration>>,
    notify: Notify,
}

impl MemoryMessaging {
    /// Channel whose operator is the owner of `chat_id`
    pub fn new(chat_id: ChatId) -> Self {
        Self::with_operator(chat_id, UserId(chat_id.0))
    }

    pub fn with_operator(chat_id: ChatId, operator: UserId) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            operator,
            chat_id,
            next_id: Mutex::new(1),
            sent: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            faults: Mutex::new(FaultPlan::default()),
            latency: Mutex::new(None),
            stalls: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn allocate_id(&self) -> MessageId {
        let mut next = self.next_id.lock();
        let id = MessageId(*next);
        *next += 1;
        id
    }

    /// Operator message that is not a reply
    pub fn operator_says(&self, text: &str) -> InboundMessage {
        InboundMessage {
            message_id: self.allocate_id(),
            chat_id: self.chat_id,
            from_user_id: self.operator,
            text: text.to_string(),
            reply_to_message_id: None,
        }
    }

    /// Operator reply to an earlier message
    pub fn operator_replies(&self, to: MessageId, text: &str) -> InboundMessage {
        InboundMessage {
            reply_to_message_id: Some(to),
            ..self.operator_says(text)
        }
    }

    /// Deliver an operator message to the subscriber
    pub async fn push(&self, message: InboundMessage) -> Result<(), EndpointError> {
        let tx = self.inbound_tx.lock().clone().ok_or(EndpointError::Closed)?;
        tx.send(message).await.map_err(|_| EndpointError::Closed)
    }

    /// End the inbound feed
    pub fn close(&self) {
        self.inbound_tx.lock().take();
    }

    pub fn faults(&self) -> parking_lot::MutexGuard<'_, FaultPlan> {
        self.faults.lock()
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Hold only the next `send_message` call for `delay`
    pub fn stall_next_send(&self, delay: Duration) {
        self.stalls.lock().push_back(delay);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Wait until at least `count` messages were posted
    pub async fn wait_for_messages(&self, count: usize, within: Duration) -> Option<Vec<SentMessage>> {
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

    /// Wait until at least `count` notices were posted
    pub async fn wait_for_notices(&self, count: usize, within: Duration) -> Option<Vec<Notice>> {
        let deadline = Instant::now() + within;
        loop {
            let notified = self.notify.notified();
            {
                let notices = self.notices.lock();
                if notices.len() >= count {
                    return Some(notices.clone());
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

#[async_trait]
impl MessagingEndpoint for MemoryMessaging {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId, EndpointError> {
        let stall = self.stalls.lock().pop_front();
        let latency = stall.or(*self.latency.lock());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.faults.lock().next_failure() {
            return Err(error);
        }

        let message_id = self.allocate_id();
        self.sent.lock().push(SentMessage {
            message_id,
            chat_id,
            text: text.to_string(),
        });
        self.notify.notify_waiters();
        Ok(message_id)
    }

    async fn subscribe_inbound(&self) -> Result<InboundFeed, EndpointError> {
        self.inbound_rx.lock().take().ok_or(EndpointError::Closed)
    }

    async fn send_error_notice(&self, chat_id: ChatId, text: &str) -> Result<(), EndpointError> {
        self.notices.lock().push(Notice {
            chat_id,
            text: text.to_string(),
        });
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_sequential_and_shared() {
        let messaging = MemoryMessaging::new(ChatId(10));
        let first = messaging.send_message(ChatId(10), "A***: hi").await.unwrap();
        let reply = messaging.operator_replies(first, "welcome!");
        let second = messaging.send_message(ChatId(10), "B: yo").await.unwrap();

        assert_eq!(first, MessageId(1));
        assert_eq!(reply.message_id, MessageId(2));
        assert_eq!(reply.reply_to_message_id, Some(MessageId(1)));
        assert_eq!(reply.from_user_id, UserId(10));
        assert_eq!(second, MessageId(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_holds_only_next_send() {
        let messaging = MemoryMessaging::new(ChatId(10));
        messaging.stall_next_send(Duration::from_secs(30));

        let started = Instant::now();
        messaging.send_message(ChatId(10), "slow").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));

        let started = Instant::now();
        messaging.send_message(ChatId(10), "fast").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_notices_recorded() {
        let messaging = MemoryMessaging::new(ChatId(10));
        messaging
            .send_error_notice(ChatId(10), "send failed")
            .await
            .unwrap();
        let notices = messaging
            .wait_for_notices(1, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(notices[0].text, "send failed");
    }
}
