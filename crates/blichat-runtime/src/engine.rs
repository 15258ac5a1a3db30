//! Relay Engine
//!
//! Per-event logic of both directions. The engine holds no state of its own
//! between events; everything that outlives a single event lives in the
//! correlation store and the outbound gate.

use blichat_core::{
    normalize, ChatId, CorrelationStore, Discard, EndpointError, InboundMessage, MessageId,
    MessagingEndpoint, OutboundRequest, RawEvent, RelayConfig,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::gate::{GateError, OutboundGate, SendReceipt, SendTicket};

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Result of handling one live-stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Posted to the messaging channel and recorded for replies
    Relayed { message_id: MessageId },
    Discarded(Discard),
    /// The messaging channel did not take the comment
    Failed(EndpointError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyText,
    SlashCommand,
}

/// Result of handling one operator message
#[derive(Debug)]
pub enum ReverseOutcome {
    /// Handed to the outbound gate
    Queued {
        ticket: SendTicket,
        /// Whether the text is addressed to a commenter
        attributed: bool,
    },
    Ignored(IgnoreReason),
    /// Sender is not an operator; a notice was sent
    Unauthorized,
    /// The gate refused the request; a notice was sent
    Refused(GateError),
}

// ----------------------------------------------------------------------------
// Relay Engine
// ----------------------------------------------------------------------------

pub struct RelayEngine {
    config: Arc<RelayConfig>,
    messaging: Arc<dyn MessagingEndpoint>,
    store: Arc<CorrelationStore>,
    gate: Arc<OutboundGate>,
}

impl RelayEngine {
    pub fn new(
        config: Arc<RelayConfig>,
        messaging: Arc<dyn MessagingEndpoint>,
        store: Arc<CorrelationStore>,
        gate: Arc<OutboundGate>,
    ) -> Self {
        Self {
            config,
            messaging,
            store,
            gate,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<OutboundGate> {
        &self.gate
    }

    /// Relay one live-stream event to the messaging channel
    ///
    /// Only comments are relayed; every successful send is recorded in the
    /// correlation store so the operator can reply to it.
    pub async fn forward(&self, raw: &RawEvent) -> ForwardOutcome {
        let comment = match normalize(raw) {
            Ok(comment) => comment,
            Err(discard) => {
                if discard.is_malformed() {
                    warn!("Dropping {} event: {}", raw.kind.as_str(), discard);
                } else {
                    debug!("Ignoring {} event", raw.kind.as_str());
                }
                return ForwardOutcome::Discarded(discard);
            }
        };

        let text = comment.render();
        let timeout = self.config.messaging_send_timeout();
        let sent = tokio::time::timeout(
            timeout,
            self.messaging.send_message(self.config.chat_id, &text),
        )
        .await
        .unwrap_or(Err(EndpointError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }));

        match sent {
            Ok(message_id) => {
                self.store.put(
                    message_id,
                    comment.sender_id.clone(),
                    comment.display_name.clone(),
                );
                debug!(
                    "Relayed comment {} from {} as message {}",
                    comment.source_message_id,
                    comment.sender_id.short(),
                    message_id
                );
                ForwardOutcome::Relayed { message_id }
            }
            Err(err) => {
                warn!(
                    "Failed to relay comment {} to chat {}: {}",
                    comment.source_message_id, self.config.chat_id, err
                );
                ForwardOutcome::Failed(err)
            }
        }
    }

    /// Turn one operator message into a live-room request
    ///
    /// Replies to a relayed comment are addressed to its sender; replies to
    /// anything unknown or expired, and direct messages, go out verbatim.
    pub async fn reverse(&self, message: &InboundMessage) -> ReverseOutcome {
        if !self.config.is_operator(message.from_user_id, message.chat_id) {
            warn!(
                "Rejecting message from unauthorized user {} in chat {}",
                message.from_user_id, message.chat_id
            );
            self.notify(message.chat_id, "You are not authorized to use this relay")
                .await;
            return ReverseOutcome::Unauthorized;
        }

        let text = message.text.as_str();
        if text.trim().is_empty() {
            return ReverseOutcome::Ignored(IgnoreReason::EmptyText);
        }
        if self.config.ignore_slash_commands && text.trim_start().starts_with('/') {
            debug!("Ignoring command message {}", message.message_id);
            return ReverseOutcome::Ignored(IgnoreReason::SlashCommand);
        }

        let target = message.reply_to_message_id.and_then(|id| {
            let target = self.store.get(id);
            if target.is_none() {
                debug!("No relayed comment behind message {}, sending plain", id);
            }
            target
        });
        let attributed = target.is_some();
        let request = match target {
            Some(target) => OutboundRequest::reply(text, target),
            None => OutboundRequest::plain(text),
        };

        match self.gate.submit(request) {
            Ok(ticket) => {
                info!(
                    "Queued operator message {} for room {}{}",
                    message.message_id,
                    self.config.room_id,
                    if attributed { " (reply)" } else { "" }
                );
                ReverseOutcome::Queued { ticket, attributed }
            }
            Err(err) => {
                warn!("Outbound gate refused message {}: {}", message.message_id, err);
                self.notify(message.chat_id, &refusal_notice(&err)).await;
                ReverseOutcome::Refused(err)
            }
        }
    }

    /// Tell the operator how a queued request ended
    ///
    /// Failures always produce a notice; successes only when delivery
    /// confirmation is enabled.
    pub async fn report(&self, chat_id: ChatId, outcome: &Result<SendReceipt, GateError>) {
        match outcome {
            Ok(receipt) => {
                if self.config.confirm_delivery {
                    self.notify(chat_id, &format!("Sent to live room: {}", receipt.text))
                        .await;
                }
            }
            Err(err) => {
                error!("Operator message was not delivered: {}", err);
                self.notify(chat_id, &refusal_notice(err)).await;
            }
        }
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        let timeout = self.config.messaging_send_timeout();
        match tokio::time::timeout(timeout, self.messaging.send_error_notice(chat_id, text)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Failed to notify chat {}: {}", chat_id, err),
            Err(_) => warn!("Notice to chat {} timed out", chat_id),
        }
    }
}

fn refusal_notice(err: &GateError) -> String {
    match err {
        GateError::Backpressure { .. } => {
            "Live room is busy, message dropped. Try again shortly.".to_string()
        }
        GateError::PermanentSendFailure { attempts, .. } => {
            format!("Failed to send to live room after {attempts} attempts")
        }
        GateError::Rejected { error } => format!("Live room rejected the message: {error}"),
        GateError::Closed => "Relay is shutting down, message dropped".to_string(),
    }
}
