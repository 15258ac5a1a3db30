//! Endpoint abstraction
//!
//! The relay talks to the outside world through two collaborators: the live
//! stream (events in, comments out) and the messaging channel (relayed
//! comments out, operator messages in). Authentication, sessions and cookie
//! refresh belong to the implementations, not to the relay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::EndpointError;
use crate::event::RawEvent;
use crate::types::{ChatId, MessageId, RoomId, UserId};

/// Feed of raw live-stream events; ends when the subscription closes
pub type EventFeed = mpsc::Receiver<RawEvent>;

/// Feed of operator messages; ends when the subscription closes
pub type InboundFeed = mpsc::Receiver<InboundMessage>;

// ----------------------------------------------------------------------------
// Messaging Channel Input
// ----------------------------------------------------------------------------

/// Message received on the messaging channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub from_user_id: UserId,
    pub text: String,
    /// Message this one replies to, if it is a reply
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
}

impl InboundMessage {
    pub fn is_reply(&self) -> bool {
        self.reply_to_message_id.is_some()
    }
}

// ----------------------------------------------------------------------------
// Endpoint Traits
// ----------------------------------------------------------------------------

/// Live-stream side of the relay
#[async_trait]
pub trait StreamEndpoint: Send + Sync {
    /// Start receiving events for a room
    async fn subscribe(&self, room_id: RoomId) -> Result<EventFeed, EndpointError>;

    /// Post a comment into the room
    async fn send_comment(&self, room_id: RoomId, text: &str) -> Result<(), EndpointError>;
}

/// Messaging-channel side of the relay
#[async_trait]
pub trait MessagingEndpoint: Send + Sync {
    /// Post a message and return its id on the channel
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId, EndpointError>;

    /// Start receiving messages addressed to the relay
    async fn subscribe_inbound(&self) -> Result<InboundFeed, EndpointError>;

    /// Post a failure notice for the operator
    async fn send_error_notice(&self, chat_id: ChatId, text: &str) -> Result<(), EndpointError>;
}
