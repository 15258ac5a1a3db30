//! Requests headed for the live room

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::types::SenderId;

/// Commenter a live-room message is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub sender_id: SenderId,
    pub display_name: String,
}

/// A message waiting to be sent into the live room
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub text: String,
    pub target: Option<ReplyTarget>,
    pub enqueued_at: Instant,
}

impl OutboundRequest {
    /// Unaddressed message, sent verbatim
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: None,
            enqueued_at: Instant::now(),
        }
    }

    /// Message addressed to an earlier commenter
    pub fn reply(text: impl Into<String>, target: ReplyTarget) -> Self {
        Self {
            text: text.into(),
            target: Some(target),
            enqueued_at: Instant::now(),
        }
    }

    /// Final text as it appears in the live room
    ///
    /// The `@name:` prefix is plain text; the platform does not notify the
    /// addressed viewer.
    pub fn render(&self) -> String {
        match &self.target {
            Some(target) => format!("@{}: {}", target.display_name, self.text),
            None => self.text.clone(),
        }
    }
}
