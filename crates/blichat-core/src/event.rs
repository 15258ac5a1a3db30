//! Live-stream event model
//!
//! `RawEvent` is what the stream endpoint delivers: a kind tag plus a JSON
//! payload whose fields depend on the kind. `CommentEvent` is the canonical
//! record produced by the normalizer for real audience comments.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::{SenderId, Timestamp};

// ----------------------------------------------------------------------------
// Event Kinds
// ----------------------------------------------------------------------------

/// Kind of a raw live-stream event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Audience comment (danmaku)
    Comment,
    /// Paid, highlighted comment
    SuperChat,
    RoomEnter,
    Follow,
    Share,
    Like,
    Gift,
    GuardBuy,
    EntryEffect,
    SystemNotice,
    /// Any kind this relay does not know about
    Other(String),
}

impl EventKind {
    /// Whether events of this kind carry a conversational comment
    pub fn is_comment(&self) -> bool {
        matches!(self, EventKind::Comment | EventKind::SuperChat)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Comment => "comment",
            EventKind::SuperChat => "super_chat",
            EventKind::RoomEnter => "room_enter",
            EventKind::Follow => "follow",
            EventKind::Share => "share",
            EventKind::Like => "like",
            EventKind::Gift => "gift",
            EventKind::GuardBuy => "guard_buy",
            EventKind::EntryEffect => "entry_effect",
            EventKind::SystemNotice => "system_notice",
            EventKind::Other(name) => name,
        }
    }
}

impl From<String> for EventKind {
    /// Accepts both the relay's own snake_case names and the live platform's
    /// command names (`DANMU_MSG`, `SEND_GIFT`, ...).
    fn from(name: String) -> Self {
        match name.as_str() {
            "comment" | "DANMU_MSG" => EventKind::Comment,
            "super_chat" | "SUPER_CHAT_MESSAGE" => EventKind::SuperChat,
            "room_enter" | "INTERACT_WORD" | "INTERACT_WORD_V2" => EventKind::RoomEnter,
            "follow" => EventKind::Follow,
            "share" => EventKind::Share,
            "like" | "LIKE_INFO_V3_CLICK" => EventKind::Like,
            "gift" | "SEND_GIFT" => EventKind::Gift,
            "guard_buy" | "GUARD_BUY" | "USER_TOAST_MSG" => EventKind::GuardBuy,
            "entry_effect" | "ENTRY_EFFECT" => EventKind::EntryEffect,
            "system_notice" | "NOTICE_MSG" | "ROOM_CHANGE" | "WATCHED_CHANGE" => {
                EventKind::SystemNotice
            }
            _ => EventKind::Other(name),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Raw Event
// ----------------------------------------------------------------------------

/// Event as delivered by the stream endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "Timestamp::now")]
    pub received_at: Timestamp,
}

impl RawEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            received_at: Timestamp::now(),
        }
    }
}

// ----------------------------------------------------------------------------
// Comment Event
// ----------------------------------------------------------------------------

/// Viewer decorations the platform attaches to a comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badges {
    /// Fan medal name and level
    pub medal: Option<(String, u32)>,
    pub user_level: u32,
    /// 0 = none, 1 = monthly, 2 = yearly
    pub vip: u8,
    pub admin: bool,
    pub title: Option<String>,
}

impl Badges {
    pub fn is_empty(&self) -> bool {
        self.medal.is_none()
            && self.user_level == 0
            && self.vip == 0
            && !self.admin
            && self.title.is_none()
    }

    /// Bracketed labels in display order
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some((name, level)) = &self.medal {
            labels.push(format!("[{name} {level}]"));
        }
        match self.vip {
            1 => labels.push("[VIP]".to_string()),
            2 => labels.push("[SVIP]".to_string()),
            _ => {}
        }
        if self.admin {
            labels.push("[admin]".to_string());
        }
        if let Some(title) = &self.title {
            labels.push(format!("[{title}]"));
        }
        if self.user_level > 0 {
            labels.push(format!("[UL {}]", self.user_level));
        }
        labels
    }
}

/// Canonical audience comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub source_message_id: String,
    pub sender_id: SenderId,
    /// Display name as delivered, possibly masked by the platform
    pub display_name: String,
    pub text: String,
    pub received_at: Timestamp,
    #[serde(default)]
    pub badges: Badges,
    /// Price of a super chat, in whole currency units
    #[serde(default)]
    pub super_chat_price: Option<u32>,
}

impl CommentEvent {
    /// Text posted to the messaging channel for this comment
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        if let Some(price) = self.super_chat_price {
            rendered.push_str(&format!("¥{price} "));
        }
        for label in self.badges.labels() {
            rendered.push_str(&label);
            rendered.push(' ');
        }
        rendered.push_str(&self.display_name);
        rendered.push_str(": ");
        rendered.push_str(&self.text);
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(name: &str, text: &str) -> CommentEvent {
        CommentEvent {
            source_message_id: "src-1".into(),
            sender_id: SenderId::new("u1"),
            display_name: name.into(),
            text: text.into(),
            received_at: Timestamp::new(0),
            badges: Badges::default(),
            super_chat_price: None,
        }
    }

    #[test]
    fn test_kind_from_platform_command() {
        assert_eq!(EventKind::from("DANMU_MSG".to_string()), EventKind::Comment);
        assert_eq!(EventKind::from("SEND_GIFT".to_string()), EventKind::Gift);
        assert_eq!(
            EventKind::from("SUPER_CHAT_MESSAGE".to_string()),
            EventKind::SuperChat
        );
        assert_eq!(
            EventKind::from("POPULARITY_RED_POCKET_START".to_string()),
            EventKind::Other("POPULARITY_RED_POCKET_START".into())
        );
        assert!(EventKind::SuperChat.is_comment());
        assert!(!EventKind::RoomEnter.is_comment());
    }

    #[test]
    fn test_raw_event_deserializes_kind_names() {
        let event: RawEvent = serde_json::from_str(
            r#"{"kind": "follow", "payload": {"uid": 1}, "received_at": 10}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Follow);
        assert_eq!(event.received_at, Timestamp::new(10));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "follow");
    }

    #[test]
    fn test_plain_render() {
        assert_eq!(comment("A***", "hi").render(), "A***: hi");
    }

    #[test]
    fn test_render_with_badges_and_price() {
        let mut event = comment("A***", "great stream");
        event.badges = Badges {
            medal: Some(("fans".into(), 5)),
            user_level: 12,
            vip: 2,
            admin: false,
            title: None,
        };
        assert_eq!(
            event.render(),
            "[fans 5] [SVIP] [UL 12] A***: great stream"
        );

        event.badges = Badges::default();
        event.super_chat_price = Some(30);
        assert_eq!(event.render(), "¥30 A***: great stream");
    }
}
