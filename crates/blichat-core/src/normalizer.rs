//! Event Normalizer
//!
//! Turns raw stream events into `CommentEvent`s. Only comment kinds pass;
//! everything else is discarded without side effects. Display names are
//! taken as delivered: masked names stay masked.

use serde::{Deserialize, Deserializer};

use crate::errors::Discard;
use crate::event::{Badges, CommentEvent, EventKind, RawEvent};
use crate::types::SenderId;

// ----------------------------------------------------------------------------
// Payload Shape
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentPayload {
    #[serde(alias = "id_str", alias = "msg_id")]
    id: Option<serde_json::Value>,
    uid: Option<u64>,
    uid_crc32: Option<String>,
    #[serde(alias = "username")]
    uname: Option<String>,
    #[serde(alias = "message")]
    msg: Option<String>,
    user_level: u32,
    medal_name: Option<String>,
    medal_level: u32,
    vip: u8,
    #[serde(deserialize_with = "bool_or_int")]
    admin: bool,
    title: Option<String>,
    price: Option<u32>,
}

/// The platform encodes flags as either booleans or 0/1
fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

// ----------------------------------------------------------------------------
// Normalization
// ----------------------------------------------------------------------------

/// Remove characters the messaging channel refuses.
///
/// Keeps line breaks and tabs; drops every other control character.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Normalize a raw stream event into a comment, or say why it was discarded
pub fn normalize(raw: &RawEvent) -> Result<CommentEvent, Discard> {
    if !raw.kind.is_comment() {
        return Err(Discard::NotAComment {
            kind: raw.kind.to_string(),
        });
    }

    let payload: CommentPayload =
        serde_json::from_value(raw.payload.clone()).map_err(|e| Discard::Malformed {
            reason: e.to_string(),
        })?;

    let sender_id = match (payload.uid, non_empty(payload.uid_crc32)) {
        (Some(uid), _) if uid != 0 => SenderId::new(uid.to_string()),
        (_, Some(code)) => SenderId::new(code),
        _ => {
            return Err(Discard::Malformed {
                reason: "no sender identity".into(),
            })
        }
    };

    let display_name = non_empty(payload.uname.map(|name| strip_control_chars(&name)))
        .ok_or_else(|| Discard::Malformed {
            reason: "missing display name".into(),
        })?;

    let text = strip_control_chars(payload.msg.as_deref().unwrap_or_default());
    if text.trim().is_empty() {
        return Err(Discard::Malformed {
            reason: "empty comment text".into(),
        });
    }

    let source_message_id = match payload.id {
        Some(serde_json::Value::String(id)) if !id.is_empty() => id,
        Some(serde_json::Value::Number(id)) => id.to_string(),
        _ => format!("{}-{}", sender_id, raw.received_at.as_millis()),
    };

    let super_chat_price = match raw.kind {
        EventKind::SuperChat => Some(payload.price.unwrap_or(0)),
        _ => None,
    };

    let badges = Badges {
        medal: non_empty(payload.medal_name).map(|name| (name, payload.medal_level)),
        user_level: payload.user_level,
        vip: payload.vip,
        admin: payload.admin,
        title: non_empty(payload.title),
    };

    Ok(CommentEvent {
        source_message_id,
        sender_id,
        display_name,
        text,
        received_at: raw.received_at,
        badges,
        super_chat_price,
    })
}
