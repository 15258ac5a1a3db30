//! BliChat Core
//!
//! Data model and stateful building blocks of the live-room relay:
//! - `normalizer`: raw stream events to canonical comments
//! - `correlation`: bounded, expiring map from relayed message to commenter
//! - `endpoint`: the two collaborator traits the relay speaks through
//! - `config`: values the relay consumes
//!
//! Task orchestration lives in `blichat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod errors;
pub mod event;
pub mod normalizer;
pub mod outbound;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{CorrelationConfig, GateConfig, RelayConfig, RetryPolicy};
pub use correlation::{CorrelationStats, CorrelationStore, RelayedMessage};
pub use endpoint::{EventFeed, InboundFeed, InboundMessage, MessagingEndpoint, StreamEndpoint};
pub use errors::{ConfigError, Discard, EndpointError, RelayError, RelayResult};
pub use event::{Badges, CommentEvent, EventKind, RawEvent};
pub use normalizer::{normalize, strip_control_chars};
pub use outbound::{OutboundRequest, ReplyTarget};
pub use types::{ChatId, MessageId, RoomId, SenderId, Timestamp, UserId};
