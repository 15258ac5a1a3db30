//! BliChat Runtime
//!
//! The running relay, built on the data model in `blichat-core`:
//! - `OutboundGate`: single-flight, rate-limited sender into the live room
//! - `RelayEngine`: per-event logic of both directions
//! - `RelaySupervisor`: ingress, eviction and health tasks plus shutdown
//! - `RelayBuilder`: wiring for consumers

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod engine;
pub mod gate;
pub mod retry;
pub mod supervisor;
pub mod tasks;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::{RelayBuilder, RelayHandle};
pub use engine::{ForwardOutcome, IgnoreReason, RelayEngine, ReverseOutcome};
pub use gate::{GateError, GateStatistics, OutboundGate, RateState, SendReceipt, SendTicket};
pub use retry::{GiveUpReason, RetryDecision, RetryState};
pub use supervisor::{RelaySummary, RelaySupervisor};
pub use tasks::{IngressSummary, TaskId};

// Re-export core types for convenience
pub use blichat_core::{
    ChatId, CorrelationStore, EndpointError, InboundMessage, MessageId, MessagingEndpoint,
    RawEvent, RelayConfig, RelayError, RelayResult, RoomId, StreamEndpoint,
};
