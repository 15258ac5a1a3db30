//! BliChat Harness
//!
//! In-memory implementations of the live-stream and messaging endpoints with
//! recorded output and failure injection, used by tests and offline simulation.

pub mod faults;
pub mod messaging;
pub mod stream;

pub use faults::FaultPlan;
pub use messaging::{MemoryMessaging, Notice, SentMessage};
pub use stream::{MemoryStream, SentComment};
