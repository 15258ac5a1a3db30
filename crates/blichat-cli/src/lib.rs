//! BliChat CLI Library
//!
//! Building blocks of the `blichat` binary, exposed for integration tests.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;

pub use config::AppConfig;
pub use error::{CliError, Result};
pub use session::{Report, Scenario, Session, Step};
