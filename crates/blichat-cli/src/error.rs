//! Error handling for the BliChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Relay error: {0}")]
    Relay(#[from] blichat_core::RelayError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] blichat_core::EndpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid scenario step {step}: {reason}")]
    Script { step: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
