//! Relay Configuration
//!
//! Values consumed by the relay core. How they are loaded (files, environment,
//! command line) is the binary's concern; this module only defines the shape,
//! the defaults and validation.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::{ChatId, RoomId, UserId};

// ----------------------------------------------------------------------------
// Outbound Gate Configuration
// ----------------------------------------------------------------------------

/// Rate control for sends into the live room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum spacing between consecutive sends in milliseconds
    pub min_send_spacing_ms: u64,
    /// Maximum number of requests waiting for their turn
    pub queue_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_send_spacing_ms: 1_000, // platform limit is roughly one comment per second
            queue_capacity: 32,
        }
    }
}

impl GateConfig {
    pub fn min_send_spacing(&self) -> Duration {
        Duration::from_millis(self.min_send_spacing_ms)
    }
}

// ----------------------------------------------------------------------------
// Correlation Store Configuration
// ----------------------------------------------------------------------------

/// Bounds for the reply correlation store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// How long a relayed comment stays answerable, in seconds
    pub retention_secs: u64,
    /// Maximum number of remembered relayed comments
    pub capacity: usize,
    /// How often expired entries are swept, in seconds
    pub eviction_interval_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3_600,
            capacity: 1_000,
            eviction_interval_secs: 60,
        }
    }
}

impl CorrelationConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

// ----------------------------------------------------------------------------
// Retry Policy
// ----------------------------------------------------------------------------

/// Bounded exponential backoff for transient live-room send failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Relay Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of the relay core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Live room that is watched and replied into
    pub room_id: RoomId,
    /// Chat on the messaging channel that receives relayed comments
    pub chat_id: ChatId,
    /// Users allowed to send into the live room; empty means anyone posting
    /// in `chat_id`, or the user whose id equals `chat_id`
    pub allowed_operator_ids: Vec<UserId>,
    pub gate: GateConfig,
    pub correlation: CorrelationConfig,
    pub retry: RetryPolicy,
    /// Upper bound for a single send to the messaging channel, in milliseconds
    pub messaging_send_timeout_ms: u64,
    /// Relayed comments that may be in flight to the messaging channel at once
    pub max_concurrent_forwards: usize,
    /// How long shutdown waits for queued live-room sends, in milliseconds
    pub shutdown_grace_ms: u64,
    /// Acknowledge every successful live-room send to the operator
    pub confirm_delivery: bool,
    /// Do not relay operator messages starting with `/`
    pub ignore_slash_commands: bool,
    /// Interval of the periodic status log line, in seconds (0 disables it)
    pub health_log_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_id: RoomId(0),
            chat_id: ChatId(0),
            allowed_operator_ids: Vec::new(),
            gate: GateConfig::default(),
            correlation: CorrelationConfig::default(),
            retry: RetryPolicy::default(),
            messaging_send_timeout_ms: 10_000,
            max_concurrent_forwards: 8,
            shutdown_grace_ms: 5_000,
            confirm_delivery: false,
            ignore_slash_commands: true,
            health_log_interval_secs: 300,
        }
    }
}

impl RelayConfig {
    /// Default configuration bound to a room and a chat
    pub fn new(room_id: RoomId, chat_id: ChatId) -> Self {
        Self {
            room_id,
            chat_id,
            ..Self::default()
        }
    }

    /// Configuration with short timings, for tests and simulations
    pub fn for_testing(room_id: RoomId, chat_id: ChatId) -> Self {
        Self {
            room_id,
            chat_id,
            gate: GateConfig {
                min_send_spacing_ms: 100,
                queue_capacity: 16,
            },
            correlation: CorrelationConfig {
                retention_secs: 60,
                capacity: 100,
                eviction_interval_secs: 5,
            },
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 50,
                max_delay_ms: 200,
                backoff_multiplier: 2.0,
            },
            messaging_send_timeout_ms: 1_000,
            shutdown_grace_ms: 1_000,
            health_log_interval_secs: 0,
            ..Self::default()
        }
    }

    pub fn messaging_send_timeout(&self) -> Duration {
        Duration::from_millis(self.messaging_send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn health_log_interval(&self) -> Option<Duration> {
        (self.health_log_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_log_interval_secs))
    }

    /// Whether a message from `user`, posted in `chat`, may reach the live room
    pub fn is_operator(&self, user: UserId, chat: ChatId) -> bool {
        if self.allowed_operator_ids.is_empty() {
            chat == self.chat_id || user.0 == self.chat_id.0
        } else {
            self.allowed_operator_ids.contains(&user)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_id.0 == 0 {
            return Err(ConfigError::Missing { field: "room_id" });
        }
        if self.chat_id.0 == 0 {
            return Err(ConfigError::Missing { field: "chat_id" });
        }
        if self.gate.min_send_spacing_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gate.min_send_spacing_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.gate.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gate.queue_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_concurrent_forwards == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_forwards",
                reason: "must be at least 1".into(),
            });
        }
        if self.correlation.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.correlation.retention_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.retention_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.correlation.eviction_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.eviction_interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier",
                reason: format!("must be >= 1.0, got {}", self.retry.backoff_multiplier),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_delay_ms",
                reason: "must not be below retry.initial_delay_ms".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requires_room_and_chat() {
        let config = RelayConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing { field: "room_id" })
        );

        let config = RelayConfig {
            room_id: RoomId(7),
            ..RelayConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing { field: "chat_id" })
        );

        assert!(RelayConfig::new(RoomId(7), ChatId(99)).validate().is_ok());
        assert!(RelayConfig::for_testing(RoomId(7), ChatId(99))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rejects_degenerate_bounds() {
        let mut config = RelayConfig::new(RoomId(1), ChatId(1));
        config.gate.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::new(RoomId(1), ChatId(1));
        config.gate.min_send_spacing_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::new(RoomId(1), ChatId(1));
        config.max_concurrent_forwards = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::new(RoomId(1), ChatId(1));
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::new(RoomId(1), ChatId(1));
        config.retry.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_operator_defaults_to_chat() {
        let mut config = RelayConfig::new(RoomId(1), ChatId(555));
        assert!(config.is_operator(UserId(555), ChatId(555)));
        // Private chat with the owner arrives under the owner's id
        assert!(config.is_operator(UserId(555), ChatId(9)));
        assert!(!config.is_operator(UserId(556), ChatId(556)));

        config.allowed_operator_ids = vec![UserId(1), UserId(2)];
        assert!(config.is_operator(UserId(2), ChatId(2)));
        assert!(!config.is_operator(UserId(555), ChatId(555)));
    }

    #[test]
    fn test_group_chat_members_are_operators() {
        let config = RelayConfig::new(RoomId(1), ChatId(-1001234));
        assert!(config.is_operator(UserId(5555), ChatId(-1001234)));
        assert!(config.is_operator(UserId(6666), ChatId(-1001234)));
        assert!(!config.is_operator(UserId(5555), ChatId(5555)));
    }

    #[test]
    fn test_partial_input_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"room_id": 42, "chat_id": -100, "gate": {"queue_capacity": 4}}"#)
                .unwrap();
        assert_eq!(config.room_id, RoomId(42));
        assert_eq!(config.gate.queue_capacity, 4);
        assert_eq!(config.gate.min_send_spacing_ms, 1_000);
        assert_eq!(config.correlation, CorrelationConfig::default());
    }
}
