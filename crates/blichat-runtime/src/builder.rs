//! Relay Builder API
//!
//! Entry point for consumers (CLI, simulations, tests): register the two
//! endpoints, pick a configuration and get a handle to the running relay.

use blichat_core::{
    ConfigError, CorrelationStats, CorrelationStore, MessagingEndpoint, RelayConfig, RelayError,
    RelayResult, StreamEndpoint,
};
use std::sync::Arc;
use tracing::info;

use crate::engine::RelayEngine;
use crate::gate::{GateStatistics, OutboundGate, RateState};
use crate::supervisor::{RelaySummary, RelaySupervisor};

// ----------------------------------------------------------------------------
// Relay Builder
// ----------------------------------------------------------------------------

pub struct RelayBuilder {
    config: RelayConfig,
    stream: Option<Arc<dyn StreamEndpoint>>,
    messaging: Option<Arc<dyn MessagingEndpoint>>,
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            stream: None,
            messaging: None,
        }
    }

    /// Live-stream endpoint the relay listens on and replies into
    pub fn with_stream(mut self, stream: Arc<dyn StreamEndpoint>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Messaging endpoint that receives relayed comments
    pub fn with_messaging(mut self, messaging: Arc<dyn MessagingEndpoint>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    /// Enable or disable success notices for live-room sends
    pub fn confirm_delivery(mut self, enabled: bool) -> Self {
        self.config.confirm_delivery = enabled;
        self
    }

    /// Validate, wire and start the relay
    pub async fn build_and_start(self) -> RelayResult<RelayHandle> {
        self.config.validate()?;
        let stream = self.stream.ok_or(RelayError::Config(ConfigError::Missing {
            field: "stream endpoint",
        }))?;
        let messaging = self.messaging.ok_or(RelayError::Config(ConfigError::Missing {
            field: "messaging endpoint",
        }))?;

        let config = Arc::new(self.config);
        let store = Arc::new(CorrelationStore::from_config(&config.correlation));
        let gate = Arc::new(OutboundGate::spawn(
            stream.clone(),
            config.room_id,
            &config.gate,
            config.retry.clone(),
        ));
        let engine = Arc::new(RelayEngine::new(config, messaging.clone(), store, gate));

        let supervisor = RelaySupervisor::start(engine, stream, messaging).await?;
        info!("Relay running");
        Ok(RelayHandle { supervisor })
    }
}

// ----------------------------------------------------------------------------
// Relay Handle
// ----------------------------------------------------------------------------

/// Handle to a running relay
pub struct RelayHandle {
    supervisor: RelaySupervisor,
}

impl RelayHandle {
    pub fn engine(&self) -> &Arc<RelayEngine> {
        self.supervisor.engine()
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        self.engine().store()
    }

    pub fn correlation_stats(&self) -> CorrelationStats {
        self.store().stats()
    }

    pub fn gate_stats(&self) -> GateStatistics {
        self.engine().gate().stats()
    }

    pub fn rate_state(&self) -> RateState {
        self.engine().gate().rate_state()
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Run until both feeds end
    pub async fn wait(mut self) -> RelaySummary {
        self.supervisor.wait().await
    }

    /// Stop the relay gracefully
    pub async fn shutdown(mut self) -> RelaySummary {
        self.supervisor.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blichat_core::{ChatId, RoomId};
    use blichat_harness::{MemoryMessaging, MemoryStream};

    #[tokio::test]
    async fn test_build_requires_endpoints() {
        let config = RelayConfig::for_testing(RoomId(1), ChatId(10));
        let result = RelayBuilder::new(config)
            .with_stream(Arc::new(MemoryStream::new()))
            .build_and_start()
            .await;
        assert!(matches!(
            result,
            Err(RelayError::Config(ConfigError::Missing {
                field: "messaging endpoint"
            }))
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = RelayConfig::for_testing(RoomId(0), ChatId(10));
        let result = RelayBuilder::new(config)
            .with_stream(Arc::new(MemoryStream::new()))
            .with_messaging(Arc::new(MemoryMessaging::new(ChatId(10))))
            .build_and_start()
            .await;
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let config = RelayConfig::for_testing(RoomId(1), ChatId(10));
        let handle = RelayBuilder::new(config)
            .with_stream(Arc::new(MemoryStream::new()))
            .with_messaging(Arc::new(MemoryMessaging::new(ChatId(10))))
            .build_and_start()
            .await
            .unwrap();

        assert!(handle.is_running());
        let summary = handle.shutdown().await;
        assert!(summary.drained);
        assert_eq!(summary.gate.sent, 0);
    }
}
