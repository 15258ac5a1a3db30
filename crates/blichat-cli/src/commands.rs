//! Command handlers for the BliChat CLI

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use blichat_core::{ChatId, RelayConfig, RoomId};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;
use crate::session::{Scenario, Session, Step};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run => Self::handle_run_command(config).await,
            Commands::Simulate { script, json } => {
                Self::handle_simulate_command(config, &script, json).await
            }
            Commands::CheckConfig => Self::handle_check_config_command(config),
        }
    }

    /// Relay JSON steps read line by line from stdin until EOF or Ctrl+C
    async fn handle_run_command(config: AppConfig) -> Result<()> {
        let relay = console_config(config)?;
        let mut session = Session::start(relay).await?;
        info!("Reading relay input from stdin, one JSON step per line");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_number = 0usize;
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            line_number += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Step>(line) {
                Ok(step) => session.apply(step).await?,
                Err(e) => warn!("Skipping line {}: {}", line_number, e),
            }
        }

        let report = session.finish().await;
        println!("{report}");
        Ok(())
    }

    /// Replay a scenario file and print the recorded traffic
    async fn handle_simulate_command(config: AppConfig, script: &Path, json: bool) -> Result<()> {
        let scenario = Scenario::load(script)?;
        let relay = simulation_config(config.relay);
        relay.validate().map_err(blichat_core::RelayError::from)?;

        info!(
            "Simulating {} steps from {}",
            scenario.steps.len(),
            script.display()
        );
        let mut session = Session::start(relay).await?;
        let outcome = session.run_scenario(scenario).await;
        let report = session.finish().await;
        outcome?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{report}");
        }
        Ok(())
    }

    /// Validate everything and print the effective configuration
    fn handle_check_config_command(config: AppConfig) -> Result<()> {
        config.validate()?;
        config.validate_credentials()?;
        println!("{}", config.redacted().to_toml()?);
        Ok(())
    }
}

/// Console endpoints stand in for the platform clients, so only the relay
/// section has to be valid; credentials are left to `check-config`
fn console_config(config: AppConfig) -> Result<RelayConfig> {
    config.validate()?;
    Ok(config.relay)
}

/// Simulations need no real room or chat; fill in stand-ins when unset
fn simulation_config(mut relay: RelayConfig) -> RelayConfig {
    if relay.room_id.0 == 0 {
        relay.room_id = RoomId(1);
    }
    if relay.chat_id.0 == 0 {
        relay.chat_id = ChatId(1);
    }
    relay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_run_ignores_credentials() {
        let mut config = AppConfig::default();
        config.relay = RelayConfig::new(RoomId(9), ChatId(10));
        config.telegram.bot_token = "your_bot_token_here".into();
        assert!(config.validate_credentials().is_err());

        let relay = console_config(config).unwrap();
        assert_eq!(relay.room_id, RoomId(9));

        assert!(console_config(AppConfig::default()).is_err());
    }

    #[test]
    fn test_simulation_config_fills_ids() {
        let relay = simulation_config(RelayConfig::default());
        assert_eq!(relay.room_id, RoomId(1));
        assert_eq!(relay.chat_id, ChatId(1));
        assert!(relay.validate().is_ok());

        let relay = simulation_config(RelayConfig::new(RoomId(9), ChatId(-100)));
        assert_eq!(relay.room_id, RoomId(9));
        assert_eq!(relay.chat_id, ChatId(-100));
    }
}
