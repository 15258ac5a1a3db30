//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (layered over blichat.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay on console endpoints: JSON steps on stdin, traffic on stdout.
    /// Platform credentials are not used here; `check-config` validates them
    Run,
    /// Replay a JSON scenario through the relay and print the traffic
    Simulate {
        /// Scenario file
        #[arg(short, long)]
        script: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print it as TOML
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "blichat",
            "--verbose",
            "simulate",
            "--script",
            "scenario.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Simulate { ref script, json: false } if script == &PathBuf::from("scenario.json")
        ));
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["blichat", "check-config", "--config", "prod.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn test_simulate_requires_script() {
        assert!(Cli::try_parse_from(["blichat", "simulate"]).is_err());
    }
}
