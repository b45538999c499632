//! Swarm load balancer CLI
//!
//! Queries a running swarm-balancer service for status, workers, alerts,
//! capacity predictions and health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, status, workers};

/// Swarm load balancer CLI
#[derive(Parser)]
#[command(name = "swarm-lbctl")]
#[command(author, version, about = "CLI for the Swarm load balancer", long_about = None)]
pub struct Cli {
    /// Service URL (can also be set via SWARM_LB_API_URL env var)
    #[arg(long, env = "SWARM_LB_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show lifecycle, strategy, system figures and content distribution
    Status,

    /// List registered workers
    Workers,

    /// Show recent bottleneck alerts
    Alerts,

    /// Project resource needs and a scaling recommendation
    Predict {
        /// Minutes ahead to project
        #[arg(long, default_value_t = 60)]
        horizon: u32,
    },

    /// Show the tracked state of one worker
    Worker {
        /// Worker ID
        id: String,
    },

    /// Show service health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Workers => workers::list_workers(&client, cli.format).await?,
        Commands::Alerts => status::show_alerts(&client, cli.format).await?,
        Commands::Predict { horizon } => {
            status::show_prediction(&client, horizon, cli.format).await?
        }
        Commands::Worker { id } => workers::show_worker(&client, &id, cli.format).await?,
        Commands::Health => health::show_health(&client, cli.format).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_defaults_to_an_hour() {
        let cli = Cli::try_parse_from(["swarm-lbctl", "predict"]).unwrap();
        match cli.command {
            Commands::Predict { horizon } => assert_eq!(horizon, 60),
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_worker_requires_id() {
        assert!(Cli::try_parse_from(["swarm-lbctl", "worker"]).is_err());
        let cli = Cli::try_parse_from(["swarm-lbctl", "--format", "json", "worker", "agent-1"]).unwrap();
        assert!(matches!(cli.format, output::OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Worker { ref id } if id == "agent-1"));
    }
}
