use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use onionsim::circuit::Framing;
use onionsim::commands::{self, run::RunOptions};
use onionsim::config;

#[derive(Parser)]
#[command(name = "onionsim")]
#[command(about = "Simulate onion routing through a telescoping relay circuit", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.onionsim/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Build a circuit and exchange one message and one reply
    Run {
        /// Number of relays to create (at least 3)
        #[arg(long)]
        relays: Option<usize>,

        /// Number of relays in the circuit (at least 3)
        #[arg(long)]
        circuit_length: Option<usize>,

        /// Let the eavesdropper observe one hop per direction
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        eavesdrop: Option<bool>,

        /// Layer encoding: separator or tagged
        #[arg(long)]
        framing: Option<Framing>,

        /// Seed relay capacities and eavesdropper draws
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    // A config file can turn on verbose logging too
    let verbose = cli.verbose
        || (config_path.exists()
            && config::SimConfig::load(&config_path).is_ok_and(|c| c.verbose));

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => commands::init::run(&config_path, force),
        Commands::Run {
            relays,
            circuit_length,
            eavesdrop,
            framing,
            seed,
        } => commands::run::run(
            &config_path,
            RunOptions {
                relays,
                circuit_length,
                eavesdrop,
                framing,
                seed,
                verbose,
            },
        ),
    }
}

/// `RUST_LOG` wins when it parses; otherwise DEBUG with verbose, INFO without.
fn log_filter(verbose: bool, directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_levels() {
        assert_eq!(log_filter(false, None).to_string(), "info");
        assert_eq!(log_filter(true, None).to_string(), "debug");
        assert_eq!(log_filter(true, Some(String::new())).to_string(), "debug");
    }

    #[test]
    fn test_log_filter_prefers_env_directives() {
        assert_eq!(
            log_filter(false, Some("onionsim=trace".to_string())).to_string(),
            "onionsim=trace"
        );
    }
}
