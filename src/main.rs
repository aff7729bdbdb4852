//! X10V Wallet Bridge - Algorand wallet link and payment signing bridge

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use x10v_wallet_bridge::cli::commands;
use x10v_wallet_bridge::config::Config;

/// Wallet bridge diagnostics and manual flows
#[derive(Parser)]
#[command(name = "bridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "bridge.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an address offline (no network access)
    Validate {
        /// Candidate address
        address: String,
    },

    /// Look up balance and existence for an address
    Account {
        /// Verified address
        address: String,
    },

    /// Show current suggested transaction parameters
    Params,

    /// Run a payment through the manual signing flow
    Pay {
        /// Receiver address
        to: String,

        /// Amount in microAlgos (integer, taken verbatim)
        amount: u64,

        /// Transaction note
        #[arg(long)]
        note: Option<String>,

        /// Host-container user id for the address cache
        #[arg(long)]
        user: Option<String>,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check node reachability
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "x10v_wallet_bridge=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    debug!("configuration loaded");

    match cli.command {
        Commands::Validate { address } => {
            commands::validate(&address);
            Ok(())
        }
        Commands::Account { address } => commands::account(&config, &address).await,
        Commands::Params => commands::params(&config).await,
        Commands::Pay {
            to,
            amount,
            note,
            user,
        } => commands::pay(&config, &to, amount, note, user).await,
        Commands::Config => {
            commands::show_config(&config);
            Ok(())
        }
        Commands::Health => commands::health(&config).await,
    }
}
