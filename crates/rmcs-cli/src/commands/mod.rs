use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rmcs_config::{BotConfig, ConfigLoader};
use rmcs_core::RmcsError;

use crate::logging;

mod identity;
mod run;

/// 🤖 rmcs-bot: keeps a robot connected to its control server
#[derive(Parser)]
#[command(name = "rmcs-bot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to bot.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the control server and stay connected until interrupted
    Run,
    /// Resolve this robot's id and print it
    Identify {
        /// Ignore the cached id and ask the server again
        #[arg(long)]
        refresh: bool,
    },
    /// Forget the cached robot id
    Forget,
    /// Print the network interface inventory as JSON
    Network,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> rmcs_core::Result<()> {
        // Config first: it decides the log format and directory.
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };

        logging::init_tracing(
            log_level,
            &config.logging.format,
            config.logging.directory.as_deref(),
        )?;

        match self.command {
            Commands::Run => run::cmd_run(config).await,
            Commands::Identify { refresh } => identity::cmd_identify(config, refresh).await,
            Commands::Forget => identity::cmd_forget(config),
            Commands::Network => Self::cmd_network().await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Version => Self::cmd_version(),
        }
    }

    async fn cmd_network() -> rmcs_core::Result<()> {
        let nics = tokio::task::spawn_blocking(rmcs_runtime::network::snapshot)
            .await
            .map_err(|e| RmcsError::Other(e.into()))??;
        println!("{}", serde_json::to_string_pretty(&nics)?);
        Ok(())
    }

    fn cmd_config(config: BotConfig, json: bool) -> rmcs_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| RmcsError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_version() -> rmcs_core::Result<()> {
        println!("🤖 rmcs-bot v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Build: debug");
        #[cfg(not(debug_assertions))]
        println!("   Build: release");
        Ok(())
    }
}
