use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use cstack_core::Operation;
use std::path::PathBuf;

mod commands;

use commands::batch::BatchArgs;

#[derive(Parser)]
#[command(name = "cstack")]
#[command(version)]
#[command(about = "Manage many docker compose stacks as one administrative unit", long_about = None)]
struct Cli {
    /// Configuration file path (default: $CSTACK_CONFIG or ~/compose-stack.yaml)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start stacks in the background
    Up(BatchArgs),

    /// Stop and remove stacks
    Down(BatchArgs),

    /// Show stack service status
    Ps(BatchArgs),

    /// Pull stack images
    Pull(BatchArgs),

    /// Show captured stack logs
    Logs(BatchArgs),

    /// Restart stack services
    Restart(BatchArgs),

    /// Show the resolved configuration
    Config {
        /// Print a starter configuration template
        #[arg(short, long)]
        template: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cstack_core::logging::init(cli.verbose);

    let config_path = cstack_core::Config::resolve_path(cli.config.as_deref());

    let exit_code = match cli.command {
        Commands::Up(args) => commands::batch::run(&config_path, Operation::Up, args).await?,
        Commands::Down(args) => commands::batch::run(&config_path, Operation::Down, args).await?,
        Commands::Ps(args) => commands::batch::run(&config_path, Operation::Ps, args).await?,
        Commands::Pull(args) => commands::batch::run(&config_path, Operation::Pull, args).await?,
        Commands::Logs(args) => commands::batch::run(&config_path, Operation::Logs, args).await?,
        Commands::Restart(args) => {
            commands::batch::run(&config_path, Operation::Restart, args).await?
        }
        Commands::Config { template } => {
            commands::config::run(&config_path, template)?;
            0
        }
    };

    std::process::exit(exit_code);
}
