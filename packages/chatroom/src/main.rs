use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cli;
mod config;

use crate::config::{ChatConfig, FileConfig, load_config};

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Terminal client for a realtime chat room")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.chatroom)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Chat server base URL; overrides both endpoints in config.toml
    #[arg(long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the room and chat from stdin
    Join(JoinArgs),

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Parser)]
struct JoinArgs {
    /// Name to chat as
    #[arg(short, long)]
    username: String,

    /// Authentication token
    #[arg(long, env = "CHAT_TOKEN", default_value = "", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only chat lines.
    let default_directive = if cli.debug {
        "chat=debug,chat_session=debug,info"
    } else {
        "chat=info,chat_session=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = ChatConfig::new(cli.data_dir.clone())?;
    let file_config: FileConfig = load_config(&config.data_dir)
        .extract()
        .with_context(|| {
            format!(
                "Failed to load configuration from {}",
                config.config_toml_path().display()
            )
        })?;
    let file_config = file_config.with_server_override(cli.server.as_deref());

    match cli.command {
        Commands::Join(args) => cli::join_command(&file_config, args.username, args.token).await,
        Commands::Config => {
            let text = toml::to_string_pretty(&file_config)
                .context("Failed to serialize configuration")?;
            print!("{}", text);
            Ok(())
        }
    }
}
