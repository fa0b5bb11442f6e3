use crate::chatwoot::ChatwootClient;
use crate::config::{Config, get_config_path, load_config, save_config};
use crate::engine::ConversationEngine;
use crate::gateway::{self, AppState};
use crate::media::MediaStore;
use crate::store::ConversationStore;
use crate::twilio::TwilioClient;
use crate::utils::expand_home;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "zapdesk")]
#[command(about = "WhatsApp to Chatwoot support bridge")]
#[command(version = crate::VERSION)]
pub struct Cli {
    /// Path to the config file (default: ~/.zapdesk/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve,
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Show config path and database counters
    Status,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve(cli.config.as_deref()).await,
        Commands::Init { force } => init(cli.config.as_deref(), force),
        Commands::Status => status(cli.config.as_deref()),
    }
}

/// Wire the dependency context once and hand it to the gateway.
pub fn build_state(config: &Config) -> Result<AppState> {
    let store = Arc::new(ConversationStore::new(expand_home(
        &config.storage.db_path,
    ))?);
    let chatwoot = Arc::new(ChatwootClient::new(&config.chatwoot));
    let twilio = Arc::new(TwilioClient::new(&config.twilio));
    let media = Arc::new(MediaStore::new(
        expand_home(&config.storage.media_dir),
        &config.storage.public_base_url,
    )?);
    let engine = Arc::new(ConversationEngine::new(store.clone(), chatwoot.clone()));

    Ok(AppState {
        engine,
        store,
        twilio,
        chatwoot,
        media,
    })
}

async fn serve(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path)?;
    config
        .validate()
        .context("config is incomplete; run `zapdesk init` and fill in the credentials")?;

    let state = build_state(&config)?;
    gateway::serve(state, &config.server.host, config.server.port).await
}

fn init(config_path: Option<&std::path::Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    save_config(&Config::default(), Some(&path))?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

fn status(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = ConversationStore::new(expand_home(&config.storage.db_path))?;

    println!("zapdesk {}", crate::VERSION);
    println!(
        "config:        {}",
        config_path
            .map(|p| p.display().to_string())
            .or_else(|| get_config_path().ok().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "<default>".to_string())
    );
    println!("database:      {}", config.storage.db_path);
    println!("conversations: {}", store.conversation_count()?);
    println!("messages:      {}", store.message_count()?);
    Ok(())
}
