//! agilesync - JIRA Agile sync
//!
//! Main entry point for the agilesync CLI.

use agilesync::agile;
use agilesync::config::{validate_config, validate_config_result, SyncConfig};
use agilesync::pipe::{JsonlPipe, Pipe};
use agilesync::state::SqliteStateStore;
use agilesync::webhook::{PipeUserManager, WebhookProcessor, WebhookServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// agilesync - boards, sprints and backlogs from JIRA Agile
#[derive(Parser, Debug)]
#[command(name = "agilesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/agilesync/config.yaml)
    #[arg(short, long, env = "AGILESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one bulk sync of boards and sprints
    Sync {
        /// Re-emit closed sprints that were already synced
        #[arg(long)]
        historical: bool,

        /// Concurrent board/sprint tasks
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output file (default: output_path from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Process one stored webhook payload
    Webhook {
        /// File holding the JSON delivery
        file: PathBuf,

        /// Customer id (default: from config)
        #[arg(long)]
        customer: Option<String>,

        /// Integration instance id (default: from config)
        #[arg(long)]
        instance: Option<String>,
    },

    /// Run the webhook receiver
    Serve {
        /// Listen address (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Check the configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = agilesync::logging::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<SyncConfig> {
    let config = match path {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::load_default().with_context(|| {
            format!(
                "No configuration found. Create {} first.",
                SyncConfig::default_path().display()
            )
        })?,
    };
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Validate => {
            match validate_config(&config) {
                Ok(()) => println!("Configuration is valid"),
                Err(errors) => {
                    for error in &errors {
                        println!("  - {}", error);
                    }
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
            }
            Ok(())
        }

        Commands::Sync {
            historical,
            concurrency,
            output,
        } => {
            config.historical |= historical;
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            validate_config_result(&config)?;
            let output = output.unwrap_or_else(|| config.output_path.clone());

            let options = config.to_sync_options()?;
            let pipe = Arc::new(
                JsonlPipe::append(&output)
                    .with_context(|| format!("cannot open {}", output.display()))?,
            );
            let store = Arc::new(
                SqliteStateStore::open_path(&config.state_path).with_context(|| {
                    format!("cannot open state at {}", config.state_path.display())
                })?,
            );

            let stats = agile::sync(&options, pipe, store).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::Webhook {
            file,
            customer,
            instance,
        } => {
            let payload = std::fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let customer = customer.unwrap_or_else(|| config.customer_id.clone());
            let instance = instance.unwrap_or_else(|| config.integration_instance_id.clone());

            let pipe: Arc<dyn Pipe> = Arc::new(JsonlPipe::append(&config.output_path)?);
            let users = Arc::new(PipeUserManager::new(Arc::clone(&pipe)));
            let outcome =
                WebhookProcessor::new(pipe, users).dispatch(&customer, &instance, &payload)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let pipe: Arc<dyn Pipe> = Arc::new(JsonlPipe::append(&config.output_path)?);
            let users = Arc::new(PipeUserManager::new(Arc::clone(&pipe)));
            WebhookServer::new(WebhookProcessor::new(pipe, users))
                .run(&bind)
                .await?;
            Ok(())
        }
    }
}
