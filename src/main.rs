//! `decisions` - submit court decisions for processing, follow their progress
//! and search the processed corpus.

use anyhow::{Context, Result};
use clap::Parser;
use decision_upload_client_lib::{
    commands::{self, CommandContext, UploadInput},
    infrastructure::{AppConfig, ConfigManager, SearchMethod, logging},
};
use std::path::PathBuf;

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Submit decision text and follow its processing
    Upload {
        /// Decision text (URLs or identifiers)
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// Read decision text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Submit only; do not open the progress channel
        #[arg(long)]
        no_watch: bool,
    },
    /// Follow the progress of previously submitted decisions
    Watch {
        /// Decision identifiers to track, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// User channel id returned by the upload call
        #[arg(long)]
        channel: Option<String>,
    },
    /// Similarity search over processed decisions
    Search {
        /// Search text
        query: String,
        /// similarity_search, similarity_search_by_vector or
        /// similarity_search_by_vector_with_relevance_scores
        #[arg(long, default_value = "similarity_search")]
        method: SearchMethod,
    },
}

#[derive(Parser, Debug)]
#[command(name = "decisions")]
#[command(version)]
#[command(about = "Decision upload and progress tracking client", long_about = None)]
struct Cli {
    /// Configuration file path (overrides the per-user config file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Access token (overrides configuration)
    #[arg(long, global = true, env = "DECISIONS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path)).context("Failed to load configuration")?,
        None => ConfigManager::new()?.initialize_on_first_run().await?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    logging::init_logging_with_config(&config.logging)?;
    logging::log_system_info(&config.logging);

    let ctx = CommandContext::new(config, cli.token);

    match cli.command {
        Command::Upload { text, file, no_watch } => {
            let input = match (text, file) {
                (Some(text), _) => UploadInput::Text(text),
                (None, Some(path)) => UploadInput::File(path),
                (None, None) => UploadInput::Stdin,
            };
            commands::upload_decisions(&ctx, input, !no_watch).await
        }
        Command::Watch { ids, channel } => commands::watch_batch(&ctx, ids, channel).await,
        Command::Search { query, method } => {
            let hits = commands::search_decisions(&ctx, &query, method).await?;
            print!("{}", commands::render_hits(&hits));
            Ok(())
        }
    }
}
