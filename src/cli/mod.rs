use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{HttpFeedSource, StreamIngestor};
use crate::store::engine::PersistenceEngine;
use crate::store::MemoryKeyValueStore;

#[derive(Parser)]
#[command(name = "chirp-store")]
#[command(about = "Stream ingestion and persistence for social-media messages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the configured feed until interrupted
    Run,

    /// Print the message and user counters
    Count,

    /// Load one message record and print it
    Show {
        /// Message id
        id: u64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        init_tracing(&config, self.verbose);

        let engine = PersistenceEngine::new(
            Arc::new(MemoryKeyValueStore::new()),
            config.engine_settings(),
        );

        match self.command {
            Commands::Run => run_ingest(&config, engine).await,
            Commands::Count => {
                println!("messages: {}", engine.count_all().await?);
                println!("users:    {}", engine.count_users().await?);
                Ok(())
            }
            Commands::Show { id } => {
                let record = engine.load_message(id).await?;
                println!("{:#?}", record);
                Ok(())
            }
        }
    }
}

async fn run_ingest(config: &Config, engine: PersistenceEngine) -> Result<()> {
    if config.ingest.endpoint.is_empty() {
        return Err(Error::Config(
            "ingest endpoint is not configured".to_string(),
        ));
    }

    let mut source = HttpFeedSource::new(&config.ingest.endpoint)?;
    if let Some(token) = &config.ingest.bearer_token {
        source = source.with_bearer_token(token);
    }

    let ingestor = Arc::new(StreamIngestor::new(
        Arc::new(source),
        engine.clone(),
        config.ingest_settings(),
    ));

    let runner = Arc::clone(&ingestor);
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    ingestor.stop();
    handle
        .await
        .map_err(|e| Error::InvalidState(e.to_string()))??;

    tracing::info!(
        received = ingestor.received(),
        stored = engine.count_all().await?,
        users = engine.count_users().await?,
        "ingestion finished"
    );
    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json_format {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
