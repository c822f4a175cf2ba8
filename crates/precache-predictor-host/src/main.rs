//! PreCache Predictor host: entry point.

use std::path::Path;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use precache_predictor::storage::{CONFIG_KEY, STATS_KEY};
use precache_predictor::{
    prefetch_all, Coordinator, HttpPrefetcher, HttpPrefetcherConfig, JsonFileStore,
    KeyValueStore, Message, PredictorConfig, PrefetchLevel, Settings, StatsRecord,
};
use precache_predictor_host::config::resolve_store_path;
use precache_predictor_host::protocol::ProtocolHandler;
use precache_predictor_host::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "precache-predictor-host",
    about = "Navigation prediction and prefetch coordinator, JSON-RPC over stdio",
    version
)]
struct Cli {
    /// Path to the JSON store file.
    #[arg(short, long)]
    store: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator over stdio (default).
    Serve {
        /// Path to the JSON store file.
        #[arg(short, long)]
        store: Option<String>,

        /// Prefetch request timeout in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },

    /// Print stored statistics as JSON.
    Stats,

    /// Check that the store file is readable.
    Validate,

    /// Predict next pages for a URL from stored history.
    Predict {
        url: String,

        /// Aggressiveness (low, medium, high). Defaults to the stored setting.
        #[arg(long)]
        level: Option<String>,

        /// Also prefetch the predicted pages.
        #[arg(long)]
        fetch: bool,
    },

    /// Print supported actions as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   precache-predictor-host completions bash > ~/.local/share/bash-completion/completions/precache-predictor-host
    ///   precache-predictor-host completions zsh > ~/.zfunc/_precache-predictor-host
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        store: None,
        timeout_ms: 10_000,
    }) {
        Commands::Serve { store, timeout_ms } => {
            let store_path = resolve_store_path(store.or(cli.store).as_deref());
            tracing::info!("PreCache Predictor host");
            tracing::info!("Store: {}", store_path.display());

            let store = Arc::new(JsonFileStore::open(&store_path).await?);
            let fetcher = Arc::new(HttpPrefetcher::new(HttpPrefetcherConfig {
                timeout_ms,
                ..HttpPrefetcherConfig::default()
            })?);
            let coordinator = Coordinator::load(store, fetcher, PredictorConfig::default()).await?;
            let (handle, task) = coordinator.spawn();

            let transport = StdioTransport::new(ProtocolHandler::new(handle));
            transport.run().await?;

            // Dropping the transport drops the last handle; wait for pending
            // fetches and writes to finish.
            drop(transport);
            task.await?;
        }

        Commands::Stats => {
            let store_path = resolve_store_path(cli.store.as_deref());
            let store = JsonFileStore::open(&store_path).await?;
            let (stats, history) = read_stats(&store).await?.decode()?;
            let summary = serde_json::json!({
                "store": store_path.display().to_string(),
                "stats": stats.snapshot(),
                "sourcePages": history.source_count(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Validate => {
            let store_path = resolve_store_path(cli.store.as_deref());
            match validate_store(&store_path).await {
                Ok((settings, pages)) => {
                    println!("Valid store: {}", store_path.display());
                    println!("  Active: {}", settings.is_active);
                    println!("  Prefetch level: {:?}", settings.prefetch_level);
                    println!("  Source pages: {pages}");
                }
                Err(e) => {
                    eprintln!("Invalid store: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Predict { url, level, fetch } => {
            let store_path = resolve_store_path(cli.store.as_deref());
            let store = JsonFileStore::open(&store_path).await?;
            let settings = read_settings(&store).await?;
            let (_, history) = read_stats(&store).await?.decode()?;

            let level = level
                .map(PrefetchLevel::from)
                .unwrap_or(settings.prefetch_level);
            let predicted = history.predict(&url, level);
            println!("{}", serde_json::to_string_pretty(&predicted)?);

            if fetch && !predicted.is_empty() {
                let fetcher = HttpPrefetcher::new(HttpPrefetcherConfig::default())?;
                let urls: Vec<String> = predicted.into_iter().map(|c| c.url).collect();
                for (url, result) in prefetch_all(&fetcher, &urls, 4).await {
                    match result {
                        Ok(report) => eprintln!("{url}: {} in {}ms", report.status, report.elapsed_ms),
                        Err(e) => eprintln!("{url}: {e}"),
                    }
                }
            }
        }

        Commands::Info => {
            let info = serde_json::json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "transport": "stdio",
                "actions": Message::ACTIONS,
                "action_count": Message::ACTIONS.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "precache-predictor-host",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Read the stats record without writing anything back.
async fn read_stats(store: &JsonFileStore) -> anyhow::Result<StatsRecord> {
    Ok(match store.get(STATS_KEY).await? {
        Some(value) => serde_json::from_value(value)?,
        None => StatsRecord::empty(),
    })
}

async fn read_settings(store: &JsonFileStore) -> anyhow::Result<Settings> {
    Ok(match store.get(CONFIG_KEY).await? {
        Some(value) => serde_json::from_value(value)?,
        None => Settings::default(),
    })
}

/// Strict check: the file must exist and parse, and both keys must decode.
async fn validate_store(path: &Path) -> anyhow::Result<(Settings, usize)> {
    let bytes = tokio::fs::read(path).await?;
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)?;

    let settings = match raw.get(CONFIG_KEY) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => anyhow::bail!("missing \"{CONFIG_KEY}\" key"),
    };
    let record: StatsRecord = match raw.get(STATS_KEY) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => anyhow::bail!("missing \"{STATS_KEY}\" key"),
    };
    let (_, history) = record.decode()?;
    Ok((settings, history.source_count()))
}
