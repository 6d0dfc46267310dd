use anyhow::{bail, Context};
use clap::Parser;
use condenser_client::CondenserApiClient;
use std::path::PathBuf;
use std::sync::Arc;
use thread_aggregator::{node_count, AggregateStore, ProfileCache, StoreOptions};
use threadline_core::{AppConfig, ErrorReporter, NodeKey};
use tracing_subscriber::EnvFilter;

/// Fetch a post and its whole reply tree and print it as JSON.
#[derive(Debug, Parser)]
#[command(name = "threadline", version)]
struct Cli {
    /// Post to fetch: `author/permlink`, `@author/permlink` or a post URL
    target: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deepest reply depth to expand (direct replies are depth 0)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(max_depth) = cli.max_depth {
        config.max_depth = max_depth;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let key = parse_target(&cli.target)?;
    tracing::info!("Fetching {} from {}", key, config.rpc_url);

    let client = Arc::new(CondenserApiClient::new(&config)?);
    let store = AggregateStore::from_sources(
        key,
        client.clone(),
        client.clone(),
        Arc::new(ProfileCache::new()),
        StoreOptions::from(&config),
    );

    store.refresh_all().await;
    let state = store.state();

    let reporter = ErrorReporter::new();
    if let Some(error) = &state.root_error {
        reporter.report_descriptor("post", error);
    }
    if let Some(error) = &state.tree_error {
        reporter.report_descriptor("comments", error);
    }

    let output = if cli.compact {
        serde_json::to_string(&state)?
    } else {
        serde_json::to_string_pretty(&state)?
    };
    println!("{}", output);

    let metrics = client.get_metrics().await;
    tracing::info!(
        "{} replies in {} RPC calls ({} failed, avg {:?})",
        node_count(&state.tree),
        metrics.total_requests,
        metrics.failed_requests,
        metrics.average_response_time()
    );

    if state.root_error.is_some() {
        bail!("post could not be loaded");
    }
    Ok(())
}

/// Accepts `author/permlink`, `@author/permlink`, or any URL whose last two
/// path segments are `@author/permlink`.
fn parse_target(target: &str) -> anyhow::Result<NodeKey> {
    let trimmed = target.trim().trim_end_matches('/');
    let mut segments = trimmed.rsplit('/');
    let permlink = segments.next().unwrap_or_default();
    let author = segments.next().unwrap_or_default();

    let author = if trimmed.contains("://") {
        match author.strip_prefix('@') {
            Some(author) => author,
            None => bail!("expected a post URL ending in /@author/permlink: {}", target),
        }
    } else {
        author.trim_start_matches('@')
    };

    if author.is_empty() || permlink.is_empty() {
        bail!("expected author/permlink, got {:?}", target);
    }
    Ok(NodeKey::new(author, permlink))
}
