use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use listing_scout::core::config::load_config;
use listing_scout::scraping::BrowserSession;
use listing_scout::tools::{JsonLinesSink, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "listing-scout")]
#[command(about = "Crawl a commerce search engine from seed keywords into product records")]
#[command(version)]
struct Cli {
    /// Config file (default search: $LISTING_SCOUT_CONFIG, ./listing-scout.json, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Site key under `sites`
    #[arg(short, long)]
    site: Option<String>,

    /// Seed keyword; repeat to crawl several. Replaces the configured list.
    #[arg(short, long = "keyword")]
    keywords: Vec<String>,

    /// JSON-Lines output file (stdout when unset)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Search-result page cap per query
    #[arg(long)]
    max_pages: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Records may go to stdout; logs always go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if !cli.keywords.is_empty() {
        config.keywords = cli.keywords.clone();
    }
    if cli.headed {
        config.browser.headless = false;
    }
    if cli.output.is_some() {
        config.output = cli.output.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        let (key, _) = config.active_site(cli.site.as_deref())?;
        if let Some(site) = config.sites.get_mut(&key) {
            site.max_pages = max_pages;
        }
    }
    config
        .validate(cli.site.as_deref())
        .context("invalid configuration")?;

    let mut sink = match &config.output {
        Some(path) => JsonLinesSink::append(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?,
        None => JsonLinesSink::stdout(),
    };

    let session = BrowserSession::launch(&config.browser).await?;
    let pipeline = Pipeline::from_config(session, &config, cli.site.as_deref())?;
    info!("Starting listing-scout run {}", pipeline.run_id());

    let summary = pipeline
        .run_until(&config.keywords, &mut sink, shutdown_signal())
        .await?;

    info!("summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
