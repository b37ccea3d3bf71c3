//! subfuse command-line interface
//!
//! Exit codes: 0 on success, 1 on handled errors, 2 on invalid usage
//! (clap's default).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use subfuse_cache::{
    DiskCache, MemoryCache, RedisCache, TieredCache, TieredCacheConfig,
};
use subfuse_core::{AppSettings, SecurityValidator, SourceTier};
use subfuse_fetch::{Fetcher, FetcherConfig, RetryPolicy};
use subfuse_jobs::{JobManager, JobManagerConfig};
use subfuse_parsers::ParserBank;
use subfuse_pipeline::{parse_formats, Merger, MergerConfig, Processor, ProgressFn};
use subfuse_server::{AppState, ServerConfig};
use subfuse_sources::SourceManager;

#[derive(Parser)]
#[command(name = "subfuse", version, about = "VPN subscription aggregation platform")]
struct Cli {
    /// Settings file; falls back to APP_CONFIG_PATH, then sources.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once and write outputs
    Process {
        /// Output directory
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Formats to emit (overrides the settings file)
        #[arg(long, value_delimiter = ',')]
        formats: Option<Vec<String>>,
    },
    /// Validate the settings file
    Validate,
    /// Start the HTTP API server
    Server,
    /// Manage sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Discover new sources from GitHub topics and Telegram channels
    Discover {
        /// GitHub API token
        #[arg(long, env = "GITHUB_TOKEN")]
        github_token: Option<String>,
        /// GitHub topics to scan (defaults to the built-in list)
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<String>>,
        /// Telegram channels to scan (defaults to the built-in list)
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,
        /// Reliability floor for registration
        #[arg(long, default_value_t = 0.3)]
        min_reliability: f64,
    },
    /// Query a running server's health endpoint
    Health,
    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum SourcesAction {
    /// Register a source
    Add {
        /// Subscription URL
        url: String,
        /// Tier name
        #[arg(long, default_value = "experimental")]
        tier: String,
        /// Weight in [0, 1]
        #[arg(long)]
        weight: Option<f64>,
    },
    /// List configured sources
    List,
    /// Remove a source
    Remove {
        /// Subscription URL
        url: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| std::env::var("APP_CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("sources.yaml"))
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Version => {
            println!("subfuse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Validate => validate(&config_path(&cli)).await,
        Command::Process {
            output_dir,
            formats,
        } => process(&config_path(&cli), output_dir, formats.as_deref()).await,
        Command::Server => server(&config_path(&cli)).await,
        Command::Sources { action } => sources(&config_path(&cli), action).await,
        Command::Discover {
            github_token,
            topics,
            channels,
            min_reliability,
        } => {
            discover(
                &config_path(&cli),
                github_token.clone(),
                topics.clone(),
                channels.clone(),
                *min_reliability,
            )
            .await
        }
        Command::Health => health().await,
    }
}

async fn build_cache(settings: &AppSettings) -> Arc<TieredCache> {
    let l1 = Arc::new(MemoryCache::new(subfuse_cache::MemoryCacheConfig {
        default_ttl: Some(std::time::Duration::from_secs(settings.cache.ttl)),
        ..Default::default()
    }));

    let l2: Option<Arc<dyn subfuse_cache::CacheBackend>> =
        match std::env::var("SUBFUSE_REDIS_URL") {
            Ok(url) => match RedisCache::connect(&url).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis tier unavailable, continuing without L2");
                    None
                }
            },
            Err(_) => None,
        };

    let l3: Option<Arc<dyn subfuse_cache::CacheBackend>> =
        match std::env::var("SUBFUSE_CACHE_DIR") {
            Ok(dir) => match DiskCache::with_dir(&dir).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    tracing::warn!(error = %e, "disk tier unavailable, continuing without L3");
                    None
                }
            },
            Err(_) => None,
        };

    Arc::new(TieredCache::new(l1, l2, l3, TieredCacheConfig::default()))
}

async fn build_merger(settings: &AppSettings) -> Result<Arc<Merger>> {
    let cache = build_cache(settings).await;

    let sources = Arc::new(
        SourceManager::new(SecurityValidator::default()).with_cache(Arc::clone(&cache)),
    );
    sources.load(settings).await;

    let fetcher_config = FetcherConfig {
        max_concurrent: settings.processing.max_concurrent,
        request_timeout: std::time::Duration::from_secs(settings.processing.timeout),
        retry: RetryPolicy {
            max_attempts: settings.processing.retry_attempts.max(1),
            ..Default::default()
        },
        cache_ttl: std::time::Duration::from_secs(settings.cache.ttl),
        ..Default::default()
    };
    let fetcher = Arc::new(
        Fetcher::new(fetcher_config)
            .map_err(|e| anyhow::anyhow!("failed to build fetcher: {}", e))?
            .with_cache(cache),
    );

    Ok(Arc::new(Merger::new(
        sources,
        fetcher,
        Arc::new(ParserBank::default()),
        Processor::new(SecurityValidator::default()),
        MergerConfig::default(),
    )))
}

async fn validate(config: &PathBuf) -> Result<()> {
    let settings = AppSettings::load(config)
        .with_context(|| format!("settings file {} is invalid", config.display()))?;
    println!(
        "{} {} sources across {} tiers, formats: {}",
        style("valid:").green().bold(),
        settings.source_count(),
        settings.sources.len(),
        settings.output.formats.join(", "),
    );
    Ok(())
}

async fn process(
    config: &PathBuf,
    output_dir: &PathBuf,
    formats: Option<&[String]>,
) -> Result<()> {
    let settings = AppSettings::load(config)
        .with_context(|| format!("cannot load settings from {}", config.display()))?;
    let format_names: Vec<String> = formats
        .map(|f| f.to_vec())
        .unwrap_or_else(|| settings.output.formats.clone());
    let formats = parse_formats(&format_names)?;

    let merger = build_merger(&settings).await?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_bar = bar.clone();
    let progress: ProgressFn = Arc::new(move |value, message: &str| {
        progress_bar.set_position((value * 100.0) as u64);
        progress_bar.set_message(message.to_string());
    });

    let report = merger
        .run(&formats, output_dir, &CancellationToken::new(), Some(progress))
        .await?;
    bar.finish_with_message("done");

    println!(
        "{} {} sources ({} ok), {} configurations, {} duplicates removed",
        style("pipeline:").green().bold(),
        report.sources_processed,
        report.successful_sources,
        report.configurations_found,
        report.duplicates_removed,
    );
    for (format, path) in &report.output_files {
        println!("  {} -> {}", format, path.display());
    }
    Ok(())
}

async fn server(config: &PathBuf) -> Result<()> {
    let settings = AppSettings::load(config)
        .with_context(|| format!("cannot load settings from {}", config.display()))?;

    let jobs = JobManager::new("jobs.json", JobManagerConfig::default()).await?;
    jobs.spawn_cleanup();

    let cache = build_cache(&settings).await;
    let state = AppState::new(jobs, Some(cache));

    let merger = build_merger(&settings).await?;
    state.set_merger(merger).await;
    info!("merger initialized");

    let server_config = ServerConfig::from_env();
    subfuse_server::serve(state, server_config)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {}", e))
}

async fn sources(config: &PathBuf, action: &SourcesAction) -> Result<()> {
    let settings = AppSettings::load(config)
        .with_context(|| format!("cannot load settings from {}", config.display()))?;
    let manager = SourceManager::new(SecurityValidator::default());
    manager.load(&settings).await;

    match action {
        SourcesAction::Add { url, tier, weight } => {
            let tier = SourceTier::parse(tier)
                .ok_or_else(|| anyhow::anyhow!("unknown tier: {}", tier))?;
            manager
                .add_source(url, tier, *weight)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("{} {}", style("added:").green().bold(), url);
        }
        SourcesAction::List => {
            let sources = manager.get_all_sources().await;
            if sources.is_empty() {
                println!("no sources configured");
            }
            for source in sources {
                let marker = if source.blacklisted {
                    style("blacklisted").red()
                } else if source.enabled {
                    style("enabled").green()
                } else {
                    style("disabled").yellow()
                };
                println!("{:>12}  {:<14} {}", marker, source.tier.as_str(), source.url);
            }
        }
        SourcesAction::Remove { url } => {
            if manager.remove_source(url).await {
                println!("{} {}", style("removed:").green().bold(), url);
            } else {
                println!("{} {}", style("not found:").yellow().bold(), url);
            }
        }
    }
    Ok(())
}

async fn discover(
    config: &PathBuf,
    github_token: Option<String>,
    topics: Option<Vec<String>>,
    channels: Option<Vec<String>>,
    min_reliability: f64,
) -> Result<()> {
    use subfuse_discovery::{
        DiscoveryService, GithubMonitor, GithubMonitorConfig, TelegramMonitor,
        TelegramMonitorConfig,
    };

    let settings = AppSettings::load(config)
        .with_context(|| format!("cannot load settings from {}", config.display()))?;
    let manager = Arc::new(SourceManager::new(SecurityValidator::default()));
    manager.load(&settings).await;
    let known_urls: std::collections::HashSet<String> = manager
        .get_all_sources()
        .await
        .into_iter()
        .map(|s| s.url)
        .collect();

    let mut github_config = GithubMonitorConfig {
        token: github_token,
        ..Default::default()
    };
    if let Some(topics) = topics {
        github_config.topics = topics;
    }
    let mut telegram_config = TelegramMonitorConfig::default();
    if let Some(channels) = channels {
        telegram_config.channels = channels;
    }

    let service = DiscoveryService::new(Arc::clone(&manager))
        .with_github(GithubMonitor::new(github_config).map_err(|e| anyhow::anyhow!("{}", e))?)
        .with_telegram(
            TelegramMonitor::new(telegram_config).map_err(|e| anyhow::anyhow!("{}", e))?,
        )
        .with_min_reliability(min_reliability);

    let report = service.run_once().await;
    println!(
        "{} {} candidates, {} registered ({} duplicate, {} invalid, {} below floor)",
        style("discovery:").green().bold(),
        report.discovered,
        report.registered,
        report.skipped_duplicate,
        report.skipped_invalid,
        report.skipped_low_reliability,
    );

    // List only what this pass added beyond the settings file.
    let added: Vec<_> = manager
        .get_all_sources()
        .await
        .into_iter()
        .filter(|s| !known_urls.contains(&s.url))
        .collect();
    if !added.is_empty() {
        for source in &added {
            println!("  {:.2}  {}", source.weight, source.url);
        }
        println!(
            "add the URLs you want to keep to {} (discovery does not rewrite it)",
            config.display()
        );
    }
    Ok(())
}

async fn health() -> Result<()> {
    let config = ServerConfig::from_env();
    let url = format!("http://{}:{}/health", config.host, config.port);
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("cannot reach {}", url))?;
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
