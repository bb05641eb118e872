use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lotus_relay::config::Config;
use lotus_relay::feeds::validate_criteria;
use lotus_relay::models::FeedKind;
use lotus_relay::scheduler::Engine;
use lotus_relay::storage::{create_sqlite_store, SubscriptionStore};
use lotus_relay::{api, i18n, metrics};

#[derive(Parser)]
#[command(
    name = "lotus-relay",
    version,
    about = "Relays world-state feeds (fissures, trader, arbitration) into community channels",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled feed until interrupted
    Run {
        /// Do not start the control API
        #[arg(long, default_value = "false")]
        no_api: bool,
    },

    /// Re-deliver a feed's current state to one community
    Trigger {
        /// Feed name (fissures, trader, arbitration)
        #[arg(short, long)]
        feed: String,

        /// Community whose subscriptions are refreshed
        #[arg(long)]
        community: String,
    },

    /// Create or update a subscription
    Subscribe {
        /// Feed name (fissures, trader, arbitration)
        #[arg(short, long)]
        feed: String,

        /// Community (guild) id
        #[arg(long)]
        community: String,

        /// Target channel id
        #[arg(long)]
        channel: String,

        /// Match criteria as JSON
        #[arg(long)]
        criteria: Option<String>,

        /// Role pinged when something new goes live
        #[arg(long)]
        ping: Option<String>,
    },

    /// Delete a subscription
    Unsubscribe {
        /// Subscription id
        #[arg(long)]
        id: String,
    },

    /// List subscriptions
    List {
        /// Only this feed
        #[arg(short, long)]
        feed: Option<String>,

        /// Only this community
        #[arg(long)]
        community: Option<String>,
    },

    /// Validate configuration and lookup tables
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;
    i18n::init_from_env();

    match cli.command {
        Commands::Run { no_api } => {
            tracing::info!(no_api = %no_api, "Starting relay");
            run(config, !no_api).await?;
        }

        Commands::Trigger { feed, community } => {
            tracing::info!(feed = %feed, community = %community, "Starting manual reconciliation");
            trigger(config, &feed, &community).await?;
        }

        Commands::Subscribe {
            feed,
            community,
            channel,
            criteria,
            ping,
        } => {
            subscribe(&config, &feed, &community, &channel, criteria.as_deref(), ping.as_deref())?;
        }

        Commands::Unsubscribe { id } => unsubscribe(&config, &id)?,

        Commands::List { feed, community } => list(&config, feed.as_deref(), community.as_deref())?,

        Commands::CheckConfig => check_config(&config)?,
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn parse_feed(raw: &str) -> Result<FeedKind> {
    raw.parse::<FeedKind>().map_err(|e| anyhow::anyhow!(e))
}

async fn run(config: Config, with_api: bool) -> Result<()> {
    config.validate_lookup_files()?;
    metrics::init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {e}"))?;

    let engine = Arc::new(Engine::from_config(&config)?);
    engine.start().await;

    let (stop_api, mut api_stopped) = tokio::sync::watch::channel(false);
    let api_task = if with_api && config.api.enabled {
        let addr: SocketAddr = config
            .api
            .bind
            .parse()
            .with_context(|| format!("Invalid API bind address: {}", config.api.bind))?;
        let engine = Arc::clone(&engine);
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = api_stopped.changed().await;
            };
            if let Err(e) = api::serve(addr, engine, shutdown).await {
                tracing::error!(error = %e, "Control API failed");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    stop_api.send_replace(true);
    engine.shutdown().await;
    if let Some(task) = api_task {
        task.await.context("Control API task panicked")?;
    }

    tracing::info!("Relay stopped");
    Ok(())
}

async fn trigger(config: Config, feed: &str, community: &str) -> Result<()> {
    config.validate_lookup_files()?;
    let engine = Engine::from_config(&config)?;

    let report = engine.trigger_manual_reconcile(feed, community).await?;
    // Let scheduled cleanups finish before the process exits
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn subscribe(
    config: &Config,
    feed: &str,
    community: &str,
    channel: &str,
    criteria: Option<&str>,
    ping_role: Option<&str>,
) -> Result<()> {
    let kind = parse_feed(feed)?;
    let criteria: serde_json::Value = match criteria {
        Some(raw) => serde_json::from_str(raw).context("Criteria must be valid JSON")?,
        None => serde_json::Value::Null,
    };
    validate_criteria(kind, &criteria).context("Criteria do not match the feed")?;

    let store = create_sqlite_store(&config.storage.sqlite_path)?;
    let subscription = store.upsert(kind, community, channel, &criteria, ping_role)?;

    println!("{}", serde_json::to_string_pretty(&subscription)?);
    Ok(())
}

fn unsubscribe(config: &Config, id: &str) -> Result<()> {
    let store = create_sqlite_store(&config.storage.sqlite_path)?;
    if store.delete(id)? {
        println!("Deleted subscription {id}");
    } else {
        anyhow::bail!("Subscription not found: {id}");
    }
    Ok(())
}

fn list(config: &Config, feed: Option<&str>, community: Option<&str>) -> Result<()> {
    let feeds = match feed {
        Some(raw) => vec![parse_feed(raw)?],
        None => FeedKind::ALL.to_vec(),
    };

    let store = create_sqlite_store(&config.storage.sqlite_path)?;
    for kind in feeds {
        let subscriptions = match community {
            Some(community) => store.list_by_community(kind, community)?,
            None => store.list_all(kind)?,
        };

        for sub in subscriptions {
            println!(
                "{}  {:<12} community={} channel={} ping={} message={}",
                sub.subscription_id,
                kind,
                sub.community_id,
                sub.target_channel_id,
                sub.ping_target_id.as_deref().unwrap_or("-"),
                sub.last_message_ref
                    .as_ref()
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
    }
    Ok(())
}

fn check_config(config: &Config) -> Result<()> {
    config.validate_lookup_files()?;
    let resolver = lotus_relay::localization::LocalizationResolver::load(&config.localization)?;
    let (locations, names) = resolver.len();

    println!("Configuration OK");
    println!("  World-state: {}", config.worldstate.url);
    println!("  Arbitration: {}", config.worldstate.arbitration_url);
    println!("  Store: {}", config.storage.sqlite_path.display());
    println!("  Lookup tables: {locations} locations, {names} names");
    for kind in config.feeds.enabled() {
        println!(
            "  Feed {kind}: every {}s",
            config.feeds.schedule(kind).interval().as_secs()
        );
    }
    if config.delivery.bot_token.is_none() {
        println!("  Warning: no bot token configured; `run` and `trigger` will fail");
    }
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("lotus_relay=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("lotus_relay={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
