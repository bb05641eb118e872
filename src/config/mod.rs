//! Configuration management for lotus-relay
//!
//! Settings are resolved once per process from environment variables or a
//! TOML file, validated, and then handed to the engine by reference.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::FeedKind;

/// Default world-state document
pub const DEFAULT_WORLDSTATE_URL: &str = "https://api.warframe.com/cdn/worldState.php";

/// Default hourly arbitration schedule
pub const DEFAULT_ARBITRATION_URL: &str = "https://browse.wf/arbys.json";

/// Default Discord REST base
pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream endpoints
    pub worldstate: WorldStateConfig,

    /// Per-feed scheduling
    pub feeds: FeedsConfig,

    /// Delivery target settings
    pub delivery: DeliveryConfig,

    /// Subscription store
    pub storage: StorageConfig,

    /// Static game-data lookup tables
    pub localization: LocalizationConfig,

    /// Control API
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldStateConfig {
    /// World-state document URL (fissures, trader)
    pub url: String,

    /// Arbitration schedule URL
    pub arbitration_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent string
    pub user_agent: String,
}

/// Scheduling of a single feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSchedule {
    /// Whether the feed runs in this process
    pub enabled: bool,

    /// Seconds between scheduled passes
    pub interval_secs: u64,
}

impl FeedSchedule {
    const fn every(interval_secs: u64) -> Self {
        Self {
            enabled: true,
            interval_secs,
        }
    }

    /// Get the interval as Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Scheduling of all feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub fissures: FeedSchedule,
    pub trader: FeedSchedule,
    pub arbitration: FeedSchedule,
}

impl FeedsConfig {
    /// Get the schedule for a feed
    pub fn schedule(&self, feed: FeedKind) -> FeedSchedule {
        match feed {
            FeedKind::Fissures => self.fissures,
            FeedKind::Trader => self.trader,
            FeedKind::Arbitration => self.arbitration,
        }
    }

    fn schedule_mut(&mut self, feed: FeedKind) -> &mut FeedSchedule {
        match feed {
            FeedKind::Fissures => &mut self.fissures,
            FeedKind::Trader => &mut self.trader,
            FeedKind::Arbitration => &mut self.arbitration,
        }
    }

    /// Feeds enabled in this process
    pub fn enabled(&self) -> Vec<FeedKind> {
        FeedKind::ALL
            .into_iter()
            .filter(|feed| self.schedule(*feed).enabled)
            .collect()
    }
}

/// Delivery target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// REST API base URL
    pub api_base: String,

    /// Bot token; never serialized back out
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,

    /// Per-subscription delivery timeout in seconds
    pub timeout_secs: u64,

    /// Seconds before a transient ping message is deleted
    pub ping_delete_secs: u64,

    /// Maximum deliveries in flight per pass
    pub max_concurrent: usize,
}

/// Subscription store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Locations of the static game-data tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Node metadata table (name, enemy, mission type)
    pub locations_path: PathBuf,

    /// Flat identifier to display-name dictionary
    pub dictionary_path: PathBuf,
}

/// Control API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Whether `run` starts the HTTP control API
    pub enabled: bool,

    /// Bind address
    pub bind: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn default_user_agent() -> String {
    format!("lotus-relay/{}", env!("CARGO_PKG_VERSION"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Default for WorldStateConfig {
    fn default() -> Self {
        Self {
            url: String::from(DEFAULT_WORLDSTATE_URL),
            arbitration_url: String::from(DEFAULT_ARBITRATION_URL),
            timeout_secs: 10,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            fissures: FeedSchedule::every(60),
            trader: FeedSchedule::every(300),
            arbitration: FeedSchedule::every(120),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_base: String::from(DEFAULT_DISCORD_API),
            bot_token: None,
            timeout_secs: 15,
            ping_delete_secs: 10,
            max_concurrent: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/subscriptions.db"),
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            locations_path: PathBuf::from("data/locations.json"),
            dictionary_path: PathBuf::from("data/dictionary.json"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: String::from("127.0.0.1:8090"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RELAY_WORLDSTATE_URL") {
            config.worldstate.url = url;
        }
        if let Ok(url) = std::env::var("RELAY_ARBITRATION_URL") {
            config.worldstate.arbitration_url = url;
        }
        if let Some(secs) = env_parse("RELAY_FETCH_TIMEOUT") {
            config.worldstate.timeout_secs = secs;
        }
        if let Ok(agent) = std::env::var("RELAY_USER_AGENT") {
            config.worldstate.user_agent = agent;
        }

        for feed in FeedKind::ALL {
            let prefix = format!("RELAY_{}", feed.as_str().to_ascii_uppercase());
            let schedule = config.feeds.schedule_mut(feed);
            if let Some(enabled) = env_parse(&format!("{prefix}_ENABLED")) {
                schedule.enabled = enabled;
            }
            if let Some(secs) = env_parse(&format!("{prefix}_INTERVAL")) {
                schedule.interval_secs = secs;
            }
        }

        if let Ok(base) = std::env::var("RELAY_DISCORD_API") {
            config.delivery.api_base = base;
        }
        config.delivery.bot_token = std::env::var("DISCORD_BOT_TOKEN")
            .or_else(|_| std::env::var("RELAY_BOT_TOKEN"))
            .ok();
        if let Some(secs) = env_parse("RELAY_DELIVERY_TIMEOUT") {
            config.delivery.timeout_secs = secs;
        }
        if let Some(secs) = env_parse("RELAY_PING_DELETE_SECS") {
            config.delivery.ping_delete_secs = secs;
        }
        if let Some(n) = env_parse("RELAY_MAX_CONCURRENT") {
            config.delivery.max_concurrent = n;
        }

        if let Ok(path) = std::env::var("RELAY_SQLITE_PATH") {
            config.storage.sqlite_path = path.into();
        }
        if let Ok(path) = std::env::var("RELAY_LOCATIONS_PATH") {
            config.localization.locations_path = path.into();
        }
        if let Ok(path) = std::env::var("RELAY_DICTIONARY_PATH") {
            config.localization.dictionary_path = path.into();
        }

        if let Some(enabled) = env_parse("RELAY_API_ENABLED") {
            config.api.enabled = enabled;
        }
        if let Ok(bind) = std::env::var("RELAY_API_BIND") {
            config.api.bind = bind;
        }

        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("RELAY_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    ///
    /// A file without a bot token picks it up from `DISCORD_BOT_TOKEN`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        if config.delivery.bot_token.is_none() {
            config.delivery.bot_token = std::env::var("DISCORD_BOT_TOKEN").ok();
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("worldstate.url", &self.worldstate.url),
            ("worldstate.arbitration_url", &self.worldstate.arbitration_url),
            ("delivery.api_base", &self.delivery.api_base),
        ] {
            let parsed = url::Url::parse(url).with_context(|| format!("{name} is not a valid URL"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{name} must use http or https");
            }
        }

        if self.worldstate.timeout_secs == 0 {
            anyhow::bail!("worldstate.timeout_secs must be greater than 0");
        }

        for feed in FeedKind::ALL {
            let schedule = self.feeds.schedule(feed);
            if schedule.enabled && schedule.interval_secs == 0 {
                anyhow::bail!("feeds.{feed}.interval_secs must be greater than 0");
            }
        }

        if self.delivery.timeout_secs == 0 {
            anyhow::bail!("delivery.timeout_secs must be greater than 0");
        }

        if self.delivery.max_concurrent == 0 {
            anyhow::bail!("delivery.max_concurrent must be greater than 0");
        }

        if self.api.enabled {
            self.api
                .bind
                .parse::<SocketAddr>()
                .with_context(|| format!("api.bind '{}' is not a socket address", self.api.bind))?;
        }

        if !["text", "json"].contains(&self.logging.format.as_str()) {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Check that the static lookup tables exist
    ///
    /// Kept apart from `validate` so tests can build configs without files.
    pub fn validate_lookup_files(&self) -> Result<()> {
        for path in [
            &self.localization.locations_path,
            &self.localization.dictionary_path,
        ] {
            if !path.is_file() {
                anyhow::bail!("Lookup table not found: {}", path.display());
            }
        }

        Ok(())
    }

    /// Get fetch timeout as Duration
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.worldstate.timeout_secs)
    }

    /// Get per-subscription delivery timeout as Duration
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.timeout_secs)
    }

    /// Get transient ping lifetime as Duration
    #[must_use]
    pub fn ping_delete_after(&self) -> Duration {
        Duration::from_secs(self.delivery.ping_delete_secs)
    }

    /// Set the world-state URL
    #[must_use]
    pub fn with_worldstate_url(mut self, url: impl Into<String>) -> Self {
        self.worldstate.url = url.into();
        self
    }

    /// Set the arbitration URL
    #[must_use]
    pub fn with_arbitration_url(mut self, url: impl Into<String>) -> Self {
        self.worldstate.arbitration_url = url.into();
        self
    }

    /// Set the SQLite path
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.sqlite_path = path.into();
        self
    }

    /// Set both lookup table paths
    #[must_use]
    pub fn with_lookup_tables(
        mut self,
        locations: impl Into<PathBuf>,
        dictionary: impl Into<PathBuf>,
    ) -> Self {
        self.localization.locations_path = locations.into();
        self.localization.dictionary_path = dictionary.into();
        self
    }

    /// Enable or disable a feed
    #[must_use]
    pub fn with_feed_enabled(mut self, feed: FeedKind, enabled: bool) -> Self {
        self.feeds.schedule_mut(feed).enabled = enabled;
        self
    }
}
