//! Tests for config module

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use lotus_relay::config::{Config, DEFAULT_WORLDSTATE_URL};
use lotus_relay::models::FeedKind;
use serial_test::serial;
use tempfile::NamedTempFile;

const RELAY_VARS: &[&str] = &[
    "RELAY_WORLDSTATE_URL",
    "RELAY_TRADER_ENABLED",
    "RELAY_FISSURES_INTERVAL",
    "RELAY_DELIVERY_TIMEOUT",
    "RELAY_SQLITE_PATH",
    "RELAY_LOG_FORMAT",
    "DISCORD_BOT_TOKEN",
    "RELAY_BOT_TOKEN",
];

fn clear_env() {
    for var in RELAY_VARS {
        std::env::remove_var(var);
    }
}

fn set_env(key: &str, value: &str) {
    std::env::set_var(key, value);
}

#[test]
fn test_sample_config_is_valid() {
    let config = Config::from_file(Path::new("config.toml")).expect("config.toml should parse");
    assert!(config.validate().is_ok());
    assert_eq!(config.feeds.enabled().len(), 3);
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.worldstate.url, DEFAULT_WORLDSTATE_URL);
    assert!(config.delivery.bot_token.is_none());
    assert_eq!(config.feeds.enabled(), FeedKind::ALL.to_vec());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    set_env("RELAY_WORLDSTATE_URL", "http://127.0.0.1:9000/ws.json");
    set_env("RELAY_TRADER_ENABLED", "false");
    set_env("RELAY_FISSURES_INTERVAL", "30");
    set_env("RELAY_DELIVERY_TIMEOUT", "5");
    set_env("RELAY_SQLITE_PATH", "/tmp/relay.db");
    set_env("DISCORD_BOT_TOKEN", "secret-token");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.worldstate.url, "http://127.0.0.1:9000/ws.json");
    assert_eq!(
        config.feeds.enabled(),
        vec![FeedKind::Fissures, FeedKind::Arbitration]
    );
    assert_eq!(
        config.feeds.schedule(FeedKind::Fissures).interval(),
        Duration::from_secs(30)
    );
    assert_eq!(config.delivery_timeout(), Duration::from_secs(5));
    assert_eq!(config.storage.sqlite_path, Path::new("/tmp/relay.db"));
    assert_eq!(config.delivery.bot_token.as_deref(), Some("secret-token"));
}

#[test]
#[serial]
fn test_unparseable_env_value_keeps_default() {
    clear_env();
    set_env("RELAY_FISSURES_INTERVAL", "soon");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.feeds.schedule(FeedKind::Fissures).interval(),
        Duration::from_secs(60)
    );
}

#[test]
#[serial]
fn test_from_file_partial_sections() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[worldstate]
url = "http://localhost:8080/worldState.php"
timeout_secs = 3

[feeds.arbitration]
enabled = false
interval_secs = 120

[delivery]
bot_token = "from-file"
ping_delete_secs = 30

[logging]
format = "json"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());

    assert_eq!(config.worldstate.url, "http://localhost:8080/worldState.php");
    assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
    assert_eq!(config.feeds.enabled(), vec![FeedKind::Fissures, FeedKind::Trader]);
    assert_eq!(config.delivery.bot_token.as_deref(), Some("from-file"));
    assert_eq!(config.ping_delete_after(), Duration::from_secs(30));
    assert_eq!(config.logging.format, "json");
    // Untouched sections keep their defaults
    assert_eq!(config.delivery.max_concurrent, 4);
}

#[test]
#[serial]
fn test_from_file_token_falls_back_to_env() {
    clear_env();
    set_env("DISCORD_BOT_TOKEN", "env-token");

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[api]\nenabled = false").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    clear_env();

    assert_eq!(config.delivery.bot_token.as_deref(), Some("env-token"));
    assert!(!config.api.enabled);
}

#[test]
fn test_from_file_rejects_bad_toml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[worldstate\nurl = ").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse TOML"));
}

#[test]
fn test_missing_lookup_tables_detected() {
    let dir = tempfile::tempdir().unwrap();
    let locations = dir.path().join("locations.json");
    std::fs::write(&locations, "{}").unwrap();

    let config = Config::default().with_lookup_tables(&locations, dir.path().join("missing.json"));
    let err = config.validate_lookup_files().unwrap_err();
    assert!(err.to_string().contains("missing.json"));

    let config = Config::default().with_lookup_tables(&locations, &locations);
    assert!(config.validate_lookup_files().is_ok());
}
