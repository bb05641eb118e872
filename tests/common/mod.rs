//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lotus_relay::config::Config;
use lotus_relay::localization::{LocalizationResolver, LocationEntry};
use lotus_relay::models::FeedKind;
use lotus_relay::notifications::channels::MemoryDeliveryTarget;
use lotus_relay::scheduler::Engine;
use lotus_relay::storage::MemorySubscriptionStore;
use lotus_relay::utils::error::FetchError;
use lotus_relay::worldstate::{RawSnapshot, SnapshotSource};
use serde_json::{json, Value};

pub const T0: i64 = 1_700_000_000_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

pub fn at(offset_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(T0 + offset_ms).unwrap()
}

/// Snapshot source whose body can be swapped between passes
#[derive(Default)]
pub struct ScriptedSource {
    body: Mutex<Option<Value>>,
    fetches: Mutex<usize>,
}

impl ScriptedSource {
    pub fn serving(body: Value) -> Arc<Self> {
        let source = Arc::new(Self::default());
        source.set(body);
        source
    }

    pub fn set(&self, body: Value) {
        *self.body.lock().unwrap() = Some(body);
    }

    /// Make every following fetch fail
    pub fn fail(&self) {
        *self.body.lock().unwrap() = None;
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self) -> Result<RawSnapshot, FetchError> {
        *self.fetches.lock().unwrap() += 1;
        match self.body.lock().unwrap().clone() {
            Some(body) => Ok(RawSnapshot::new(body)),
            None => Err(FetchError::Status(503)),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

pub fn resolver() -> Arc<LocalizationResolver> {
    let mut locations = HashMap::new();
    for (node, name, enemy, kind) in [
        ("SolNode1", "Galatea (Neptune)", Some("Corpus"), None),
        ("SolNode24", "Oro (Earth)", Some("Grineer"), None),
        ("SolNode64", "Elara (Jupiter)", Some("FC_CORPUS"), Some("MT_SURVIVAL")),
        ("SolNode147", "Cholistan (Europa)", Some("FC_INFESTATION"), Some("MT_DEFENSE")),
        ("EarthHUB", "Strata Relay (Earth)", None, None),
    ] {
        locations.insert(
            node.to_string(),
            LocationEntry {
                value: name.to_string(),
                enemy: enemy.map(str::to_string),
                mission_type: kind.map(str::to_string),
            },
        );
    }

    let mut dictionary = HashMap::new();
    for (key, value) in [
        ("MT_CAPTURE", "Capture"),
        ("MT_EXTERMINATION", "Extermination"),
        ("MT_SURVIVAL", "Survival"),
        ("MT_DEFENSE", "Defense"),
        ("FC_CORPUS", "Corpus"),
        ("FC_INFESTATION", "Infested"),
        ("/Lotus/Upgrades/Mods/Rifle/PrimedRifleDamageMod", "Primed Serration"),
    ] {
        dictionary.insert(key.to_string(), value.to_string());
    }

    Arc::new(LocalizationResolver::from_tables(locations, dictionary))
}

fn date(millis: i64) -> Value {
    json!({"$date": {"$numberLong": millis.to_string()}})
}

pub fn fissure(id: &str, node: &str, modifier: &str, activation: i64, expiry: i64) -> Value {
    json!({
        "_id": {"$oid": id},
        "Activation": date(activation),
        "Expiry": date(expiry),
        "Node": node,
        "MissionType": "MT_CAPTURE",
        "Modifier": modifier
    })
}

pub fn fissures(entries: Vec<Value>) -> Value {
    json!({"ActiveMissions": entries, "VoidStorms": []})
}

pub fn trader(id: &str, activation: i64, manifest: Value) -> Value {
    json!({
        "VoidTraders": [{
            "_id": {"$oid": id},
            "Activation": date(activation),
            "Expiry": date(activation + 2 * DAY_MS),
            "Character": "Baro'Ki Teel",
            "Node": "EarthHUB",
            "Manifest": manifest
        }]
    })
}

pub fn primed_manifest() -> Value {
    json!([
        {"ItemType": "/Lotus/StoreItems/Upgrades/Mods/Rifle/PrimedRifleDamageMod", "PrimePrice": 350, "RegularPrice": 110000}
    ])
}

/// Two consecutive arbitrations, the first starting at `start`
pub fn arbitrations(start: i64) -> Value {
    json!({
        "Arbitrations": [
            {"Activation": start, "Expiry": start + HOUR_MS, "Node": "SolNode64"},
            {"Activation": start + HOUR_MS, "Expiry": start + 2 * HOUR_MS, "Node": "SolNode147"}
        ]
    })
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Engine over in-memory components
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemorySubscriptionStore>,
    pub target: Arc<MemoryDeliveryTarget>,
    pub worldstate: Arc<ScriptedSource>,
    pub arbitration: Arc<ScriptedSource>,
}

pub fn harness(config: Config) -> Harness {
    let store = Arc::new(MemorySubscriptionStore::new());
    let target = Arc::new(MemoryDeliveryTarget::new());
    let worldstate = Arc::new(ScriptedSource::default());
    let arbitration = Arc::new(ScriptedSource::default());

    let engine = {
        let worldstate = Arc::clone(&worldstate);
        let arbitration = Arc::clone(&arbitration);
        Engine::assemble(&config, resolver(), store.clone(), target.clone(), move |kind| {
            let source: Arc<dyn SnapshotSource> = match kind {
                FeedKind::Arbitration => arbitration.clone(),
                FeedKind::Fissures | FeedKind::Trader => worldstate.clone(),
            };
            source
        })
    };

    Harness {
        engine,
        store,
        target,
        worldstate,
        arbitration,
    }
}

/// Config with short delivery limits for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.delivery.timeout_secs = 1;
    config.delivery.max_concurrent = 4;
    config
}
