//! Game-data localization lookups
//!
//! Turns opaque upstream identifiers (`SolNode129`, `MT_SURVIVAL`,
//! `/Lotus/StoreItems/Types/Items/ShipDecos/Foo`) into display strings using
//! two static tables shipped with each game release:
//!
//! - a location table keyed by node id, carrying the node name, the enemy
//!   faction and the mission type played there
//! - a flat translation dictionary keyed by internal identifier
//!
//! Both tables are read once and never invalidated. Resolution follows a
//! fixed fallback chain: exact dictionary hit, then the identifier's last
//! path segment, then the raw identifier unchanged.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::config::LocalizationConfig;
use crate::error::{Error, Result};
use crate::utils::last_path_segment;

static GLOBAL_RESOLVER: OnceLock<Arc<LocalizationResolver>> = OnceLock::new();

/// One entry of the location table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationEntry {
    /// Display name, e.g. "Mot (Void)"
    pub value: String,

    /// Enemy faction controlling the node
    #[serde(default)]
    pub enemy: Option<String>,

    /// Mission type played on the node
    #[serde(default, rename = "type")]
    pub mission_type: Option<String>,
}

/// Resolved view of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationInfo {
    pub name: String,
    pub enemy: Option<String>,
    pub mission_type: Option<String>,
}

/// Fixed identifier to display-category renames, consulted before generic resolution
#[derive(Debug, Clone, Copy)]
pub struct OverrideTable(pub &'static [(&'static str, &'static str)]);

impl OverrideTable {
    /// Look up an override for an identifier
    pub fn get(&self, identifier: &str) -> Option<&'static str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(identifier))
            .map(|(_, value)| *value)
    }
}

/// Read-only lookup service over the two static tables
#[derive(Debug, Default)]
pub struct LocalizationResolver {
    locations: HashMap<String, LocationEntry>,
    dictionary: HashMap<String, String>,
}

impl LocalizationResolver {
    /// Build a resolver from in-memory tables
    pub fn from_tables(
        locations: HashMap<String, LocationEntry>,
        dictionary: HashMap<String, String>,
    ) -> Self {
        let dictionary = dictionary
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        Self {
            locations,
            dictionary,
        }
    }

    /// Load both tables from disk
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a table is missing or malformed; the
    /// engine must not start without them.
    pub fn load(config: &LocalizationConfig) -> Result<Self> {
        let locations: HashMap<String, LocationEntry> =
            read_table(&config.locations_path, "location table")?;
        let dictionary: HashMap<String, String> =
            read_table(&config.dictionary_path, "translation dictionary")?;

        tracing::info!(
            locations = locations.len(),
            dictionary = dictionary.len(),
            "Localization tables loaded"
        );

        Ok(Self::from_tables(locations, dictionary))
    }

    /// Get the process-wide resolver, loading it on first use
    ///
    /// Later calls return the already loaded instance regardless of `config`.
    pub fn global(config: &LocalizationConfig) -> Result<Arc<Self>> {
        if let Some(resolver) = GLOBAL_RESOLVER.get() {
            return Ok(Arc::clone(resolver));
        }

        let loaded = Arc::new(Self::load(config)?);
        Ok(Arc::clone(GLOBAL_RESOLVER.get_or_init(|| loaded)))
    }

    /// Number of (location, dictionary) entries
    pub fn len(&self) -> (usize, usize) {
        (self.locations.len(), self.dictionary.len())
    }

    /// Resolve an identifier to a display string
    ///
    /// Order: exact dictionary key (case-insensitive, also with the
    /// `/StoreItems` path component removed), then the last path segment,
    /// then the raw identifier.
    pub fn resolve(&self, identifier: &str) -> String {
        if let Some(name) = self.lookup(identifier) {
            return name.to_string();
        }

        match last_path_segment(identifier) {
            Some(segment) => segment.to_string(),
            None => identifier.to_string(),
        }
    }

    /// Resolve a node id to its location metadata
    pub fn location(&self, node: &str) -> LocationInfo {
        match self.locations.get(node) {
            Some(entry) => LocationInfo {
                name: entry.value.clone(),
                enemy: entry.enemy.clone(),
                mission_type: entry.mission_type.clone(),
            },
            None => LocationInfo {
                name: self.resolve(node),
                enemy: None,
                mission_type: None,
            },
        }
    }

    fn lookup(&self, identifier: &str) -> Option<&str> {
        let key = identifier.to_ascii_lowercase();
        if let Some(name) = self.dictionary.get(&key) {
            return Some(name);
        }

        let without_store = key.replace("/storeitems", "");
        if without_store != key {
            return self.dictionary.get(&without_store).map(String::as_str);
        }

        None
    }
}

fn read_table<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read {what} at {}: {e}", path.display()))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        Error::config(format!("Failed to parse {what} at {}: {e}", path.display()))
    })
}
