//! Traveling merchant feed
//!
//! The `VoidTraders` section lists the merchant's next (or current) visit.
//! Only the earliest visit is tracked. Its manifest is only published once
//! the merchant has arrived, which is what makes the arrival worth a ping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{contains_any, Entity, Feed};
use crate::i18n::t;
use crate::localization::LocalizationResolver;
use crate::models::{ClassifiedEntity, FeedKind, LifecycleStatus};
use crate::notifications::{Embed, MessageContent};
use crate::scheduler::change::ChangeSet;
use crate::utils::error::ClassifyError;
use crate::utils::relative_time;
use crate::worldstate::{decode_entries, MongoDate, MongoId, RawSnapshot};

const EMBED_COLOR: u32 = 0x1ABC9C;

/// Items rendered as embed fields; the rest are summarized
const MAX_ITEM_FIELDS: usize = 24;

/// One offer in the merchant's manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraderItem {
    pub name: String,
    pub ducats: u32,
    pub credits: u64,
}

/// Trader-specific attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraderAttributes {
    pub character: String,
    pub items: Vec<TraderItem>,
}

/// Subscription criteria for the trader feed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraderCriteria {
    /// Relay names, matched as substrings of the location
    pub locations: Vec<String>,
    /// Wanted items, matched as substrings of item names in an active manifest
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTrader {
    #[serde(rename = "_id")]
    id: MongoId,
    activation: MongoDate,
    expiry: MongoDate,
    character: String,
    node: String,
    #[serde(default)]
    manifest: Vec<RawOffer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawOffer {
    item_type: String,
    #[serde(default)]
    prime_price: u32,
    #[serde(default)]
    regular_price: u64,
}

/// The traveling merchant feed
#[derive(Debug, Default, Clone, Copy)]
pub struct TraderFeed;

impl Feed for TraderFeed {
    type Attributes = TraderAttributes;
    type Criteria = TraderCriteria;

    fn kind(&self) -> FeedKind {
        FeedKind::Trader
    }

    fn classify(
        &self,
        snapshot: &RawSnapshot,
        resolver: &LocalizationResolver,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entity<Self>>, ClassifyError> {
        let mut traders: Vec<RawTrader> = decode_entries("trader", snapshot.section("VoidTraders")?);
        traders.sort_by_key(|raw| raw.activation);

        let raw = traders
            .into_iter()
            .next()
            .ok_or_else(|| ClassifyError::NoCurrentEntity("VoidTraders has no valid entry".to_string()))?;

        let items = raw
            .manifest
            .iter()
            .map(|offer| TraderItem {
                name: resolver.resolve(&offer.item_type),
                ducats: offer.prime_price,
                credits: offer.regular_price,
            })
            .collect();

        let character = resolver.resolve(&raw.character);

        Ok(vec![ClassifiedEntity {
            id: raw.id.as_str().to_string(),
            display_name: character.clone(),
            location_name: resolver.location(&raw.node).name,
            category: FeedKind::Trader.as_str().to_string(),
            activation_at: raw.activation.0,
            expiry_at: raw.expiry.0,
            status: LifecycleStatus::at(raw.activation.0, raw.expiry.0, now),
            extra: TraderAttributes { character, items },
        }])
    }

    fn select<'a>(
        &self,
        criteria: &Self::Criteria,
        entities: &'a [Entity<Self>],
    ) -> Vec<&'a Entity<Self>> {
        entities
            .iter()
            .take(1)
            .filter(|e| contains_any(&criteria.locations, &e.location_name))
            .filter(|e| {
                criteria.items.is_empty()
                    || (e.is_active()
                        && e.extra
                            .items
                            .iter()
                            .any(|item| contains_any(&criteria.items, &item.name)))
            })
            .collect()
    }

    fn render(&self, selected: &[&Entity<Self>], now: DateTime<Utc>) -> MessageContent {
        let Some(trader) = selected.first() else {
            return MessageContent::default();
        };

        let mut embed = Embed::new(t!(
            "render.trader.title",
            name = trader.display_name,
            location = trader.location_name
        ))
        .with_color(EMBED_COLOR)
        .with_timestamp(now);

        match trader.status_at(now) {
            LifecycleStatus::Upcoming => {
                embed = embed.with_description(format!(
                    "{} {}",
                    t!("render.trader.arrives"),
                    relative_time(trader.activation_at)
                ));
            }
            LifecycleStatus::Active => {
                embed = embed.with_description(format!(
                    "{} {}",
                    t!("render.trader.leaves"),
                    relative_time(trader.expiry_at)
                ));
                for item in trader.extra.items.iter().take(MAX_ITEM_FIELDS) {
                    embed = embed.with_field(
                        item.name.clone(),
                        t!("render.trader.price", ducats = item.ducats, credits = item.credits).to_string(),
                        true,
                    );
                }
                let hidden = trader.extra.items.len().saturating_sub(MAX_ITEM_FIELDS);
                if hidden > 0 {
                    embed = embed.with_field(
                        t!("render.trader.more").to_string(),
                        hidden.to_string(),
                        false,
                    );
                }
            }
            LifecycleStatus::Expired => {
                embed = embed.with_description(t!("render.trader.departed").to_string());
            }
        }

        MessageContent::embed(embed)
    }

    fn wants_ping(&self, selected: &[&Entity<Self>], changes: &ChangeSet) -> bool {
        selected
            .first()
            .is_some_and(|e| changes.became_active(&e.id) && !e.extra.items.is_empty())
    }

    fn ping_text(&self, selected: &[&Entity<Self>]) -> String {
        match selected.first() {
            Some(e) => t!(
                "render.trader.ping",
                name = e.display_name,
                location = e.location_name
            )
            .to_string(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::LocationEntry;
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};

    const T0: i64 = 1_700_000_000_000;

    fn resolver() -> LocalizationResolver {
        let mut locations = HashMap::new();
        locations.insert(
            "EarthHUB".to_string(),
            LocationEntry {
                value: "Strata Relay (Earth)".to_string(),
                enemy: None,
                mission_type: None,
            },
        );

        let mut dictionary = HashMap::new();
        dictionary.insert(
            "/Lotus/Types/Items/ShipDecos/BaroKiTeerBust".to_string(),
            "Baro Ki'Teer Bust".to_string(),
        );

        LocalizationResolver::from_tables(locations, dictionary)
    }

    fn snapshot(manifest: serde_json::Value) -> RawSnapshot {
        RawSnapshot::new(json!({
            "VoidTraders": [
                {"_id": {"$oid": "later"}, "Activation": {"$date": {"$numberLong": (T0 + 86_400_000).to_string()}},
                 "Expiry": {"$date": {"$numberLong": (T0 + 2 * 86_400_000).to_string()}},
                 "Character": "Baro'Ki Teel", "Node": "MercuryHUB"},
                {"_id": {"$oid": "baro"}, "Activation": {"$date": {"$numberLong": T0.to_string()}},
                 "Expiry": {"$date": {"$numberLong": (T0 + 172_800_000).to_string()}},
                 "Character": "Baro'Ki Teel", "Node": "EarthHUB", "Manifest": manifest}
            ]
        }))
    }

    fn manifest() -> serde_json::Value {
        json!([
            {"ItemType": "/Lotus/StoreItems/Types/Items/ShipDecos/BaroKiTeerBust", "PrimePrice": 350, "RegularPrice": 100000},
            {"ItemType": "/Lotus/StoreItems/Upgrades/Mods/Rifle/PrimedRifleDamageMod", "PrimePrice": 500, "RegularPrice": 200000}
        ])
    }

    fn at(offset_ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(T0 + offset_ms).unwrap()
    }

    #[test]
    fn test_classify_primary_entity() {
        let entities = TraderFeed.classify(&snapshot(manifest()), &resolver(), at(-1000)).unwrap();

        assert_eq!(entities.len(), 1);
        let baro = &entities[0];
        assert_eq!(baro.id, "baro");
        assert_eq!(baro.location_name, "Strata Relay (Earth)");
        assert_eq!(baro.status, LifecycleStatus::Upcoming);
        assert_eq!(baro.extra.items[0].name, "Baro Ki'Teer Bust");
        assert_eq!(baro.extra.items[1].name, "PrimedRifleDamageMod");
    }

    #[test]
    fn test_classify_without_entries() {
        let empty = RawSnapshot::new(json!({"VoidTraders": []}));
        assert!(matches!(
            TraderFeed.classify(&empty, &resolver(), at(0)),
            Err(ClassifyError::NoCurrentEntity(_))
        ));

        let missing = RawSnapshot::new(json!({}));
        assert!(matches!(
            TraderFeed.classify(&missing, &resolver(), at(0)),
            Err(ClassifyError::MissingSection(_))
        ));
    }

    #[test]
    fn test_item_criteria_require_active_manifest() {
        let criteria = TraderFeed.parse_criteria(&json!({"items": ["primed"]})).unwrap();

        let upcoming = TraderFeed.classify(&snapshot(json!([])), &resolver(), at(-1000)).unwrap();
        assert!(TraderFeed.select(&criteria, &upcoming).is_empty());

        let active = TraderFeed.classify(&snapshot(manifest()), &resolver(), at(1000)).unwrap();
        assert_eq!(TraderFeed.select(&criteria, &active).len(), 1);

        let relay = TraderFeed.parse_criteria(&json!({"locations": ["Larunda"]})).unwrap();
        assert!(TraderFeed.select(&relay, &active).is_empty());
    }

    #[test]
    fn test_ping_on_arrival_with_manifest() {
        let active = TraderFeed.classify(&snapshot(manifest()), &resolver(), at(1000)).unwrap();
        let selected = TraderFeed.select(&TraderCriteria::default(), &active);

        let changes = ChangeSet {
            became_active: BTreeSet::from(["baro".to_string()]),
            status_changed: BTreeSet::from(["baro".to_string()]),
            ..ChangeSet::default()
        };
        assert!(TraderFeed.wants_ping(&selected, &changes));
        assert!(!TraderFeed.wants_ping(&selected, &ChangeSet::default()));

        let empty = TraderFeed.classify(&snapshot(json!([])), &resolver(), at(1000)).unwrap();
        let selected = TraderFeed.select(&TraderCriteria::default(), &empty);
        assert!(!TraderFeed.wants_ping(&selected, &changes));
    }

    #[test]
    fn test_render_active_lists_items() {
        let active = TraderFeed.classify(&snapshot(manifest()), &resolver(), at(1000)).unwrap();
        let selected = TraderFeed.select(&TraderCriteria::default(), &active);

        let embed = TraderFeed.render(&selected, at(1000)).embed.unwrap();
        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].name, "Baro Ki'Teer Bust");
        assert!(embed.fields[0].value.contains("350"));
    }
}
