//! Void fissure feed
//!
//! Reads `ActiveMissions` (star-chart fissures) and `VoidStorms` (railjack
//! fissures) from the world-state document. Every fissure is its own
//! entity; a subscription sees the list filtered by its criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{matches_any, Entity, Feed};
use crate::i18n::t;
use crate::localization::{LocalizationResolver, OverrideTable};
use crate::models::{ClassifiedEntity, FeedKind, LifecycleStatus};
use crate::notifications::{Embed, MessageContent};
use crate::scheduler::change::ChangeSet;
use crate::utils::error::ClassifyError;
use crate::utils::relative_time;
use crate::worldstate::{decode_entries, MongoDate, MongoId, RawSnapshot};

const EMBED_COLOR: u32 = 0x8E44AD;

/// Generic upstream label shared by the open-world nodes
const LANDSCAPE_MISSION: &str = "MT_LANDSCAPE";

/// Open-world nodes renamed before generic mission-type resolution
pub const OPEN_WORLD_OVERRIDES: OverrideTable = OverrideTable(&[
    ("SolNode228", "Plains of Eidolon"),
    ("SolNode129", "Orb Vallis"),
    ("SolNode229", "Cambion Drift"),
]);

/// Relic tier of a fissure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RelicTier {
    Lith,
    Meso,
    Neo,
    Axi,
    Requiem,
    Omnia,
}

impl RelicTier {
    /// Parse the upstream `VoidT*` modifier
    pub fn from_modifier(modifier: &str) -> Option<Self> {
        match modifier {
            "VoidT1" => Some(Self::Lith),
            "VoidT2" => Some(Self::Meso),
            "VoidT3" => Some(Self::Neo),
            "VoidT4" => Some(Self::Axi),
            "VoidT5" => Some(Self::Requiem),
            "VoidT6" => Some(Self::Omnia),
            _ => None,
        }
    }

    /// Canonical name used in criteria
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lith => "Lith",
            Self::Meso => "Meso",
            Self::Neo => "Neo",
            Self::Axi => "Axi",
            Self::Requiem => "Requiem",
            Self::Omnia => "Omnia",
        }
    }

    /// Localized display name
    pub fn label(&self) -> String {
        match self {
            Self::Lith => t!("render.tiers.lith").to_string(),
            Self::Meso => t!("render.tiers.meso").to_string(),
            Self::Neo => t!("render.tiers.neo").to_string(),
            Self::Axi => t!("render.tiers.axi").to_string(),
            Self::Requiem => t!("render.tiers.requiem").to_string(),
            Self::Omnia => t!("render.tiers.omnia").to_string(),
        }
    }
}

/// Fissure-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FissureAttributes {
    pub tier: RelicTier,
    pub mission_type: String,
    pub enemy: Option<String>,
    pub steel_path: bool,
    pub void_storm: bool,
}

/// Subscription criteria for the fissure feed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FissureCriteria {
    /// Relic tiers, e.g. `["Axi", "Omnia"]`
    pub tiers: Vec<String>,
    /// Resolved mission types, e.g. `["Survival"]`
    pub mission_types: Vec<String>,
    /// `Some(true)` steel path only, `Some(false)` normal only, `None` both
    pub steel_path: Option<bool>,
    /// Railjack void storms instead of star-chart fissures
    pub void_storms: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFissure {
    #[serde(rename = "_id")]
    id: MongoId,
    activation: MongoDate,
    expiry: MongoDate,
    node: String,
    mission_type: String,
    modifier: String,
    #[serde(default)]
    hard: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVoidStorm {
    #[serde(rename = "_id")]
    id: MongoId,
    activation: MongoDate,
    expiry: MongoDate,
    node: String,
    active_mission_tier: String,
}

/// The void fissure feed
#[derive(Debug, Default, Clone, Copy)]
pub struct FissureFeed;

impl FissureFeed {
    fn mission_type(resolver: &LocalizationResolver, node: &str, mission_type: &str) -> String {
        match OPEN_WORLD_OVERRIDES.get(node) {
            Some(category) if mission_type == LANDSCAPE_MISSION => category.to_string(),
            _ => resolver.resolve(mission_type),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn entity(
        resolver: &LocalizationResolver,
        id: &MongoId,
        activation: MongoDate,
        expiry: MongoDate,
        node: &str,
        tier: RelicTier,
        mission_type: String,
        steel_path: bool,
        void_storm: bool,
        now: DateTime<Utc>,
    ) -> Entity<Self> {
        let location = resolver.location(node);

        ClassifiedEntity {
            id: id.as_str().to_string(),
            display_name: format!("{} {}", tier.label(), mission_type),
            location_name: location.name,
            category: tier.as_str().to_string(),
            activation_at: activation.0,
            expiry_at: expiry.0,
            status: LifecycleStatus::at(activation.0, expiry.0, now),
            extra: FissureAttributes {
                tier,
                mission_type,
                enemy: location.enemy,
                steel_path,
                void_storm,
            },
        }
    }

    fn tier_or_warn(modifier: &str, id: &MongoId) -> Option<RelicTier> {
        let tier = RelicTier::from_modifier(modifier);
        if tier.is_none() {
            tracing::warn!(feed = "fissures", entity_id = id.as_str(), modifier = modifier, "Unknown relic tier, dropping entry");
        }
        tier
    }
}

impl Feed for FissureFeed {
    type Attributes = FissureAttributes;
    type Criteria = FissureCriteria;

    fn kind(&self) -> FeedKind {
        FeedKind::Fissures
    }

    fn classify(
        &self,
        snapshot: &RawSnapshot,
        resolver: &LocalizationResolver,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entity<Self>>, ClassifyError> {
        let missions: Vec<RawFissure> = decode_entries("fissures", snapshot.section("ActiveMissions")?);
        let storms: Vec<RawVoidStorm> = snapshot
            .section("VoidStorms")
            .map(|entries| decode_entries("fissures", entries))
            .unwrap_or_default();

        let mut entities: Vec<Entity<Self>> = missions
            .iter()
            .filter_map(|raw| {
                let tier = Self::tier_or_warn(&raw.modifier, &raw.id)?;
                let mission_type = Self::mission_type(resolver, &raw.node, &raw.mission_type);
                Some(Self::entity(
                    resolver, &raw.id, raw.activation, raw.expiry, &raw.node, tier, mission_type, raw.hard,
                    false, now,
                ))
            })
            .collect();

        entities.extend(storms.iter().filter_map(|raw| {
            let tier = Self::tier_or_warn(&raw.active_mission_tier, &raw.id)?;
            let mission_type = resolver
                .location(&raw.node)
                .mission_type
                .unwrap_or_else(|| t!("render.fissures.void_storm").to_string());
            Some(Self::entity(
                resolver, &raw.id, raw.activation, raw.expiry, &raw.node, tier, mission_type, false, true,
                now,
            ))
        }));

        entities.sort_by(|a, b| {
            a.extra
                .tier
                .cmp(&b.extra.tier)
                .then_with(|| a.expiry_at.cmp(&b.expiry_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(entities)
    }

    fn select<'a>(
        &self,
        criteria: &Self::Criteria,
        entities: &'a [Entity<Self>],
    ) -> Vec<&'a Entity<Self>> {
        entities
            .iter()
            .filter(|e| e.status != LifecycleStatus::Expired)
            .filter(|e| e.extra.void_storm == criteria.void_storms)
            .filter(|e| criteria.steel_path.map_or(true, |sp| e.extra.steel_path == sp))
            .filter(|e| matches_any(&criteria.tiers, e.extra.tier.as_str()))
            .filter(|e| matches_any(&criteria.mission_types, &e.extra.mission_type))
            .collect()
    }

    fn render(&self, selected: &[&Entity<Self>], now: DateTime<Utc>) -> MessageContent {
        let lines: Vec<String> = selected
            .iter()
            .map(|e| {
                let mut line = format!(
                    "**{}** {} · {}",
                    e.extra.tier.label(),
                    e.extra.mission_type,
                    e.location_name
                );
                if let Some(enemy) = &e.extra.enemy {
                    line.push_str(&format!(" ({enemy})"));
                }
                if e.extra.steel_path {
                    line.push_str(&format!(" · {}", t!("render.fissures.steel_path")));
                }
                let timing = match e.status_at(now) {
                    LifecycleStatus::Upcoming => {
                        format!("{} {}", t!("render.starts"), relative_time(e.activation_at))
                    }
                    _ => format!("{} {}", t!("render.expires"), relative_time(e.expiry_at)),
                };
                format!("{line} · {timing}")
            })
            .collect();

        let title = if selected.iter().any(|e| e.extra.void_storm) {
            t!("render.fissures.storm_title").to_string()
        } else {
            t!("render.fissures.title").to_string()
        };

        MessageContent::embed(
            Embed::new(title)
                .with_description(lines.join("\n"))
                .with_color(EMBED_COLOR)
                .with_footer(t!("render.fissures.footer", count = selected.len()).to_string())
                .with_timestamp(now),
        )
    }

    fn wants_ping(&self, selected: &[&Entity<Self>], changes: &ChangeSet) -> bool {
        selected
            .iter()
            .any(|e| e.is_active() && (changes.is_changed(&e.id) || changes.became_active(&e.id)))
    }

    fn ping_text(&self, selected: &[&Entity<Self>]) -> String {
        let names: Vec<&str> = selected
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.display_name.as_str())
            .collect();

        t!("render.fissures.ping", names = names.join(", ")).to_string()
    }
}
