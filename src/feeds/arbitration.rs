//! Arbitration feed
//!
//! Arbitrations rotate hourly and come from a separate schedule document whose
//! `Arbitrations` section lists past, current and upcoming nodes. The feed
//! tracks the single entry active at classification time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{matches_any, Entity, Feed};
use crate::i18n::t;
use crate::localization::LocalizationResolver;
use crate::models::{ClassifiedEntity, FeedKind, LifecycleStatus};
use crate::notifications::{Embed, MessageContent};
use crate::scheduler::change::ChangeSet;
use crate::utils::error::ClassifyError;
use crate::utils::relative_time;
use crate::worldstate::{decode_entries, MongoDate, MongoId, RawSnapshot};

const EMBED_COLOR: u32 = 0xE67E22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationAttributes {
    pub node: String,
    pub mission_type: String,
    pub faction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArbitrationCriteria {
    pub mission_types: Vec<String>,
    pub factions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawArbitration {
    #[serde(rename = "_id", default)]
    id: Option<MongoId>,
    activation: MongoDate,
    expiry: MongoDate,
    node: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArbitrationFeed;

impl Feed for ArbitrationFeed {
    type Attributes = ArbitrationAttributes;
    type Criteria = ArbitrationCriteria;

    fn kind(&self) -> FeedKind {
        FeedKind::Arbitration
    }

    fn classify(
        &self,
        snapshot: &RawSnapshot,
        resolver: &LocalizationResolver,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entity<Self>>, ClassifyError> {
        let entries: Vec<RawArbitration> =
            decode_entries("arbitration", snapshot.section("Arbitrations")?);

        let raw = entries
            .into_iter()
            .find(|raw| {
                LifecycleStatus::at(raw.activation.0, raw.expiry.0, now) == LifecycleStatus::Active
            })
            .ok_or_else(|| {
                ClassifyError::NoCurrentEntity(format!("no arbitration active at {}", now.to_rfc3339()))
            })?;

        let info = resolver.location(&raw.node);
        let mission_type = info
            .mission_type
            .map(|m| resolver.resolve(&m))
            .unwrap_or_else(|| t!("render.arbitration.unknown").to_string());
        let faction = info
            .enemy
            .map(|f| resolver.resolve(&f))
            .unwrap_or_else(|| t!("render.arbitration.unknown").to_string());

        let id = match &raw.id {
            Some(id) => id.as_str().to_string(),
            None => format!("{}:{}", raw.node, raw.activation.0.timestamp_millis()),
        };

        Ok(vec![ClassifiedEntity {
            id,
            display_name: format!("{mission_type} - {faction}"),
            location_name: info.name,
            category: mission_type.clone(),
            activation_at: raw.activation.0,
            expiry_at: raw.expiry.0,
            status: LifecycleStatus::Active,
            extra: ArbitrationAttributes {
                node: raw.node,
                mission_type,
                faction,
            },
        }])
    }

    fn select<'a>(
        &self,
        criteria: &Self::Criteria,
        entities: &'a [Entity<Self>],
    ) -> Vec<&'a Entity<Self>> {
        entities
            .iter()
            .filter(|e| e.status != LifecycleStatus::Expired)
            .filter(|e| matches_any(&criteria.mission_types, &e.extra.mission_type))
            .filter(|e| matches_any(&criteria.factions, &e.extra.faction))
            .collect()
    }

    fn render(&self, selected: &[&Entity<Self>], now: DateTime<Utc>) -> MessageContent {
        let Some(arbitration) = selected.first() else {
            return MessageContent::default();
        };

        let embed = Embed::new(t!("render.arbitration.title"))
            .with_description(format!(
                "**{}**\n{} {}",
                arbitration.location_name,
                t!("render.expires"),
                relative_time(arbitration.expiry_at)
            ))
            .with_field(
                t!("render.arbitration.mission").to_string(),
                arbitration.extra.mission_type.clone(),
                true,
            )
            .with_field(
                t!("render.arbitration.faction").to_string(),
                arbitration.extra.faction.clone(),
                true,
            )
            .with_color(EMBED_COLOR)
            .with_timestamp(now);

        MessageContent::embed(embed)
    }

    fn wants_ping(&self, selected: &[&Entity<Self>], changes: &ChangeSet) -> bool {
        selected.iter().any(|e| changes.became_active(&e.id))
    }

    fn ping_text(&self, selected: &[&Entity<Self>]) -> String {
        match selected.first() {
            Some(e) => t!(
                "render.arbitration.ping",
                mission = e.extra.mission_type,
                location = e.location_name
            )
            .to_string(),
            None => String::new(),
        }
    }
}
