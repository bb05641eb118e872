//! Change detection between consecutive snapshots
//!
//! A feed's classified entities are compared with what the scheduler last
//! propagated. Only identity and timing count: an entity is significant when
//! its id, activation or expiry differ from the stored fingerprint. Display
//! text never makes a snapshot significant.
//!
//! For feeds carrying several entities the snapshot is significant when any
//! entity is, when a previously seen entity disappears, or when an entity's
//! lifecycle status moved (an upcoming trader arriving keeps its id and
//! timing, so the status is the only thing that changes).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{ClassifiedEntity, LifecycleStatus};

/// Identity and timing of one propagated entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub entity_id: String,
    pub activation_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
}

impl Fingerprint {
    pub fn of<X>(entity: &ClassifiedEntity<X>) -> Self {
        Self {
            entity_id: entity.id.clone(),
            activation_at: entity.activation_at,
            expiry_at: entity.expiry_at,
        }
    }
}

/// Check whether a candidate differs from the last fingerprint
pub fn is_significant<X>(candidate: &ClassifiedEntity<X>, last: &Fingerprint) -> bool {
    candidate.id != last.entity_id
        || candidate.activation_at != last.activation_at
        || candidate.expiry_at != last.expiry_at
}

/// Fingerprint plus the status it had when propagated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedEntry {
    pub fingerprint: Fingerprint,
    pub status: LifecycleStatus,
}

/// Everything a feed's scheduler last propagated, keyed by entity id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastObserved {
    entries: BTreeMap<String, ObservedEntry>,
}

impl LastObserved {
    pub fn from_entities<X>(entities: &[ClassifiedEntity<X>]) -> Self {
        let entries = entities
            .iter()
            .map(|entity| {
                (
                    entity.id.clone(),
                    ObservedEntry {
                        fingerprint: Fingerprint::of(entity),
                        status: entity.status,
                    },
                )
            })
            .collect();

        Self { entries }
    }

    pub fn get(&self, entity_id: &str) -> Option<&ObservedEntry> {
        self.entries.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// What moved between the last propagation and the current snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Entities that are new or whose timing moved
    pub changed: BTreeSet<String>,
    /// Entities now active that were not active when last propagated
    pub became_active: BTreeSet<String>,
    /// Known entities whose lifecycle status moved
    pub status_changed: BTreeSet<String>,
    /// Previously propagated entities no longer present
    pub removed: BTreeSet<String>,
    /// No prior state existed; content propagates but nobody is pinged
    pub baseline: bool,
}

impl ChangeSet {
    /// Check whether this snapshot must be propagated
    pub fn is_significant(&self) -> bool {
        self.baseline
            || !self.changed.is_empty()
            || !self.status_changed.is_empty()
            || !self.removed.is_empty()
    }

    pub fn is_changed(&self, entity_id: &str) -> bool {
        self.changed.contains(entity_id)
    }

    pub fn became_active(&self, entity_id: &str) -> bool {
        self.became_active.contains(entity_id)
    }
}

/// Compares classified snapshots with the last propagated state
pub struct ChangeDetector;

impl ChangeDetector {
    /// Build the change set for a snapshot
    ///
    /// `last = None` means nothing was propagated since start-up.
    pub fn detect<X>(candidates: &[ClassifiedEntity<X>], last: Option<&LastObserved>) -> ChangeSet {
        let Some(last) = last else {
            return ChangeSet {
                changed: candidates.iter().map(|e| e.id.clone()).collect(),
                baseline: true,
                ..ChangeSet::default()
            };
        };

        let mut changes = ChangeSet::default();

        for candidate in candidates {
            match last.get(&candidate.id) {
                Some(observed) => {
                    if is_significant(candidate, &observed.fingerprint) {
                        changes.changed.insert(candidate.id.clone());
                    }
                    if observed.status != candidate.status {
                        changes.status_changed.insert(candidate.id.clone());
                        if candidate.status == LifecycleStatus::Active {
                            changes.became_active.insert(candidate.id.clone());
                        }
                    }
                }
                None => {
                    changes.changed.insert(candidate.id.clone());
                    if candidate.is_active() {
                        changes.became_active.insert(candidate.id.clone());
                    }
                }
            }
        }

        let current: BTreeSet<&str> = candidates.iter().map(|e| e.id.as_str()).collect();
        changes.removed = last
            .ids()
            .filter(|id| !current.contains(id))
            .map(String::from)
            .collect();

        changes
    }
}
