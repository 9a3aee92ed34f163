// Per-user progress state and its JSON document form.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use spacetimedb::Timestamp;

use crate::catalog::Catalog;
use crate::{DEFAULT_LOCATION, XP_PER_LEVEL};

/// Level is a step function of cumulative XP: every `XP_PER_LEVEL` xp is +1 level
pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// Progress of one user.
///
/// Fields are private so every change goes through the grow-only mutators:
/// xp never decreases, completion sets and unlocked locations never shrink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    user_id: String,
    xp: u32,
    completed_missions: BTreeSet<String>,
    completed_quizzes: BTreeSet<String>,
    unlocked_locations: BTreeSet<String>,
    best_scores: BTreeMap<String, u32>,
    completed_at: Option<Timestamp>,
}

impl Progress {
    /// Bootstrap progress for a fresh user
    pub fn new(user_id: impl Into<String>) -> Self {
        Progress {
            user_id: user_id.into(),
            xp: 0,
            completed_missions: BTreeSet::new(),
            completed_quizzes: BTreeSet::new(),
            unlocked_locations: BTreeSet::from([DEFAULT_LOCATION.to_string()]),
            best_scores: BTreeMap::new(),
            completed_at: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn xp(&self) -> u32 {
        self.xp
    }

    pub fn level(&self) -> u32 {
        level_for_xp(self.xp)
    }

    pub fn completed_missions(&self) -> &BTreeSet<String> {
        &self.completed_missions
    }

    pub fn completed_quizzes(&self) -> &BTreeSet<String> {
        &self.completed_quizzes
    }

    pub fn unlocked_locations(&self) -> &BTreeSet<String> {
        &self.unlocked_locations
    }

    pub fn best_scores(&self) -> &BTreeMap<String, u32> {
        &self.best_scores
    }

    pub fn best_score(&self, id: &str) -> Option<u32> {
        self.best_scores.get(id).copied()
    }

    /// When the user first finished every module
    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    pub fn has_completed_mission(&self, mission_id: &str) -> bool {
        self.completed_missions.contains(mission_id)
    }

    pub fn has_completed_quiz(&self, quiz_id: &str) -> bool {
        self.completed_quizzes.contains(quiz_id)
    }

    pub fn is_location_unlocked(&self, location_id: &str) -> bool {
        self.unlocked_locations.contains(location_id)
    }

    /// Primary missions completed
    pub fn completed_modules(&self, catalog: &Catalog) -> u32 {
        catalog.primary_missions()
            .filter(|m| self.completed_missions.contains(&m.id))
            .count() as u32
    }

    pub fn is_champion(&self, catalog: &Catalog) -> bool {
        self.completed_modules(catalog) == catalog.total_modules()
    }

    pub(crate) fn grant_xp(&mut self, amount: u32) {
        self.xp = self.xp.saturating_add(amount);
    }

    /// Returns false when the mission was already recorded
    pub(crate) fn mark_mission(&mut self, mission_id: &str) -> bool {
        self.completed_missions.insert(mission_id.to_string())
    }

    pub(crate) fn mark_quiz(&mut self, quiz_id: &str) -> bool {
        self.completed_quizzes.insert(quiz_id.to_string())
    }

    pub(crate) fn unlock_location(&mut self, location_id: &str) -> bool {
        self.unlocked_locations.insert(location_id.to_string())
    }

    /// Keeps the best score seen; returns true if `score` is a new best
    pub(crate) fn record_score(&mut self, id: &str, score: u32) -> bool {
        match self.best_scores.get(id) {
            Some(&best) if best >= score => false,
            _ => {
                self.best_scores.insert(id.to_string(), score);
                true
            }
        }
    }

    pub(crate) fn stamp_completed(&mut self, at: Timestamp) {
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
    }

    /// Rebuild progress from persisted parts, repairing what a bad write could leave behind
    pub fn from_parts(
        user_id: impl Into<String>,
        xp: u32,
        completed_missions: impl IntoIterator<Item = String>,
        completed_quizzes: impl IntoIterator<Item = String>,
        unlocked_locations: impl IntoIterator<Item = String>,
        best_scores: BTreeMap<String, u32>,
        completed_at: Option<Timestamp>,
    ) -> Self {
        let mut unlocked_locations: BTreeSet<String> = unlocked_locations.into_iter().collect();
        unlocked_locations.insert(DEFAULT_LOCATION.to_string());
        Progress {
            user_id: user_id.into(),
            xp,
            completed_missions: completed_missions.into_iter().collect(),
            completed_quizzes: completed_quizzes.into_iter().collect(),
            unlocked_locations,
            best_scores,
            completed_at,
        }
    }

    pub fn to_document(&self) -> ProgressDocument {
        ProgressDocument {
            level: self.level(),
            xp: self.xp,
            completed_missions: self.completed_missions.iter().cloned().collect(),
            completed_quizzes: self.completed_quizzes.iter().cloned().collect(),
            unlocked_locations: self.unlocked_locations.iter().cloned().collect(),
            best_scores: self.best_scores.clone(),
            completed_at: self.completed_at.map(|t| t.to_micros_since_unix_epoch()),
        }
    }

    /// Stored `level` is ignored: it is always recomputed from xp
    pub fn from_document(user_id: impl Into<String>, doc: ProgressDocument) -> Self {
        let user_id = user_id.into();
        if doc.level != level_for_xp(doc.xp) {
            log::warn!("[PROGRESS] stale level user={} stored={} xp={} recomputed={}",
                user_id, doc.level, doc.xp, level_for_xp(doc.xp));
        }
        Progress::from_parts(
            user_id,
            doc.xp,
            doc.completed_missions,
            doc.completed_quizzes,
            doc.unlocked_locations,
            doc.best_scores,
            doc.completed_at.map(Timestamp::from_micros_since_unix_epoch),
        )
    }

    /// Read an exported JSON document; corrupt input falls back to bootstrap progress
    pub fn from_value_or_default(user_id: impl Into<String>, value: serde_json::Value) -> Self {
        let user_id = user_id.into();
        match serde_json::from_value::<ProgressDocument>(value) {
            Ok(doc) => Progress::from_document(user_id, doc),
            Err(e) => {
                log::warn!("[PROGRESS] corrupt document user={} error={} fallback=bootstrap", user_id, e);
                Progress::new(user_id)
            }
        }
    }
}

/// Wire form of progress, as returned with login/register responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub completed_missions: Vec<String>,
    #[serde(default)]
    pub completed_quizzes: Vec<String>,
    #[serde(default = "default_unlocked_locations")]
    pub unlocked_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub best_scores: BTreeMap<String, u32>,
    /// Microseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

fn default_level() -> u32 {
    1
}

fn default_unlocked_locations() -> Vec<String> {
    vec![DEFAULT_LOCATION.to_string()]
}

impl Default for ProgressDocument {
    fn default() -> Self {
        ProgressDocument {
            level: default_level(),
            xp: 0,
            completed_missions: Vec::new(),
            completed_quizzes: Vec::new(),
            unlocked_locations: default_unlocked_locations(),
            best_scores: BTreeMap::new(),
            completed_at: None,
        }
    }
}
