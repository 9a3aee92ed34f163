// Static mission, location, quiz and badge definitions.
//
// The catalog is content, not state: it is loaded once from
// `data/catalog.json`, validated, and shared read-only by every reducer.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;
use crate::DEFAULT_LOCATION;

const BUILTIN_CATALOG_JSON: &str = include_str!("../data/catalog.json");

static BUILTIN: Lazy<Result<Catalog, ProgressError>> =
    Lazy::new(|| Catalog::from_json(BUILTIN_CATALOG_JSON));

/// A completable onboarding task tied to a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionDef {
    pub id: String,
    pub title: String,
    /// None for the bootstrap mission, which needs no unlocked location
    pub location_id: Option<String>,
    pub required_missions: Vec<String>,
    pub unlocks_locations: Vec<String>,
    pub xp_reward: u32,
    /// Primary missions are the onboarding "modules" counted for champions
    pub is_primary: bool,
    /// Onboarding day (1-based) the mission is scheduled for
    pub day: u32,
    pub category: String,
}

/// A node on the city map gating one primary mission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDef {
    pub id: String,
    pub name: String,
    pub mission_id: String,
    pub xp_reward: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizKind {
    Quiz,
    Game,
}

/// A quiz or mini-game that can be completed for XP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDef {
    pub id: String,
    pub title: String,
    pub category: String,
    pub kind: QuizKind,
    #[serde(default)]
    pub location_id: Option<String>,
}

/// Activation predicate of a badge, evaluated against progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BadgeRule {
    MissionsCompleted {
        count: u32,
    },
    MissionCompleted {
        #[serde(rename = "missionId")]
        mission_id: String,
    },
    /// Every quiz and game of the category
    QuizCategory {
        category: String,
    },
    QuizzesCompleted {
        count: u32,
    },
    XpAtLeast {
        xp: u32,
    },
    LocationsUnlocked {
        count: u32,
    },
    /// Every primary mission
    AllModules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rule: BadgeRule,
}

/// On-disk shape of the catalog
#[derive(Debug, Deserialize)]
struct CatalogFile {
    locations: Vec<LocationDef>,
    missions: Vec<MissionDef>,
    #[serde(default)]
    quizzes: Vec<QuizDef>,
    #[serde(default)]
    badges: Vec<BadgeDef>,
}

/// Validated, immutable catalog with id lookups
#[derive(Debug, Clone)]
pub struct Catalog {
    locations: Vec<LocationDef>,
    missions: Vec<MissionDef>,
    quizzes: Vec<QuizDef>,
    badges: Vec<BadgeDef>,
    location_index: HashMap<String, usize>,
    mission_index: HashMap<String, usize>,
    quiz_index: HashMap<String, usize>,
}

impl Catalog {
    /// The catalog shipped with the module
    pub fn builtin() -> Result<&'static Catalog, ProgressError> {
        BUILTIN.as_ref().map_err(Clone::clone)
    }

    pub fn from_json(json: &str) -> Result<Catalog, ProgressError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| ProgressError::Catalog(format!("unparseable catalog: {}", e)))?;
        Catalog::build(file)
    }

    fn build(file: CatalogFile) -> Result<Catalog, ProgressError> {
        let location_index = index_by_id(file.locations.iter().map(|l| l.id.as_str()), "location")?;
        let mission_index = index_by_id(file.missions.iter().map(|m| m.id.as_str()), "mission")?;
        let quiz_index = index_by_id(file.quizzes.iter().map(|q| q.id.as_str()), "quiz")?;
        index_by_id(file.badges.iter().map(|b| b.id.as_str()), "badge")?;

        let catalog = Catalog {
            locations: file.locations,
            missions: file.missions,
            quizzes: file.quizzes,
            badges: file.badges,
            location_index,
            mission_index,
            quiz_index,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), ProgressError> {
        if self.location(DEFAULT_LOCATION).is_none() {
            return Err(invalid(format!("default location '{}' is not defined", DEFAULT_LOCATION)));
        }

        for mission in &self.missions {
            if let Some(location_id) = &mission.location_id {
                if self.location(location_id).is_none() {
                    return Err(invalid(format!("mission '{}' references unknown location '{}'", mission.id, location_id)));
                }
            } else if mission.is_primary {
                return Err(invalid(format!("primary mission '{}' has no location", mission.id)));
            }
            for required in &mission.required_missions {
                if self.mission(required).is_none() {
                    return Err(invalid(format!("mission '{}' requires unknown mission '{}'", mission.id, required)));
                }
            }
            for unlocked in &mission.unlocks_locations {
                if self.location(unlocked).is_none() {
                    return Err(invalid(format!("mission '{}' unlocks unknown location '{}'", mission.id, unlocked)));
                }
            }
        }

        // Exactly one primary mission per location, and it is the one the location names
        for location in &self.locations {
            let primaries: Vec<&MissionDef> = self.missions.iter()
                .filter(|m| m.is_primary && m.location_id.as_deref() == Some(location.id.as_str()))
                .collect();
            match primaries.as_slice() {
                [only] if only.id == location.mission_id => {}
                [only] => {
                    return Err(invalid(format!(
                        "location '{}' names mission '{}' but its primary mission is '{}'",
                        location.id, location.mission_id, only.id
                    )));
                }
                _ => {
                    return Err(invalid(format!(
                        "location '{}' has {} primary missions, expected 1",
                        location.id, primaries.len()
                    )));
                }
            }
        }

        for quiz in &self.quizzes {
            if let Some(location_id) = &quiz.location_id {
                if self.location(location_id).is_none() {
                    return Err(invalid(format!("quiz '{}' references unknown location '{}'", quiz.id, location_id)));
                }
            }
        }

        for badge in &self.badges {
            match &badge.rule {
                BadgeRule::MissionCompleted { mission_id } if self.mission(mission_id).is_none() => {
                    return Err(invalid(format!("badge '{}' references unknown mission '{}'", badge.id, mission_id)));
                }
                BadgeRule::QuizCategory { category } if self.quizzes_in_category(category).next().is_none() => {
                    return Err(invalid(format!("badge '{}' references empty quiz category '{}'", badge.id, category)));
                }
                _ => {}
            }
        }

        self.check_prerequisites_acyclic()?;
        self.check_reachable()
    }

    /// Play the unlock rules to a fixed point from a fresh start; every location
    /// and primary mission must be reachable or no one can become a champion
    fn check_reachable(&self) -> Result<(), ProgressError> {
        let mut unlocked: HashSet<&str> = HashSet::from([DEFAULT_LOCATION]);
        let mut completed: HashSet<&str> = HashSet::new();
        loop {
            let ready: Vec<&MissionDef> = self.missions.iter()
                .filter(|m| !completed.contains(m.id.as_str()))
                .filter(|m| m.location_id.as_deref().map_or(true, |id| unlocked.contains(id)))
                .filter(|m| m.required_missions.iter().all(|r| completed.contains(r.as_str())))
                .collect();
            if ready.is_empty() {
                break;
            }
            for mission in ready {
                completed.insert(mission.id.as_str());
                unlocked.extend(mission.unlocks_locations.iter().map(String::as_str));
            }
        }

        if let Some(location) = self.locations.iter().find(|l| !unlocked.contains(l.id.as_str())) {
            return Err(invalid(format!("location '{}' can never be unlocked", location.id)));
        }
        if let Some(mission) = self.primary_missions().find(|m| !completed.contains(m.id.as_str())) {
            return Err(invalid(format!("primary mission '{}' can never be completed", mission.id)));
        }
        Ok(())
    }

    /// Depth-first walk over `required_missions`; a back edge means no one can ever finish
    fn check_prerequisites_acyclic(&self) -> Result<(), ProgressError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(catalog: &Catalog, idx: usize, marks: &mut [Mark]) -> Result<(), ProgressError> {
            match marks[idx] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(invalid(format!(
                        "prerequisite cycle through mission '{}'",
                        catalog.missions[idx].id
                    )));
                }
                Mark::Unvisited => {}
            }
            marks[idx] = Mark::InProgress;
            for required in &catalog.missions[idx].required_missions {
                if let Some(&next) = catalog.mission_index.get(required) {
                    visit(catalog, next, marks)?;
                }
            }
            marks[idx] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.missions.len()];
        for idx in 0..self.missions.len() {
            visit(self, idx, &mut marks)?;
        }
        Ok(())
    }

    pub fn mission(&self, id: &str) -> Option<&MissionDef> {
        self.mission_index.get(id).map(|&i| &self.missions[i])
    }

    pub fn location(&self, id: &str) -> Option<&LocationDef> {
        self.location_index.get(id).map(|&i| &self.locations[i])
    }

    pub fn quiz(&self, id: &str) -> Option<&QuizDef> {
        self.quiz_index.get(id).map(|&i| &self.quizzes[i])
    }

    pub fn missions(&self) -> &[MissionDef] {
        &self.missions
    }

    pub fn locations(&self) -> &[LocationDef] {
        &self.locations
    }

    pub fn quizzes(&self) -> &[QuizDef] {
        &self.quizzes
    }

    pub fn badges(&self) -> &[BadgeDef] {
        &self.badges
    }

    pub fn primary_missions(&self) -> impl Iterator<Item = &MissionDef> {
        self.missions.iter().filter(|m| m.is_primary)
    }

    /// Number of modules a champion must complete
    pub fn total_modules(&self) -> u32 {
        self.primary_missions().count() as u32
    }

    pub fn quizzes_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a QuizDef> {
        self.quizzes.iter().filter(move |q| q.category == category)
    }
}

fn invalid(message: String) -> ProgressError {
    ProgressError::Catalog(message)
}

fn index_by_id<'a>(ids: impl Iterator<Item = &'a str>, kind: &str) -> Result<HashMap<String, usize>, ProgressError> {
    let mut seen = HashSet::new();
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        if id.is_empty() {
            return Err(invalid(format!("{} #{} has an empty id", kind, i)));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("duplicate {} id '{}'", kind, id)));
        }
        index.insert(id.to_string(), i);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json(missions: &str) -> String {
        format!(
            r#"{{
                "locations": [{{ "id": "headquarters", "name": "HQ", "missionId": "tour", "xpReward": 10 }}],
                "missions": {}
            }}"#,
            missions
        )
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().expect("builtin catalog is valid");
        assert_eq!(catalog.total_modules(), 6);
        assert_eq!(catalog.locations().len(), 6);

        let bootstrap = catalog.mission("character-creation").unwrap();
        assert!(bootstrap.location_id.is_none());
        assert!(bootstrap.required_missions.is_empty());

        let tour = catalog.mission("headquarters-tour").unwrap();
        assert_eq!(tour.required_missions, vec!["character-creation".to_string()]);
        assert!(catalog.quiz("trivia-quiz").is_some());
        assert!(catalog.quiz("no-such-quiz").is_none());
    }

    #[test]
    fn test_badge_rules_parse_tagged() {
        let catalog = Catalog::builtin().unwrap();
        let guardian = catalog.badges().iter().find(|b| b.id == "security-guardian").unwrap();
        assert_eq!(
            guardian.rule,
            BadgeRule::MissionCompleted { mission_id: "security-compliance".into() }
        );
        assert!(catalog.badges().iter().any(|b| b.rule == BadgeRule::AllModules));
    }

    #[test]
    fn test_rejects_location_nothing_unlocks() {
        let json = r#"{
            "locations": [
                { "id": "headquarters", "name": "HQ", "missionId": "tour", "xpReward": 10 },
                { "id": "rooftop", "name": "Rooftop", "missionId": "sunset", "xpReward": 10 }
            ],
            "missions": [
                { "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": [],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" },
                { "id": "sunset", "title": "s", "locationId": "rooftop", "requiredMissions": ["tour"],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 2, "category": "c" }
            ]
        }"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(matches!(err, ProgressError::Catalog(msg) if msg.contains("rooftop") && msg.contains("never be unlocked")));

        // Same map with the tour opening the rooftop is fine
        let fixed = json.replacen(r#""unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1"#,
            r#""unlocksLocations": ["rooftop"], "xpReward": 10, "isPrimary": true, "day": 1"#, 1);
        assert_eq!(Catalog::from_json(&fixed).unwrap().total_modules(), 2);
    }

    #[test]
    fn test_rejects_unknown_prerequisite() {
        let json = minimal_json(
            r#"[{ "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": ["ghost"],
                 "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" }]"#,
        );
        let err = Catalog::from_json(&json).unwrap_err();
        assert!(matches!(err, ProgressError::Catalog(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_rejects_prerequisite_cycle() {
        let json = minimal_json(
            r#"[
                { "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": ["side"],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" },
                { "id": "side", "title": "s", "locationId": "headquarters", "requiredMissions": ["tour"],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": false, "day": 1, "category": "c" }
            ]"#,
        );
        let err = Catalog::from_json(&json).unwrap_err();
        assert!(matches!(err, ProgressError::Catalog(msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_rejects_two_primary_missions_at_one_location() {
        let json = minimal_json(
            r#"[
                { "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": [],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" },
                { "id": "other", "title": "o", "locationId": "headquarters", "requiredMissions": [],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" }
            ]"#,
        );
        assert!(Catalog::from_json(&json).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let json = minimal_json(
            r#"[
                { "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": [],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": true, "day": 1, "category": "c" },
                { "id": "tour", "title": "t", "locationId": "headquarters", "requiredMissions": [],
                  "unlocksLocations": [], "xpReward": 10, "isPrimary": false, "day": 1, "category": "c" }
            ]"#,
        );
        let err = Catalog::from_json(&json).unwrap_err();
        assert!(matches!(err, ProgressError::Catalog(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Catalog::from_json("not json").is_err());
    }
}
