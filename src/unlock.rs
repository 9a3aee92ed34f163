// Unlock engine: which missions and locations are open, and what completing a mission does.

use chrono::DateTime;
use spacetimedb::Timestamp;

use crate::catalog::{Catalog, MissionDef};
use crate::error::ProgressError;
use crate::progress::Progress;

/// Missions and locations currently open to a user, in catalog order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Availability {
    /// Missions that can be completed right now (not yet completed, prerequisites met)
    pub missions: Vec<String>,
    pub locations: Vec<String>,
}

/// Effect of a mission completion attempt that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionOutcome {
    pub mission_id: String,
    pub xp_gained: u32,
    /// Locations that were locked before this completion
    pub unlocked_locations: Vec<String>,
    /// Mission was already complete; nothing changed
    pub already_completed: bool,
    /// This completion finished the last onboarding module
    pub finished_onboarding: bool,
}

/// Location gate: vacuous for missions without a location
fn location_open(progress: &Progress, mission: &MissionDef) -> bool {
    mission.location_id.as_deref().map_or(true, |id| progress.is_location_unlocked(id))
}

fn missing_prerequisites(progress: &Progress, mission: &MissionDef) -> Vec<String> {
    mission.required_missions.iter()
        .filter(|id| !progress.has_completed_mission(id))
        .cloned()
        .collect()
}

pub fn is_mission_available(progress: &Progress, mission: &MissionDef) -> bool {
    location_open(progress, mission)
        && mission.required_missions.iter().all(|id| progress.has_completed_mission(id))
}

pub fn compute_availability(progress: &Progress, catalog: &Catalog) -> Availability {
    let missions = catalog.missions().iter()
        .filter(|m| !progress.has_completed_mission(&m.id) && is_mission_available(progress, m))
        .map(|m| m.id.clone())
        .collect();
    let locations = catalog.locations().iter()
        .filter(|l| progress.is_location_unlocked(&l.id))
        .map(|l| l.id.clone())
        .collect();
    Availability { missions, locations }
}

/// Complete a mission, mutating `progress` only when the completion is accepted.
///
/// Unknown ids and locked missions leave `progress` untouched. Re-completing a
/// mission is a successful no-op so two racing requests cannot double-grant XP.
pub fn complete_mission(
    progress: &mut Progress,
    catalog: &Catalog,
    mission_id: &str,
    now: Timestamp,
) -> Result<MissionOutcome, ProgressError> {
    let mission = catalog.mission(mission_id)
        .ok_or_else(|| ProgressError::MissionNotFound(mission_id.to_string()))?;

    if progress.has_completed_mission(&mission.id) {
        return Ok(MissionOutcome {
            mission_id: mission.id.clone(),
            xp_gained: 0,
            unlocked_locations: Vec::new(),
            already_completed: true,
            finished_onboarding: false,
        });
    }

    let missing = missing_prerequisites(progress, mission);
    let location_locked = !location_open(progress, mission);
    if !missing.is_empty() || location_locked {
        return Err(ProgressError::MissionLocked {
            mission: mission.id.clone(),
            missing,
            location_locked,
        });
    }

    let was_champion = progress.is_champion(catalog);
    progress.mark_mission(&mission.id);
    let unlocked_locations: Vec<String> = mission.unlocks_locations.iter()
        .filter(|id| progress.unlock_location(id))
        .cloned()
        .collect();
    progress.grant_xp(mission.xp_reward);

    let finished_onboarding = !was_champion && progress.is_champion(catalog);
    if finished_onboarding {
        progress.stamp_completed(now);
    }

    Ok(MissionOutcome {
        mission_id: mission.id.clone(),
        xp_gained: mission.xp_reward,
        unlocked_locations,
        already_completed: false,
        finished_onboarding,
    })
}

/// 1-based onboarding day: calendar days (UTC) since registration, plus one
pub fn onboarding_day(registered_at: Timestamp, now: Timestamp) -> u32 {
    let start = DateTime::from_timestamp_micros(registered_at.to_micros_since_unix_epoch());
    let current = DateTime::from_timestamp_micros(now.to_micros_since_unix_epoch());
    match (start, current) {
        (Some(start), Some(current)) => {
            let days = current.date_naive().signed_duration_since(start.date_naive()).num_days();
            u32::try_from(days.max(0)).unwrap_or(u32::MAX - 1) + 1
        }
        _ => 1,
    }
}

/// Available missions scheduled on or before `day`, oldest first
pub fn agenda<'c>(progress: &Progress, catalog: &'c Catalog, day: u32) -> Vec<&'c MissionDef> {
    let mut due: Vec<&MissionDef> = catalog.missions().iter()
        .filter(|m| m.day <= day)
        .filter(|m| !progress.has_completed_mission(&m.id) && is_mission_available(progress, m))
        .collect();
    due.sort_by_key(|m| m.day);
    due
}
