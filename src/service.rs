// Progress service: the one object reducers (and tests) go through to read
// and mutate onboarding state. Persistence is injected as a `ProgressStore`.

use serde::{Deserialize, Serialize};
use spacetimedb::Timestamp;

use crate::badges::newly_unlocked;
use crate::catalog::Catalog;
use crate::error::ProgressError;
use crate::games::GameResult;
use crate::leaderboard::{Leaderboard, Participant};
use crate::progress::{Progress, ProgressDocument};
use crate::scoring;
use crate::store::ProgressStore;
use crate::unlock;
use crate::user::{Registration, UserProfile};

/// Body of a login/register response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub user: UserProfile,
    #[serde(default)]
    pub progress: ProgressDocument,
}

/// Result of an accepted mission or quiz completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Progress snapshot after the completion
    pub progress: Progress,
    pub xp_gained: u32,
    pub unlocked_locations: Vec<String>,
    pub new_badges: Vec<String>,
    /// Repeat completion: no XP, no unlocks
    pub already_completed: bool,
    pub finished_onboarding: bool,
}

impl Completion {
    /// Anything the public leaderboard shows (xp, modules, badge count) may have moved
    pub fn changes_leaderboard(&self) -> bool {
        !self.already_completed || !self.new_badges.is_empty()
    }
}

pub struct ProgressService<'c, S> {
    store: S,
    catalog: &'c Catalog,
}

impl<'c, S: ProgressStore> ProgressService<'c, S> {
    pub fn new(store: S, catalog: &'c Catalog) -> Self {
        ProgressService { store, catalog }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }


    fn require_user(&self, user_id: &str) -> Result<UserProfile, ProgressError> {
        self.store.user(user_id)?
            .ok_or_else(|| ProgressError::UserNotFound(user_id.to_string()))
    }

    /// Stored progress, or bootstrap progress when none exists yet
    fn load_progress(&self, user_id: &str) -> Result<(Progress, bool), ProgressError> {
        match self.store.progress(user_id)? {
            Some(progress) => Ok((progress, true)),
            None => {
                log::warn!("[PROGRESS] missing document user={} fallback=bootstrap", user_id);
                Ok((Progress::new(user_id), false))
            }
        }
    }

    pub fn register(&mut self, user_id: &str, form: Registration, now: Timestamp) -> Result<AuthResponse, ProgressError> {
        if self.store.user(user_id)?.is_some() {
            return Err(ProgressError::AlreadyRegistered(user_id.to_string()));
        }
        let profile = form.into_profile(user_id, now)?;
        if self.store.user_by_username(&profile.username)?.is_some() {
            return Err(ProgressError::UsernameTaken(profile.username));
        }

        let progress = Progress::new(user_id);
        self.store.save_user(&profile)?;
        self.store.save_progress(&progress)?;

        log::info!("[REGISTER] user={} username={} department=\"{}\" role=\"{}\" experience={}",
            profile.id, profile.username, profile.department, profile.role, profile.experience);

        Ok(AuthResponse {
            message: "Registration successful".to_string(),
            user: profile,
            progress: progress.to_document(),
        })
    }

    pub fn login(&mut self, user_id: &str, now: Timestamp) -> Result<AuthResponse, ProgressError> {
        let profile = self.require_user(user_id)?;
        let (progress, stored) = self.load_progress(user_id)?;
        if !stored {
            self.store.save_progress(&progress)?;
        }

        let day = unlock::onboarding_day(profile.registered_at(), now);
        let pending = unlock::agenda(&progress, self.catalog, day);
        log::info!("[LOGIN] user={} day={} level={} xp={} modules={}/{} pending={:?}",
            profile.id, day, progress.level(), progress.xp(),
            progress.completed_modules(self.catalog), self.catalog.total_modules(),
            pending.iter().map(|m| m.id.as_str()).collect::<Vec<_>>());

        Ok(AuthResponse {
            message: "Login successful".to_string(),
            user: profile,
            progress: progress.to_document(),
        })
    }

    pub fn update_profile(&mut self, user_id: &str, name: Option<String>, avatar: Option<String>) -> Result<UserProfile, ProgressError> {
        let mut profile = self.require_user(user_id)?;
        profile.apply_edit(name, avatar)?;
        self.store.save_user(&profile)?;
        log::info!("[PROFILE] updated user={} name=\"{}\" avatar={}",
            profile.id, profile.name, profile.avatar.is_some());
        Ok(profile)
    }

    pub fn progress(&self, user_id: &str) -> Result<Progress, ProgressError> {
        self.require_user(user_id)?;
        Ok(self.load_progress(user_id)?.0)
    }



    /// Snapshot badges that flipped to unlocked between two states
    fn record_new_badges(&mut self, before: &Progress, after: &Progress, now: Timestamp) -> Result<Vec<String>, ProgressError> {
        let earned = newly_unlocked(before, after, self.catalog);
        for badge_id in &earned {
            self.store.record_badge(after.user_id(), badge_id, now)?;
            log::info!("[BADGE] unlocked user={} badge={}", after.user_id(), badge_id);
        }
        Ok(earned)
    }

    pub fn complete_mission(
        &mut self,
        user_id: &str,
        mission_id: &str,
        score: Option<u32>,
        now: Timestamp,
    ) -> Result<Completion, ProgressError> {
        self.require_user(user_id)?;
        let (mut progress, _) = self.load_progress(user_id)?;
        let before = progress.clone();

        let outcome = unlock::complete_mission(&mut progress, self.catalog, mission_id, now)
            .map_err(|e| {
                log::warn!("[MISSION] rejected user={} mission={} reason=\"{}\"", user_id, mission_id, e);
                e
            })?;
        if let Some(score) = score {
            progress.record_score(&outcome.mission_id, score);
        }

        if progress != before {
            self.store.save_progress(&progress)?;
        }
        let new_badges = self.record_new_badges(&before, &progress, now)?;

        if outcome.already_completed {
            log::info!("[MISSION] repeat user={} mission={} xp_gain=0", user_id, outcome.mission_id);
        } else {
            log::info!("[MISSION] completed user={} mission={} xp_gain={} xp={} level={} unlocked={:?} badges={:?}",
                user_id, outcome.mission_id, outcome.xp_gained, progress.xp(), progress.level(),
                outcome.unlocked_locations, new_badges);
        }
        if outcome.finished_onboarding {
            log::info!("[CHAMPION] user={} xp={} modules={}", user_id, progress.xp(), self.catalog.total_modules());
        }

        Ok(Completion {
            progress,
            xp_gained: outcome.xp_gained,
            unlocked_locations: outcome.unlocked_locations,
            new_badges,
            already_completed: outcome.already_completed,
            finished_onboarding: outcome.finished_onboarding,
        })
    }

    pub fn complete_quiz(
        &mut self,
        user_id: &str,
        quiz_id: &str,
        raw_score: u32,
        now: Timestamp,
    ) -> Result<Completion, ProgressError> {
        self.require_user(user_id)?;
        let (mut progress, _) = self.load_progress(user_id)?;
        let before = progress.clone();

        let outcome = scoring::complete_quiz(&mut progress, self.catalog, quiz_id, raw_score)
            .map_err(|e| {
                log::warn!("[QUIZ] rejected user={} quiz={} reason=\"{}\"", user_id, quiz_id, e);
                e
            })?;

        if progress != before {
            self.store.save_progress(&progress)?;
        }
        let new_badges = self.record_new_badges(&before, &progress, now)?;

        log::info!("[QUIZ] completed user={} quiz={} score={} first={} best={} xp_gain={} xp={} level={}",
            user_id, outcome.quiz_id, outcome.score, outcome.first_completion, outcome.new_best,
            outcome.xp_gained, progress.xp(), progress.level());

        Ok(Completion {
            progress,
            xp_gained: outcome.xp_gained,
            unlocked_locations: Vec::new(),
            new_badges,
            already_completed: !outcome.first_completion,
            finished_onboarding: false,
        })
    }

    /// Score a mini-game round with its own formula, then credit it like a quiz
    pub fn submit_game(&mut self, user_id: &str, result: &GameResult, now: Timestamp) -> Result<Completion, ProgressError> {
        let (game_id, score) = result.normalized();
        self.complete_quiz(user_id, &game_id, score, now)
    }

    pub fn leaderboard(&self) -> Result<Leaderboard, ProgressError> {
        let rows = self.store.participants()?;
        let participants: Vec<Participant> = rows.iter()
            .map(|(profile, progress)| Participant { profile, progress })
            .collect();
        Ok(Leaderboard::build(&participants, self.catalog))
    }
}
