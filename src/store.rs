// Persistence boundary for users, progress and badge snapshots.
//
// The service only talks to `ProgressStore`. Reducers hand it a
// `TableStore` over the module tables; tests and tools use `MemoryStore`.

use std::collections::{BTreeMap, HashMap};

use spacetimedb::{ReducerContext, Table, Timestamp};

use crate::error::StoreError;
use crate::progress::Progress;
use crate::user::UserProfile;
use crate::{badge_award, user_account, user_progress};
use crate::{BadgeAward, UserAccount, UserProgress};

pub trait ProgressStore {
    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Usernames are stored lowercase
    fn user_by_username(&self, username: &str) -> Result<Option<UserProfile>, StoreError>;

    fn save_user(&mut self, profile: &UserProfile) -> Result<(), StoreError>;

    /// `None` when the user has no progress document yet
    fn progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError>;

    fn save_progress(&mut self, progress: &Progress) -> Result<(), StoreError>;

    /// Every registered user with their progress (bootstrap progress if none is stored)
    fn participants(&self) -> Result<Vec<(UserProfile, Progress)>, StoreError>;

    /// Snapshot an unlocked badge; recording the same badge twice is a no-op
    fn record_badge(&mut self, user_id: &str, badge_id: &str, at: Timestamp) -> Result<(), StoreError>;
}

// ==================== TABLE STORE ====================

/// Parse the best-score JSON column; unreadable data yields an empty history
fn parse_scores(user_id: &str, scores_json: &Option<String>) -> BTreeMap<String, u32> {
    let Some(raw) = scores_json else {
        return BTreeMap::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("[PROGRESS] corrupt best_scores user={} error={} fallback=empty", user_id, e);
        BTreeMap::new()
    })
}

fn encode_scores(scores: &BTreeMap<String, u32>) -> Option<String> {
    if scores.is_empty() {
        return None;
    }
    serde_json::to_string(scores).ok()
}

pub(crate) fn progress_from_row(row: UserProgress) -> Progress {
    let scores = parse_scores(&row.user_id, &row.best_scores);
    Progress::from_parts(
        row.user_id,
        row.xp,
        row.completed_missions,
        row.completed_quizzes,
        row.unlocked_locations,
        scores,
        row.completed_at,
    )
}

pub(crate) fn progress_to_row(progress: &Progress, updated_at: Timestamp) -> UserProgress {
    UserProgress {
        user_id: progress.user_id().to_string(),
        level: progress.level(),
        xp: progress.xp(),
        completed_missions: progress.completed_missions().iter().cloned().collect(),
        completed_quizzes: progress.completed_quizzes().iter().cloned().collect(),
        unlocked_locations: progress.unlocked_locations().iter().cloned().collect(),
        best_scores: encode_scores(progress.best_scores()),
        completed_at: progress.completed_at(),
        updated_at,
    }
}

pub(crate) fn profile_from_row(row: UserAccount) -> UserProfile {
    UserProfile {
        id: row.id,
        username: row.username,
        name: row.name,
        department: row.department,
        role: row.role,
        experience: row.experience,
        avatar: row.avatar,
        registered_at: row.registered_at.to_micros_since_unix_epoch(),
    }
}

pub(crate) fn profile_to_row(profile: &UserProfile) -> UserAccount {
    UserAccount {
        id: profile.id.clone(),
        username: profile.username.clone(),
        name: profile.name.clone(),
        department: profile.department.clone(),
        role: profile.role.clone(),
        experience: profile.experience.clone(),
        avatar: profile.avatar.clone(),
        registered_at: profile.registered_at(),
    }
}

/// Store backed by the module tables of the current transaction
pub struct TableStore<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> TableStore<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        TableStore { ctx }
    }
}

impl ProgressStore for TableStore<'_> {
    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.ctx.db.user_account().id().find(&user_id.to_string()).map(profile_from_row))
    }

    fn user_by_username(&self, username: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.ctx.db.user_account().username().find(&username.to_lowercase()).map(profile_from_row))
    }

    fn save_user(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        let row = profile_to_row(profile);
        if self.ctx.db.user_account().id().find(&profile.id).is_some() {
            self.ctx.db.user_account().id().update(row);
        } else {
            self.ctx.db.user_account().insert(row);
        }
        Ok(())
    }

    fn progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError> {
        Ok(self.ctx.db.user_progress().user_id().find(&user_id.to_string()).map(progress_from_row))
    }

    fn save_progress(&mut self, progress: &Progress) -> Result<(), StoreError> {
        let row = progress_to_row(progress, self.ctx.timestamp);
        if self.ctx.db.user_progress().user_id().find(&row.user_id).is_some() {
            self.ctx.db.user_progress().user_id().update(row);
        } else {
            self.ctx.db.user_progress().insert(row);
        }
        Ok(())
    }

    fn participants(&self) -> Result<Vec<(UserProfile, Progress)>, StoreError> {
        Ok(self.ctx.db.user_account()
            .iter()
            .map(|account| {
                let progress = self.ctx.db.user_progress()
                    .user_id()
                    .find(&account.id)
                    .map(progress_from_row)
                    .unwrap_or_else(|| Progress::new(account.id.clone()));
                (profile_from_row(account), progress)
            })
            .collect())
    }

    fn record_badge(&mut self, user_id: &str, badge_id: &str, at: Timestamp) -> Result<(), StoreError> {
        let already = self.ctx.db.badge_award()
            .user_id()
            .filter(&user_id.to_string())
            .any(|award| award.badge_id == badge_id);
        if !already {
            self.ctx.db.badge_award().insert(BadgeAward {
                id: 0, // auto_inc
                user_id: user_id.to_string(),
                badge_id: badge_id.to_string(),
                unlocked_at: at,
            });
        }
        Ok(())
    }
}

// ==================== MEMORY STORE ====================

/// In-process store. Insertion order of users is preserved for `participants`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    users: Vec<UserProfile>,
    progress: HashMap<String, Progress>,
    badges: HashMap<String, Vec<(String, Timestamp)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When a badge was snapshotted, if it was
    pub fn badge_unlocked_at(&self, user_id: &str, badge_id: &str) -> Option<Timestamp> {
        self.badges.get(user_id)?
            .iter()
            .find(|(id, _)| id == badge_id)
            .map(|(_, at)| *at)
    }
}

impl ProgressStore for MemoryStore {
    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.iter().find(|u| u.id == user_id).cloned())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<UserProfile>, StoreError> {
        let username = username.to_lowercase();
        Ok(self.users.iter().find(|u| u.username == username).cloned())
    }

    fn save_user(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        match self.users.iter_mut().find(|u| u.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => self.users.push(profile.clone()),
        }
        Ok(())
    }

    fn progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError> {
        Ok(self.progress.get(user_id).cloned())
    }

    fn save_progress(&mut self, progress: &Progress) -> Result<(), StoreError> {
        self.progress.insert(progress.user_id().to_string(), progress.clone());
        Ok(())
    }

    fn participants(&self) -> Result<Vec<(UserProfile, Progress)>, StoreError> {
        Ok(self.users.iter()
            .map(|user| {
                let progress = self.progress.get(&user.id)
                    .cloned()
                    .unwrap_or_else(|| Progress::new(user.id.clone()));
                (user.clone(), progress)
            })
            .collect())
    }

    fn record_badge(&mut self, user_id: &str, badge_id: &str, at: Timestamp) -> Result<(), StoreError> {
        let awards = self.badges.entry(user_id.to_string()).or_default();
        if !awards.iter().any(|(id, _)| id == badge_id) {
            awards.push((badge_id.to_string(), at));
        }
        Ok(())
    }
}
