use spacetimedb::{
    ReducerContext, Identity, Table, Timestamp,
    table, reducer, view, SpacetimeType,
};

// Onboarding core: catalog, progress state and the rules over it
pub mod badges;
pub mod catalog;
pub mod error;
pub mod games;
pub mod leaderboard;
pub mod progress;
pub mod scoring;
pub mod service;
pub mod store;
pub mod unlock;
pub mod user;

// Import bulk restore reducers for disaster recovery
mod restore;

use catalog::Catalog;
use games::GameResult;
use leaderboard::Leaderboard;
use progress::Progress;
use service::ProgressService;
use store::{progress_from_row, TableStore};
use user::Registration;

// ==================== CONSTANTS ====================

/// Location every new employee starts with
pub const DEFAULT_LOCATION: &str = "headquarters";

/// XP needed per level step (level = xp / XP_PER_LEVEL + 1)
pub const XP_PER_LEVEL: u32 = 100;

/// Share of a quiz/game score credited as XP (50 = floor(score * 0.5))
pub const QUIZ_XP_PERCENT: u32 = 50;

// ==================== HELPER FUNCTIONS ====================

/// First 8 characters of an id, for log lines
fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}

/// Resolve the calling connection to its verified user id
fn session_user_id(ctx: &ReducerContext) -> Result<String, String> {
    ctx.db.session()
        .connection_id()
        .find(&ctx.sender)
        .map(|s| s.user_id)
        .ok_or("No session found".to_string())
}

fn require_worker(ctx: &ReducerContext, action: &str) -> Result<(), String> {
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized {} attempt by {}", action, ctx.sender);
        return Err("Unauthorized".to_string());
    }
    Ok(())
}

/// Progress service over this transaction's tables
fn service(ctx: &ReducerContext) -> Result<ProgressService<'static, TableStore<'_>>, String> {
    let catalog = Catalog::builtin().map_err(|e| e.to_string())?;
    Ok(ProgressService::new(TableStore::new(ctx), catalog))
}

/// Project a leaderboard onto table rows
fn leaderboard_rows(board: &Leaderboard, now: Timestamp) -> (Vec<LeaderboardRow>, Vec<DepartmentRow>) {
    let champions: std::collections::HashSet<&str> = board.champions.iter()
        .map(|c| c.user_id.as_str())
        .collect();
    let entries = board.entries.iter()
        .map(|e| LeaderboardRow {
            user_id: e.user_id.clone(),
            position: e.rank,
            name: e.name.clone(),
            department: e.department.clone(),
            total_xp: e.total_xp,
            level: e.level,
            completed_modules: e.completed_modules,
            total_modules: board.total_modules,
            badges: e.badges,
            champion: champions.contains(e.user_id.as_str()),
            completed_at: e.completed_at,
            refreshed_at: now,
        })
        .collect();
    let departments = board.departments.iter()
        .map(|d| DepartmentRow {
            department: d.department.clone(),
            members: d.members,
            total_xp: d.total_xp,
            avg_xp: d.avg_xp,
            champions: d.champions,
        })
        .collect();
    (entries, departments)
}

/// Project the unlock engine's answer for one user
fn availability_row(progress: &Progress, catalog: &Catalog) -> AvailabilityRow {
    let available = unlock::compute_availability(progress, catalog);
    AvailabilityRow {
        user_id: progress.user_id().to_string(),
        missions: available.missions,
        locations: available.locations,
        completed_modules: progress.completed_modules(catalog),
        total_modules: catalog.total_modules(),
    }
}

/// Every catalog badge with its live unlock state
fn badge_progress_rows(progress: &Progress, catalog: &Catalog) -> Vec<BadgeProgressRow> {
    catalog.badges().iter()
        .zip(badges::evaluate_badges(progress, catalog))
        .map(|(def, status)| BadgeProgressRow {
            badge_id: status.id,
            name: def.name.clone(),
            unlocked: status.unlocked,
            progress: status.progress,
        })
        .collect()
}

/// Stored progress of a registered user, bootstrap progress if the row went missing
fn view_progress(ctx: &spacetimedb::ViewContext) -> Option<Progress> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    let account = ctx.db.user_account().id().find(&session.user_id)?;
    Some(ctx.db.user_progress()
        .user_id()
        .find(&account.id)
        .map(progress_from_row)
        .unwrap_or_else(|| Progress::new(account.id)))
}

/// Rebuild the public leaderboard and department tables from current progress
fn write_leaderboard(ctx: &ReducerContext) -> Result<Leaderboard, String> {
    let board = service(ctx)?.leaderboard().map_err(|e| e.to_string())?;
    let (entries, departments) = leaderboard_rows(&board, ctx.timestamp);

    let stale_entries: Vec<String> = ctx.db.leaderboard_entry().iter().map(|e| e.user_id).collect();
    for user_id in stale_entries {
        ctx.db.leaderboard_entry().user_id().delete(&user_id);
    }
    let stale_departments: Vec<String> = ctx.db.department_stat().iter().map(|d| d.department).collect();
    for department in stale_departments {
        ctx.db.department_stat().department().delete(&department);
    }

    for row in entries {
        ctx.db.leaderboard_entry().insert(row);
    }
    for row in departments {
        ctx.db.department_stat().insert(row);
    }
    Ok(board)
}

// ==================== TABLES ====================

/// Session links ephemeral connection to stable user
/// PRIVATE: created by the auth gateway after it verified credentials
#[table(name = session)]
pub struct Session {
    #[primary_key]
    pub connection_id: Identity,

    /// Stable user ID issued by the identity provider
    pub user_id: String,

    pub connected_at: Timestamp,
}

/// Authorized identities that can create sessions and call admin reducers
#[table(name = authorized_worker)]
pub struct AuthorizedWorker {
    #[primary_key]
    pub identity: Identity,
}

/// Employee profile
/// PRIVATE: clients read their own row through the my_user view
#[table(name = user_account)]
#[derive(Clone)]
pub struct UserAccount {
    #[primary_key]
    pub id: String,

    /// Login handle, stored lowercase
    #[unique]
    pub username: String,

    pub name: String,

    #[index(btree)]
    pub department: String,

    pub role: String,

    /// Self-reported experience level
    pub experience: String,

    /// Emoji or image key chosen in character creation
    pub avatar: Option<String>,

    pub registered_at: Timestamp,
}

/// Onboarding progress document, one per user
/// PRIVATE: clients read their own row through the my_progress view
#[table(name = user_progress)]
#[derive(Clone)]
pub struct UserProgress {
    #[primary_key]
    pub user_id: String,

    /// Derived from xp on every write, stored for client convenience
    pub level: u32,

    pub xp: u32,

    pub completed_missions: Vec<String>,

    /// Quizzes and mini-games
    pub completed_quizzes: Vec<String>,

    pub unlocked_locations: Vec<String>,

    /// Best score per quiz/game/mission stored as JSON
    /// Example: {"trivia-quiz": 80, "memory-game": 95}
    pub best_scores: Option<String>,

    /// When every module was first complete
    pub completed_at: Option<Timestamp>,

    pub updated_at: Timestamp,
}

/// Snapshot of a badge at the moment it unlocked (audit/display only)
#[table(name = badge_award)]
pub struct BadgeAward {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub user_id: String,

    pub badge_id: String,

    pub unlocked_at: Timestamp,
}

/// Ranked leaderboard, rebuilt after every completion
#[table(name = leaderboard_entry, public)]
#[derive(Clone)]
pub struct LeaderboardRow {
    #[primary_key]
    pub user_id: String,

    /// 1-based position
    pub position: u32,

    /// Display name (denormalized)
    pub name: String,

    pub department: String,

    pub total_xp: u32,

    pub level: u32,

    pub completed_modules: u32,

    pub total_modules: u32,

    /// Unlocked badge count
    pub badges: u32,

    /// All modules complete
    pub champion: bool,

    pub completed_at: Option<Timestamp>,

    pub refreshed_at: Timestamp,
}

/// Per-department aggregates shown next to the leaderboard
#[table(name = department_stat, public)]
pub struct DepartmentRow {
    #[primary_key]
    pub department: String,

    pub members: u32,

    pub total_xp: u64,

    /// Rounded to nearest integer
    pub avg_xp: u32,

    pub champions: u32,
}

/// What the caller can do right now (my_availability view)
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct AvailabilityRow {
    pub user_id: String,

    /// Missions that can be completed now, catalog order
    pub missions: Vec<String>,

    pub locations: Vec<String>,

    pub completed_modules: u32,

    pub total_modules: u32,
}

/// Live badge state (my_badge_progress view)
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct BadgeProgressRow {
    pub badge_id: String,

    pub name: String,

    pub unlocked: bool,

    /// 0-100
    pub progress: u32,
}

// ==================== VIEWS ====================

/// View: the caller's own profile
#[view(name = my_user, public)]
fn my_user(ctx: &spacetimedb::ViewContext) -> Option<UserAccount> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    ctx.db.user_account().id().find(&session.user_id)
}

/// View: the caller's own progress document
#[view(name = my_progress, public)]
fn my_progress(ctx: &spacetimedb::ViewContext) -> Option<UserProgress> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    ctx.db.user_progress().user_id().find(&session.user_id)
}

/// View: badges the caller has unlocked
#[view(name = my_badges, public)]
fn my_badges(ctx: &spacetimedb::ViewContext) -> Vec<BadgeAward> {
    match ctx.db.session().connection_id().find(ctx.sender) {
        Some(session) => ctx.db.badge_award().user_id().filter(&session.user_id).collect(),
        None => Vec::new(),
    }
}

/// View: the caller's own leaderboard row
#[view(name = my_leaderboard_entry, public)]
fn my_leaderboard_entry(ctx: &spacetimedb::ViewContext) -> Option<LeaderboardRow> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    ctx.db.leaderboard_entry().user_id().find(&session.user_id)
}

/// View: missions and locations open to the caller
#[view(name = my_availability, public)]
fn my_availability(ctx: &spacetimedb::ViewContext) -> Option<AvailabilityRow> {
    let catalog = Catalog::builtin().ok()?;
    let progress = view_progress(ctx)?;
    Some(availability_row(&progress, catalog))
}

/// View: every badge with unlock state and progress percentage
#[view(name = my_badge_progress, public)]
fn my_badge_progress(ctx: &spacetimedb::ViewContext) -> Vec<BadgeProgressRow> {
    match (Catalog::builtin(), view_progress(ctx)) {
        (Ok(catalog), Some(progress)) => badge_progress_rows(&progress, catalog),
        _ => Vec::new(),
    }
}

// ==================== REDUCERS ====================

/// Initialize module
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_worker().insert(AuthorizedWorker {
            identity: ctx.sender,
        });
    }

    match Catalog::builtin() {
        Ok(catalog) => log::info!("City onboarding module initialized missions={} locations={} quizzes={} badges={}",
            catalog.missions().len(), catalog.locations().len(), catalog.quizzes().len(), catalog.badges().len()),
        Err(e) => log::error!("City onboarding module initialized with invalid catalog: {}", e),
    }
}

/// Create a verified session for a client identity
/// Called by the auth gateway AFTER verifying the user's credentials
#[reducer]
pub fn create_session(ctx: &ReducerContext, client_identity: String, user_id: String) -> Result<(), String> {
    require_worker(ctx, "create_session")?;

    let identity = Identity::from_hex(&client_identity)
        .map_err(|e| format!("Invalid identity hex string: {}", e))?;

    // Same user reconnecting uncleanly, or same connection reused
    let stale_sessions: Vec<_> = ctx.db.session()
        .iter()
        .filter(|s| s.user_id == user_id || s.connection_id == identity)
        .map(|s| s.connection_id)
        .collect();
    for conn_id in stale_sessions {
        ctx.db.session().connection_id().delete(&conn_id);
    }

    ctx.db.session().insert(Session {
        connection_id: identity,
        user_id: user_id.clone(),
        connected_at: ctx.timestamp,
    });

    log::info!("[SESSION] created user:{} ws:{}", short_id(&user_id), short_id(&client_identity));
    Ok(())
}

/// Clean up session when a client disconnects
#[reducer(client_disconnected)]
pub fn on_disconnect(ctx: &ReducerContext) {
    if let Some(session) = ctx.db.session().connection_id().find(&ctx.sender) {
        let session_duration_secs = ctx.timestamp.duration_since(session.connected_at)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        log::info!("[DISCONNECT] user:{} session_min:{:.1}",
            short_id(&session.user_id), session_duration_secs as f32 / 60.0);
        ctx.db.session().connection_id().delete(&ctx.sender);
    }
}

/// Register the session's user with their profile and bootstrap progress
#[reducer]
pub fn register(
    ctx: &ReducerContext,
    username: String,
    name: String,
    department: String,
    role: String,
    experience: String,
) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let form = Registration { username, name, department, role, experience };
    let response = service(ctx)?
        .register(&user_id, form, ctx.timestamp)
        .map_err(|e| e.to_string())?;
    log::info!("[REGISTER] {} user:{}", response.message, short_id(&response.user.id));
    write_leaderboard(ctx)?;
    Ok(())
}

/// Returning user: bootstraps progress if the document went missing
#[reducer]
pub fn login(ctx: &ReducerContext) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let response = service(ctx)?
        .login(&user_id, ctx.timestamp)
        .map_err(|e| e.to_string())?;
    log::debug!("[LOGIN] {} user:{} level:{}", response.message, short_id(&user_id), response.progress.level);
    Ok(())
}

/// Edit the mutable profile fields (display name, avatar)
#[reducer]
pub fn update_profile(ctx: &ReducerContext, name: Option<String>, avatar: Option<String>) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let name_changed = name.is_some();
    service(ctx)?
        .update_profile(&user_id, name, avatar)
        .map_err(|e| e.to_string())?;
    if name_changed {
        write_leaderboard(ctx)?;
    }
    Ok(())
}

/// Complete a mission; repeat completion succeeds without granting XP again
#[reducer]
pub fn complete_mission(ctx: &ReducerContext, mission_id: String, score: Option<u32>) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let completion = service(ctx)?
        .complete_mission(&user_id, &mission_id, score, ctx.timestamp)
        .map_err(|e| e.to_string())?;
    if completion.changes_leaderboard() {
        write_leaderboard(ctx)?;
    }
    Ok(())
}

/// Complete a quiz with a score already normalized by the client game
#[reducer]
pub fn complete_quiz(ctx: &ReducerContext, quiz_id: String, score: u32) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let completion = service(ctx)?
        .complete_quiz(&user_id, &quiz_id, score, ctx.timestamp)
        .map_err(|e| e.to_string())?;
    if completion.changes_leaderboard() {
        write_leaderboard(ctx)?;
    }
    Ok(())
}

/// Submit a raw mini-game round; the server applies that game's scoring formula
#[reducer]
pub fn submit_game_result(ctx: &ReducerContext, result: GameResult) -> Result<(), String> {
    let user_id = session_user_id(ctx)?;
    let completion = service(ctx)?
        .submit_game(&user_id, &result, ctx.timestamp)
        .map_err(|e| e.to_string())?;
    if completion.changes_leaderboard() {
        write_leaderboard(ctx)?;
    }
    Ok(())
}

/// On-demand leaderboard rebuild (clients poll the public tables)
#[reducer]
pub fn refresh_leaderboard(ctx: &ReducerContext) -> Result<(), String> {
    let board = write_leaderboard(ctx)?;
    let caller = ctx.db.session()
        .connection_id()
        .find(&ctx.sender)
        .map(|s| s.user_id)
        .unwrap_or_default();
    let view = board.view_for(&caller);
    log::info!("[LEADERBOARD] refreshed entries={} champions={} caller_rank={:?}",
        view.entries.len(), board.champions.len(), view.me.map(|e| e.rank));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::Participant;
    use crate::user::UserProfile;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("ééééééééé"), "éééééééé");
    }

    #[test]
    fn test_constants_match_catalog() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.location(DEFAULT_LOCATION).is_some());
        assert_eq!(scoring::quiz_xp(80), 40);
    }

    #[test]
    fn test_availability_row_follows_unlocks() {
        let catalog = Catalog::builtin().unwrap();
        let mut progress = Progress::new("u1");
        let fresh = availability_row(&progress, catalog);
        assert_eq!(fresh.missions, vec!["character-creation".to_string()]);
        assert_eq!(fresh.locations, vec![DEFAULT_LOCATION.to_string()]);
        assert_eq!((fresh.completed_modules, fresh.total_modules), (0, 6));

        let now = Timestamp::from_micros_since_unix_epoch(0);
        unlock::complete_mission(&mut progress, catalog, "character-creation", now).unwrap();
        unlock::complete_mission(&mut progress, catalog, "headquarters-tour", now).unwrap();
        let row = availability_row(&progress, catalog);
        assert_eq!(row.user_id, "u1");
        assert_eq!(row.missions, vec!["benefits-enrollment", "company-culture", "tools-training"]);
        assert_eq!(row.locations, vec!["headquarters", "culture-museum", "training-center"]);
        assert_eq!(row.completed_modules, 1);
    }

    #[test]
    fn test_badge_progress_rows_cover_catalog() {
        let catalog = Catalog::builtin().unwrap();
        let progress = Progress::from_parts(
            "u1", 250, vec!["character-creation".to_string()], Vec::<String>::new(), Vec::<String>::new(),
            Default::default(), None,
        );
        let rows = badge_progress_rows(&progress, catalog);
        assert_eq!(rows.len(), catalog.badges().len());

        let by_id = |id: &str| rows.iter().find(|r| r.badge_id == id).unwrap();
        assert!(by_id("first-steps").unlocked);
        assert_eq!(by_id("first-steps").progress, 100);
        assert!(!by_id("rising-star").unlocked);
        assert_eq!(by_id("rising-star").progress, 50);
        assert!(!by_id("rising-star").name.is_empty());
    }

    #[test]
    fn test_leaderboard_rows_flag_champions() {
        let catalog = Catalog::builtin().unwrap();
        let profile = |id: &str, department: &str| UserProfile {
            id: id.into(),
            username: id.into(),
            name: id.into(),
            department: department.into(),
            role: "Developer".into(),
            experience: "junior".into(),
            avatar: None,
            registered_at: 0,
        };
        let all_modules: Vec<String> = catalog.primary_missions().map(|m| m.id.clone()).collect();
        let champion = Progress::from_parts("a", 780, all_modules, Vec::<String>::new(), Vec::<String>::new(), Default::default(), None);
        let newcomer = Progress::new("b");
        let (pa, pb) = (profile("a", "Engineering"), profile("b", "Sales"));
        let board = Leaderboard::build(
            &[Participant { profile: &pb, progress: &newcomer }, Participant { profile: &pa, progress: &champion }],
            catalog,
        );

        let (entries, departments) = leaderboard_rows(&board, Timestamp::from_micros_since_unix_epoch(0));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "a");
        assert_eq!(entries[0].position, 1);
        assert!(entries[0].champion);
        assert_eq!(entries[0].total_modules, 6);
        assert!(!entries[1].champion);
        assert_eq!(departments.iter().map(|d| d.department.as_str()).collect::<Vec<_>>(), vec!["Engineering", "Sales"]);
    }
}
