// Badge evaluation. Badges are never stored as mutable state: they are
// recomputed from progress on every read, and only snapshotted when unlocked.

use crate::catalog::{BadgeDef, BadgeRule, Catalog};
use crate::progress::Progress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeStatus {
    pub id: String,
    pub unlocked: bool,
    /// 0..=100; unlocked badges always report 100
    pub progress: u32,
}

/// `(current, required)` for a rule
fn measure(rule: &BadgeRule, progress: &Progress, catalog: &Catalog) -> (u32, u32) {
    match rule {
        BadgeRule::MissionsCompleted { count } => (progress.completed_missions().len() as u32, *count),
        BadgeRule::MissionCompleted { mission_id } => (u32::from(progress.has_completed_mission(mission_id)), 1),
        BadgeRule::QuizCategory { category } => {
            let (done, total) = catalog.quizzes_in_category(category)
                .fold((0, 0), |(done, total), quiz| {
                    (done + u32::from(progress.has_completed_quiz(&quiz.id)), total + 1)
                });
            (done, total)
        }
        BadgeRule::QuizzesCompleted { count } => (progress.completed_quizzes().len() as u32, *count),
        BadgeRule::XpAtLeast { xp } => (progress.xp(), *xp),
        BadgeRule::LocationsUnlocked { count } => (progress.unlocked_locations().len() as u32, *count),
        BadgeRule::AllModules => (progress.completed_modules(catalog), catalog.total_modules()),
    }
}

pub fn evaluate_badge(badge: &BadgeDef, progress: &Progress, catalog: &Catalog) -> BadgeStatus {
    let (current, required) = measure(&badge.rule, progress, catalog);
    let unlocked = current >= required;
    let percent = if unlocked || required == 0 {
        100
    } else {
        (u64::from(current) * 100 / u64::from(required)).min(100) as u32
    };
    BadgeStatus {
        id: badge.id.clone(),
        unlocked,
        progress: percent,
    }
}

/// Status of every catalog badge, in catalog order
pub fn evaluate_badges(progress: &Progress, catalog: &Catalog) -> Vec<BadgeStatus> {
    catalog.badges().iter()
        .map(|badge| evaluate_badge(badge, progress, catalog))
        .collect()
}

pub fn unlocked_count(progress: &Progress, catalog: &Catalog) -> u32 {
    evaluate_badges(progress, catalog).iter().filter(|b| b.unlocked).count() as u32
}

/// Badge ids unlocked in `after` but not in `before`
pub fn newly_unlocked(before: &Progress, after: &Progress, catalog: &Catalog) -> Vec<String> {
    let earlier = evaluate_badges(before, catalog);
    evaluate_badges(after, catalog)
        .into_iter()
        .zip(earlier)
        .filter(|(now, was)| now.unlocked && !was.unlocked)
        .map(|(now, _)| now.id)
        .collect()
}
