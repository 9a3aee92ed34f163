use std::collections::BTreeMap;

use spacetimedb::Timestamp;

use crate::badges::unlocked_count;
use crate::catalog::Catalog;
use crate::progress::Progress;
use crate::user::UserProfile;

/// One user as seen by the ranker
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    pub profile: &'a UserProfile,
    pub progress: &'a Progress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub department: String,
    pub total_xp: u32,
    pub level: u32,
    pub completed_modules: u32,
    pub badges: u32,
    /// 1-based position in the overall ranking
    pub rank: u32,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentStat {
    pub department: String,
    pub members: u32,
    pub total_xp: u64,
    /// Rounded to the nearest integer, halves up
    pub avg_xp: u32,
    pub champions: u32,
}

/// Derived, read-only projection of every user's progress
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub champions: Vec<LeaderboardEntry>,
    pub departments: Vec<DepartmentStat>,
    pub total_modules: u32,
}

/// What a single user gets back from a leaderboard query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardView<'a> {
    pub entries: &'a [LeaderboardEntry],
    pub me: Option<&'a LeaderboardEntry>,
}

fn micros(at: Option<Timestamp>) -> Option<i64> {
    at.map(|t| t.to_micros_since_unix_epoch())
}

/// Rank by total XP descending.
///
/// Equal XP is broken by completion time (earliest first) among entries that
/// have one; entries without a completion time keep their input position.
pub fn rank(participants: &[Participant<'_>], catalog: &Catalog) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = participants.iter()
        .map(|p| LeaderboardEntry {
            user_id: p.profile.id.clone(),
            name: p.profile.name.clone(),
            department: p.profile.department.clone(),
            total_xp: p.progress.xp(),
            level: p.progress.level(),
            completed_modules: p.progress.completed_modules(catalog),
            badges: unlocked_count(p.progress, catalog),
            rank: 0,
            completed_at: p.progress.completed_at(),
        })
        .collect();

    // sort_by_key is stable, so equal XP keeps input order
    entries.sort_by_key(|e| std::cmp::Reverse(e.total_xp));

    let mut start = 0;
    while start < entries.len() {
        let xp = entries[start].total_xp;
        let end = start + entries[start..].iter().take_while(|e| e.total_xp == xp).count();
        order_timed_slots(&mut entries[start..end]);
        start = end;
    }

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }
    entries
}

/// Within one XP tie group, reorder the entries that carry a completion time
/// among the slots they already occupy.
fn order_timed_slots(group: &mut [LeaderboardEntry]) {
    let slots: Vec<usize> = group.iter()
        .enumerate()
        .filter(|(_, e)| e.completed_at.is_some())
        .map(|(i, _)| i)
        .collect();
    if slots.len() < 2 {
        return;
    }
    let mut timed: Vec<LeaderboardEntry> = slots.iter().map(|&i| group[i].clone()).collect();
    timed.sort_by_key(|e| micros(e.completed_at));
    for (slot, entry) in slots.into_iter().zip(timed) {
        group[slot] = entry;
    }
}

/// Users who completed every module.
///
/// Those with a completion time come first, earliest first; the rest follow
/// by XP (the order of `ranked`).
pub fn champions(ranked: &[LeaderboardEntry], total_modules: u32) -> Vec<LeaderboardEntry> {
    let (mut timed, untimed): (Vec<_>, Vec<_>) = ranked.iter()
        .filter(|e| e.completed_modules == total_modules)
        .cloned()
        .partition(|e| e.completed_at.is_some());
    timed.sort_by_key(|e| micros(e.completed_at));
    timed.extend(untimed);
    timed
}

pub fn department_stats(ranked: &[LeaderboardEntry], total_modules: u32) -> Vec<DepartmentStat> {
    let mut by_department: BTreeMap<&str, (u32, u64, u32)> = BTreeMap::new();
    for entry in ranked {
        let slot = by_department.entry(entry.department.as_str()).or_insert((0, 0, 0));
        slot.0 += 1;
        slot.1 += u64::from(entry.total_xp);
        slot.2 += u32::from(entry.completed_modules == total_modules);
    }
    by_department.into_iter()
        .map(|(department, (members, total_xp, champions))| DepartmentStat {
            department: department.to_string(),
            members,
            total_xp,
            avg_xp: ((total_xp + u64::from(members) / 2) / u64::from(members)) as u32,
            champions,
        })
        .collect()
}

impl Leaderboard {
    pub fn build(participants: &[Participant<'_>], catalog: &Catalog) -> Leaderboard {
        let total_modules = catalog.total_modules();
        let entries = rank(participants, catalog);
        Leaderboard {
            champions: champions(&entries, total_modules),
            departments: department_stats(&entries, total_modules),
            entries,
            total_modules,
        }
    }

    pub fn entry(&self, user_id: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    /// Sorted entries plus the requester's own row
    pub fn view_for(&self, user_id: &str) -> LeaderboardView<'_> {
        LeaderboardView {
            entries: &self.entries,
            me: self.entry(user_id),
        }
    }
}
