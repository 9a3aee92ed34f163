// End-to-end onboarding runs through the progress service over an in-memory store

use city_onboarding::catalog::Catalog;
use city_onboarding::error::ProgressError;
use city_onboarding::games::{GameResult, MemoryRound, QuizRound};
use city_onboarding::service::ProgressService;
use city_onboarding::store::MemoryStore;
use city_onboarding::unlock::compute_availability;
use city_onboarding::user::Registration;
use pretty_assertions::assert_eq;
use spacetimedb::Timestamp;

const DAY_MICROS: i64 = 86_400_000_000;

/// Primary path in dependency order, starting from character creation
const CHAMPION_PATH: [&str; 7] = [
    "character-creation",
    "headquarters-tour",
    "company-culture",
    "tools-training",
    "meet-the-team",
    "security-compliance",
    "first-project",
];

fn at(micros: i64) -> Timestamp {
    Timestamp::from_micros_since_unix_epoch(micros)
}

fn new_service() -> ProgressService<'static, MemoryStore> {
    ProgressService::new(MemoryStore::new(), Catalog::builtin().unwrap())
}

fn register(service: &mut ProgressService<'static, MemoryStore>, id: &str, department: &str, now: i64) {
    service.register(id, Registration {
        username: id.to_string(),
        name: format!("Employee {}", id),
        department: department.to_string(),
        role: "Developer".to_string(),
        experience: "junior".to_string(),
    }, at(now)).unwrap();
}

fn run_champion_path(service: &mut ProgressService<'static, MemoryStore>, id: &str, start: i64) {
    for (step, mission) in CHAMPION_PATH.iter().enumerate() {
        service.complete_mission(id, mission, None, at(start + step as i64)).unwrap();
    }
}

#[test]
fn fresh_employee_starts_at_headquarters() {
    let mut service = new_service();
    register(&mut service, "new-hire", "Engineering", 0);

    let response = service.login("new-hire", at(DAY_MICROS / 2)).unwrap();
    assert_eq!(response.message, "Login successful");
    assert_eq!(response.progress.level, 1);
    assert_eq!(response.progress.xp, 0);
    assert_eq!(response.progress.unlocked_locations, vec!["headquarters".to_string()]);

    let progress = service.progress("new-hire").unwrap();
    let availability = compute_availability(&progress, service.catalog());
    assert_eq!(availability.missions, vec!["character-creation".to_string()]);
}

#[test]
fn missions_unlock_in_dependency_order() {
    let mut service = new_service();
    register(&mut service, "u1", "Engineering", 0);

    // (mission, expected xp after, expected new locations)
    let steps: Vec<(&str, u32, Vec<&str>)> = vec![
        ("character-creation", 50, vec![]),
        ("headquarters-tour", 150, vec!["culture-museum", "training-center"]),
        ("company-culture", 270, vec!["team-plaza"]),
        ("tools-training", 420, vec!["security-vault"]),
        ("meet-the-team", 540, vec!["innovation-lab"]),
    ];

    for (mission, xp, unlocked) in steps {
        let completion = service.complete_mission("u1", mission, None, at(1)).unwrap();
        assert_eq!(completion.progress.xp(), xp, "xp after {}", mission);
        assert_eq!(completion.unlocked_locations, unlocked, "locations after {}", mission);
    }

    let progress = service.progress("u1").unwrap();
    assert_eq!(progress.unlocked_locations().len(), 6);
    assert_eq!(progress.level(), 6);
}

#[test]
fn locked_mission_is_rejected_without_side_effects() {
    let mut service = new_service();
    register(&mut service, "u1", "Engineering", 0);

    let err = service.complete_mission("u1", "headquarters-tour", None, at(1)).unwrap_err();
    assert_eq!(err, ProgressError::MissionLocked {
        mission: "headquarters-tour".to_string(),
        missing: vec!["character-creation".to_string()],
        location_locked: false,
    });

    let err = service.complete_mission("u1", "first-project", None, at(1)).unwrap_err();
    assert!(matches!(err, ProgressError::MissionLocked { location_locked: true, .. }));

    let progress = service.progress("u1").unwrap();
    assert_eq!(progress.xp(), 0);
    assert!(progress.completed_missions().is_empty());
}

#[test]
fn repeat_completions_never_grant_xp_twice() {
    let mut service = new_service();
    register(&mut service, "u1", "Engineering", 0);

    service.complete_mission("u1", "character-creation", None, at(1)).unwrap();
    let repeat = service.complete_mission("u1", "character-creation", None, at(2)).unwrap();
    assert!(repeat.already_completed);
    assert_eq!(repeat.xp_gained, 0);
    assert_eq!(repeat.progress.xp(), 50);

    let first = service.complete_quiz("u1", "trivia-quiz", 80, at(3)).unwrap();
    assert_eq!(first.xp_gained, 40);
    let better = service.complete_quiz("u1", "trivia-quiz", 100, at(4)).unwrap();
    assert_eq!(better.xp_gained, 0);
    assert_eq!(better.progress.xp(), 90);
    assert_eq!(better.progress.best_score("trivia-quiz"), Some(100));
}

#[test]
fn game_rounds_are_scored_server_side() {
    let mut service = new_service();
    register(&mut service, "u1", "Engineering", 0);

    let round = GameResult::Memory(MemoryRound { pairs: 8, moves: 10, seconds: 45 });
    let score = round.score();
    let completion = service.submit_game("u1", &round, at(1)).unwrap();
    assert_eq!(completion.xp_gained, score / 2);
    assert!(completion.progress.has_completed_quiz("memory-game"));

    let quiz = GameResult::Quiz(QuizRound { quiz_id: "security-quiz".into(), correct: 9, total: 10 });
    let completion = service.submit_game("u1", &quiz, at(2)).unwrap();
    assert_eq!(completion.xp_gained, 45);

    let unknown = GameResult::Quiz(QuizRound { quiz_id: "pop-quiz".into(), correct: 1, total: 1 });
    assert!(service.submit_game("u1", &unknown, at(3)).unwrap_err().is_not_found());
}

#[test]
fn full_onboarding_run_earns_champion_badges() {
    let mut service = new_service();
    register(&mut service, "u1", "Engineering", 0);

    let mut earned = Vec::new();
    let mut finished = Vec::new();
    for (step, mission) in CHAMPION_PATH.iter().enumerate() {
        let completion = service.complete_mission("u1", mission, None, at(100 + step as i64)).unwrap();
        earned.extend(completion.new_badges);
        if completion.finished_onboarding {
            finished.push(*mission);
        }
    }

    assert_eq!(finished, vec!["first-project"]);
    earned.sort();
    assert_eq!(earned, vec![
        "city-explorer",
        "first-steps",
        "onboarding-champion",
        "rising-star",
        "security-guardian",
    ]);

    let progress = service.progress("u1").unwrap();
    assert_eq!(progress.xp(), 890);
    assert_eq!(progress.level(), 9);
    assert_eq!(progress.completed_at(), Some(at(106)));
    assert!(service.store().badge_unlocked_at("u1", "first-steps").is_some());
}

#[test]
fn leaderboard_ranks_by_xp_and_champions_by_completion_time() {
    let mut service = new_service();
    register(&mut service, "early", "Engineering", 0);
    register(&mut service, "late", "Engineering", 0);
    register(&mut service, "browser", "Sales", 0);

    run_champion_path(&mut service, "early", 1_000);
    run_champion_path(&mut service, "late", 2_000);
    service.complete_quiz("late", "trivia-quiz", 80, at(3_000)).unwrap();
    service.complete_mission("browser", "character-creation", None, at(4_000)).unwrap();

    let board = service.leaderboard().unwrap();
    let order: Vec<(&str, u32, u32)> = board.entries.iter()
        .map(|e| (e.user_id.as_str(), e.total_xp, e.rank))
        .collect();
    assert_eq!(order, vec![("late", 930, 1), ("early", 890, 2), ("browser", 50, 3)]);

    let champions: Vec<&str> = board.champions.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(champions, vec!["early", "late"]);

    let engineering = &board.departments[0];
    assert_eq!(engineering.department, "Engineering");
    assert_eq!((engineering.members, engineering.total_xp, engineering.avg_xp, engineering.champions), (2, 1820, 910, 2));

    let view = board.view_for("browser");
    assert_eq!(view.me.map(|e| e.rank), Some(3));
}
