// Mini-game results and their scoring formulas.
//
// Each game owns its formula (streaks, move counts, time bonuses) and reduces
// a round to a `(game_id, score)` pair on a 0-100 scale. The aggregator in
// `crate::scoring` only ever sees that pair.

use spacetimedb::SpacetimeType;

pub const TRIVIA_GAME_ID: &str = "trivia-quiz";
pub const MEMORY_GAME_ID: &str = "memory-game";
pub const PUZZLE_GAME_ID: &str = "puzzle-game";
pub const SCRAMBLE_GAME_ID: &str = "word-scramble";

const MAX_SCORE: u32 = 100;

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct TriviaRound {
    pub correct: u32,
    pub total: u32,
    /// Longest run of consecutive correct answers
    pub best_streak: u32,
    /// Seconds remaining on the round timer
    pub seconds_left: u32,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct MemoryRound {
    pub pairs: u32,
    /// Card pair flips; `pairs` is a perfect game
    pub moves: u32,
    pub seconds: u32,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct PuzzleRound {
    pub pieces: u32,
    pub moves: u32,
    pub seconds: u32,
    pub solved: bool,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct ScrambleRound {
    pub words: u32,
    pub solved: u32,
    pub hints_used: u32,
    pub best_streak: u32,
}

/// Plain multiple-choice quiz attached to a location
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct QuizRound {
    pub quiz_id: String,
    pub correct: u32,
    pub total: u32,
}

/// Final result of one mini-game round, as reported by the client
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub enum GameResult {
    Trivia(TriviaRound),
    Memory(MemoryRound),
    Puzzle(PuzzleRound),
    WordScramble(ScrambleRound),
    Quiz(QuizRound),
}

impl GameResult {
    pub fn game_id(&self) -> &str {
        match self {
            GameResult::Trivia(_) => TRIVIA_GAME_ID,
            GameResult::Memory(_) => MEMORY_GAME_ID,
            GameResult::Puzzle(_) => PUZZLE_GAME_ID,
            GameResult::WordScramble(_) => SCRAMBLE_GAME_ID,
            GameResult::Quiz(round) => &round.quiz_id,
        }
    }

    /// Normalized score, always within 0..=100
    pub fn score(&self) -> u32 {
        let raw = match self {
            GameResult::Trivia(round) => trivia_score(round),
            GameResult::Memory(round) => memory_score(round),
            GameResult::Puzzle(round) => puzzle_score(round),
            GameResult::WordScramble(round) => scramble_score(round),
            GameResult::Quiz(round) => ratio(round.correct, round.total, MAX_SCORE),
        };
        raw.min(MAX_SCORE)
    }

    /// The `(game_id, score)` pair handed to the scoring aggregator
    pub fn normalized(&self) -> (String, u32) {
        (self.game_id().to_string(), self.score())
    }
}

/// `part / whole * scale`, with `part` clamped to `whole`
fn ratio(part: u32, whole: u32, scale: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (u64::from(part.min(whole)) * u64::from(scale) / u64::from(whole)) as u32
}

// Accuracy 80, streak up to 10, time up to 10
fn trivia_score(round: &TriviaRound) -> u32 {
    if round.total == 0 {
        return 0;
    }
    let accuracy = ratio(round.correct, round.total, 80);
    let streak_bonus = round.best_streak.min(round.correct).min(5) * 2;
    let time_bonus = (round.seconds_left / 6).min(10);
    accuracy + streak_bonus + time_bonus
}

// Completion 60, move efficiency up to 30, speed up to 10
fn memory_score(round: &MemoryRound) -> u32 {
    if round.pairs == 0 {
        return 0;
    }
    let wasted_moves = round.moves.saturating_sub(round.pairs);
    let move_bonus = 30u32.saturating_sub(wasted_moves.saturating_mul(2));
    let time_bonus = if round.seconds <= round.pairs.saturating_mul(4) {
        10
    } else if round.seconds <= round.pairs.saturating_mul(8) {
        5
    } else {
        0
    };
    60 + move_bonus + time_bonus
}

// Solving 50, move efficiency up to 25, speed up to 25
fn puzzle_score(round: &PuzzleRound) -> u32 {
    if !round.solved {
        return 0;
    }
    let wasted_moves = round.moves.saturating_sub(round.pieces);
    let move_bonus = 25u32.saturating_sub(wasted_moves);
    let time_bonus = 25u32.saturating_sub(round.seconds / 12);
    50 + move_bonus + time_bonus
}

// Solved words 70, streak up to 20, clean run 10, minus 5 per hint
fn scramble_score(round: &ScrambleRound) -> u32 {
    if round.words == 0 {
        return 0;
    }
    let solved = round.solved.min(round.words);
    let base = ratio(solved, round.words, 70);
    let streak_bonus = round.best_streak.min(solved).min(5) * 4;
    let clean_bonus = if round.hints_used == 0 && solved == round.words { 10 } else { 0 };
    (base + streak_bonus + clean_bonus).saturating_sub(round.hints_used.saturating_mul(5))
}
