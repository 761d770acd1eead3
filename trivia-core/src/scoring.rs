use serde::{Deserialize, Serialize};
use trivia_types::{
    AnswerOutcome, AnswerReport, MAX_DIFFICULTY, MIN_DIFFICULTY, Player, PlayerUpdate, Question,
    RoundResult, SubmittedAnswer,
};

pub struct ScoringEngine;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointsAward {
    pub points: u32,
    pub new_streak: u32,
    pub multiplier: f64,
}

/// Everything produced by scoring one answer for one player
#[derive(Debug, Clone)]
pub struct ScoredAnswer {
    pub award: PointsAward,
    pub update: PlayerUpdate,
    pub result: RoundResult,
    pub report: AnswerReport,
    pub outcome: AnswerOutcome,
}

impl ScoringEngine {
    pub const BASE_POINTS: f64 = 10.0;
    pub const MAX_TIME_BONUS: f64 = 5.0;

    /// Points for an answer given the player's streak before it
    pub fn calculate_points(
        is_correct: bool,
        prior_streak: u32,
        time_elapsed: f64,
        time_limit: u32,
    ) -> PointsAward {
        if !is_correct {
            return PointsAward {
                points: 0,
                new_streak: 0,
                multiplier: 1.0,
            };
        }

        let new_streak = prior_streak + 1;
        let multiplier = Self::streak_multiplier(new_streak);
        let time_bonus = Self::time_bonus(time_elapsed, time_limit) as f64;
        let points = ((Self::BASE_POINTS + time_bonus) * multiplier).round() as u32;

        PointsAward {
            points,
            new_streak,
            multiplier,
        }
    }

    pub fn streak_multiplier(streak: u32) -> f64 {
        match streak {
            s if s >= 5 => 2.5,
            s if s >= 3 => 2.0,
            s if s >= 2 => 1.5,
            _ => 1.0,
        }
    }

    /// Linear decay from the full bonus at 0s to nothing at the time limit
    pub fn time_bonus(time_elapsed: f64, time_limit: u32) -> u32 {
        if time_limit == 0 {
            return 0;
        }
        let remaining = (1.0 - time_elapsed.max(0.0) / time_limit as f64).max(0.0);
        (Self::MAX_TIME_BONUS * remaining).round() as u32
    }

    /// Difficulty rises only on sustained success and drops on every miss
    pub fn adjust_difficulty(current: u8, is_correct: bool, new_streak: u32) -> u8 {
        if is_correct && new_streak >= 2 {
            current.saturating_add(1).min(MAX_DIFFICULTY)
        } else if !is_correct {
            current.saturating_sub(1).max(MIN_DIFFICULTY)
        } else {
            current
        }
    }

    /// Scores `answer` for `player` and derives every state change it causes
    pub fn score_answer(
        player: &Player,
        question: &Question,
        round: u32,
        answer: SubmittedAnswer,
        time_elapsed: f64,
    ) -> ScoredAnswer {
        let is_correct = question.is_correct(&answer);
        let award = Self::calculate_points(
            is_correct,
            player.streak,
            time_elapsed,
            question.time_limit,
        );

        let score = player.score + award.points;
        let best_streak = player.best_streak.max(award.new_streak);
        let correct_answers = player.correct_answers + u32::from(is_correct);
        let total_answers = player.total_answers + 1;
        let difficulty = Self::adjust_difficulty(player.difficulty, is_correct, award.new_streak);
        let lives = if is_correct {
            player.lives
        } else {
            player.lives.saturating_sub(1)
        };
        let fastest_answer = if is_correct {
            Some(match player.fastest_answer {
                Some(fastest) => fastest.min(time_elapsed),
                None => time_elapsed,
            })
        } else {
            player.fastest_answer
        };

        let update = PlayerUpdate {
            score: Some(score),
            streak: Some(award.new_streak),
            best_streak: Some(best_streak),
            correct_answers: Some(correct_answers),
            total_answers: Some(total_answers),
            lives: Some(lives),
            difficulty: Some(difficulty),
            fastest_answer,
            is_ready: None,
        };

        let report = AnswerReport {
            player_id: player.id,
            question_id: question.id,
            round,
            answer: answer.clone(),
            is_correct,
            points: award.points,
            new_score: score,
            streak: award.new_streak,
            best_streak,
            correct_answers,
            total_answers,
            lives,
            difficulty,
            fastest_answer,
            time_elapsed,
            completed_turns: 0,
        };

        let outcome = AnswerOutcome {
            is_correct,
            points: award.points,
            multiplier: award.multiplier,
            correct_answer: question.correct_answer.clone(),
            explanation: question.explanation.clone(),
            selected: answer,
        };

        ScoredAnswer {
            award,
            update,
            result: report.result(),
            report,
            outcome,
        }
    }
}
