use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{GameStatus, PlayerId, Question, SubmittedAnswer, TurnPosition};

/// Who produced the result currently on screen. Only the client that
/// answered moves the game forward afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResultOrigin {
    AnsweredByMe,
    AnsweredByOther,
}

/// Per-client turn phase layered over `GameStatus::Playing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "phase", content = "origin", rename_all = "snake_case")]
#[ts(export)]
pub enum Phase {
    Lobby,
    Loading,
    TurnIntro,
    Question,
    Result(ResultOrigin),
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub points: u32,
    pub multiplier: f64,
    pub correct_answer: String,
    pub explanation: String,
    #[ts(type = "string")]
    pub selected: SubmittedAnswer,
}

/// Derived view-model a presentation layer renders from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TurnView {
    pub phase: Phase,
    pub status: GameStatus,
    pub position: TurnPosition,
    pub current_player: Option<PlayerId>,
    pub is_my_turn: bool,
    pub is_host: bool,
    pub question: Option<Question>,
    pub outcome: Option<AnswerOutcome>,
    pub completed_turns: usize,
    pub total_turns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum AwardKind {
    HottestStreak,
    Sharpshooter,
    SpeedDemon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Award {
    pub kind: AwardKind,
    pub player_id: PlayerId,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub score: u32,
    pub tied: bool,
}
