use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;
use uuid::Uuid;

use crate::errors::GameError;
use crate::{GameId, PlayerId, QuestionId};

pub const DEFAULT_DIFFICULTY: u8 = 5;
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 10;
pub const STARTING_LIVES: u8 = 3;
pub const DEFAULT_AVATAR: &str = "😀";
pub const DEFAULT_KID_AGE: u8 = 8;
pub const QUESTION_TIME_LIMIT_SECS: u32 = 20;
pub const ROUND_OPTIONS: [u32; 3] = [3, 5, 10];
pub const TIMEOUT_SENTINEL: &str = "__timeout__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum GameMode {
    Local,
    Online,
}

/// Lifecycle of a game. Only moves forward; a full reset starts a new game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum GameStatus {
    Lobby,
    Playing,
    Finished,
}

impl GameStatus {
    fn rank(self) -> u8 {
        match self {
            GameStatus::Lobby => 0,
            GameStatus::Playing => 1,
            GameStatus::Finished => 2,
        }
    }

    pub fn can_transition_to(self, next: GameStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Lobby => "lobby",
            GameStatus::Playing => "playing",
            GameStatus::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lobby" => Some(GameStatus::Lobby),
            "playing" => Some(GameStatus::Playing),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Subject {
    Science,
    History,
    Gaming,
    Movies,
    Music,
    Sports,
    Nature,
    Food,
    Travel,
    #[serde(rename = "Pop Culture")]
    PopCulture,
    Art,
    Tech,
}

impl Subject {
    pub const ALL: [Subject; 12] = [
        Subject::Science,
        Subject::History,
        Subject::Gaming,
        Subject::Movies,
        Subject::Music,
        Subject::Sports,
        Subject::Nature,
        Subject::Food,
        Subject::Travel,
        Subject::PopCulture,
        Subject::Art,
        Subject::Tech,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Subject::Science => "Science",
            Subject::History => "History",
            Subject::Gaming => "Gaming",
            Subject::Movies => "Movies",
            Subject::Music => "Music",
            Subject::Sports => "Sports",
            Subject::Nature => "Nature",
            Subject::Food => "Food",
            Subject::Travel => "Travel",
            Subject::PopCulture => "Pop Culture",
            Subject::Art => "Art",
            Subject::Tech => "Tech",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Language {
    #[default]
    En,
    He,
    Ru,
    De,
    Pl,
    Es,
}

impl Language {
    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::He => "Hebrew",
            Language::Ru => "Russian",
            Language::De => "German",
            Language::Pl => "Polish",
            Language::Es => "Spanish",
        }
    }

    /// Option labels used for true/false questions in this language
    pub fn true_false_labels(self) -> (&'static str, &'static str) {
        match self {
            Language::En => ("True", "False"),
            Language::He => ("נכון", "לא נכון"),
            Language::Ru => ("Верно", "Неверно"),
            Language::De => ("Wahr", "Falsch"),
            Language::Pl => ("Prawda", "Fałsz"),
            Language::Es => ("Verdadero", "Falso"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AgeGroup {
    Kid,
    Adult,
}

impl AgeGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeGroup::Kid => "kid",
            AgeGroup::Adult => "adult",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "kid" => Some(AgeGroup::Kid),
            "adult" => Some(AgeGroup::Adult),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    CompletePhrase,
    Estimation,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::CompletePhrase,
        QuestionType::Estimation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::CompletePhrase => "complete_phrase",
            QuestionType::Estimation => "estimation",
        }
    }

    /// Number of options a well-formed question of this type carries
    pub fn option_count(self) -> usize {
        match self {
            QuestionType::TrueFalse => 2,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub age: AgeGroup,
    pub kid_age: Option<u8>,
    pub avatar: String,
    pub difficulty: u8,
    pub score: u32,
    pub lives: u8,
    pub streak: u32,
    pub best_streak: u32,
    pub correct_answers: u32,
    pub total_answers: u32,
    pub fastest_answer: Option<f64>,
    pub is_host: bool,
    pub is_ready: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, age: AgeGroup, difficulty: u8) -> Self {
        Self {
            id,
            name: name.into(),
            age,
            kid_age: None,
            avatar: DEFAULT_AVATAR.to_string(),
            difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            score: 0,
            lives: STARTING_LIVES,
            streak: 0,
            best_streak: 0,
            correct_answers: 0,
            total_answers: 0,
            fastest_answer: None,
            is_host: false,
            is_ready: false,
        }
    }

    pub fn accuracy(&self) -> Option<f64> {
        if self.total_answers == 0 {
            None
        } else {
            Some(self.correct_answers as f64 / self.total_answers as f64)
        }
    }

    pub fn apply(&mut self, update: &PlayerUpdate) {
        if let Some(score) = update.score {
            self.score = score;
        }
        if let Some(streak) = update.streak {
            self.streak = streak;
        }
        if let Some(best_streak) = update.best_streak {
            self.best_streak = best_streak;
        }
        if let Some(correct) = update.correct_answers {
            self.correct_answers = correct;
        }
        if let Some(total) = update.total_answers {
            self.total_answers = total;
        }
        if let Some(lives) = update.lives {
            self.lives = lives;
        }
        if let Some(difficulty) = update.difficulty {
            self.difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        }
        if let Some(fastest) = update.fastest_answer {
            self.fastest_answer = Some(fastest);
        }
        if let Some(is_ready) = update.is_ready {
            self.is_ready = is_ready;
        }
    }
}

/// Partial player fields merged by `Player::apply`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerUpdate {
    pub score: Option<u32>,
    pub streak: Option<u32>,
    pub best_streak: Option<u32>,
    pub correct_answers: Option<u32>,
    pub total_answers: Option<u32>,
    pub lives: Option<u8>,
    pub difficulty: Option<u8>,
    pub fastest_answer: Option<f64>,
    pub is_ready: Option<bool>,
}

impl PlayerUpdate {
    pub fn ready(is_ready: bool) -> Self {
        Self {
            is_ready: Some(is_ready),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub subject: Subject,
    pub difficulty: u8,
    pub time_limit: u32,
}

impl Question {
    pub fn is_correct(&self, answer: &SubmittedAnswer) -> bool {
        match answer {
            SubmittedAnswer::Choice(choice) => *choice == self.correct_answer,
            SubmittedAnswer::Timeout => false,
        }
    }
}

/// What a player gave for a turn. Serialized as the literal choice, or
/// `"__timeout__"` when the countdown ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmittedAnswer {
    Choice(String),
    Timeout,
}

impl SubmittedAnswer {
    pub fn as_str(&self) -> &str {
        match self {
            SubmittedAnswer::Choice(choice) => choice,
            SubmittedAnswer::Timeout => TIMEOUT_SENTINEL,
        }
    }
}

impl From<String> for SubmittedAnswer {
    fn from(value: String) -> Self {
        if value == TIMEOUT_SENTINEL {
            SubmittedAnswer::Timeout
        } else {
            SubmittedAnswer::Choice(value)
        }
    }
}

impl From<SubmittedAnswer> for String {
    fn from(value: SubmittedAnswer) -> Self {
        match value {
            SubmittedAnswer::Choice(choice) => choice,
            SubmittedAnswer::Timeout => TIMEOUT_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundResult {
    pub player_id: PlayerId,
    pub round: u32,
    pub question_id: QuestionId,
    #[ts(type = "string")]
    pub answer: SubmittedAnswer,
    pub is_correct: bool,
    pub time_elapsed: f64,
    pub points_earned: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameSettings {
    pub mode: GameMode,
    pub subjects: Vec<Subject>,
    pub rounds: u32,
    pub default_difficulty: u8,
    pub language: Language,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            mode: GameMode::Local,
            subjects: Subject::ALL.to_vec(),
            rounds: 5,
            default_difficulty: DEFAULT_DIFFICULTY,
            language: Language::En,
        }
    }
}

impl GameSettings {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.subjects.is_empty() {
            return Err(GameError::InvalidSettings {
                reason: "at least one subject is required".to_string(),
            });
        }
        if !ROUND_OPTIONS.contains(&self.rounds) {
            return Err(GameError::InvalidSettings {
                reason: format!("rounds must be one of {:?}", ROUND_OPTIONS),
            });
        }
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.default_difficulty) {
            return Err(GameError::InvalidSettings {
                reason: format!(
                    "difficulty must be between {} and {}",
                    MIN_DIFFICULTY, MAX_DIFFICULTY
                ),
            });
        }
        Ok(())
    }

    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            mode: update.mode.unwrap_or(self.mode),
            subjects: update
                .subjects
                .clone()
                .unwrap_or_else(|| self.subjects.clone()),
            rounds: update.rounds.unwrap_or(self.rounds),
            default_difficulty: update.default_difficulty.unwrap_or(self.default_difficulty),
            language: update.language.unwrap_or(self.language),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettingsUpdate {
    pub mode: Option<GameMode>,
    pub subjects: Option<Vec<Subject>>,
    pub rounds: Option<u32>,
    pub default_difficulty: Option<u8>,
    pub language: Option<Language>,
}

/// Whose turn it is, as a (turn index, 1-based round) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TurnPosition {
    pub turn_index: usize,
    pub round: u32,
}

impl TurnPosition {
    pub const START: TurnPosition = TurnPosition {
        turn_index: 0,
        round: 1,
    };

    pub fn new(turn_index: usize, round: u32) -> Self {
        Self { turn_index, round }
    }

    /// Round-robin successor; the round advances when the index wraps to 0.
    pub fn next(self, player_count: usize) -> Self {
        if player_count == 0 {
            return self;
        }
        let turn_index = (self.turn_index + 1) % player_count;
        let round = if turn_index == 0 {
            self.round + 1
        } else {
            self.round
        };
        Self { turn_index, round }
    }
}

// Turns are ordered by round first, then by seat
impl Ord for TurnPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.round, self.turn_index).cmp(&(other.round, other.turn_index))
    }
}

impl PartialOrd for TurnPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Game {
    pub id: GameId,
    pub room_code: Option<String>,
    pub host_id: Option<PlayerId>,
    pub status: GameStatus,
    pub settings: GameSettings,
    pub players: Vec<Player>,
    pub current_round: u32,
    pub current_player_turn_index: usize,
    pub current_question: Option<Question>,
    pub question_history: Vec<String>,
    pub round_results: Vec<RoundResult>,
    /// Turns played before this replica started recording results
    #[serde(default)]
    pub earlier_turns: usize,
}

impl Default for Game {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            room_code: None,
            host_id: None,
            status: GameStatus::Lobby,
            settings: GameSettings::default(),
            players: Vec::new(),
            current_round: 1,
            current_player_turn_index: 0,
            current_question: None,
            question_history: Vec::new(),
            round_results: Vec::new(),
            earlier_turns: 0,
        }
    }
}

impl Game {
    pub fn total_turns(&self) -> usize {
        self.settings.rounds as usize * self.players.len()
    }

    pub fn completed_turns(&self) -> usize {
        self.earlier_turns + self.round_results.len()
    }

    /// Completion is counted from recorded results, not from the round counter,
    /// which may lag behind on replicas.
    pub fn is_game_over(&self) -> bool {
        !self.players.is_empty() && self.completed_turns() >= self.total_turns()
    }

    pub fn position(&self) -> TurnPosition {
        TurnPosition::new(self.current_player_turn_index, self.current_round)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_turn_index)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host_id == Some(id)
    }

    pub fn has_result_for(&self, player_id: PlayerId, question_id: QuestionId) -> bool {
        self.round_results
            .iter()
            .any(|r| r.player_id == player_id && r.question_id == question_id)
    }

    pub fn question_answered(&self, question_id: QuestionId) -> bool {
        self.round_results
            .iter()
            .any(|r| r.question_id == question_id)
    }

    pub fn channel_key(&self) -> Option<String> {
        self.room_code.as_deref().map(channel_key)
    }
}

/// Broadcast channel name for a room
pub fn channel_key(room_code: &str) -> String {
    format!("game:{}", room_code.to_uppercase())
}
