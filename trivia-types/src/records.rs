use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{AgeGroup, GameId, GameSettings, GameStatus, Player, PlayerId, Question};

/// A game row as stored by the persistence backstop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameRecord {
    pub id: GameId,
    pub room_code: Option<String>,
    pub host_id: PlayerId,
    pub settings: GameSettings,
    pub status: GameStatus,
    pub current_round: u32,
    pub current_question: Option<Question>,
    pub created_at: String, // ISO 8601 string
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewGame {
    pub host_id: PlayerId,
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GamePatch {
    pub status: Option<GameStatus>,
    pub current_round: Option<u32>,
    pub current_question: Option<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    pub age: AgeGroup,
    pub kid_age: Option<u8>,
    pub avatar_emoji: String,
    pub difficulty: u8,
    pub is_host: bool,
    pub is_ready: bool,
    pub score: u32,
    pub joined_at: String, // ISO 8601 string
}

impl PlayerRecord {
    /// Rebuilds a roster entry from the stored subset of player fields
    pub fn to_player(&self) -> Player {
        let mut player = Player::new(self.id, self.name.clone(), self.age, self.difficulty);
        player.kid_age = self.kid_age;
        player.avatar = self.avatar_emoji.clone();
        player.is_host = self.is_host;
        player.is_ready = self.is_ready;
        player.score = self.score;
        player
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPlayer {
    pub id: Option<PlayerId>,
    pub name: String,
    pub age: AgeGroup,
    pub kid_age: Option<u8>,
    pub avatar_emoji: String,
    pub difficulty: u8,
    pub is_host: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerPatch {
    pub score: Option<u32>,
    pub is_ready: Option<bool>,
    pub difficulty: Option<u8>,
}
