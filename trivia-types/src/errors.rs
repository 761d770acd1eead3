use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound { room_code: String },
    #[error("Game {game_id} not found")]
    GameNotFound { game_id: String },
    #[error("Player {player_id} not found")]
    PlayerNotFound { player_id: String },
    #[error("It is not your turn")]
    NotYourTurn,
    #[error("This question has already been answered")]
    AlreadyAnswered,
    #[error("No question is open for answers")]
    NoActiveQuestion,
    #[error("Only the host can do that")]
    NotHost,
    #[error("At least {required} players are needed, found {actual}")]
    NotEnoughPlayers { required: usize, actual: usize },
    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },
    #[error("Invalid game state: {current_state}")]
    InvalidGameState { current_state: String },
}
