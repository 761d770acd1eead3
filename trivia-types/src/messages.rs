use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    Player, PlayerId, PlayerUpdate, Question, QuestionId, RoundResult, SubmittedAnswer,
    TurnPosition,
};

pub const GAME_EVENT: &str = "game_event";
pub const PLAYER_JOINED: &str = "player_joined";
pub const PLAYER_INSERTED: &str = "player_inserted";

/// A game protocol message as it travels over the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameMessage {
    pub sender_id: PlayerId,
    pub payload: GameEvent,
}

impl GameMessage {
    pub fn new(sender_id: PlayerId, payload: GameEvent) -> Self {
        Self { sender_id, payload }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum GameEvent {
    GameStart {
        turn_index: usize,
        round: u32,
    },
    Question {
        question: Question,
        turn_index: usize,
        round: u32,
    },
    Answer(AnswerReport),
    AdvanceTurn {
        next_turn_index: usize,
        next_round: u32,
    },
    GameOver,
    PlayerReady {
        player_id: PlayerId,
        is_ready: bool,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameStart { .. } => "game_start",
            GameEvent::Question { .. } => "question",
            GameEvent::Answer(_) => "answer",
            GameEvent::AdvanceTurn { .. } => "advance_turn",
            GameEvent::GameOver => "game_over",
            GameEvent::PlayerReady { .. } => "player_ready",
        }
    }

    pub fn advance_to(position: TurnPosition) -> Self {
        GameEvent::AdvanceTurn {
            next_turn_index: position.turn_index,
            next_round: position.round,
        }
    }
}

/// Everything a replica needs to apply an answer produced elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerReport {
    pub player_id: PlayerId,
    pub question_id: QuestionId,
    pub round: u32,
    #[ts(type = "string")]
    pub answer: SubmittedAnswer,
    pub is_correct: bool,
    pub points: u32,
    pub new_score: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub correct_answers: u32,
    pub total_answers: u32,
    pub lives: u8,
    pub difficulty: u8,
    pub fastest_answer: Option<f64>,
    pub time_elapsed: f64,
    /// Turns the sender had completed once this answer was recorded
    #[serde(default)]
    pub completed_turns: usize,
}

impl AnswerReport {
    pub fn result(&self) -> RoundResult {
        RoundResult {
            player_id: self.player_id,
            round: self.round,
            question_id: self.question_id,
            answer: self.answer.clone(),
            is_correct: self.is_correct,
            time_elapsed: self.time_elapsed,
            points_earned: self.points,
        }
    }

    pub fn player_update(&self) -> PlayerUpdate {
        PlayerUpdate {
            score: Some(self.new_score),
            streak: Some(self.streak),
            best_streak: Some(self.best_streak),
            correct_answers: Some(self.correct_answers),
            total_answers: Some(self.total_answers),
            lives: Some(self.lives),
            difficulty: Some(self.difficulty),
            fastest_answer: self.fastest_answer,
            is_ready: None,
        }
    }
}

/// Raw envelope handed to and from a realtime transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransportEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Typed view of the events carried on a game channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Game(GameMessage),
    PlayerJoined(Player),
    PlayerInserted(Player),
}

impl ChannelEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ChannelEvent::Game(_) => GAME_EVENT,
            ChannelEvent::PlayerJoined(_) => PLAYER_JOINED,
            ChannelEvent::PlayerInserted(_) => PLAYER_INSERTED,
        }
    }

    pub fn encode(&self) -> Result<TransportEvent, serde_json::Error> {
        let payload = match self {
            ChannelEvent::Game(message) => serde_json::to_value(message)?,
            ChannelEvent::PlayerJoined(player) | ChannelEvent::PlayerInserted(player) => {
                serde_json::to_value(player)?
            }
        };
        Ok(TransportEvent {
            event: self.event_name().to_string(),
            payload,
        })
    }

    /// Returns `Ok(None)` for event names this build does not know about.
    pub fn decode(raw: &TransportEvent) -> Result<Option<Self>, serde_json::Error> {
        let event = match raw.event.as_str() {
            GAME_EVENT => ChannelEvent::Game(serde_json::from_value(raw.payload.clone())?),
            PLAYER_JOINED => ChannelEvent::PlayerJoined(serde_json::from_value(raw.payload.clone())?),
            PLAYER_INSERTED => {
                ChannelEvent::PlayerInserted(serde_json::from_value(raw.payload.clone())?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Frames a client sends to the relay
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientFrame {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Publish {
        channel: String,
        request_id: u64,
        event: TransportEvent,
    },
    Heartbeat,
}

/// Frames the relay sends to a client
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RelayFrame {
    Subscribed {
        channel: String,
    },
    Unsubscribed {
        channel: String,
    },
    Event {
        channel: String,
        event: TransportEvent,
    },
    Ack {
        request_id: u64,
        delivered: usize,
    },
    Error {
        request_id: Option<u64>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_game_event_wire_tags() {
        let message = GameMessage::new(
            Uuid::new_v4(),
            GameEvent::AdvanceTurn {
                next_turn_index: 1,
                next_round: 2,
            },
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["payload"]["type"], "advance_turn");
        assert_eq!(value["payload"]["next_round"], 2);

        let over = serde_json::to_value(GameEvent::GameOver).unwrap();
        assert_eq!(over["type"], "game_over");
    }

    #[test]
    fn test_unknown_event_name_decodes_to_none() {
        let raw = TransportEvent {
            event: "presence_sync".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(ChannelEvent::decode(&raw).unwrap().is_none());
    }

    #[test]
    fn test_unknown_game_event_type_is_an_error() {
        let raw = TransportEvent {
            event: GAME_EVENT.to_string(),
            payload: serde_json::json!({
                "sender_id": Uuid::new_v4(),
                "payload": { "type": "emoji_reaction" }
            }),
        };
        assert!(ChannelEvent::decode(&raw).is_err());
    }
}
