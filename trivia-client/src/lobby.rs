use std::sync::Arc;
use tracing::{info, warn};
use trivia_core::{OnlineCoordinator, normalize_room_code};
use trivia_types::{
    AgeGroup, ChannelEvent, DEFAULT_AVATAR, DEFAULT_DIFFICULTY, Game, GameError, GameMode,
    GameRecord, GameSettings, GameStatus, NewGame, NewPlayer, PlayerId, PlayerRecord, channel_key,
};
use uuid::Uuid;

use crate::backstop::Backstop;
use crate::config::ClientConfig;
use crate::driver::{SessionHandle, SessionParts, spawn_session};
use crate::error::SessionError;
use crate::generator::QuestionGenerator;
use crate::transport::{Subscription, Transport};

/// How a player presents themselves when creating or joining a room
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    pub name: String,
    pub age: AgeGroup,
    pub kid_age: Option<u8>,
    pub avatar: String,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, age: AgeGroup) -> Self {
        Self {
            name: name.into(),
            age,
            kid_age: None,
            avatar: DEFAULT_AVATAR.to_string(),
        }
    }

    fn new_player(&self, id: PlayerId, difficulty: u8, is_host: bool) -> NewPlayer {
        NewPlayer {
            id: Some(id),
            name: self.name.clone(),
            age: self.age,
            kid_age: self.kid_age,
            avatar_emoji: self.avatar.clone(),
            difficulty,
            is_host,
        }
    }
}

/// Shared collaborators for every online session of this client
#[derive(Clone)]
pub struct SessionServices {
    pub transport: Arc<dyn Transport>,
    pub backstop: Arc<dyn Backstop>,
    pub generator: Arc<dyn QuestionGenerator>,
    pub config: ClientConfig,
}

/// A session together with the room it runs in
pub struct OnlineSession {
    pub player_id: PlayerId,
    pub room_code: String,
    pub handle: SessionHandle,
}

pub async fn create_online_game(
    services: &SessionServices,
    host: PlayerProfile,
    settings: GameSettings,
) -> Result<OnlineSession, SessionError> {
    let settings = GameSettings {
        mode: GameMode::Online,
        ..settings
    };
    settings.validate()?;

    let host_id = Uuid::new_v4();
    let record = services
        .backstop
        .create_game(&NewGame {
            host_id,
            settings: settings.clone(),
        })
        .await?;
    let room_code = record
        .room_code
        .clone()
        .ok_or_else(|| GameError::InvalidGameState {
            current_state: "created game has no room code".to_string(),
        })?;
    let host_record = services
        .backstop
        .add_player(
            record.id,
            &host.new_player(host_id, settings.default_difficulty, true),
        )
        .await?;
    info!("Created room {} for host {}", room_code, host.name);

    let subscription = services.transport.subscribe(&channel_key(&room_code)).await?;
    let game = game_from_records(&record, &[host_record]);
    let handle = start_session(services, host_id, game, subscription);
    Ok(OnlineSession {
        player_id: host_id,
        room_code,
        handle,
    })
}

/// Joins a lobby, or a game already in progress as a watcher until the
/// next turn reaches this client
pub async fn join_online_game(
    services: &SessionServices,
    room_code: &str,
    profile: PlayerProfile,
) -> Result<OnlineSession, SessionError> {
    let room_code = normalize_room_code(room_code);
    let record = services
        .backstop
        .find_room(&room_code)
        .await?
        .filter(|record| record.status != GameStatus::Finished)
        .ok_or_else(|| GameError::RoomNotFound {
            room_code: room_code.clone(),
        })?;
    let channel = channel_key(&room_code);

    // Subscribed before the roster read, so joins landing in between still
    // arrive as events
    let subscription = services.transport.subscribe(&channel).await?;
    let player_id = Uuid::new_v4();
    let entry = match enter_room(services, &record, &room_code, &profile, player_id).await {
        Ok(entry) => entry,
        Err(e) => {
            if let Err(unsubscribe) = services.transport.unsubscribe(&channel).await {
                warn!("Failed to leave {} after a failed join: {}", channel, unsubscribe);
            }
            return Err(e);
        }
    };

    let game = game_from_records(&entry.record, &entry.roster);
    if game.status == GameStatus::Playing {
        info!(
            "{} joined room {} mid-game in round {}",
            profile.name, room_code, game.current_round
        );
    } else {
        info!(
            "{} joined room {} with {} players",
            profile.name,
            room_code,
            game.players.len()
        );
    }
    let handle = start_session(services, player_id, game, subscription);

    // The backstop's player_inserted covers peers that miss this
    match ChannelEvent::PlayerJoined(entry.inserted.to_player()).encode() {
        Ok(event) => {
            if let Err(e) = services.transport.send(&channel, event).await {
                warn!("Failed to announce join in {}: {}", room_code, e);
            }
        }
        Err(e) => warn!("Failed to encode player_joined: {}", e),
    }

    Ok(OnlineSession {
        player_id,
        room_code,
        handle,
    })
}

/// What a joining client reads back once its row is in place
struct RoomEntry {
    record: GameRecord,
    inserted: PlayerRecord,
    roster: Vec<PlayerRecord>,
}

async fn enter_room(
    services: &SessionServices,
    record: &GameRecord,
    room_code: &str,
    profile: &PlayerProfile,
    player_id: PlayerId,
) -> Result<RoomEntry, SessionError> {
    let inserted = services
        .backstop
        .add_player(
            record.id,
            &profile.new_player(player_id, DEFAULT_DIFFICULTY, false),
        )
        .await?;
    // Status and round may have moved on while the row was written
    let record = services
        .backstop
        .find_room(room_code)
        .await?
        .filter(|fresh| fresh.id == record.id && fresh.status != GameStatus::Finished)
        .ok_or_else(|| GameError::RoomNotFound {
            room_code: room_code.to_string(),
        })?;
    let roster = services.backstop.players(record.id).await?;
    Ok(RoomEntry {
        record,
        inserted,
        roster,
    })
}

fn start_session(
    services: &SessionServices,
    me: PlayerId,
    game: Game,
    subscription: Subscription,
) -> SessionHandle {
    let coordinator = OnlineCoordinator::new(me, game, services.config.coordinator_config());
    spawn_session(SessionParts {
        coordinator,
        transport: services.transport.clone(),
        subscription,
        backstop: services.backstop.clone(),
        generator: services.generator.clone(),
        generation_timeout: services.config.generation_timeout,
    })
}

/// Rebuilds a lobby from its stored rows, roster in join order
pub fn game_from_records(record: &GameRecord, players: &[PlayerRecord]) -> Game {
    Game {
        id: record.id,
        room_code: record.room_code.clone(),
        host_id: Some(record.host_id),
        status: record.status,
        settings: record.settings.clone(),
        players: players.iter().map(PlayerRecord::to_player).collect(),
        current_round: record.current_round,
        ..Game::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_from_records_keeps_join_order() {
        let host = Uuid::new_v4();
        let record = GameRecord {
            id: Uuid::new_v4(),
            room_code: Some("K7QM".to_string()),
            host_id: host,
            settings: GameSettings::default(),
            status: GameStatus::Lobby,
            current_round: 1,
            current_question: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let players: Vec<PlayerRecord> = ["Host", "Guest"]
            .iter()
            .enumerate()
            .map(|(i, name)| PlayerRecord {
                id: if i == 0 { host } else { Uuid::new_v4() },
                game_id: record.id,
                name: name.to_string(),
                age: AgeGroup::Adult,
                kid_age: None,
                avatar_emoji: DEFAULT_AVATAR.to_string(),
                difficulty: 5,
                is_host: i == 0,
                is_ready: i == 0,
                score: 0,
                joined_at: "2024-01-01T00:00:00Z".to_string(),
            })
            .collect();

        let game = game_from_records(&record, &players);
        assert!(game.is_host(host));
        assert_eq!(game.players[1].name, "Guest");
        assert!(game.players[0].is_ready);
        assert_eq!(game.channel_key().as_deref(), Some("game:K7QM"));
    }
}
