use std::sync::Arc;
use tracing::{error, info, warn};
use trivia_core::{generate_room_code, normalize_room_code};
use trivia_persistence::GameRepository;
use trivia_types::{ChannelEvent, GamePatch, NewGame, NewPlayer, PlayerPatch, channel_key};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::channels::ChannelRegistry;
use crate::websocket::ConnectionManager;

const ROOM_CODE_ATTEMPTS: usize = 32;

fn error_reply(message: &str, status: StatusCode) -> Response {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
    .into_response()
}

fn internal_error(context: &str, err: anyhow::Error) -> Response {
    error!("{}: {}", context, err);
    error_reply(context, StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn handle_create_game(
    new_game: NewGame,
    repository: Arc<GameRepository>,
) -> Result<Response, warp::Rejection> {
    if let Err(e) = new_game.settings.validate() {
        return Ok(error_reply(&e.to_string(), StatusCode::BAD_REQUEST));
    }

    let mut room_code = None;
    for _ in 0..ROOM_CODE_ATTEMPTS {
        let candidate = generate_room_code(&mut rand::thread_rng());
        match repository.room_code_in_use(&candidate).await {
            Ok(false) => {
                room_code = Some(candidate);
                break;
            }
            Ok(true) => continue,
            Err(e) => return Ok(internal_error("Failed to check room code", e)),
        }
    }
    let Some(room_code) = room_code else {
        warn!("No free room code after {} attempts", ROOM_CODE_ATTEMPTS);
        return Ok(error_reply(
            "No free room code",
            StatusCode::SERVICE_UNAVAILABLE,
        ));
    };

    match repository.create_game(&new_game, &room_code).await {
        Ok(record) => {
            info!("Created game {} in room {}", record.id, room_code);
            Ok(warp::reply::with_status(warp::reply::json(&record), StatusCode::CREATED).into_response())
        }
        Err(e) => Ok(internal_error("Failed to create game", e)),
    }
}

pub async fn handle_find_room(
    room_code: String,
    repository: Arc<GameRepository>,
) -> Result<Response, warp::Rejection> {
    let room_code = normalize_room_code(&room_code);
    match repository.find_active_by_room_code(&room_code).await {
        Ok(Some(record)) => Ok(warp::reply::json(&record).into_response()),
        Ok(None) => Ok(error_reply("Room not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(internal_error("Failed to look up room", e)),
    }
}

pub async fn handle_update_game(
    game_id: Uuid,
    patch: GamePatch,
    repository: Arc<GameRepository>,
) -> Result<Response, warp::Rejection> {
    match repository.update_game(game_id, &patch).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(false) => Ok(error_reply("Game not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(internal_error("Failed to update game", e)),
    }
}

/// Inserts the player row, then tells the game channel about it
pub async fn handle_add_player(
    game_id: Uuid,
    new_player: NewPlayer,
    repository: Arc<GameRepository>,
    connection_manager: Arc<ConnectionManager>,
    channels: Arc<ChannelRegistry>,
) -> Result<Response, warp::Rejection> {
    let game = match repository.find_game(game_id).await {
        Ok(Some(game)) => game,
        Ok(None) => return Ok(error_reply("Game not found", StatusCode::NOT_FOUND)),
        Err(e) => return Ok(internal_error("Failed to look up game", e)),
    };

    let record = match repository.add_player(game_id, &new_player).await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(error_reply("Game not found", StatusCode::NOT_FOUND)),
        Err(e) => return Ok(internal_error("Failed to add player", e)),
    };
    info!("Player {} joined game {}", record.name, game_id);

    if let Some(room_code) = &game.room_code {
        match ChannelEvent::PlayerInserted(record.to_player()).encode() {
            Ok(event) => {
                channels
                    .publish(&connection_manager, &channel_key(room_code), None, event)
                    .await;
            }
            Err(e) => warn!("Failed to encode player_inserted: {}", e),
        }
    }

    Ok(warp::reply::with_status(warp::reply::json(&record), StatusCode::CREATED).into_response())
}

pub async fn handle_list_players(
    game_id: Uuid,
    repository: Arc<GameRepository>,
) -> Result<Response, warp::Rejection> {
    match repository.players_for_game(game_id).await {
        Ok(players) => Ok(warp::reply::json(&players).into_response()),
        Err(e) => Ok(internal_error("Failed to fetch players", e)),
    }
}

pub async fn handle_update_player(
    player_id: Uuid,
    patch: PlayerPatch,
    repository: Arc<GameRepository>,
) -> Result<Response, warp::Rejection> {
    match repository.update_player(player_id, &patch).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(false) => Ok(error_reply("Player not found", StatusCode::NOT_FOUND)),
        Err(e) => Ok(internal_error("Failed to update player", e)),
    }
}
