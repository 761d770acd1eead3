use std::sync::Arc;
use std::time::Duration;
use warp::Filter;
use uuid::Uuid;

use crate::channels::ChannelRegistry;
use crate::config::Config;
use crate::websocket::{ConnectionManager, RateLimit};
use trivia_persistence::GameRepository;

pub mod api;
pub mod channels;
pub mod config;
pub mod websocket;

const MAX_BODY_BYTES: u64 = 64 * 1024;

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    channels: Arc<ChannelRegistry>,
    repository: Arc<GameRepository>,
    config: &Config,
) -> impl Filter<Extract = impl warp::Reply + use<>, Error = warp::Rejection> + Clone + use<> {
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let channels_filter = warp::any().map({
        let channels = channels.clone();
        move || channels.clone()
    });

    let repository_filter = warp::any().map({
        let repository = repository.clone();
        move || repository.clone()
    });

    let rate_limit = RateLimit {
        burst: config.rate_limit_burst,
        refill: Duration::from_millis(config.rate_limit_refill_ms),
    };

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter.clone())
        .and(channels_filter.clone())
        .map(move |ws: warp::ws::Ws, conn_mgr, channels| {
            ws.on_upgrade(move |socket| {
                websocket::handle_connection(socket, conn_mgr, channels, rate_limit)
            })
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    let create_game = warp::path!("games")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(repository_filter.clone())
        .and_then(api::handle_create_game);

    let find_room = warp::path!("games" / "room" / String)
        .and(warp::get())
        .and(repository_filter.clone())
        .and_then(api::handle_find_room);

    let update_game = warp::path!("games" / Uuid)
        .and(warp::patch())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(repository_filter.clone())
        .and_then(api::handle_update_game);

    let add_player = warp::path!("games" / Uuid / "players")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(repository_filter.clone())
        .and(connection_manager_filter.clone())
        .and(channels_filter.clone())
        .and_then(api::handle_add_player);

    let list_players = warp::path!("games" / Uuid / "players")
        .and(warp::get())
        .and(repository_filter.clone())
        .and_then(api::handle_list_players);

    let update_player = warp::path!("players" / Uuid)
        .and(warp::patch())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(repository_filter.clone())
        .and_then(api::handle_update_player);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "PATCH"]);

    websocket
        .or(health)
        .or(create_game)
        .or(find_room)
        .or(update_game)
        .or(add_player)
        .or(list_players)
        .or(update_player)
        .with(cors)
        .with(warp::log("trivia_relay"))
}
