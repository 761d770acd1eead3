
use serde_json::json;
use test_helpers::*;
use trivia_relay::config::Config;
use trivia_types::{
    ClientFrame, GamePatch, GameRecord, GameStatus, PLAYER_INSERTED, PlayerPatch, PlayerRecord,
    RelayFrame, TransportEvent, channel_key,
};
use uuid::Uuid;

fn game_event(n: u32) -> TransportEvent {
    TransportEvent {
        event: "game_event".to_string(),
        payload: json!({ "n": n }),
    }
}

fn publish(channel: &str, request_id: u64, n: u32) -> ClientFrame {
    ClientFrame::Publish {
        channel: channel.to_string(),
        request_id,
        event: game_event(n),
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = default_test_app().await;

    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&app)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "OK");
}

#[tokio::test]
async fn test_publish_reaches_other_subscribers_only() {
    let app = default_test_app().await;
    let mut alice = warp::test::ws().path("/ws").handshake(app.clone()).await.unwrap();
    let mut bob = warp::test::ws().path("/ws").handshake(app).await.unwrap();
    subscribe(&mut alice, "game:K7QM").await;
    subscribe(&mut bob, "game:K7QM").await;

    send_frame(&mut alice, &publish("game:K7QM", 1, 1)).await;
    match next_frame(&mut alice).await {
        RelayFrame::Ack {
            request_id,
            delivered,
        } => {
            assert_eq!(request_id, 1);
            assert_eq!(delivered, 1);
        }
        other => panic!("expected Ack, got {:?}", other),
    }
    match next_frame(&mut bob).await {
        RelayFrame::Event { channel, event } => {
            assert_eq!(channel, "game:K7QM");
            assert_eq!(event, game_event(1));
        }
        other => panic!("expected Event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_echo_to_sender_when_enabled() {
    let app = create_test_app(Config {
        echo_to_sender: true,
        ..Config::default()
    })
    .await;
    let mut alice = warp::test::ws().path("/ws").handshake(app).await.unwrap();
    subscribe(&mut alice, "game:K7QM").await;

    send_frame(&mut alice, &publish("game:K7QM", 3, 9)).await;
    // The echo is queued before the ack
    assert!(matches!(next_frame(&mut alice).await, RelayFrame::Event { .. }));
    assert!(matches!(
        next_frame(&mut alice).await,
        RelayFrame::Ack {
            request_id: 3,
            delivered: 1
        }
    ));
}

#[tokio::test]
async fn test_publish_without_subscription_is_refused() {
    let app = default_test_app().await;
    let mut alice = warp::test::ws().path("/ws").handshake(app).await.unwrap();

    send_frame(&mut alice, &publish("game:K7QM", 5, 1)).await;
    match next_frame(&mut alice).await {
        RelayFrame::Error {
            request_id,
            message,
        } => {
            assert_eq!(request_id, Some(5));
            assert!(message.contains("Not subscribed"));
        }
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_keeps_the_socket_open() {
    let app = default_test_app().await;
    let mut alice = warp::test::ws().path("/ws").handshake(app).await.unwrap();

    alice.send_text("invalid json").await;
    match next_frame(&mut alice).await {
        RelayFrame::Error { message, .. } => assert!(message.contains("Invalid JSON message")),
        other => panic!("expected Error, got {:?}", other),
    }

    subscribe(&mut alice, "game:K7QM").await;
}

#[tokio::test]
async fn test_rate_limit_answers_with_error() {
    let app = create_test_app(Config {
        rate_limit_burst: 2,
        rate_limit_refill_ms: 60_000,
        ..Config::default()
    })
    .await;
    let mut alice = warp::test::ws().path("/ws").handshake(app).await.unwrap();

    send_frame(&mut alice, &ClientFrame::Heartbeat).await;
    send_frame(&mut alice, &ClientFrame::Heartbeat).await;
    send_frame(
        &mut alice,
        &ClientFrame::Subscribe {
            channel: "game:K7QM".to_string(),
        },
    )
    .await;

    match next_frame(&mut alice).await {
        RelayFrame::Error { message, .. } => assert_eq!(message, "Rate limit exceeded"),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_and_find_room() {
    let app = default_test_app().await;

    let response = warp::test::request()
        .method("POST")
        .path("/games")
        .json(&new_game())
        .reply(&app)
        .await;
    assert_eq!(response.status(), 201);
    let created: GameRecord = serde_json::from_slice(response.body()).unwrap();
    let room_code = created.room_code.clone().unwrap();
    assert_eq!(room_code.len(), 4);
    assert_eq!(created.status, GameStatus::Lobby);

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/games/room/{}", room_code.to_lowercase()))
        .reply(&app)
        .await;
    assert_eq!(response.status(), 200);
    let found: GameRecord = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(found.id, created.id);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let app = default_test_app().await;
    let mut game = new_game();
    game.settings.rounds = 4;

    let response = warp::test::request()
        .method("POST")
        .path("/games")
        .json(&game)
        .reply(&app)
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_finished_room_is_not_found() {
    let app = default_test_app().await;
    let response = warp::test::request()
        .method("POST")
        .path("/games")
        .json(&new_game())
        .reply(&app)
        .await;
    let created: GameRecord = serde_json::from_slice(response.body()).unwrap();

    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/games/{}", created.id))
        .json(&GamePatch {
            status: Some(GameStatus::Finished),
            ..GamePatch::default()
        })
        .reply(&app)
        .await;
    assert_eq!(response.status(), 204);

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/games/room/{}", created.room_code.unwrap()))
        .reply(&app)
        .await;
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!({ "error": "Room not found" }));

    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/games/{}", Uuid::new_v4()))
        .json(&GamePatch::default())
        .reply(&app)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_player_insert_is_announced_on_the_game_channel() {
    let app = default_test_app().await;
    let response = warp::test::request()
        .method("POST")
        .path("/games")
        .json(&new_game())
        .reply(&app)
        .await;
    let game: GameRecord = serde_json::from_slice(response.body()).unwrap();
    let channel = channel_key(game.room_code.as_deref().unwrap());

    let mut host = warp::test::ws().path("/ws").handshake(app.clone()).await.unwrap();
    subscribe(&mut host, &channel).await;

    let guest = new_player("Guest", false);
    let response = warp::test::request()
        .method("POST")
        .path(&format!("/games/{}/players", game.id))
        .json(&guest)
        .reply(&app)
        .await;
    assert_eq!(response.status(), 201);
    let record: PlayerRecord = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(Some(record.id), guest.id);
    assert!(!record.is_ready);

    match next_frame(&mut host).await {
        RelayFrame::Event { event, .. } => {
            assert_eq!(event.event, PLAYER_INSERTED);
            assert_eq!(event.payload["name"], "Guest");
        }
        other => panic!("expected player_inserted, got {:?}", other),
    }

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/games/{}/players", game.id))
        .reply(&app)
        .await;
    let roster: Vec<PlayerRecord> = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn test_update_player_and_missing_rows() {
    let app = default_test_app().await;
    let response = warp::test::request()
        .method("POST")
        .path("/games")
        .json(&new_game())
        .reply(&app)
        .await;
    let game: GameRecord = serde_json::from_slice(response.body()).unwrap();

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/games/{}/players", game.id))
        .json(&new_player("Host", true))
        .reply(&app)
        .await;
    let host: PlayerRecord = serde_json::from_slice(response.body()).unwrap();
    assert!(host.is_ready);

    let patch = PlayerPatch {
        score: Some(30),
        ..PlayerPatch::default()
    };
    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/players/{}", host.id))
        .json(&patch)
        .reply(&app)
        .await;
    assert_eq!(response.status(), 204);

    let response = warp::test::request()
        .method("PATCH")
        .path(&format!("/players/{}", Uuid::new_v4()))
        .json(&patch)
        .reply(&app)
        .await;
    assert_eq!(response.status(), 404);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/games/{}/players", Uuid::new_v4()))
        .json(&new_player("Lost", false))
        .reply(&app)
        .await;
    assert_eq!(response.status(), 404);
}
