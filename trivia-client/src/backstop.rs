use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use trivia_core::{PersistOp, generate_room_code, normalize_room_code};
use trivia_types::{
    ChannelEvent, GameId, GamePatch, GameRecord, GameStatus, NewGame, NewPlayer, PlayerId,
    PlayerPatch, PlayerRecord, channel_key,
};
use uuid::Uuid;

use crate::error::BackstopError;
use crate::transport::MemoryHub;

/// Durable copy of games and rosters. Used to find a room and load its
/// roster when joining, and as a best-effort mirror during play.
#[async_trait]
pub trait Backstop: Send + Sync {
    async fn create_game(&self, new_game: &NewGame) -> Result<GameRecord, BackstopError>;

    /// Unfinished game with this room code, matched case-insensitively
    async fn find_room(&self, room_code: &str) -> Result<Option<GameRecord>, BackstopError>;

    async fn update_game(&self, game_id: GameId, patch: &GamePatch) -> Result<(), BackstopError>;

    async fn add_player(
        &self,
        game_id: GameId,
        player: &NewPlayer,
    ) -> Result<PlayerRecord, BackstopError>;

    async fn players(&self, game_id: GameId) -> Result<Vec<PlayerRecord>, BackstopError>;

    async fn update_player(
        &self,
        player_id: PlayerId,
        patch: &PlayerPatch,
    ) -> Result<(), BackstopError>;
}

/// Performs one mirrored write. Failures are logged and swallowed.
pub async fn mirror(backstop: &dyn Backstop, op: &PersistOp) {
    let result = match op {
        PersistOp::UpdateGame { game_id, patch } => backstop.update_game(*game_id, patch).await,
        PersistOp::UpdatePlayer { player_id, patch } => {
            backstop.update_player(*player_id, patch).await
        }
    };
    match result {
        Ok(()) => debug!("Mirrored {:?}", op),
        Err(e) => error!("Failed to mirror state to backstop: {}", e),
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackstop {
    client: Client,
    base_url: String,
}

impl HttpBackstop {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackstopError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or("No response body".into());
        if status == StatusCode::NOT_FOUND {
            return Err(BackstopError::NotFound(body));
        }
        warn!("Backstop request failed: {} - {}", status, body);
        Err(BackstopError::Api(status, body))
    }
}

#[async_trait]
impl Backstop for HttpBackstop {
    async fn create_game(&self, new_game: &NewGame) -> Result<GameRecord, BackstopError> {
        let response = self
            .client
            .post(format!("{}/games", self.base_url))
            .json(new_game)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn find_room(&self, room_code: &str) -> Result<Option<GameRecord>, BackstopError> {
        let code = normalize_room_code(room_code);
        let response = self
            .client
            .get(format!("{}/games/room/{}", self.base_url, code))
            .send()
            .await?;
        match Self::check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(BackstopError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_game(&self, game_id: GameId, patch: &GamePatch) -> Result<(), BackstopError> {
        let response = self
            .client
            .patch(format!("{}/games/{}", self.base_url, game_id))
            .json(patch)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn add_player(
        &self,
        game_id: GameId,
        player: &NewPlayer,
    ) -> Result<PlayerRecord, BackstopError> {
        let response = self
            .client
            .post(format!("{}/games/{}/players", self.base_url, game_id))
            .json(player)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn players(&self, game_id: GameId) -> Result<Vec<PlayerRecord>, BackstopError> {
        let response = self
            .client
            .get(format!("{}/games/{}/players", self.base_url, game_id))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        patch: &PlayerPatch,
    ) -> Result<(), BackstopError> {
        let response = self
            .client
            .patch(format!("{}/players/{}", self.base_url, player_id))
            .json(patch)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryTables {
    games: HashMap<GameId, GameRecord>,
    players: Vec<PlayerRecord>,
}

/// In-process backstop with the relay's semantics. When given a hub it
/// announces inserted players on the game channel like the relay does.
#[derive(Clone, Default)]
pub struct MemoryBackstop {
    tables: Arc<Mutex<MemoryTables>>,
    hub: Option<MemoryHub>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackstop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hub(hub: MemoryHub) -> Self {
        Self {
            hub: Some(hub),
            ..Self::default()
        }
    }

    /// Makes every update fail, to exercise the mirror's error path
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn game(&self, game_id: GameId) -> Option<GameRecord> {
        self.tables.lock().await.games.get(&game_id).cloned()
    }

    pub async fn player(&self, player_id: PlayerId) -> Option<PlayerRecord> {
        self.tables
            .lock()
            .await
            .players
            .iter()
            .find(|p| p.id == player_id)
            .cloned()
    }

    fn check_writable(&self) -> Result<(), BackstopError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(BackstopError::Api(
                StatusCode::SERVICE_UNAVAILABLE,
                "backstop unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn now_string() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl Backstop for MemoryBackstop {
    async fn create_game(&self, new_game: &NewGame) -> Result<GameRecord, BackstopError> {
        let mut tables = self.tables.lock().await;
        let room_code = loop {
            let code = generate_room_code(&mut rand::thread_rng());
            let in_use = tables.games.values().any(|g| {
                g.room_code.as_deref() == Some(code.as_str()) && g.status != GameStatus::Finished
            });
            if !in_use {
                break code;
            }
        };

        let record = GameRecord {
            id: Uuid::new_v4(),
            room_code: Some(room_code),
            host_id: new_game.host_id,
            settings: new_game.settings.clone(),
            status: GameStatus::Lobby,
            current_round: 1,
            current_question: None,
            created_at: now_string(),
        };
        tables.games.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_room(&self, room_code: &str) -> Result<Option<GameRecord>, BackstopError> {
        let code = normalize_room_code(room_code);
        let tables = self.tables.lock().await;
        Ok(tables
            .games
            .values()
            .find(|g| g.room_code.as_deref() == Some(code.as_str()) && g.status != GameStatus::Finished)
            .cloned())
    }

    async fn update_game(&self, game_id: GameId, patch: &GamePatch) -> Result<(), BackstopError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let game = tables
            .games
            .get_mut(&game_id)
            .ok_or_else(|| BackstopError::NotFound(format!("game {}", game_id)))?;
        if let Some(status) = patch.status {
            game.status = status;
        }
        if let Some(round) = patch.current_round {
            game.current_round = round;
        }
        if let Some(question) = &patch.current_question {
            game.current_question = Some(question.clone());
        }
        Ok(())
    }

    async fn add_player(
        &self,
        game_id: GameId,
        player: &NewPlayer,
    ) -> Result<PlayerRecord, BackstopError> {
        let (record, room_code) = {
            let mut tables = self.tables.lock().await;
            let room_code = tables
                .games
                .get(&game_id)
                .ok_or_else(|| BackstopError::NotFound(format!("game {}", game_id)))?
                .room_code
                .clone();
            let record = PlayerRecord {
                id: player.id.unwrap_or_else(Uuid::new_v4),
                game_id,
                name: player.name.clone(),
                age: player.age,
                kid_age: player.kid_age,
                avatar_emoji: player.avatar_emoji.clone(),
                difficulty: player.difficulty,
                is_host: player.is_host,
                is_ready: player.is_host,
                score: 0,
                joined_at: now_string(),
            };
            tables.players.push(record.clone());
            (record, room_code)
        };

        if let (Some(hub), Some(code)) = (&self.hub, room_code) {
            match ChannelEvent::PlayerInserted(record.to_player()).encode() {
                Ok(event) => {
                    hub.publish(&channel_key(&code), event).await;
                }
                Err(e) => warn!("Failed to encode player_inserted: {}", e),
            }
        }
        Ok(record)
    }

    async fn players(&self, game_id: GameId) -> Result<Vec<PlayerRecord>, BackstopError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .players
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        patch: &PlayerPatch,
    ) -> Result<(), BackstopError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let player = tables
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| BackstopError::NotFound(format!("player {}", player_id)))?;
        if let Some(score) = patch.score {
            player.score = score;
        }
        if let Some(is_ready) = patch.is_ready {
            player.is_ready = is_ready;
        }
        if let Some(difficulty) = patch.difficulty {
            player.difficulty = difficulty;
        }
        Ok(())
    }
}
