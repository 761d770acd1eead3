#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use trivia_client::{
    Backstop, BackstopError, ClientConfig, GeneratorError, MemoryBackstop, MemoryHub,
    PlayerProfile, QuestionGenerator, SessionError, SessionHandle, SessionServices,
    SessionSnapshot,
};
use trivia_core::{QuestionRequest, fallback_question};
use trivia_types::{
    AgeGroup, DEFAULT_AVATAR, DEFAULT_DIFFICULTY, GameId, GameMode, GamePatch, GameRecord, GameSettings, NewGame,
    NewPlayer, Phase, PlayerId, PlayerPatch, PlayerRecord, Question,
};

/// Generator that never produces anything, so every turn uses a fallback
pub struct FailingGenerator {
    pub calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl QuestionGenerator for FailingGenerator {
    async fn generate(&self, _request: &QuestionRequest) -> Result<Question, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Parse("offline".to_string()))
    }
}

/// Generator that answers after `delay` with a marked question
pub struct ScriptedGenerator {
    pub delay: Duration,
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, request: &QuestionRequest) -> Result<Question, GeneratorError> {
        tokio::time::sleep(self.delay).await;
        let mut question = fallback_question(request.subject, 0);
        question.text = format!("Scripted {}", request.subject.label());
        Ok(question)
    }
}

/// Fast timings so paused-clock tests stay readable
pub fn test_config() -> ClientConfig {
    ClientConfig {
        generation_timeout: Duration::from_secs(2),
        turn_intro: Duration::from_millis(1500),
        local_turn_intro: Duration::from_millis(2000),
        result_display: Duration::from_millis(3000),
        host_debounce: Duration::from_millis(100),
        ack_timeout: Duration::from_secs(1),
        ..ClientConfig::default()
    }
}

/// Creates services for one client sharing the given hub and backstop
pub fn services(
    hub: &MemoryHub,
    backstop: &MemoryBackstop,
    generator: Arc<dyn QuestionGenerator>,
) -> SessionServices {
    SessionServices {
        transport: Arc::new(hub.connect()),
        backstop: Arc::new(backstop.clone()),
        generator,
        config: test_config(),
    }
}

/// Backstop that lands other writes inside a join. A queued player is
/// inserted right after the next roster read, and player inserts can be
/// held until the test releases them.
pub struct InterleavingBackstop {
    inner: MemoryBackstop,
    after_roster_read: Mutex<Option<NewPlayer>>,
    hold_inserts: Option<Arc<Notify>>,
}

impl InterleavingBackstop {
    pub fn new(inner: &MemoryBackstop) -> Self {
        Self {
            inner: inner.clone(),
            after_roster_read: Mutex::new(None),
            hold_inserts: None,
        }
    }

    pub fn insert_after_roster_read(self, player: NewPlayer) -> Self {
        *self.after_roster_read.lock().unwrap() = Some(player);
        self
    }

    pub fn hold_inserts_until(mut self, release: Arc<Notify>) -> Self {
        self.hold_inserts = Some(release);
        self
    }
}

#[async_trait]
impl Backstop for InterleavingBackstop {
    async fn create_game(&self, new_game: &NewGame) -> Result<GameRecord, BackstopError> {
        self.inner.create_game(new_game).await
    }

    async fn find_room(&self, room_code: &str) -> Result<Option<GameRecord>, BackstopError> {
        self.inner.find_room(room_code).await
    }

    async fn update_game(&self, game_id: GameId, patch: &GamePatch) -> Result<(), BackstopError> {
        self.inner.update_game(game_id, patch).await
    }

    async fn add_player(
        &self,
        game_id: GameId,
        player: &NewPlayer,
    ) -> Result<PlayerRecord, BackstopError> {
        if let Some(release) = &self.hold_inserts {
            release.notified().await;
        }
        self.inner.add_player(game_id, player).await
    }

    async fn players(&self, game_id: GameId) -> Result<Vec<PlayerRecord>, BackstopError> {
        let roster = self.inner.players(game_id).await?;
        let queued = self.after_roster_read.lock().unwrap().take();
        if let Some(player) = queued {
            self.inner.add_player(game_id, &player).await?;
        }
        Ok(roster)
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        patch: &PlayerPatch,
    ) -> Result<(), BackstopError> {
        self.inner.update_player(player_id, patch).await
    }
}

/// Row for a player that only ever exists in the backstop
pub fn absent_player(name: &str) -> NewPlayer {
    NewPlayer {
        id: Some(uuid::Uuid::new_v4()),
        name: name.to_string(),
        age: AgeGroup::Adult,
        kid_age: None,
        avatar_emoji: DEFAULT_AVATAR.to_string(),
        difficulty: DEFAULT_DIFFICULTY,
        is_host: false,
    }
}

pub fn online_settings(rounds: u32) -> GameSettings {
    GameSettings {
        mode: GameMode::Online,
        rounds,
        ..GameSettings::default()
    }
}

pub fn profile(name: &str) -> PlayerProfile {
    PlayerProfile::new(name, AgeGroup::Adult)
}

/// Plays one client to the end: answers correctly whenever it is this
/// client's question, and returns the final snapshot.
pub async fn autoplay(mut handle: SessionHandle) -> Result<SessionSnapshot, SessionError> {
    loop {
        let snapshot = handle
            .wait_for(|s| {
                s.is_finished()
                    || (s.view.is_my_turn
                        && s.view.phase == Phase::Question
                        && s.view.outcome.is_none())
            })
            .await?;
        if snapshot.is_finished() {
            return Ok(snapshot);
        }
        if let Some(question) = snapshot.view.question {
            let _ = handle.submit_answer(question.correct_answer).await;
        }
    }
}

/// Waits for the end of the game without ever answering
pub async fn spectate(mut handle: SessionHandle) -> Result<SessionSnapshot, SessionError> {
    handle.wait_for(SessionSnapshot::is_finished).await
}
