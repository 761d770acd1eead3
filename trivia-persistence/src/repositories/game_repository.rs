use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{games, players, prelude::*};
use trivia_types::{
    AgeGroup, GameId, GamePatch, GameRecord, GameStatus, NewGame, NewPlayer, PlayerId,
    PlayerPatch, PlayerRecord,
};

/// Games and their rosters, as the backstop stores them
#[derive(Clone)]
pub struct GameRepository {
    db: DatabaseConnection,
}

impl GameRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_game(model: games::Model) -> Result<GameRecord> {
        let status = GameStatus::parse(&model.status).unwrap_or_else(|| {
            warn!("Game {} has unknown status '{}'", model.id, model.status);
            GameStatus::Lobby
        });
        let current_question = match model.current_question {
            Some(question) => serde_json::from_value(question)?,
            None => None,
        };

        Ok(GameRecord {
            id: model.id,
            room_code: model.room_code,
            host_id: model.host_id,
            settings: serde_json::from_value(model.settings)?,
            status,
            current_round: model.current_round.max(1) as u32,
            current_question,
            created_at: model.created_at.to_rfc3339(),
        })
    }

    fn model_to_player(model: players::Model) -> PlayerRecord {
        PlayerRecord {
            id: model.id,
            game_id: model.game_id,
            name: model.name,
            age: AgeGroup::parse(&model.age).unwrap_or(AgeGroup::Adult),
            kid_age: model.kid_age.map(|age| age.clamp(0, u8::MAX as i16) as u8),
            avatar_emoji: model.avatar_emoji,
            difficulty: model.difficulty.clamp(0, u8::MAX as i16) as u8,
            is_host: model.is_host,
            is_ready: model.is_ready,
            score: model.score.max(0) as u32,
            joined_at: model.joined_at.to_rfc3339(),
        }
    }

    pub async fn create_game(&self, new_game: &NewGame, room_code: &str) -> Result<GameRecord> {
        let game = games::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            room_code: ActiveValue::Set(Some(room_code.to_string())),
            host_id: ActiveValue::Set(new_game.host_id),
            settings: ActiveValue::Set(serde_json::to_value(&new_game.settings)?),
            status: ActiveValue::Set(GameStatus::Lobby.as_str().to_string()),
            current_round: ActiveValue::Set(1),
            current_question: ActiveValue::Set(None),
            created_at: ActiveValue::Set(chrono::Utc::now().into()),
        };

        let saved = Games::insert(game).exec(&self.db).await?;
        let created = Games::find_by_id(saved.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created game"))?;

        debug!("Created game {} with room code {}", created.id, room_code);
        Self::model_to_game(created)
    }

    pub async fn find_game(&self, game_id: GameId) -> Result<Option<GameRecord>> {
        Games::find_by_id(game_id)
            .one(&self.db)
            .await?
            .map(Self::model_to_game)
            .transpose()
    }

    /// The newest unfinished game using `room_code`
    pub async fn find_active_by_room_code(&self, room_code: &str) -> Result<Option<GameRecord>> {
        Games::find()
            .filter(games::Column::RoomCode.eq(room_code))
            .filter(games::Column::Status.ne(GameStatus::Finished.as_str()))
            .order_by_desc(games::Column::CreatedAt)
            .one(&self.db)
            .await?
            .map(Self::model_to_game)
            .transpose()
    }

    pub async fn room_code_in_use(&self, room_code: &str) -> Result<bool> {
        let count = Games::find()
            .filter(games::Column::RoomCode.eq(room_code))
            .filter(games::Column::Status.ne(GameStatus::Finished.as_str()))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Applies the fields present in `patch`. Returns false when the game
    /// does not exist.
    pub async fn update_game(&self, game_id: GameId, patch: &GamePatch) -> Result<bool> {
        let Some(game) = Games::find_by_id(game_id).one(&self.db).await? else {
            return Ok(false);
        };

        let mut game: games::ActiveModel = game.into();
        if let Some(status) = patch.status {
            game.status = ActiveValue::Set(status.as_str().to_string());
        }
        if let Some(round) = patch.current_round {
            game.current_round = ActiveValue::Set(round as i32);
        }
        if let Some(question) = &patch.current_question {
            game.current_question = ActiveValue::Set(Some(serde_json::to_value(question)?));
        }
        game.update(&self.db).await?;
        Ok(true)
    }

    /// Inserts a player row. The host starts ready. Returns `None` when the
    /// game does not exist.
    pub async fn add_player(
        &self,
        game_id: GameId,
        new_player: &NewPlayer,
    ) -> Result<Option<PlayerRecord>> {
        if Games::find_by_id(game_id).one(&self.db).await?.is_none() {
            return Ok(None);
        }

        let player = players::ActiveModel {
            id: ActiveValue::Set(new_player.id.unwrap_or_else(Uuid::new_v4)),
            game_id: ActiveValue::Set(game_id),
            name: ActiveValue::Set(new_player.name.clone()),
            age: ActiveValue::Set(new_player.age.as_str().to_string()),
            kid_age: ActiveValue::Set(new_player.kid_age.map(i16::from)),
            avatar_emoji: ActiveValue::Set(new_player.avatar_emoji.clone()),
            difficulty: ActiveValue::Set(i16::from(new_player.difficulty)),
            is_host: ActiveValue::Set(new_player.is_host),
            is_ready: ActiveValue::Set(new_player.is_host),
            score: ActiveValue::Set(0),
            joined_at: ActiveValue::Set(chrono::Utc::now().into()),
        };

        let saved = Players::insert(player).exec(&self.db).await?;
        let created = Players::find_by_id(saved.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created player"))?;
        Ok(Some(Self::model_to_player(created)))
    }

    /// Roster in join order
    pub async fn players_for_game(&self, game_id: GameId) -> Result<Vec<PlayerRecord>> {
        let players = Players::find()
            .filter(players::Column::GameId.eq(game_id))
            .order_by_asc(players::Column::JoinedAt)
            .all(&self.db)
            .await?;
        Ok(players.into_iter().map(Self::model_to_player).collect())
    }

    pub async fn update_player(&self, player_id: PlayerId, patch: &PlayerPatch) -> Result<bool> {
        let Some(player) = Players::find_by_id(player_id).one(&self.db).await? else {
            return Ok(false);
        };

        let mut player: players::ActiveModel = player.into();
        if let Some(score) = patch.score {
            player.score = ActiveValue::Set(score as i32);
        }
        if let Some(is_ready) = patch.is_ready {
            player.is_ready = ActiveValue::Set(is_ready);
        }
        if let Some(difficulty) = patch.difficulty {
            player.difficulty = ActiveValue::Set(i16::from(difficulty));
        }
        player.update(&self.db).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use migration::{Migrator, MigratorTrait};
    use trivia_types::{GameSettings, Question, QuestionType, Subject};

    async fn setup_test_db() -> GameRepository {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        GameRepository::new(db)
    }

    fn new_game() -> NewGame {
        NewGame {
            host_id: Uuid::new_v4(),
            settings: GameSettings::default(),
        }
    }

    fn new_player(name: &str, is_host: bool) -> NewPlayer {
        NewPlayer {
            id: None,
            name: name.to_string(),
            age: AgeGroup::Kid,
            kid_age: Some(9),
            avatar_emoji: "🦊".to_string(),
            difficulty: 5,
            is_host,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_game() {
        let repo = setup_test_db().await;
        let new_game = new_game();

        let created = repo.create_game(&new_game, "K7QM").await.unwrap();
        assert_eq!(created.room_code.as_deref(), Some("K7QM"));
        assert_eq!(created.status, GameStatus::Lobby);
        assert_eq!(created.current_round, 1);
        assert_eq!(created.settings, new_game.settings);

        let found = repo.find_game(created.id).await.unwrap().unwrap();
        assert_eq!(found.host_id, new_game.host_id);
        assert!(repo.find_game(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finished_games_release_their_room_code() {
        let repo = setup_test_db().await;
        let game = repo.create_game(&new_game(), "K7QM").await.unwrap();
        assert!(repo.room_code_in_use("K7QM").await.unwrap());
        assert!(repo.find_active_by_room_code("K7QM").await.unwrap().is_some());

        let patch = GamePatch {
            status: Some(GameStatus::Finished),
            ..GamePatch::default()
        };
        assert!(repo.update_game(game.id, &patch).await.unwrap());

        assert!(!repo.room_code_in_use("K7QM").await.unwrap());
        assert!(repo.find_active_by_room_code("K7QM").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_game_fields() {
        let repo = setup_test_db().await;
        let game = repo.create_game(&new_game(), "AB3K").await.unwrap();
        let question = Question {
            id: Uuid::new_v4(),
            text: "Is water wet?".to_string(),
            question_type: QuestionType::TrueFalse,
            options: vec!["True".to_string(), "False".to_string()],
            correct_answer: "True".to_string(),
            explanation: "Mostly.".to_string(),
            subject: Subject::Science,
            difficulty: 2,
            time_limit: 20,
        };

        let patch = GamePatch {
            status: Some(GameStatus::Playing),
            current_round: Some(2),
            current_question: Some(question.clone()),
        };
        assert!(repo.update_game(game.id, &patch).await.unwrap());

        let stored = repo.find_game(game.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Playing);
        assert_eq!(stored.current_round, 2);
        assert_eq!(stored.current_question, Some(question));

        assert!(!repo
            .update_game(Uuid::new_v4(), &GamePatch::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_roster_keeps_join_order() {
        let repo = setup_test_db().await;
        let game = repo.create_game(&new_game(), "ZX9P").await.unwrap();

        let host = repo
            .add_player(game.id, &new_player("Host", true))
            .await
            .unwrap()
            .unwrap();
        assert!(host.is_ready);
        assert_eq!(host.kid_age, Some(9));
        assert_eq!(host.age, AgeGroup::Kid);

        let guest_id = Uuid::new_v4();
        let guest = repo
            .add_player(
                game.id,
                &NewPlayer {
                    id: Some(guest_id),
                    ..new_player("Guest", false)
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(guest.id, guest_id);
        assert!(!guest.is_ready);

        let roster = repo.players_for_game(game.id).await.unwrap();
        let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "Guest"]);

        assert!(repo
            .add_player(Uuid::new_v4(), &new_player("Lost", false))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_player() {
        let repo = setup_test_db().await;
        let game = repo.create_game(&new_game(), "QQ22").await.unwrap();
        let player = repo
            .add_player(game.id, &new_player("Guest", false))
            .await
            .unwrap()
            .unwrap();

        let patch = PlayerPatch {
            score: Some(42),
            is_ready: Some(true),
            difficulty: Some(7),
        };
        assert!(repo.update_player(player.id, &patch).await.unwrap());

        let roster = repo.players_for_game(game.id).await.unwrap();
        assert_eq!(roster[0].score, 42);
        assert!(roster[0].is_ready);
        assert_eq!(roster[0].difficulty, 7);

        assert!(!repo
            .update_player(Uuid::new_v4(), &PlayerPatch::default())
            .await
            .unwrap());
    }
}
