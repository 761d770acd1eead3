use rand::Rng;
use tracing::{info, warn};
use trivia_types::{
    AnswerOutcome, Game, GameError, GameMode, GameSettings, GameStatus, Phase, Player, PlayerId,
    Question, ResultOrigin, SettingsUpdate, SubmittedAnswer, TurnView,
};

use crate::questions::{QuestionRequest, fallback_for, validate_question};
use crate::scoring::ScoringEngine;
use crate::store::{GameAction, GameStore, SessionState};

/// What happens after the result of a pass-and-play turn is dismissed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalProgress {
    NextTurn,
    Finished,
}

/// Single-device round robin: one process, no network, fully deterministic.
pub struct LocalTurnMachine {
    store: GameStore,
    phase: Phase,
    outcome: Option<AnswerOutcome>,
}

impl LocalTurnMachine {
    pub fn new(settings: GameSettings) -> Self {
        let game = Game {
            settings: GameSettings {
                mode: GameMode::Local,
                ..settings
            },
            ..Game::default()
        };
        let state = SessionState {
            game,
            ..SessionState::default()
        };
        Self {
            store: GameStore::new(state),
            phase: Phase::Lobby,
            outcome: None,
        }
    }

    pub fn game(&self) -> &Game {
        self.store.game()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        self.require_status(GameStatus::Lobby)?;
        self.store.dispatch(GameAction::AddPlayer(player));
        Ok(())
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), GameError> {
        self.require_status(GameStatus::Lobby)?;
        self.store.dispatch(GameAction::RemovePlayer(id));
        Ok(())
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<(), GameError> {
        self.require_status(GameStatus::Lobby)?;
        self.game().settings.merged(&update).validate()?;
        self.store.dispatch(GameAction::SetSettings(update));
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), GameError> {
        self.require_status(GameStatus::Lobby)?;
        if self.game().players.is_empty() {
            return Err(GameError::NotEnoughPlayers {
                required: 1,
                actual: 0,
            });
        }
        self.game().settings.validate()?;

        self.store.dispatch(GameAction::SetStatus(GameStatus::Playing));
        self.store.dispatch(GameAction::PrepareNextTurn {
            turn_index: 0,
            round: 1,
        });
        self.phase = Phase::Loading;
        info!(
            "Local game started with {} players for {} rounds",
            self.game().players.len(),
            self.game().settings.rounds
        );
        Ok(())
    }

    /// Request for the question of the current turn
    pub fn question_request<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<QuestionRequest> {
        if self.phase != Phase::Loading {
            return None;
        }
        QuestionRequest::for_turn(self.game(), rng)
    }

    /// Installs the generated question, or a fallback when generation failed
    /// or produced something unplayable.
    pub fn provide_question(
        &mut self,
        request: &QuestionRequest,
        generated: anyhow::Result<Question>,
    ) -> Result<(), GameError> {
        if self.phase != Phase::Loading {
            return Err(self.invalid_state());
        }
        let question = match generated.and_then(|q| validate_question(&q).map(|_| q)) {
            Ok(question) => question,
            Err(e) => {
                warn!(
                    "Question generation failed for {}, using fallback: {}",
                    request.subject.label(),
                    e
                );
                fallback_for(request)
            }
        };
        self.store.dispatch(GameAction::SetQuestion(question));
        self.outcome = None;
        self.phase = Phase::TurnIntro;
        Ok(())
    }

    /// Turn intro is over; the current player may answer
    pub fn reveal_question(&mut self) -> Result<(), GameError> {
        if self.phase != Phase::TurnIntro {
            return Err(self.invalid_state());
        }
        self.phase = Phase::Question;
        Ok(())
    }

    pub fn submit_answer(
        &mut self,
        answer: SubmittedAnswer,
        time_elapsed: f64,
    ) -> Result<AnswerOutcome, GameError> {
        if self.outcome.is_some() {
            return Err(GameError::AlreadyAnswered);
        }
        if self.phase != Phase::Question {
            return Err(GameError::NoActiveQuestion);
        }
        let game = self.game();
        let question = game
            .current_question
            .clone()
            .ok_or(GameError::NoActiveQuestion)?;
        let player = game.current_player().cloned().ok_or_else(|| self.invalid_state())?;

        let scored =
            ScoringEngine::score_answer(&player, &question, game.current_round, answer, time_elapsed);
        self.store.dispatch(GameAction::UpdatePlayer {
            id: player.id,
            update: scored.update,
        });
        self.store.dispatch(GameAction::RecordResult(scored.result));
        self.outcome = Some(scored.outcome.clone());
        self.phase = Phase::Result(ResultOrigin::AnsweredByMe);
        Ok(scored.outcome)
    }

    pub fn time_out(&mut self) -> Result<AnswerOutcome, GameError> {
        let limit = self
            .game()
            .current_question
            .as_ref()
            .map(|q| q.time_limit as f64)
            .ok_or(GameError::NoActiveQuestion)?;
        self.submit_answer(SubmittedAnswer::Timeout, limit)
    }

    /// Dismisses the result and moves to the next player, or ends the game
    pub fn continue_turn(&mut self) -> Result<LocalProgress, GameError> {
        if !matches!(self.phase, Phase::Result(_)) {
            return Err(self.invalid_state());
        }
        if self.game().is_game_over() {
            self.store.dispatch(GameAction::SetStatus(GameStatus::Finished));
            self.phase = Phase::Finished;
            info!("Local game finished after {} turns", self.game().completed_turns());
            return Ok(LocalProgress::Finished);
        }
        self.store.dispatch(GameAction::NextTurn);
        self.outcome = None;
        self.phase = Phase::Loading;
        Ok(LocalProgress::NextTurn)
    }

    pub fn view(&self) -> TurnView {
        let game = self.game();
        TurnView {
            phase: self.phase,
            status: game.status,
            position: game.position(),
            current_player: game.current_player().map(|p| p.id),
            // The device is passed around, so it is always "my" turn
            is_my_turn: true,
            is_host: true,
            question: game.current_question.clone(),
            outcome: self.outcome.clone(),
            completed_turns: game.completed_turns(),
            total_turns: game.total_turns(),
        }
    }

    fn require_status(&self, status: GameStatus) -> Result<(), GameError> {
        if self.game().status == status {
            Ok(())
        } else {
            Err(self.invalid_state())
        }
    }

    fn invalid_state(&self) -> GameError {
        GameError::InvalidGameState {
            current_state: format!("{:?}/{:?}", self.game().status, self.phase),
        }
    }
}
