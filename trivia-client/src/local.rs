use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use trivia_core::{LocalProgress, LocalTurnMachine, compute_awards, leaderboard};
use trivia_types::{
    AnswerOutcome, Award, Game, GameError, GameSettings, LeaderboardEntry, Player, PlayerId,
    Question, SettingsUpdate, SubmittedAnswer, TurnView,
};
use uuid::Uuid;

use crate::generator::{QuestionGenerator, generate_within};
use crate::lobby::PlayerProfile;

/// Pass-and-play on one device: no transport, no backstop
pub struct LocalSession {
    machine: LocalTurnMachine,
    generator: Arc<dyn QuestionGenerator>,
    generation_timeout: Duration,
    turn_intro: Duration,
    rng: StdRng,
}

impl LocalSession {
    pub fn new(
        settings: GameSettings,
        generator: Arc<dyn QuestionGenerator>,
        generation_timeout: Duration,
        turn_intro: Duration,
    ) -> Self {
        Self {
            machine: LocalTurnMachine::new(settings),
            generator,
            generation_timeout,
            turn_intro,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn game(&self) -> &Game {
        self.machine.game()
    }

    pub fn view(&self) -> TurnView {
        self.machine.view()
    }

    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<PlayerId, GameError> {
        let mut player = Player::new(
            Uuid::new_v4(),
            profile.name,
            profile.age,
            self.game().settings.default_difficulty,
        );
        player.kid_age = profile.kid_age;
        player.avatar = profile.avatar;
        let id = player.id;
        self.machine.add_player(player)?;
        Ok(id)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), GameError> {
        self.machine.remove_player(id)
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<(), GameError> {
        self.machine.update_settings(update)
    }

    pub fn start(&mut self) -> Result<(), GameError> {
        self.machine.start()
    }

    /// Generates (or falls back to) the question for the current turn, shows
    /// the turn intro, then opens the question for answering.
    pub async fn load_question(&mut self) -> Result<Question, GameError> {
        let request = self
            .machine
            .question_request(&mut self.rng)
            .ok_or(GameError::NoActiveQuestion)?;
        let generated = generate_within(self.generator.as_ref(), &request, self.generation_timeout)
            .await
            .map_err(|e| {
                warn!("Local question generation failed: {}", e);
                anyhow::Error::from(e)
            });
        self.machine.provide_question(&request, generated)?;

        tokio::time::sleep(self.turn_intro).await;
        self.machine.reveal_question()?;
        self.game()
            .current_question
            .clone()
            .ok_or(GameError::NoActiveQuestion)
    }

    pub fn submit_answer(
        &mut self,
        choice: impl Into<String>,
        time_elapsed: f64,
    ) -> Result<AnswerOutcome, GameError> {
        self.machine
            .submit_answer(SubmittedAnswer::Choice(choice.into()), time_elapsed)
    }

    pub fn time_out(&mut self) -> Result<AnswerOutcome, GameError> {
        self.machine.time_out()
    }

    pub fn continue_turn(&mut self) -> Result<LocalProgress, GameError> {
        self.machine.continue_turn()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        leaderboard(&self.game().players)
    }

    pub fn awards(&self) -> Vec<Award> {
        compute_awards(&self.game().players)
    }
}
