use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use trivia_types::{
    AnswerOutcome, AnswerReport, ChannelEvent, Game, GameError, GameEvent, GameId, GameMessage, GamePatch,
    GameStatus, Phase, Player, PlayerId, PlayerPatch, PlayerUpdate, Question, QuestionId,
    ResultOrigin, RoundResult, SubmittedAnswer, TransportEvent, TurnPosition, TurnView,
};

use crate::questions::{QuestionRequest, fallback_for, validate_question};
use crate::scoring::ScoringEngine;
use crate::store::{GameAction, GameStore, SessionState};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub turn_intro: Duration,
    pub result_display: Duration,
    /// Pause before the host reads its own freshly prepared turn back for generation
    pub host_debounce: Duration,
    pub min_players: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            turn_intro: Duration::from_millis(1500),
            result_display: Duration::from_millis(3000),
            host_debounce: Duration::from_millis(100),
            min_players: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    TurnIntro,
    QuestionCountdown,
    ResultDisplay,
    HostDebounce,
}

/// Identifies one scheduled timer. A token that is no longer the live one for
/// its kind is stale and ignored when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    UpdateGame { game_id: GameId, patch: GamePatch },
    UpdatePlayer { player_id: PlayerId, patch: PlayerPatch },
}

/// Side effects requested by the coordinator; the caller performs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Broadcast(GameMessage),
    StartTimer { token: TimerToken, after: Duration },
    CancelTimer(TimerToken),
    GenerateQuestion {
        request: QuestionRequest,
        position: TurnPosition,
    },
    Persist(PersistOp),
    GameFinished,
}

/// One participant's replica of the online turn protocol.
///
/// Every client runs the same coordinator. The host additionally generates
/// questions and mirrors state to the persistence backstop; the client that
/// produced an answer is the one that advances the turn. The coordinator does
/// no IO: each entry point returns the effects to perform.
pub struct OnlineCoordinator {
    store: GameStore,
    me: PlayerId,
    config: CoordinatorConfig,
    phase: Phase,
    last_seen_question: Option<QuestionId>,
    seen_results: usize,
    outcome: Option<AnswerOutcome>,
    question_opened_at: Option<Instant>,
    timers: HashMap<TimerKind, TimerToken>,
    next_timer_seq: u64,
    scheduled_generation: HashSet<TurnPosition>,
    pending_generation: Option<TurnPosition>,
    rng: StdRng,
}

impl OnlineCoordinator {
    pub fn new(me: PlayerId, game: Game, config: CoordinatorConfig) -> Self {
        let phase = match game.status {
            GameStatus::Lobby => Phase::Lobby,
            GameStatus::Playing => Phase::Loading,
            GameStatus::Finished => Phase::Finished,
        };
        let seen_results = game.round_results.len();
        let mut store = GameStore::new(SessionState {
            game,
            ..SessionState::default()
        });
        store.dispatch(GameAction::SetMyPlayerId(me));

        Self {
            store,
            me,
            config,
            phase,
            last_seen_question: None,
            seen_results,
            outcome: None,
            question_opened_at: None,
            timers: HashMap::new(),
            next_timer_seq: 0,
            scheduled_generation: HashSet::new(),
            pending_generation: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixes the subject picker's randomness, for reproducible runs
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn me(&self) -> PlayerId {
        self.me
    }

    pub fn game(&self) -> &Game {
        self.store.game()
    }

    pub fn state(&self) -> &SessionState {
        self.store.state()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_host(&self) -> bool {
        self.game().is_host(self.me)
    }

    pub fn is_my_turn(&self) -> bool {
        self.game().current_player().map(|p| p.id) == Some(self.me)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn view(&self) -> TurnView {
        let game = self.game();
        TurnView {
            phase: self.phase,
            status: game.status,
            position: game.position(),
            current_player: game.current_player().map(|p| p.id),
            is_my_turn: self.is_my_turn(),
            is_host: self.is_host(),
            question: game.current_question.clone(),
            outcome: self.outcome.clone(),
            completed_turns: game.completed_turns(),
            total_turns: game.total_turns(),
        }
    }

    /// Host only: leave the lobby and kick off generation of the first question
    pub fn start_game(&mut self, now: Instant) -> Result<Vec<Effect>, GameError> {
        if !self.is_host() {
            return Err(GameError::NotHost);
        }
        let game = self.game();
        if game.status != GameStatus::Lobby {
            return Err(self.invalid_state());
        }
        if game.players.len() < self.config.min_players {
            return Err(GameError::NotEnoughPlayers {
                required: self.config.min_players,
                actual: game.players.len(),
            });
        }
        game.settings.validate()?;

        let mut fx = Vec::new();
        let start = TurnPosition::START;
        self.store.dispatch(GameAction::PrepareNextTurn {
            turn_index: start.turn_index,
            round: start.round,
        });
        self.store.dispatch(GameAction::SetStatus(GameStatus::Playing));
        self.enter_loading(&mut fx);
        self.broadcast(
            &mut fx,
            GameEvent::GameStart {
                turn_index: start.turn_index,
                round: start.round,
            },
        );
        self.persist_game(
            &mut fx,
            GamePatch {
                status: Some(GameStatus::Playing),
                current_round: Some(start.round),
                current_question: None,
            },
        );
        info!(
            "Game {} started with {} players",
            self.game().id,
            self.game().players.len()
        );
        self.schedule_generation(&mut fx, start);
        self.observe(&mut fx, now);
        Ok(fx)
    }

    pub fn set_ready(&mut self, is_ready: bool) -> Result<Vec<Effect>, GameError> {
        if self.game().status != GameStatus::Lobby {
            return Err(self.invalid_state());
        }
        let mut fx = Vec::new();
        self.store.dispatch(GameAction::UpdatePlayer {
            id: self.me,
            update: PlayerUpdate::ready(is_ready),
        });
        self.broadcast(
            &mut fx,
            GameEvent::PlayerReady {
                player_id: self.me,
                is_ready,
            },
        );
        self.persist_player(
            &mut fx,
            self.me,
            PlayerPatch {
                is_ready: Some(is_ready),
                ..PlayerPatch::default()
            },
        );
        Ok(fx)
    }

    /// The current player picks an option. Only the first of answer and
    /// timeout counts.
    pub fn submit_answer(
        &mut self,
        choice: impl Into<String>,
        now: Instant,
    ) -> Result<(AnswerOutcome, Vec<Effect>), GameError> {
        if self.game().status != GameStatus::Playing {
            return Err(self.invalid_state());
        }
        if !self.is_my_turn() {
            return Err(GameError::NotYourTurn);
        }
        if self.outcome.is_some() {
            return Err(GameError::AlreadyAnswered);
        }
        if self.phase != Phase::Question {
            return Err(GameError::NoActiveQuestion);
        }

        let elapsed = self
            .question_opened_at
            .map(|opened| now.saturating_duration_since(opened).as_secs_f64())
            .unwrap_or(0.0);
        let mut fx = Vec::new();
        let outcome =
            self.answer_current(&mut fx, SubmittedAnswer::Choice(choice.into()), elapsed)?;
        self.observe(&mut fx, now);
        Ok((outcome, fx))
    }

    pub fn on_timer(&mut self, token: TimerToken, now: Instant) -> Vec<Effect> {
        if self.timers.get(&token.kind) != Some(&token) {
            debug!("Ignoring stale {:?} timer", token.kind);
            return Vec::new();
        }
        self.timers.remove(&token.kind);

        let mut fx = Vec::new();
        match token.kind {
            TimerKind::TurnIntro => {
                if self.phase == Phase::TurnIntro {
                    self.phase = Phase::Question;
                    self.question_opened_at = Some(now);
                    let limit = self.game().current_question.as_ref().map(|q| q.time_limit);
                    if let Some(limit) = limit {
                        if self.is_my_turn() && self.outcome.is_none() {
                            self.start_timer(
                                &mut fx,
                                TimerKind::QuestionCountdown,
                                Duration::from_secs(limit as u64),
                            );
                        }
                    }
                }
            }
            TimerKind::QuestionCountdown => {
                let limit = self.game().current_question.as_ref().map(|q| q.time_limit);
                if let Some(limit) = limit {
                    if self.phase == Phase::Question && self.is_my_turn() && self.outcome.is_none()
                    {
                        if let Err(e) =
                            self.answer_current(&mut fx, SubmittedAnswer::Timeout, limit as f64)
                        {
                            warn!("Could not record timeout: {}", e);
                        }
                    }
                }
            }
            TimerKind::ResultDisplay => {
                if self.phase == Phase::Result(ResultOrigin::AnsweredByMe) {
                    self.finish_turn(&mut fx);
                }
            }
            TimerKind::HostDebounce => self.request_generation(&mut fx),
        }
        self.observe(&mut fx, now);
        fx
    }

    /// Host only: the collaborator answered (or failed) for `position`.
    /// Failures and unplayable questions are replaced by a fallback.
    pub fn on_question_generated(
        &mut self,
        request: &QuestionRequest,
        position: TurnPosition,
        generated: anyhow::Result<Question>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut fx = Vec::new();
        let game = self.game();
        if !self.is_host()
            || game.status != GameStatus::Playing
            || game.position() != position
            || game.current_question.is_some()
        {
            debug!("Discarding question generated for stale turn {:?}", position);
            return fx;
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

        self.store.dispatch(GameAction::SetTurnAndQuestion {
            turn_index: position.turn_index,
            round: position.round,
            question: question.clone(),
        });
        self.broadcast(
            &mut fx,
            GameEvent::Question {
                question: question.clone(),
                turn_index: position.turn_index,
                round: position.round,
            },
        );
        self.persist_game(
            &mut fx,
            GamePatch {
                status: None,
                current_round: Some(position.round),
                current_question: Some(question),
            },
        );
        self.observe(&mut fx, now);
        fx
    }

    /// Entry point for raw transport events. Unknown or malformed events are
    /// logged and dropped.
    pub fn handle_transport_event(&mut self, raw: &TransportEvent, now: Instant) -> Vec<Effect> {
        match ChannelEvent::decode(raw) {
            Ok(Some(event)) => self.handle_event(event, now),
            Ok(None) => {
                warn!("Dropping unknown channel event '{}'", raw.event);
                Vec::new()
            }
            Err(e) => {
                warn!("Dropping malformed '{}' event: {}", raw.event, e);
                Vec::new()
            }
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent, now: Instant) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            ChannelEvent::Game(message) => {
                if message.sender_id == self.me {
                    // Already applied locally when it was sent
                    debug!("Suppressing echo of own {} message", message.payload.kind());
                    return fx;
                }
                self.apply_remote(&mut fx, message);
            }
            ChannelEvent::PlayerJoined(player) | ChannelEvent::PlayerInserted(player) => {
                self.admit_player(player)
            }
        }
        self.observe(&mut fx, now);
        fx
    }

    fn apply_remote(&mut self, fx: &mut Vec<Effect>, message: GameMessage) {
        let sender = message.sender_id;
        match message.payload {
            GameEvent::GameStart { turn_index, round } => {
                if self.game().status != GameStatus::Lobby {
                    debug!("Ignoring repeated game_start from {}", sender);
                    return;
                }
                self.store
                    .dispatch(GameAction::PrepareNextTurn { turn_index, round });
                self.store.dispatch(GameAction::SetStatus(GameStatus::Playing));
                self.enter_loading(fx);
                info!("Game {} started by {}", self.game().id, sender);
                self.schedule_generation(fx, TurnPosition::new(turn_index, round));
            }
            GameEvent::Question {
                question,
                turn_index,
                round,
            } => {
                let game = self.game();
                let position = TurnPosition::new(turn_index, round);
                if game.status == GameStatus::Finished {
                    return;
                }
                if game.current_question.as_ref().map(|q| q.id) == Some(question.id) {
                    debug!("Ignoring duplicate question {}", question.id);
                    return;
                }
                if game.question_answered(question.id) || position < game.position() {
                    debug!("Ignoring stale question {} for {:?}", question.id, position);
                    return;
                }
                if game.status == GameStatus::Lobby {
                    // game_start never arrived
                    self.store.dispatch(GameAction::SetStatus(GameStatus::Playing));
                }
                self.store.dispatch(GameAction::SetTurnAndQuestion {
                    turn_index,
                    round,
                    question,
                });
            }
            GameEvent::Answer(report) => {
                if self
                    .game()
                    .has_result_for(report.player_id, report.question_id)
                {
                    debug!(
                        "Ignoring duplicate answer from {} for question {}",
                        report.player_id, report.question_id
                    );
                    return;
                }
                self.store.dispatch(GameAction::RecordResult(report.result()));
                self.store
                    .dispatch(GameAction::SyncCompletedTurns(report.completed_turns));
                self.store.dispatch(GameAction::UpdatePlayer {
                    id: report.player_id,
                    update: report.player_update(),
                });
                self.persist_player(
                    fx,
                    report.player_id,
                    PlayerPatch {
                        score: Some(report.new_score),
                        difficulty: Some(report.difficulty),
                        is_ready: None,
                    },
                );
            }
            GameEvent::AdvanceTurn {
                next_turn_index,
                next_round,
            } => {
                let target = TurnPosition::new(next_turn_index, next_round);
                let game = self.game();
                if game.status == GameStatus::Finished {
                    return;
                }
                // Equal means a duplicate, or the next question overtook this message
                if target <= game.position() {
                    debug!("Ignoring advance_turn to {:?}, already there", target);
                    return;
                }
                self.store.dispatch(GameAction::PrepareNextTurn {
                    turn_index: target.turn_index,
                    round: target.round,
                });
                self.enter_loading(fx);
                debug!("Advanced to {:?} by {}", target, sender);
                self.schedule_generation(fx, target);
            }
            GameEvent::GameOver => {
                info!("Game {} ended by {}", self.game().id, sender);
                self.store.dispatch(GameAction::SetStatus(GameStatus::Finished));
            }
            GameEvent::PlayerReady {
                player_id,
                is_ready,
            } => {
                if self.game().status != GameStatus::Lobby {
                    return;
                }
                self.store.dispatch(GameAction::UpdatePlayer {
                    id: player_id,
                    update: PlayerUpdate::ready(is_ready),
                });
                self.persist_player(
                    fx,
                    player_id,
                    PlayerPatch {
                        is_ready: Some(is_ready),
                        ..PlayerPatch::default()
                    },
                );
            }
        }
    }

    /// Late joiners are appended, so existing turn indices keep their owners
    fn admit_player(&mut self, player: Player) {
        let game = self.game();
        if game.status == GameStatus::Finished {
            debug!("Ignoring join of {} after the game finished", player.id);
            return;
        }
        if game.player(player.id).is_none() {
            if game.status == GameStatus::Playing {
                info!(
                    "Player {} joined game {} in round {}",
                    player.name,
                    game.id,
                    game.current_round
                );
            } else {
                info!("Player {} joined game {}", player.name, game.id);
            }
        }
        self.store.dispatch(GameAction::AddPlayer(player));
    }

    fn answer_current(
        &mut self,
        fx: &mut Vec<Effect>,
        answer: SubmittedAnswer,
        elapsed: f64,
    ) -> Result<AnswerOutcome, GameError> {
        let game = self.game();
        let question = game
            .current_question
            .clone()
            .ok_or(GameError::NoActiveQuestion)?;
        let player = game
            .player(self.me)
            .cloned()
            .ok_or_else(|| GameError::PlayerNotFound {
                player_id: self.me.to_string(),
            })?;
        let round = game.current_round;

        let scored = ScoringEngine::score_answer(&player, &question, round, answer, elapsed);
        self.store.dispatch(GameAction::UpdatePlayer {
            id: self.me,
            update: scored.update,
        });
        self.store.dispatch(GameAction::RecordResult(scored.result));
        self.seen_results = self.game().round_results.len();
        self.outcome = Some(scored.outcome.clone());
        self.cancel_timer(fx, TimerKind::QuestionCountdown);
        self.phase = Phase::Result(ResultOrigin::AnsweredByMe);
        self.start_timer(fx, TimerKind::ResultDisplay, self.config.result_display);

        let patch = PlayerPatch {
            score: Some(scored.report.new_score),
            difficulty: Some(scored.report.difficulty),
            is_ready: None,
        };
        let report = AnswerReport {
            completed_turns: self.game().completed_turns(),
            ..scored.report
        };
        self.broadcast(fx, GameEvent::Answer(report));
        self.persist_player(fx, self.me, patch);
        Ok(scored.outcome)
    }

    /// Result display is over for the answer this client produced
    fn finish_turn(&mut self, fx: &mut Vec<Effect>) {
        let game = self.game();
        if game.is_game_over() {
            info!(
                "Game {} complete after {} turns",
                game.id,
                game.completed_turns()
            );
            self.store.dispatch(GameAction::SetStatus(GameStatus::Finished));
            self.broadcast(fx, GameEvent::GameOver);
            return;
        }

        let next = game.position().next(game.players.len());
        self.store.dispatch(GameAction::PrepareNextTurn {
            turn_index: next.turn_index,
            round: next.round,
        });
        self.broadcast(fx, GameEvent::advance_to(next));
        self.enter_loading(fx);
        self.schedule_generation(fx, next);
    }

    /// Reconciles the phase with the replicated game after any change
    fn observe(&mut self, fx: &mut Vec<Effect>, now: Instant) {
        let status = self.game().status;
        if status == GameStatus::Finished {
            if self.phase != Phase::Finished {
                for kind in [
                    TimerKind::TurnIntro,
                    TimerKind::QuestionCountdown,
                    TimerKind::ResultDisplay,
                    TimerKind::HostDebounce,
                ] {
                    self.cancel_timer(fx, kind);
                }
                self.pending_generation = None;
                self.phase = Phase::Finished;
                self.persist_game(
                    fx,
                    GamePatch {
                        status: Some(GameStatus::Finished),
                        ..GamePatch::default()
                    },
                );
                fx.push(Effect::GameFinished);
            }
            return;
        }
        if status == GameStatus::Lobby {
            return;
        }
        if self.phase == Phase::Lobby {
            self.phase = Phase::Loading;
        }

        // Someone else's answer landed: show it instead of waiting for a timer
        let results = self.game().round_results.len();
        if results > self.seen_results {
            self.seen_results = results;
            let latest = self.game().round_results.last().cloned();
            if let Some(latest) = latest {
                if latest.player_id != self.me
                    && matches!(self.phase, Phase::Loading | Phase::TurnIntro | Phase::Question)
                {
                    self.cancel_timer(fx, TimerKind::TurnIntro);
                    self.cancel_timer(fx, TimerKind::QuestionCountdown);
                    self.outcome = Some(self.watcher_outcome(&latest));
                    self.phase = Phase::Result(ResultOrigin::AnsweredByOther);
                }
            }
        }

        // A new question id is the single trigger for the turn intro
        let question = self
            .game()
            .current_question
            .as_ref()
            .map(|q| (q.id, self.game().question_answered(q.id)));
        if let Some((question_id, answered)) = question {
            if self.last_seen_question != Some(question_id) {
                self.last_seen_question = Some(question_id);
                if answered {
                    debug!("Question {} already answered, no intro", question_id);
                } else if matches!(
                    self.phase,
                    Phase::Loading | Phase::Result(ResultOrigin::AnsweredByOther)
                ) {
                    self.outcome = None;
                    self.question_opened_at = None;
                    self.phase = Phase::TurnIntro;
                    self.start_timer(fx, TimerKind::TurnIntro, self.config.turn_intro);
                    debug!("Turn intro for question {} at {:?}", question_id, now);
                }
            }
        }
    }

    fn watcher_outcome(&self, result: &RoundResult) -> AnswerOutcome {
        let game = self.game();
        let question = game
            .current_question
            .as_ref()
            .filter(|q| q.id == result.question_id);
        let multiplier = match game.player(result.player_id) {
            Some(player) if result.is_correct => ScoringEngine::streak_multiplier(player.streak),
            _ => 1.0,
        };
        AnswerOutcome {
            is_correct: result.is_correct,
            points: result.points_earned,
            multiplier,
            correct_answer: question.map(|q| q.correct_answer.clone()).unwrap_or_default(),
            explanation: question.map(|q| q.explanation.clone()).unwrap_or_default(),
            selected: result.answer.clone(),
        }
    }

    fn enter_loading(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_timer(fx, TimerKind::TurnIntro);
        self.cancel_timer(fx, TimerKind::QuestionCountdown);
        self.cancel_timer(fx, TimerKind::ResultDisplay);
        self.outcome = None;
        self.question_opened_at = None;
        self.phase = Phase::Loading;
    }

    fn schedule_generation(&mut self, fx: &mut Vec<Effect>, position: TurnPosition) {
        if !self.is_host() {
            return;
        }
        if !self.scheduled_generation.insert(position) {
            debug!("Generation for {:?} already scheduled", position);
            return;
        }
        self.pending_generation = Some(position);
        self.start_timer(fx, TimerKind::HostDebounce, self.config.host_debounce);
    }

    fn request_generation(&mut self, fx: &mut Vec<Effect>) {
        let Some(position) = self.pending_generation.take() else {
            return;
        };
        let game = self.store.game();
        if game.status != GameStatus::Playing
            || game.position() != position
            || game.current_question.is_some()
        {
            debug!("Skipping generation for stale turn {:?}", position);
            return;
        }
        match QuestionRequest::for_turn(game, &mut self.rng) {
            Some(request) => fx.push(Effect::GenerateQuestion { request, position }),
            None => warn!("No player at {:?}, cannot request a question", position),
        }
    }

    fn start_timer(&mut self, fx: &mut Vec<Effect>, kind: TimerKind, after: Duration) {
        self.cancel_timer(fx, kind);
        self.next_timer_seq += 1;
        let token = TimerToken {
            kind,
            seq: self.next_timer_seq,
        };
        self.timers.insert(kind, token);
        fx.push(Effect::StartTimer { token, after });
    }

    fn cancel_timer(&mut self, fx: &mut Vec<Effect>, kind: TimerKind) {
        if let Some(token) = self.timers.remove(&kind) {
            fx.push(Effect::CancelTimer(token));
        }
    }

    fn broadcast(&self, fx: &mut Vec<Effect>, event: GameEvent) {
        fx.push(Effect::Broadcast(GameMessage::new(self.me, event)));
    }

    fn persist_game(&self, fx: &mut Vec<Effect>, patch: GamePatch) {
        if self.is_host() {
            fx.push(Effect::Persist(PersistOp::UpdateGame {
                game_id: self.game().id,
                patch,
            }));
        }
    }

    fn persist_player(&self, fx: &mut Vec<Effect>, player_id: PlayerId, patch: PlayerPatch) {
        if self.is_host() {
            fx.push(Effect::Persist(PersistOp::UpdatePlayer { player_id, patch }));
        }
    }

    fn invalid_state(&self) -> GameError {
        GameError::InvalidGameState {
            current_state: format!("{:?}/{:?}", self.game().status, self.phase),
        }
    }
}
