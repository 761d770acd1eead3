#![allow(dead_code)]

use std::collections::HashSet;
use std::time::{Duration, Instant};
use trivia_core::{CoordinatorConfig, Effect, OnlineCoordinator, PersistOp, QuestionRequest, TimerToken};
use trivia_types::{
    AgeGroup, ChannelEvent, Game, GameEvent, GameMessage, GameMode, GameSettings, Phase, Player,
    PlayerId, Question, QuestionId, TurnPosition,
};
use uuid::Uuid;

/// How the current player reacts once their question is on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnswerPolicy {
    /// Never answer; the countdown records a timeout
    TimeOut,
    Correct { after_ms: u64 },
    Wrong { after_ms: u64 },
}

type Generator = Box<dyn FnMut(&QuestionRequest) -> anyhow::Result<Question>>;
/// Decides per (target client, message) whether a broadcast is lost
type DropFilter = Box<dyn FnMut(usize, &GameMessage) -> bool>;

enum Work {
    Deliver(ChannelEvent),
    Timer(TimerToken),
    Generated {
        request: QuestionRequest,
        position: TurnPosition,
    },
    Answer(QuestionId),
}

struct Scheduled {
    due_ms: u64,
    seq: u64,
    client: usize,
    work: Work,
}

/// Discrete-event network of coordinators sharing one broadcast channel.
///
/// Time is virtual: each step jumps to the next due item, so a full game with
/// twenty second countdowns runs instantly.
pub struct SimNetwork {
    pub clients: Vec<OnlineCoordinator>,
    pub sent: Vec<GameMessage>,
    pub persisted: Vec<PersistOp>,
    pub finished: Vec<usize>,
    pub latency_ms: u64,
    pub generation_ms: u64,
    pub duplicate_delivery: bool,
    pub echo_to_sender: bool,
    pub policy: AnswerPolicy,
    pub dropped: usize,
    generator: Generator,
    drop_filter: Option<DropFilter>,
    base: Instant,
    now_ms: u64,
    seq: u64,
    queue: Vec<Scheduled>,
    answers_scheduled: HashSet<(usize, QuestionId)>,
}

impl SimNetwork {
    /// Host is client 0; everyone starts from the same lobby snapshot
    pub fn new(game: Game) -> Self {
        let clients = game
            .players
            .iter()
            .enumerate()
            .map(|(i, p)| {
                OnlineCoordinator::new(p.id, game.clone(), CoordinatorConfig::default())
                    .with_rng_seed(i as u64)
            })
            .collect();

        Self {
            clients,
            sent: Vec::new(),
            persisted: Vec::new(),
            finished: Vec::new(),
            latency_ms: 10,
            generation_ms: 50,
            duplicate_delivery: false,
            echo_to_sender: false,
            policy: AnswerPolicy::TimeOut,
            dropped: 0,
            generator: Box::new(|_| Err(anyhow::anyhow!("generator offline"))),
            drop_filter: None,
            base: Instant::now(),
            now_ms: 0,
            seq: 0,
            queue: Vec::new(),
            answers_scheduled: HashSet::new(),
        }
    }

    pub fn with_generator(
        mut self,
        generator: impl FnMut(&QuestionRequest) -> anyhow::Result<Question> + 'static,
    ) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn with_drop_filter(
        mut self,
        filter: impl FnMut(usize, &GameMessage) -> bool + 'static,
    ) -> Self {
        self.drop_filter = Some(Box::new(filter));
        self
    }

    pub fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.now_ms)
    }

    pub fn start(&mut self) {
        let now = self.now();
        let fx = self.clients[0]
            .start_game(now)
            .expect("host should be able to start");
        self.apply_effects(0, fx);
    }

    /// Runs until nothing is scheduled. Returns the number of steps taken.
    pub fn run(&mut self, max_steps: usize) -> usize {
        self.run_until(max_steps, |_| false)
    }

    /// Runs until `done` holds or nothing is scheduled
    pub fn run_until(&mut self, max_steps: usize, done: impl Fn(&SimNetwork) -> bool) -> usize {
        let mut steps = 0;
        while steps < max_steps && !done(self) {
            let Some(next) = self.pop_next() else {
                break;
            };
            steps += 1;
            self.now_ms = next.due_ms;
            let now = self.now();
            let client = next.client;

            let fx = match next.work {
                Work::Deliver(event) => {
                    // Through the wire format, like a real transport
                    let raw = event.encode().expect("event encodes");
                    self.clients[client].handle_transport_event(&raw, now)
                }
                Work::Timer(token) => self.clients[client].on_timer(token, now),
                Work::Generated { request, position } => {
                    let generated = (self.generator)(&request);
                    self.clients[client].on_question_generated(&request, position, generated, now)
                }
                Work::Answer(question_id) => self.answer(client, question_id, now),
            };
            self.apply_effects(client, fx);
        }
        steps
    }

    /// Adds a player while the game runs, the way a joining client does: its
    /// replica starts from the stored rows and the row insert announces it to
    /// everyone already on the channel. Returns the new client's index.
    pub fn join_late(&mut self, name: &str) -> usize {
        let player = Player::new(Uuid::new_v4(), name, AgeGroup::Adult, 5);
        let host_game = self.clients[0].game();
        let mut players = host_game.players.clone();
        players.push(player.clone());
        let replica = Game {
            id: host_game.id,
            room_code: host_game.room_code.clone(),
            host_id: host_game.host_id,
            status: host_game.status,
            settings: host_game.settings.clone(),
            players,
            current_round: host_game.current_round,
            ..Game::default()
        };

        let index = self.clients.len();
        self.clients.push(
            OnlineCoordinator::new(player.id, replica, CoordinatorConfig::default())
                .with_rng_seed(index as u64),
        );
        for target in 0..index {
            let event = ChannelEvent::PlayerInserted(player.clone());
            self.schedule(self.latency_ms, target, Work::Deliver(event));
        }
        index
    }

    pub fn all_finished(&self) -> bool {
        self.clients.iter().all(|c| c.phase() == Phase::Finished)
    }

    pub fn broadcasts_of(&self, check: impl Fn(&GameEvent) -> bool) -> usize {
        self.sent.iter().filter(|m| check(&m.payload)).count()
    }

    fn answer(&mut self, client: usize, question_id: QuestionId, now: Instant) -> Vec<Effect> {
        let coordinator = &mut self.clients[client];
        let Some(question) = coordinator
            .game()
            .current_question
            .clone()
            .filter(|q| q.id == question_id)
        else {
            return Vec::new();
        };
        let choice = match self.policy {
            AnswerPolicy::Correct { .. } => question.correct_answer.clone(),
            AnswerPolicy::Wrong { .. } => question
                .options
                .iter()
                .find(|o| **o != question.correct_answer)
                .cloned()
                .unwrap_or_default(),
            AnswerPolicy::TimeOut => return Vec::new(),
        };
        match coordinator.submit_answer(choice, now) {
            Ok((_, fx)) => fx,
            Err(_) => Vec::new(),
        }
    }

    fn apply_effects(&mut self, client: usize, fx: Vec<Effect>) {
        for effect in fx {
            match effect {
                Effect::Broadcast(message) => {
                    for target in 0..self.clients.len() {
                        if target == client && !self.echo_to_sender {
                            continue;
                        }
                        if let Some(filter) = self.drop_filter.as_mut() {
                            if filter(target, &message) {
                                self.dropped += 1;
                                continue;
                            }
                        }
                        let event = ChannelEvent::Game(message.clone());
                        self.schedule(self.latency_ms, target, Work::Deliver(event.clone()));
                        if self.duplicate_delivery {
                            self.schedule(self.latency_ms + 1, target, Work::Deliver(event));
                        }
                    }
                    self.sent.push(message);
                }
                Effect::StartTimer { token, after } => {
                    self.schedule(after.as_millis() as u64, client, Work::Timer(token));
                }
                Effect::CancelTimer(token) => self.queue.retain(|s| {
                    !(s.client == client && matches!(s.work, Work::Timer(t) if t == token))
                }),
                Effect::GenerateQuestion { request, position } => {
                    self.schedule(
                        self.generation_ms,
                        client,
                        Work::Generated { request, position },
                    );
                }
                Effect::Persist(op) => self.persisted.push(op),
                Effect::GameFinished => self.finished.push(client),
            }
        }
        self.schedule_answer(client);
    }

    fn schedule_answer(&mut self, client: usize) {
        let coordinator = &self.clients[client];
        if coordinator.phase() != Phase::Question || !coordinator.is_my_turn() {
            return;
        }
        let Some(question_id) = coordinator.game().current_question.as_ref().map(|q| q.id) else {
            return;
        };
        let after_ms = match self.policy {
            AnswerPolicy::TimeOut => return,
            AnswerPolicy::Correct { after_ms } | AnswerPolicy::Wrong { after_ms } => after_ms,
        };
        if self.answers_scheduled.insert((client, question_id)) {
            self.schedule(after_ms, client, Work::Answer(question_id));
        }
    }

    fn schedule(&mut self, delay_ms: u64, client: usize, work: Work) {
        self.seq += 1;
        self.queue.push(Scheduled {
            due_ms: self.now_ms + delay_ms,
            seq: self.seq,
            client,
            work,
        });
    }

    fn pop_next(&mut self) -> Option<Scheduled> {
        let index = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.due_ms, s.seq))
            .map(|(i, _)| i)?;
        Some(self.queue.swap_remove(index))
    }
}

/// Creates a lobby with `player_count` players where the first one hosts
pub fn create_online_lobby(player_count: usize, rounds: u32) -> Game {
    let players: Vec<Player> = (0..player_count)
        .map(|i| {
            let mut player = Player::new(
                Uuid::new_v4(),
                format!("Player{}", i + 1),
                AgeGroup::Adult,
                5,
            );
            player.is_host = i == 0;
            player
        })
        .collect();

    Game {
        id: Uuid::new_v4(),
        room_code: Some("K7QM".to_string()),
        host_id: players.first().map(|p| p.id),
        settings: GameSettings {
            mode: GameMode::Online,
            rounds,
            ..GameSettings::default()
        },
        players,
        ..Game::default()
    }
}

/// Asserts every replica agrees on the outcome of the game
pub fn assert_replicas_agree(network: &SimNetwork) {
    let reference = network.clients[0].game();
    for (i, client) in network.clients.iter().enumerate().skip(1) {
        let game = client.game();
        assert_eq!(game.status, reference.status, "client {} status", i);
        assert_eq!(
            game.round_results, reference.round_results,
            "client {} results",
            i
        );
        for (mine, theirs) in game.players.iter().zip(&reference.players) {
            assert_eq!(mine.score, theirs.score, "client {} score of {}", i, mine.name);
            assert_eq!(mine.streak, theirs.streak, "client {} streak of {}", i, mine.name);
        }
    }
}

pub fn player_ids(game: &Game) -> Vec<PlayerId> {
    game.players.iter().map(|p| p.id).collect()
}
