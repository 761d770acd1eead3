use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trivia_core::{Effect, OnlineCoordinator, PersistOp, QuestionRequest, TimerToken};
use trivia_types::{
    AnswerOutcome, ChannelEvent, Game, GameError, GameMessage, Phase, Question, TurnPosition,
    TurnView,
};

use crate::backstop::{Backstop, mirror};
use crate::error::SessionError;
use crate::generator::{QuestionGenerator, generate_within};
use crate::transport::{Subscription, Transport};

/// What a presentation layer renders: the replicated game plus this
/// client's view of the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub game: Game,
    pub view: TurnView,
}

impl SessionSnapshot {
    fn of(coordinator: &OnlineCoordinator) -> Self {
        Self {
            game: coordinator.game().clone(),
            view: coordinator.view(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.view.phase == Phase::Finished
    }
}

enum Command {
    Start(oneshot::Sender<Result<(), GameError>>),
    SetReady(bool, oneshot::Sender<Result<(), GameError>>),
    Answer(String, oneshot::Sender<Result<AnswerOutcome, GameError>>),
    Leave(oneshot::Sender<()>),
}

enum Wakeup {
    Timer(TimerToken),
    Generated {
        request: QuestionRequest,
        position: TurnPosition,
        result: anyhow::Result<Question>,
    },
}

/// Collaborators a running session needs
pub struct SessionParts {
    pub coordinator: OnlineCoordinator,
    pub transport: Arc<dyn Transport>,
    pub subscription: Subscription,
    pub backstop: Arc<dyn Backstop>,
    pub generator: Arc<dyn QuestionGenerator>,
    pub generation_timeout: Duration,
}

/// Handle to a running online session. Cloning shares the same session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    driver: Arc<JoinHandle<()>>,
}

impl SessionHandle {
    pub async fn start_game(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start(reply))?;
        Ok(response.await.map_err(|_| SessionError::Closed)??)
    }

    pub async fn set_ready(&self, is_ready: bool) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SetReady(is_ready, reply))?;
        Ok(response.await.map_err(|_| SessionError::Closed)??)
    }

    pub async fn submit_answer(
        &self,
        choice: impl Into<String>,
    ) -> Result<AnswerOutcome, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Answer(choice.into(), reply))?;
        Ok(response.await.map_err(|_| SessionError::Closed)??)
    }

    /// Unsubscribes from the game channel and stops the driver
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Leave(reply))?;
        response.await.map_err(|_| SessionError::Closed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn view(&self) -> TurnView {
        self.snapshots.borrow().view.clone()
    }

    /// Waits for the next published snapshot
    pub async fn changed(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    /// Waits until a snapshot satisfies `predicate`, starting with the current one
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let snapshot = self
            .snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

pub fn spawn_session(parts: SessionParts) -> SessionHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshots) = watch::channel(SessionSnapshot::of(&parts.coordinator));
    let driver = tokio::spawn(run_session(parts, command_rx, snapshot_tx));

    SessionHandle {
        commands,
        snapshots,
        driver: Arc::new(driver),
    }
}

struct Driver {
    coordinator: OnlineCoordinator,
    channel: String,
    generator: Arc<dyn QuestionGenerator>,
    generation_timeout: Duration,
    timers: HashMap<TimerToken, JoinHandle<()>>,
    wakeups: mpsc::UnboundedSender<Wakeup>,
    outbound: mpsc::UnboundedSender<GameMessage>,
    mirror_queue: mpsc::UnboundedSender<PersistOp>,
    finished: bool,
}

async fn run_session(
    parts: SessionParts,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
) {
    let SessionParts {
        coordinator,
        transport,
        mut subscription,
        backstop,
        generator,
        generation_timeout,
    } = parts;
    let channel = subscription.channel.clone();
    let (wakeups, mut wakeup_rx) = mpsc::unbounded_channel();

    // One sender task keeps this client's messages in order on the channel
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let sender_task = tokio::spawn(send_loop(transport.clone(), channel.clone(), outbound_rx));
    let (mirror_queue, mirror_rx) = mpsc::unbounded_channel();
    let mirror_task = tokio::spawn(mirror_loop(backstop, mirror_rx));

    let mut driver = Driver {
        coordinator,
        channel: channel.clone(),
        generator,
        generation_timeout,
        timers: HashMap::new(),
        wakeups,
        outbound,
        mirror_queue,
        finished: false,
    };
    info!(
        "Session for {} started on {}",
        driver.coordinator.me(),
        driver.channel
    );

    let mut leave_reply = None;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Leave(reply)) => {
                    leave_reply = Some(reply);
                    break;
                }
                Some(command) => driver.handle_command(command, &snapshots),
                None => break,
            },
            event = subscription.events.recv() => match event {
                Some(event) => {
                    let fx = driver.coordinator.handle_transport_event(&event, now());
                    driver.apply(fx);
                    publish(&snapshots, &driver.coordinator);
                }
                None => {
                    warn!("Channel {} closed under the session", driver.channel);
                    break;
                }
            },
            Some(wakeup) = wakeup_rx.recv() => {
                let fx = match wakeup {
                    Wakeup::Timer(token) => {
                        driver.timers.remove(&token);
                        driver.coordinator.on_timer(token, now())
                    }
                    Wakeup::Generated { request, position, result } => {
                        driver.coordinator.on_question_generated(&request, position, result, now())
                    }
                };
                driver.apply(fx);
                publish(&snapshots, &driver.coordinator);
            }
        }
        if driver.finished {
            info!("Game on {} finished", driver.channel);
            break;
        }
    }

    for (_, timer) in driver.timers.drain() {
        timer.abort();
    }
    // Let queued broadcasts and mirror writes drain before leaving the channel
    drop(driver);
    let _ = sender_task.await;
    let _ = mirror_task.await;
    if let Err(e) = transport.unsubscribe(&channel).await {
        warn!("Failed to unsubscribe from {}: {}", channel, e);
    }
    if let Some(reply) = leave_reply {
        let _ = reply.send(());
    }
}

impl Driver {
    fn handle_command(&mut self, command: Command, snapshots: &watch::Sender<SessionSnapshot>) {
        match command {
            Command::Start(reply) => {
                let result = self.coordinator.start_game(now()).map(|fx| self.apply(fx));
                publish(snapshots, &self.coordinator);
                let _ = reply.send(result);
            }
            Command::SetReady(is_ready, reply) => {
                let result = self.coordinator.set_ready(is_ready).map(|fx| self.apply(fx));
                publish(snapshots, &self.coordinator);
                let _ = reply.send(result);
            }
            Command::Answer(choice, reply) => {
                let result = self
                    .coordinator
                    .submit_answer(choice, now())
                    .map(|(outcome, fx)| {
                        self.apply(fx);
                        outcome
                    });
                publish(snapshots, &self.coordinator);
                let _ = reply.send(result);
            }
            Command::Leave(_) => {}
        }
    }

    fn apply(&mut self, fx: Vec<Effect>) {
        for effect in fx {
            match effect {
                Effect::Broadcast(message) => {
                    let _ = self.outbound.send(message);
                }
                Effect::StartTimer { token, after } => {
                    let wakeups = self.wakeups.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = wakeups.send(Wakeup::Timer(token));
                    });
                    self.timers.insert(token, timer);
                }
                Effect::CancelTimer(token) => {
                    if let Some(timer) = self.timers.remove(&token) {
                        timer.abort();
                    }
                }
                Effect::GenerateQuestion { request, position } => {
                    let generator = self.generator.clone();
                    let wakeups = self.wakeups.clone();
                    let limit = self.generation_timeout;
                    tokio::spawn(async move {
                        let result = generate_within(generator.as_ref(), &request, limit)
                            .await
                            .map_err(anyhow::Error::from);
                        let _ = wakeups.send(Wakeup::Generated {
                            request,
                            position,
                            result,
                        });
                    });
                }
                Effect::Persist(op) => {
                    let _ = self.mirror_queue.send(op);
                }
                Effect::GameFinished => self.finished = true,
            }
        }
    }
}

async fn send_loop(
    transport: Arc<dyn Transport>,
    channel: String,
    mut outbound: mpsc::UnboundedReceiver<GameMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let kind = message.payload.kind();
        let event = match ChannelEvent::Game(message).encode() {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode {} message: {}", kind, e);
                continue;
            }
        };
        // Acks are informational only; nothing is retried
        match transport.send(&channel, event).await {
            Ok(receipt) => debug!("Sent {} to {} peers", kind, receipt.delivered),
            Err(e) => warn!("Failed to send {} on {}: {}", kind, channel, e),
        }
    }
}

async fn mirror_loop(backstop: Arc<dyn Backstop>, mut queue: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = queue.recv().await {
        mirror(backstop.as_ref(), &op).await;
    }
}

fn publish(snapshots: &watch::Sender<SessionSnapshot>, coordinator: &OnlineCoordinator) {
    snapshots.send_if_modified(|current| {
        let next = SessionSnapshot::of(coordinator);
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// Coordinator clock. Tokio's clock so paused-time tests see virtual time.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
