use tracing::{debug, warn};
use trivia_types::{
    Game, GameStatus, Player, PlayerId, PlayerUpdate, Question, RoundResult, SettingsUpdate,
};

/// Client-local view of a session: the replicated game plus fields that
/// never leave this client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub game: Game,
    pub my_player_id: Option<PlayerId>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    ResetGame,
    SetGame(Game),
    AddPlayer(Player),
    RemovePlayer(PlayerId),
    UpdatePlayer {
        id: PlayerId,
        update: PlayerUpdate,
    },
    SetSettings(SettingsUpdate),
    SetStatus(GameStatus),
    SetQuestion(Question),
    RecordResult(RoundResult),
    /// A peer reported how many turns it has completed; never lowers the count
    SyncCompletedTurns(usize),
    NextTurn,
    SetRound(u32),
    SetTurnAndQuestion {
        turn_index: usize,
        round: u32,
        question: Question,
    },
    PrepareNextTurn {
        turn_index: usize,
        round: u32,
    },
    SetError(Option<String>),
    SetLoading(bool),
    SetMyPlayerId(PlayerId),
}

/// Applies one action to a copy of `state`. The input is never modified.
pub fn reduce(state: &SessionState, action: GameAction) -> SessionState {
    let mut next = state.clone();
    let game = &mut next.game;

    match action {
        GameAction::ResetGame => return SessionState::default(),
        GameAction::SetGame(replacement) => *game = replacement,
        GameAction::AddPlayer(player) => {
            if game.players.iter().any(|p| p.id == player.id) {
                debug!("Player {} already in roster, skipping add", player.id);
            } else {
                game.players.push(player);
            }
        }
        GameAction::RemovePlayer(id) => {
            game.players.retain(|p| p.id != id);
            clamp_turn_index(game);
        }
        GameAction::UpdatePlayer { id, update } => {
            if let Some(player) = game.players.iter_mut().find(|p| p.id == id) {
                player.apply(&update);
            }
        }
        GameAction::SetSettings(update) => {
            if game.status == GameStatus::Lobby {
                game.settings = game.settings.merged(&update);
            } else {
                warn!("Ignoring settings change for game {} outside the lobby", game.id);
            }
        }
        GameAction::SetStatus(status) => {
            if game.status.can_transition_to(status) {
                game.status = status;
            } else {
                warn!(
                    "Ignoring backward status change {:?} -> {:?} for game {}",
                    game.status, status, game.id
                );
            }
        }
        GameAction::SetQuestion(question) => {
            game.question_history.push(question.text.clone());
            game.current_question = Some(question);
        }
        GameAction::RecordResult(result) => game.round_results.push(result),
        GameAction::SyncCompletedTurns(reported) => {
            if reported > game.completed_turns() {
                debug!(
                    "Catching up to {} completed turns from {}",
                    reported,
                    game.completed_turns()
                );
                game.earlier_turns = reported - game.round_results.len();
            }
        }
        GameAction::NextTurn => {
            let count = game.players.len();
            if count > 0 {
                let next_index = (game.current_player_turn_index + 1) % count;
                if next_index == 0 {
                    game.current_round += 1;
                }
                game.current_player_turn_index = next_index;
            }
            game.current_question = None;
        }
        GameAction::SetRound(round) => game.current_round = round,
        GameAction::SetTurnAndQuestion {
            turn_index,
            round,
            question,
        } => {
            game.current_player_turn_index = wrap_index(turn_index, game.players.len());
            game.current_round = round;
            game.question_history.push(question.text.clone());
            game.current_question = Some(question);
        }
        GameAction::PrepareNextTurn { turn_index, round } => {
            game.current_player_turn_index = wrap_index(turn_index, game.players.len());
            game.current_round = round;
            game.current_question = None;
        }
        GameAction::SetError(error) => next.error = error,
        GameAction::SetLoading(loading) => next.is_loading = loading,
        GameAction::SetMyPlayerId(id) => next.my_player_id = Some(id),
    }

    next
}

fn wrap_index(index: usize, count: usize) -> usize {
    if count == 0 { 0 } else { index % count }
}

fn clamp_turn_index(game: &mut Game) {
    let count = game.players.len();
    if count == 0 {
        game.current_player_turn_index = 0;
    } else if game.current_player_turn_index >= count {
        game.current_player_turn_index = count - 1;
    }
}

/// Listener notified after every dispatch
pub trait StoreListener: Send {
    fn on_dispatch(&mut self, action: &GameAction, state: &SessionState);
}

/// Owned session state container with dispatch and change subscription
pub struct GameStore {
    state: SessionState,
    listeners: Vec<Box<dyn StoreListener>>,
}

impl GameStore {
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn game(&self) -> &Game {
        &self.state.game
    }

    pub fn subscribe(&mut self, listener: Box<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub fn dispatch(&mut self, action: GameAction) {
        self.state = reduce(&self.state, action.clone());
        for listener in &mut self.listeners {
            listener.on_dispatch(&action, &self.state);
        }
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}
