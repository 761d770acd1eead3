pub mod backstop;
pub mod config;
pub mod driver;
pub mod error;
pub mod generator;
pub mod local;
pub mod lobby;
pub mod transport;

pub use backstop::{Backstop, HttpBackstop, MemoryBackstop};
pub use config::ClientConfig;
pub use driver::{SessionHandle, SessionSnapshot};
pub use error::*;
pub use generator::{GeminiQuestionGenerator, QuestionGenerator};
pub use local::LocalSession;
pub use lobby::{OnlineSession, PlayerProfile, SessionServices, create_online_game, join_online_game};
pub use transport::{MemoryHub, MemoryTransport, Transport, WsTransport};
